//! The `reposerve` binary.

use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use reposerve::test_utils::TestGit;
use std::path::PathBuf;
use tempfile::TempDir;

const CONFIG_MAP: &str = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: from-cli\n";

/// A committed origin repository plus a config file pointing the clone root
/// into a temporary directory.
struct CliEnv {
    origin: TempDir,
    _work: TempDir,
    config: PathBuf,
}

impl CliEnv {
    fn new() -> Result<Self> {
        let origin = TempDir::new()?;
        let git = TestGit::new(origin.path());
        git.init()?;
        git.config_user()?;
        git.commit_files(&[("app/cm.yaml", CONFIG_MAP)], "initial")?;

        let work = TempDir::new()?;
        let config = work.path().join("config.toml");
        std::fs::write(&config, format!("work_root = '{}'\n", work.path().join("clones").display()))?;
        Ok(Self {
            origin,
            _work: work,
            config,
        })
    }

    fn repo(&self) -> String {
        self.origin.path().display().to_string()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("reposerve").unwrap();
        cmd.arg("--config")
            .arg(&self.config)
            .env_remove("REPOSERVE_PARALLELISM_LIMIT")
            .env_remove("REPOSERVE_USERNAME")
            .env_remove("REPOSERVE_PASSWORD");
        cmd
    }
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("reposerve")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("details"));
}

#[test]
fn test_verbose_and_quiet_are_exclusive() {
    Command::cargo_bin("reposerve")
        .unwrap()
        .args(["-v", "-q", "ls", "--repo", "https://github.com/example/apps"])
        .assert()
        .failure();
}

#[test]
fn test_cat_prints_file_content() -> Result<()> {
    let env = CliEnv::new()?;

    env.command()
        .args(["cat", "--repo", &env.repo(), "app/cm.yaml"])
        .assert()
        .success()
        .stdout(CONFIG_MAP);
    Ok(())
}

#[test]
fn test_generate_prints_json_response() -> Result<()> {
    let env = CliEnv::new()?;

    env.command()
        .args(["generate", "--repo", &env.repo(), "--path", "app", "--app-name", "demo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"sourceType\": \"Directory\""))
        .stdout(predicate::str::contains("from-cli"));
    Ok(())
}

#[test]
fn test_missing_file_fails_with_message() -> Result<()> {
    let env = CliEnv::new()?;

    env.command()
        .args(["cat", "--repo", &env.repo(), "app/absent.yaml"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no such file or directory"));
    Ok(())
}
