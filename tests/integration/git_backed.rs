//! The service over the git client, against local repositories.

use anyhow::Result;
use reposerve::cache::Cache;
use reposerve::git::GitClientFactory;
use reposerve::models::{ManifestRequest, Repository};
use reposerve::service::ManifestService;
use reposerve::test_utils::TestGit;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::common::{manifest_names, request};

fn config_map(name: &str) -> String {
    format!("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {name}\n")
}

fn origin(dir: &Path) -> Result<TestGit> {
    let git = TestGit::new(dir);
    git.init()?;
    git.config_user()?;
    Ok(git)
}

fn service(work: &Path) -> ManifestService {
    ManifestService::new(Arc::new(GitClientFactory::new("git", None)), Cache::in_memory(), work)
}

fn request_at(origin: &Path, revision: &str) -> ManifestRequest {
    let url = origin.display().to_string();
    let mut req = request("app");
    req.repo = Repository::new(url.clone());
    req.application_source.repo_url = url;
    req.application_source.target_revision = revision.to_string();
    req
}

#[tokio::test]
async fn test_moving_head_renders_the_new_commit() -> Result<()> {
    let upstream = TempDir::new()?;
    let work = TempDir::new()?;
    let git = origin(upstream.path())?;
    let first = git.commit_files(&[("app/cm.yaml", config_map("first").as_str())], "first")?;
    let svc = service(work.path());
    let cancel = CancellationToken::new();

    let before = svc.generate_manifest(&request_at(upstream.path(), "HEAD"), &cancel).await?;
    assert_eq!(before.revision, first);
    assert_eq!(manifest_names(&before.manifests)?, vec!["first"]);

    let second = git.commit_files(&[("app/cm.yaml", config_map("second").as_str())], "second")?;
    let after = svc.generate_manifest(&request_at(upstream.path(), "HEAD"), &cancel).await?;
    assert_eq!(after.revision, second);
    assert_eq!(manifest_names(&after.manifests)?, vec!["second"]);
    Ok(())
}

#[tokio::test]
async fn test_semver_constraint_picks_the_greatest_matching_tag() -> Result<()> {
    let upstream = TempDir::new()?;
    let work = TempDir::new()?;
    let git = origin(upstream.path())?;
    git.commit_files(&[("app/cm.yaml", config_map("v1-0").as_str())], "1.0")?;
    git.tag("v1.0.0")?;
    let wanted = git.commit_files(&[("app/cm.yaml", config_map("v1-2").as_str())], "1.2")?;
    git.tag("v1.2.0")?;
    git.commit_files(&[("app/cm.yaml", config_map("v2-0").as_str())], "2.0")?;
    git.tag("v2.0.0")?;

    let svc = service(work.path());
    let response = svc
        .generate_manifest(&request_at(upstream.path(), "^1.0"), &CancellationToken::new())
        .await?;

    assert_eq!(response.revision, wanted);
    assert_eq!(manifest_names(&response.manifests)?, vec!["v1-2"]);
    Ok(())
}

#[tokio::test]
async fn test_list_and_read_files_at_a_branch() -> Result<()> {
    let upstream = TempDir::new()?;
    let work = TempDir::new()?;
    let git = origin(upstream.path())?;
    git.commit_files(&[("app/cm.yaml", config_map("main").as_str()), ("README.md", "# apps\n")], "initial")?;
    git.create_branch("feature")?;
    git.commit_files(&[("app/extra.yaml", config_map("extra").as_str())], "feature work")?;

    let svc = service(work.path());
    let repo = Repository::new(upstream.path().display().to_string());
    let cancel = CancellationToken::new();

    let files = svc.list_dir(&repo, "*.yaml", "feature", &cancel).await?;
    assert_eq!(files, vec!["app/cm.yaml", "app/extra.yaml"]);

    let readme = svc.get_file(&repo, "README.md", "feature", &cancel).await?;
    assert_eq!(readme, b"# apps\n");
    Ok(())
}
