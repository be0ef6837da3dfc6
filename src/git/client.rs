//! Repository client backed by the system `git` binary.

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::command_builder::GitCommand;
use super::revision::{parse_ls_remote, resolve_from_refs};
use super::url::{ensure_suffix, is_commit_sha, is_ssh_url, strip_auth_from_url};
use super::{ClientFactory, RepoClient};
use crate::constants::{GIT_CLONE_TIMEOUT, GIT_FETCH_TIMEOUT};
use crate::models::Repository;
use crate::utils::platform::get_git_command;

/// Credential helper reading from the environment of the git process, so
/// secrets never appear on the command line.
const ENV_CREDENTIAL_HELPER: &str =
    "!f() { echo \"username=${GIT_USERNAME}\"; echo \"password=${GIT_PASSWORD}\"; }; f";

/// File inside `.git` holding the repository's SSH key.
const SSH_KEY_FILE: &str = "reposerve-ssh-key";

/// A working copy of one remote repository.
///
/// The clone lives at `work_dir` and is reused across requests; callers must
/// hold the working directory's lock while calling [`RepoClient::checkout`].
pub struct GitClient {
    repo: Repository,
    work_dir: PathBuf,
    git: String,
    timeout: Option<Duration>,
}

impl GitClient {
    /// Client for `repo` with its clone at `work_dir`.
    pub fn new(repo: Repository, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo,
            work_dir: work_dir.into(),
            git: get_git_command().to_string(),
            timeout: Some(GIT_FETCH_TIMEOUT),
        }
    }

    /// Use a specific git executable.
    #[must_use]
    pub fn with_git(mut self, git: impl Into<String>) -> Self {
        self.git = git.into();
        self
    }

    /// Timeout applied to network operations.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn safe_url(&self) -> String {
        strip_auth_from_url(&self.repo.repo).unwrap_or_else(|_| self.repo.repo.clone())
    }

    fn ssh_key_path(&self) -> PathBuf {
        self.work_dir.join(".git").join(SSH_KEY_FILE)
    }

    /// Base command with program, credentials and cancellation applied.
    fn git(&self, cmd: GitCommand, cancel: &CancellationToken) -> GitCommand {
        let mut cmd = cmd
            .program(self.git.clone())
            .with_cancellation(Some(cancel.clone()))
            .with_context(self.safe_url());

        if !self.repo.password.is_empty() && !is_ssh_url(&self.repo.repo) {
            cmd = cmd
                .config("credential.helper", ENV_CREDENTIAL_HELPER)
                .env("GIT_USERNAME", self.repo.username.clone())
                .env("GIT_PASSWORD", self.repo.password.clone())
                .secret(self.repo.password.clone());
        }

        if !self.repo.ssh_private_key.is_empty() {
            let mut ssh = format!("ssh -i {} -o IdentitiesOnly=yes", self.ssh_key_path().display());
            if self.repo.insecure_ignore_host_key {
                ssh.push_str(" -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null");
            }
            cmd = cmd.env("GIT_SSH_COMMAND", ssh);
        }
        cmd
    }

    async fn write_ssh_key(&self) -> Result<()> {
        if self.repo.ssh_private_key.is_empty() {
            return Ok(());
        }
        let path = self.ssh_key_path();
        let key = ensure_suffix(&self.repo.ssh_private_key, "\n");
        tokio::fs::write(&path, key)
            .await
            .with_context(|| format!("Failed to write SSH key to {}", path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await?;
        }
        Ok(())
    }

    /// Create the clone directory and point `origin` at the repository URL.
    async fn init(&self, cancel: &CancellationToken) -> Result<()> {
        if self.work_dir.join(".git").is_dir() {
            self.git(GitCommand::set_remote_url(&self.repo.repo), cancel)
                .current_dir(&self.work_dir)
                .execute_success()
                .await?;
        } else {
            tracing::debug!(target: "git", "Initializing {} at {}", self.safe_url(), self.work_dir.display());
            tokio::fs::create_dir_all(&self.work_dir).await.with_context(|| {
                format!("Failed to create working directory {}", self.work_dir.display())
            })?;
            self.git(GitCommand::init(), cancel)
                .current_dir(&self.work_dir)
                .execute_success()
                .await?;
            self.git(GitCommand::remote_add(&self.repo.repo), cancel)
                .current_dir(&self.work_dir)
                .execute_success()
                .await?;
        }
        self.write_ssh_key().await
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<()> {
        self.git(GitCommand::fetch(), cancel)
            .current_dir(&self.work_dir)
            .with_timeout(self.timeout.map(|t| t.max(GIT_CLONE_TIMEOUT)))
            .execute_success()
            .await
            .with_context(|| format!("Failed to fetch {}", self.safe_url()))
    }

    async fn resolve(&self, revision: &str, cancel: &CancellationToken) -> Result<String> {
        if is_commit_sha(revision) {
            return Ok(revision.to_lowercase());
        }
        let mut cmd = self
            .git(GitCommand::ls_remote(&self.repo.repo), cancel)
            .with_timeout(self.timeout);
        if self.work_dir.join(".git").is_dir() {
            cmd = cmd.current_dir(&self.work_dir);
        }
        let output = cmd
            .execute_stdout()
            .await
            .with_context(|| format!("Failed to list references of {}", self.safe_url()))?;
        let refs = parse_ls_remote(&output);
        resolve_from_refs(revision, &refs).ok_or_else(|| {
            anyhow::anyhow!("Unable to resolve '{}' to a commit SHA in {}", revision, self.safe_url())
        })
    }

    async fn do_checkout(&self, revision: &str, cancel: &CancellationToken) -> Result<String> {
        let commit = self.resolve(revision, cancel).await?;
        self.init(cancel).await?;
        self.fetch(cancel).await?;
        self.git(GitCommand::checkout(&commit), cancel)
            .current_dir(&self.work_dir)
            .execute_success()
            .await?;
        self.git(GitCommand::clean(), cancel)
            .current_dir(&self.work_dir)
            .execute_success()
            .await?;
        let head = self
            .git(GitCommand::rev_parse("HEAD"), cancel)
            .current_dir(&self.work_dir)
            .execute_stdout()
            .await?;
        tracing::debug!(target: "git", "Checked out {} at {}", self.safe_url(), head);
        Ok(head)
    }

    async fn do_ls_files(&self, pattern: &str, cancel: &CancellationToken) -> Result<Vec<String>> {
        let output = self
            .git(GitCommand::ls_files(pattern), cancel)
            .current_dir(&self.work_dir)
            .execute()
            .await?;
        Ok(output
            .stdout
            .split('\0')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }
}

impl RepoClient for GitClient {
    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn checkout<'a>(
        &'a self,
        revision: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.do_checkout(revision, cancel))
    }

    fn resolve_revision<'a>(
        &'a self,
        revision: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.resolve(revision, cancel))
    }

    fn ls_files<'a>(
        &'a self,
        pattern: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(self.do_ls_files(pattern, cancel))
    }
}

/// Creates [`GitClient`]s running a configured git executable.
#[derive(Debug, Clone)]
pub struct GitClientFactory {
    git: String,
    timeout: Option<Duration>,
}

impl Default for GitClientFactory {
    fn default() -> Self {
        Self {
            git: get_git_command().to_string(),
            timeout: Some(GIT_FETCH_TIMEOUT),
        }
    }
}

impl GitClientFactory {
    /// Factory using `git` as the executable.
    pub fn new(git: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            git: git.into(),
            timeout,
        }
    }
}

impl ClientFactory for GitClientFactory {
    fn new_client(&self, repo: &Repository, work_dir: &Path) -> Result<Arc<dyn RepoClient>> {
        Ok(Arc::new(
            GitClient::new(repo.clone(), work_dir)
                .with_git(self.git.clone())
                .with_timeout(self.timeout),
        ))
    }
}
