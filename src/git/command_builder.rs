//! Type-safe Git command builder for consistent command execution
//!
//! This module provides a fluent API for building and executing Git commands.
//! Execution is delegated to [`ExecCommand`], so Git invocations share the
//! timeout, cancellation and logging behavior of every other external tool.
//! Git-specific concerns live here: running with `-C <dir>`, disabling
//! interactive prompts, and the convenience constructors for the handful of
//! operations the repository client needs.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::url::url_credentials;
use crate::utils::exec::ExecCommand;
use crate::utils::platform::get_git_command;

/// Builder for constructing and executing Git commands.
///
/// # Examples
///
/// ```rust,no_run
/// use reposerve::git::command_builder::GitCommand;
///
/// # async fn example() -> anyhow::Result<()> {
/// let sha = GitCommand::rev_parse("HEAD")
///     .current_dir("/tmp/_reposerve/https:__github.com_example_apps")
///     .execute_stdout()
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// # Default Configuration
///
/// - **Program**: `git` from `PATH` (`git.exe` on Windows)
/// - **Timeout**: 5 minutes
/// - **Environment**: inherited, plus `GIT_TERMINAL_PROMPT=0`
pub struct GitCommand {
    /// Git executable
    program: String,

    /// Command arguments to pass to Git (e.g., ["fetch", "origin"])
    args: Vec<String>,

    /// Working directory, passed to git with `-C`
    current_dir: Option<PathBuf>,

    /// `-c key=value` overrides placed before the subcommand
    config: Vec<(String, String)>,

    /// Environment variables to set for the Git process
    env_vars: Vec<(String, String)>,

    /// Maximum duration to wait for command completion (None = no timeout)
    timeout_duration: Option<Duration>,

    /// Cancellation signal of the originating request
    cancel: Option<CancellationToken>,

    /// Optional context string for log lines
    context: Option<String>,

    /// Values masked in the reported command line and output
    secrets: Vec<String>,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self {
            program: get_git_command().to_string(),
            args: Vec::new(),
            current_dir: None,
            config: Vec::new(),
            env_vars: vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())],
            // Default timeout of 5 minutes for most git operations
            timeout_duration: Some(Duration::from_secs(300)),
            cancel: None,
            context: None,
            secrets: Vec::new(),
        }
    }
}

impl GitCommand {
    /// Creates a new Git command builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific git executable instead of the one on `PATH`.
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Sets the working directory for Git command execution.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Adds a `-c key=value` configuration override for this invocation.
    pub fn config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.push((key.into(), value.into()));
        self
    }

    /// Adds a single argument to the Git command.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds multiple arguments to the Git command.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds an environment variable for the Git command execution.
    ///
    /// Used for `GIT_SSH_COMMAND` when a repository carries an SSH key.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Set a custom timeout for the command (None for no timeout)
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Abort the command when the request is cancelled.
    pub fn with_cancellation(mut self, token: Option<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Set a context for logging (e.g., the repository URL)
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Mask `value` in the command line, errors and logs.
    pub fn secret(mut self, value: impl Into<String>) -> Self {
        self.secrets.push(value.into());
        self
    }

    /// Adds a repository URL argument, masking any credentials embedded in it.
    pub fn url_arg(self, url: &str) -> Self {
        let cmd = self.arg(url);
        match url_credentials(url) {
            Some(userinfo) => cmd.secret(userinfo),
            None => cmd,
        }
    }

    fn into_exec(self) -> ExecCommand {
        let mut full_args = Vec::new();
        if let Some(ref dir) = self.current_dir {
            // -C keeps git independent of the process working directory
            full_args.push("-C".to_string());
            full_args.push(dir.display().to_string());
        }
        for (key, value) in self.config {
            full_args.push("-c".to_string());
            full_args.push(format!("{key}={value}"));
        }
        full_args.extend(self.args);

        let mut cmd = ExecCommand::new(self.program)
            .args(full_args)
            .with_timeout(self.timeout_duration);
        for (key, value) in self.env_vars {
            cmd = cmd.env(key, value);
        }
        if let Some(token) = self.cancel {
            cmd = cmd.with_cancellation(token);
        }
        if let Some(ctx) = self.context {
            cmd = cmd.with_context(ctx);
        }
        for secret in self.secrets {
            cmd = cmd.secret(secret);
        }
        cmd
    }

    /// The full command line, for logging and tests.
    #[must_use]
    pub fn command_line(self) -> String {
        self.into_exec().display()
    }

    /// Execute the command and return the output
    pub async fn execute(self) -> Result<GitCommandOutput> {
        let output = self.into_exec().execute().await?;
        Ok(GitCommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// Execute the command and return only stdout as a trimmed string
    pub async fn execute_stdout(self) -> Result<String> {
        let output = self.execute().await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Execute the command and check for success without capturing output
    pub async fn execute_success(self) -> Result<()> {
        self.execute().await?;
        Ok(())
    }
}

/// Output from a Git command
#[derive(Debug)]
pub struct GitCommandOutput {
    /// Standard output from the Git command
    pub stdout: String,
    /// Standard error output from the Git command
    pub stderr: String,
}

// Convenience builders for common Git operations

impl GitCommand {
    /// Create an init command
    pub fn init() -> Self {
        Self::new().arg("init")
    }

    /// Register `url` as the `origin` remote
    pub fn remote_add(url: &str) -> Self {
        Self::new().args(["remote", "add", "origin"]).url_arg(url)
    }

    /// Point the `origin` remote at `url`
    pub fn set_remote_url(url: &str) -> Self {
        Self::new().args(["remote", "set-url", "origin"]).url_arg(url)
    }

    /// Fetch all branches and tags from origin, overwriting moved tags
    pub fn fetch() -> Self {
        Self::new().args(["fetch", "origin", "--tags", "--force"])
    }

    /// Create a forced checkout command
    pub fn checkout(ref_name: &str) -> Self {
        Self::new().args(["checkout", "--force", ref_name])
    }

    /// Remove untracked and ignored files
    pub fn clean() -> Self {
        Self::new().args(["clean", "-fdx"])
    }

    /// Create a rev-parse command
    pub fn rev_parse(ref_name: &str) -> Self {
        Self::new().args(["rev-parse", ref_name])
    }

    /// List remote references
    pub fn ls_remote(url: &str) -> Self {
        Self::new().arg("ls-remote").url_arg(url)
    }

    /// List tracked files matching a pathspec
    pub fn ls_files(pathspec: &str) -> Self {
        Self::new().args(["ls-files", "--full-name", "-z", "--", pathspec])
    }
}
