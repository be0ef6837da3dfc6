//! Cancellable external command execution.
//!
//! Every tool the service shells out to (`git`, `helm`, `kustomize`, `ks`,
//! `jsonnet`, plugin binaries) runs through [`ExecCommand`]. The builder mirrors
//! the Git command builder's fluent API and adds two guarantees:
//!
//! - the child is spawned with `kill_on_drop`, so a request that is cancelled
//!   or times out never leaves an orphaned process behind
//! - waiting happens on the async runtime (`tokio::process`), so a long render
//!   never blocks a worker thread
//!
//! # Examples
//!
//! ```rust,no_run
//! use reposerve::utils::exec::ExecCommand;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> reposerve::core::Result<()> {
//! let token = CancellationToken::new();
//! let out = ExecCommand::new("helm")
//!     .args(["template", "guestbook", "."])
//!     .current_dir("/tmp/chart")
//!     .with_cancellation(token)
//!     .execute_stdout()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::constants::{DEFAULT_EXEC_TIMEOUT, SLOW_COMMAND_THRESHOLD};
use crate::core::{RepoServerError, Result};

/// Builder for an external command.
#[derive(Debug, Clone)]
pub struct ExecCommand {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    env_vars: Vec<(String, String)>,
    timeout_duration: Option<Duration>,
    cancel: Option<CancellationToken>,
    context: Option<String>,
    secrets: Vec<String>,
}

/// Placeholder for secret values in command lines, errors and logs.
pub const REDACTED: &str = "*****";

/// Captured output of a successful command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Standard output, lossily decoded as UTF-8
    pub stdout: String,
    /// Standard error, lossily decoded as UTF-8
    pub stderr: String,
}

impl ExecCommand {
    /// Command running `program` with the default timeout and the inherited environment.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env_vars: Vec::new(),
            timeout_duration: Some(DEFAULT_EXEC_TIMEOUT),
            cancel: None,
            context: None,
            secrets: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the command in `dir`.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Add an environment variable on top of the inherited environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Set a custom timeout (None for no timeout).
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Kill the process and fail with [`RepoServerError::Cancelled`] when `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Set a context for logging (e.g. the application name).
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Mask `value` wherever the command line or tool output is reported.
    ///
    /// Empty values are ignored.
    pub fn secret(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.secrets.push(value);
        }
        self
    }

    /// The command line as it would be typed in a shell, with secrets masked.
    #[must_use]
    pub fn display(&self) -> String {
        let line = if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        };
        self.redact(&line)
    }

    fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), REDACTED))
    }

    /// Execute the command and return the captured output.
    ///
    /// # Errors
    ///
    /// - [`RepoServerError::CommandFailed`] for a non-zero exit status
    /// - [`RepoServerError::CommandTimedOut`] when the timeout elapses
    /// - [`RepoServerError::Cancelled`] when the cancellation token fires
    /// - [`RepoServerError::ToolNotFound`] when the program does not exist
    /// - [`RepoServerError::Internal`] when the program cannot be spawned otherwise
    pub async fn execute(self) -> Result<CommandOutput> {
        let start = Instant::now();
        let line = self.display();
        let ctx = self.context.as_deref().unwrap_or("-");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env_vars {
            tracing::trace!(target: "exec", "({}) Setting env var: {}", ctx, key);
            cmd.env(key, value);
        }

        tracing::debug!(target: "exec", "({}) Executing command: {}", ctx, line);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RepoServerError::ToolNotFound {
                    program: self.program.clone(),
                });
            }
            Err(e) => {
                let err = anyhow::Error::new(e).context(format!("Failed to execute {}", self.program));
                return Err(err.into());
            }
        };
        let wait = child.wait_with_output();
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let deadline = async {
            match self.timeout_duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        };

        // Dropping `wait` on the losing branches kills the child.
        let output = tokio::select! {
            result = wait => result.with_context(|| format!("Failed to wait for {line}"))?,
            () = cancelled => {
                tracing::warn!(target: "exec", "({}) Cancelled, killing: {}", ctx, line);
                return Err(RepoServerError::cancelled(format!("running `{line}`")));
            }
            () = deadline => {
                let seconds = self.timeout_duration.map_or(0, |d| d.as_secs());
                tracing::warn!(target: "exec", "({}) Command timed out after {}s: {}", ctx, seconds, line);
                return Err(RepoServerError::CommandTimedOut { command: line, seconds });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        let elapsed = start.elapsed();
        if elapsed > SLOW_COMMAND_THRESHOLD {
            tracing::info!(target: "exec::perf", "({}) {} took {:.2}s", ctx, self.program, elapsed.as_secs_f64());
        } else {
            tracing::debug!(target: "exec::perf", "({}) {} took {}ms", ctx, self.program, elapsed.as_millis());
        }

        if !output.status.success() {
            let message = if stderr.trim().is_empty() {
                self.redact(stdout.trim())
            } else {
                self.redact(stderr.trim())
            };
            tracing::debug!(
                target: "exec",
                "({}) Command failed with exit code {:?}: {}",
                ctx,
                output.status.code(),
                message
            );
            return Err(RepoServerError::CommandFailed {
                command: line,
                status: output.status.code(),
                stderr: message,
            });
        }

        Ok(CommandOutput {
            stdout,
            stderr,
        })
    }

    /// Execute the command and return its standard output untrimmed.
    pub async fn execute_stdout(self) -> Result<String> {
        Ok(self.execute().await?.stdout)
    }
}
