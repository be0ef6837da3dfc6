//! Command-line interface for reposerve.
//!
//! The binary drives a [`ManifestService`] for a single request and prints
//! the result as JSON on stdout (raw bytes for `cat`). Logs go to stderr.
//!
//! # Commands
//!
//! - `generate` - render manifests for an application path
//! - `ls` - list tracked files matching a pattern
//! - `cat` - print one file
//! - `details` - describe the application at a path
//!
//! # Global Options
//!
//! - `--config <path>` - configuration file (see [`crate::config`])
//! - `--verbose` - debug logging
//! - `--quiet` - errors only
//!
//! # Examples
//!
//! ```bash
//! reposerve generate --repo https://github.com/argoproj/argocd-example-apps \
//!     --path guestbook --revision HEAD --app-name guestbook --namespace default
//! reposerve ls --repo https://github.com/argoproj/argocd-example-apps '*.yaml'
//! reposerve cat --repo https://github.com/argoproj/argocd-example-apps guestbook/guestbook-ui-svc.yaml
//! ```
//!
//! Interrupting the process with Ctrl-C cancels the request: lock and slot
//! waits abort and running tools are killed.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::constants::DEFAULT_APP_INSTANCE_LABEL_KEY;
use crate::models::{
    AppDetailsQuery, ApplicationSource, ApplicationSourceDirectory, ApplicationSourceHelm,
    ApplicationSourcePlugin, ManifestRequest, Repository,
};
use crate::service::ManifestService;

/// Manifest generation for Git-hosted Kubernetes applications.
#[derive(Debug, Parser)]
#[command(
    name = "reposerve",
    about = "Render and cache Kubernetes manifests from Git repositories",
    version,
    long_about = "reposerve resolves a revision, checks out the repository and renders the \
                  application at a path with Helm, Kustomize, ksonnet, a config management \
                  plugin, or as plain YAML/JSON/Jsonnet."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file
    #[arg(long, global = true, env = "REPOSERVE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render manifests for an application
    Generate(GenerateArgs),
    /// List tracked files matching a pattern
    Ls(LsArgs),
    /// Print the content of a file
    Cat(CatArgs),
    /// Describe the application at a path
    Details(DetailsArgs),
}

/// Repository and credentials, shared by every command.
#[derive(Debug, Args)]
struct RepoArgs {
    /// Repository URL
    #[arg(long)]
    repo: String,

    /// Revision: branch, tag, commit SHA or semver constraint
    #[arg(long, default_value = "HEAD")]
    revision: String,

    /// HTTPS username
    #[arg(long, env = "REPOSERVE_USERNAME")]
    username: Option<String>,

    /// HTTPS password or token
    #[arg(long, env = "REPOSERVE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// File holding an SSH private key
    #[arg(long)]
    ssh_key_path: Option<PathBuf>,

    /// Skip SSH host key verification
    #[arg(long)]
    insecure_ignore_host_key: bool,
}

impl RepoArgs {
    async fn repository(&self) -> Result<Repository> {
        let ssh_private_key = match &self.ssh_key_path {
            Some(path) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read SSH key from {}", path.display()))?,
            None => String::new(),
        };
        Ok(Repository {
            username: self.username.clone().unwrap_or_default(),
            password: self.password.clone().unwrap_or_default(),
            ssh_private_key,
            insecure_ignore_host_key: self.insecure_ignore_host_key,
            ..Repository::new(self.repo.clone())
        })
    }
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[command(flatten)]
    repo: RepoArgs,

    /// Application path within the repository
    #[arg(long, default_value = ".")]
    path: String,

    /// Application name, used as the instance label value
    #[arg(long, default_value = "")]
    app_name: String,

    /// Target namespace
    #[arg(long, default_value = "")]
    namespace: String,

    /// Instance label key
    #[arg(long, default_value = DEFAULT_APP_INSTANCE_LABEL_KEY)]
    label_key: String,

    /// Helm value files, relative to the chart
    #[arg(long = "values")]
    value_files: Vec<String>,

    /// Render with this registered plugin
    #[arg(long)]
    plugin: Option<String>,

    /// Recurse into subdirectories of a plain directory
    #[arg(long)]
    recurse: bool,

    /// Skip cache lookups
    #[arg(long)]
    no_cache: bool,
}

impl GenerateArgs {
    async fn request(&self) -> Result<ManifestRequest> {
        let repo = self.repo.repository().await?;
        let mut source = ApplicationSource {
            repo_url: repo.repo.clone(),
            path: self.path.clone(),
            target_revision: self.repo.revision.clone(),
            ..ApplicationSource::default()
        };
        if !self.value_files.is_empty() {
            source.helm = Some(ApplicationSourceHelm {
                value_files: self.value_files.clone(),
                ..ApplicationSourceHelm::default()
            });
        }
        if let Some(name) = &self.plugin {
            source.plugin = Some(ApplicationSourcePlugin {
                name: name.clone(),
            });
        }
        if self.recurse {
            source.directory = Some(ApplicationSourceDirectory {
                recurse: true,
                ..ApplicationSourceDirectory::default()
            });
        }

        Ok(ManifestRequest {
            repo,
            application_source: source,
            revision: self.repo.revision.clone(),
            namespace: self.namespace.clone(),
            app_label_key: self.label_key.clone(),
            app_label_value: self.app_name.clone(),
            no_cache: self.no_cache,
            ..ManifestRequest::default()
        })
    }
}

#[derive(Debug, Args)]
struct LsArgs {
    #[command(flatten)]
    repo: RepoArgs,

    /// Git pathspec, e.g. `*.yaml`
    #[arg(default_value = "*")]
    pattern: String,
}

#[derive(Debug, Args)]
struct CatArgs {
    #[command(flatten)]
    repo: RepoArgs,

    /// File path within the repository
    path: String,
}

#[derive(Debug, Args)]
struct DetailsArgs {
    #[command(flatten)]
    repo: RepoArgs,

    /// Application path within the repository
    #[arg(long, default_value = ".")]
    path: String,

    /// Helm value files to include in the parameter listing
    #[arg(long = "values")]
    value_files: Vec<String>,
}

impl Cli {
    /// Log filter for the global flags: `RUST_LOG` unless `--verbose` or `--quiet`.
    #[must_use]
    pub fn log_filter(&self) -> EnvFilter {
        if self.verbose {
            EnvFilter::new("debug")
        } else if self.quiet {
            EnvFilter::new("error")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
        }
    }

    /// Install the stderr log subscriber.
    pub fn init_logging(&self) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(self.log_filter())
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init();
    }

    /// Run the selected command, cancelling it on Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns the service error, or a configuration or I/O failure.
    pub async fn execute(self) -> Result<()> {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling");
                on_interrupt.cancel();
            }
        });
        self.execute_with_cancel(&cancel).await
    }

    /// Run the selected command under `cancel`.
    ///
    /// # Errors
    ///
    /// Returns the service error, or a configuration or I/O failure.
    pub async fn execute_with_cancel(self, cancel: &CancellationToken) -> Result<()> {
        let config = ServerConfig::load_with_optional(self.config.clone()).await?;
        let service = ManifestService::from_config(&config)?;
        tracing::debug!("Using {:?}", service);

        match self.command {
            Commands::Generate(args) => {
                let request = args.request().await?;
                let response = service.generate_manifest(&request, cancel).await?;
                print_json(&response)
            }
            Commands::Ls(args) => {
                let repo = args.repo.repository().await?;
                let files = service.list_dir(&repo, &args.pattern, &args.repo.revision, cancel).await?;
                print_json(&files)
            }
            Commands::Cat(args) => {
                let repo = args.repo.repository().await?;
                let content = service.get_file(&repo, &args.path, &args.repo.revision, cancel).await?;
                std::io::stdout().write_all(&content)?;
                Ok(())
            }
            Commands::Details(args) => {
                let query = AppDetailsQuery {
                    repo: args.repo.repository().await?,
                    path: args.path,
                    revision: args.repo.revision,
                    value_files: args.value_files,
                    repos: Vec::new(),
                };
                let details = service.get_app_details(&query, cancel).await?;
                print_json(&details)
            }
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
