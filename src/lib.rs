//! reposerve - manifest generation and caching for Git-hosted Kubernetes applications
//!
//! Given a repository, a revision and an application path, reposerve produces
//! the ordered list of Kubernetes manifests the application stands for. The
//! path may hold plain YAML/JSON/Jsonnet files, a Helm chart, a Kustomize
//! overlay, a ksonnet application, or anything a registered config management
//! plugin understands.
//!
//! # Architecture Overview
//!
//! ```text
//! request -> resolve commit -> cache check -> (miss) lock working dir + render slot
//!         -> checkout -> detect type -> render -> assemble -> cache store -> response
//! ```
//!
//! - Results are cached by the commit they were produced from, so a branch
//!   that moves never serves stale manifests and an unchanged commit never
//!   renders twice.
//! - Each repository has one working directory, shared by every request for
//!   it. Checkouts and renders in one working directory are serialized with a
//!   per-directory lock; different repositories proceed in parallel.
//! - A process-wide limiter bounds how many renders run at once.
//! - Every request carries a cancellation token: lock and slot waits abort and
//!   running tools are killed when it fires.
//!
//! # Core Modules
//!
//! - [`service`] - [`service::ManifestService`], the public operations
//! - [`render`] - one renderer per source type behind a tagged union
//! - [`manifest`] - Kubernetes object helpers, YAML splitting, assembly
//! - [`source`] - source type detection from marker files
//! - [`cache`] - content cache, working directory locks, render limiter
//! - [`git`] - repository client trait and its git CLI implementation
//!
//! ## Supporting Modules
//!
//! - [`config`] - TOML configuration with environment overrides
//! - [`core`] - error taxonomy and user-facing error formatting
//! - [`models`] - request and response types
//! - [`utils`] - subprocess execution, path containment, file helpers
//! - [`cli`] - the `reposerve` command line
//!
//! # Example
//!
//! ```rust,no_run
//! use reposerve::config::ServerConfig;
//! use reposerve::models::{ApplicationSource, ManifestRequest, Repository};
//! use reposerve::service::ManifestService;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServerConfig::load_with_optional(None).await?;
//! let service = ManifestService::from_config(&config)?;
//!
//! let url = "https://github.com/argoproj/argocd-example-apps";
//! let request = ManifestRequest {
//!     repo: Repository::new(url),
//!     application_source: ApplicationSource {
//!         repo_url: url.to_string(),
//!         path: "guestbook".to_string(),
//!         target_revision: "HEAD".to_string(),
//!         ..ApplicationSource::default()
//!     },
//!     namespace: "default".to_string(),
//!     app_label_key: "app.kubernetes.io/instance".to_string(),
//!     app_label_value: "guestbook".to_string(),
//!     ..ManifestRequest::default()
//! };
//! let response = service.generate_manifest(&request, &CancellationToken::new()).await?;
//! for manifest in &response.manifests {
//!     println!("{manifest}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod git;
pub mod manifest;
pub mod models;
pub mod render;
pub mod service;
pub mod source;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
