//! The manifest service.
//!
//! [`ManifestService`] ties the pieces together behind four operations:
//!
//! - [`ManifestService::list_dir`]: tracked files matching a pattern
//! - [`ManifestService::get_file`]: raw content of one file
//! - [`ManifestService::generate_manifest`]: rendered, labeled manifests
//! - [`ManifestService::get_app_details`]: per-type introspection
//!
//! All four follow the same sequence. The revision is resolved to a commit
//! first, without touching the working tree, because the commit is part of
//! every cache key. Then:
//!
//! ```text
//! cache lookup -> lock working dir -> cache lookup -> [render slot]
//!     -> checkout -> work -> cache store -> release
//! ```
//!
//! The second lookup catches results produced by whoever held the lock
//! before us. Only manifest generation takes a render slot from the
//! [`ParallelismLimiter`]. Cache failures never fail a request: lookups that
//! error count as misses and stores that error are logged and dropped.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cache::{Cache, KeyLock, ParallelismLimiter, compute_once};
use crate::config::{ServerConfig, ToolPaths};
use crate::core::{RepoServerError, Result};
use crate::git::{ClientFactory, GitClientFactory, RepoClient, work_dir_name};
use crate::manifest::assemble;
use crate::models::{
    AppDetailsQuery, AppDetailsResponse, ApplicationSourceType, ConfigManagementPlugin,
    KustomizeAppSpec, ManifestRequest, ManifestResponse, Repository,
};
use crate::render::{self, RenderContext, Renderer};
use crate::source::{detect_source_type, resolve_source_type};
use crate::utils::security::safe_join;

/// Manifest generation and caching service.
pub struct ManifestService {
    clients: Arc<dyn ClientFactory>,
    cache: Cache,
    locks: KeyLock,
    limiter: ParallelismLimiter,
    work_root: PathBuf,
    tools: ToolPaths,
    plugins: Vec<ConfigManagementPlugin>,
    exec_timeout: Option<Duration>,
}

impl std::fmt::Debug for ManifestService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestService")
            .field("cache", &self.cache)
            .field("limiter", &self.limiter)
            .field("work_root", &self.work_root)
            .field("plugins", &self.plugins.len())
            .finish_non_exhaustive()
    }
}

impl ManifestService {
    /// Service cloning into `work_root` through `clients`, caching in `cache`.
    ///
    /// No parallelism limit, no registered plugins, default tool names.
    pub fn new(clients: Arc<dyn ClientFactory>, cache: Cache, work_root: impl Into<PathBuf>) -> Self {
        Self {
            clients,
            cache,
            locks: KeyLock::new(),
            limiter: ParallelismLimiter::unbounded(),
            work_root: work_root.into(),
            tools: ToolPaths::default(),
            plugins: Vec::new(),
            exec_timeout: Some(crate::constants::DEFAULT_EXEC_TIMEOUT),
        }
    }

    /// Service built from configuration, using the system git.
    ///
    /// # Errors
    ///
    /// Returns an error if the work root or cache directory cannot be resolved.
    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let clients = Arc::new(GitClientFactory::new(config.tools.git.clone(), config.exec_timeout()));
        let cache = Cache::new(config.cache_store()?);
        for (tool, program) in config.tools.unavailable() {
            tracing::debug!(target: "service", "{} executable '{}' not found", tool, program);
        }
        Ok(Self::new(clients, cache, config.work_root_path()?)
            .with_parallelism_limit(config.parallelism_limit)
            .with_tools(config.tools.clone())
            .with_plugins(config.plugins.clone())
            .with_exec_timeout(config.exec_timeout()))
    }

    /// Bound concurrent renders; 0 or less means unbounded.
    #[must_use]
    pub fn with_parallelism_limit(mut self, limit: i64) -> Self {
        self.limiter = ParallelismLimiter::new(limit);
        self
    }

    /// Use these tool executables.
    #[must_use]
    pub fn with_tools(mut self, tools: ToolPaths) -> Self {
        self.tools = tools;
        self
    }

    /// Plugins available to every request, after the request's own.
    #[must_use]
    pub fn with_plugins(mut self, plugins: Vec<ConfigManagementPlugin>) -> Self {
        self.plugins = plugins;
        self
    }

    /// Timeout for each external tool run (None for no timeout).
    #[must_use]
    pub const fn with_exec_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.exec_timeout = timeout;
        self
    }

    /// The render admission gate.
    #[must_use]
    pub const fn limiter(&self) -> &ParallelismLimiter {
        &self.limiter
    }

    /// Working directory locks.
    #[must_use]
    pub const fn locks(&self) -> &KeyLock {
        &self.locks
    }

    /// Tracked files matching the git pathspec `pattern` at `revision`.
    ///
    /// # Errors
    ///
    /// Internal when the revision cannot be resolved or checked out.
    pub async fn list_dir(
        &self,
        repo: &Repository,
        pattern: &str,
        revision: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let (client, commit) = self.open(repo, revision, cancel).await?;
        let lock_key = lock_key(client.work_dir());

        compute_once(
            &self.locks,
            &lock_key,
            cancel,
            || absorb("list", &commit, false, self.cache.get_list_dir(&commit, pattern)),
            || async {
                self.checkout(client.as_ref(), &commit, cancel).await?;
                let files = client.ls_files(pattern, cancel).await?;
                stored("list", self.cache.set_list_dir(&commit, pattern, &files).await);
                Ok(files)
            },
        )
        .await
    }

    /// Content of `path` at `revision`.
    ///
    /// # Errors
    ///
    /// - InvalidArgument when `path` escapes the repository
    /// - NotFound when the file does not exist at that commit
    /// - Internal when the revision cannot be resolved or checked out
    pub async fn get_file(
        &self,
        repo: &Repository,
        path: &str,
        revision: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let (client, commit) = self.open(repo, revision, cancel).await?;
        let file_path = safe_join(client.work_dir(), path)?;
        let lock_key = lock_key(client.work_dir());

        compute_once(
            &self.locks,
            &lock_key,
            cancel,
            || absorb("file", &commit, false, self.cache.get_file(&commit, path)),
            || async {
                self.checkout(client.as_ref(), &commit, cancel).await?;
                let content = match tokio::fs::read(&file_path).await {
                    Ok(content) => content,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        return Err(RepoServerError::NotFound {
                            path: path.to_string(),
                        });
                    }
                    Err(e) => return Err(e.into()),
                };
                stored("file", self.cache.set_file(&commit, path, &content).await);
                Ok(content)
            },
        )
        .await
    }

    /// Render the application described by `request`.
    ///
    /// With `no_cache` set both cache lookups are skipped, but the render
    /// still runs under the working directory lock and a render slot, and its
    /// result is written back to the cache.
    ///
    /// # Errors
    ///
    /// Checkout failures are Internal; renderer and assembler errors are
    /// returned unchanged.
    pub async fn generate_manifest(
        &self,
        request: &ManifestRequest,
        cancel: &CancellationToken,
    ) -> Result<ManifestResponse> {
        let source = &request.application_source;
        let (client, commit) = self.open(&request.repo, request.effective_revision(), cancel).await?;
        let lock_key = lock_key(client.work_dir());

        compute_once(
            &self.locks,
            &lock_key,
            cancel,
            || {
                absorb(
                    "manifest",
                    &commit,
                    request.no_cache,
                    self.cache.get_manifests(
                        &commit,
                        source,
                        &request.namespace,
                        &request.app_label_key,
                        &request.app_label_value,
                    ),
                )
            },
            || async {
                let _permit = self.limiter.acquire(1, cancel).await?;
                let response = self.render_manifests(client.as_ref(), &commit, request, cancel).await?;
                stored(
                    "manifest",
                    self.cache
                        .set_manifests(
                            &commit,
                            source,
                            &request.namespace,
                            &request.app_label_key,
                            &request.app_label_value,
                            &response,
                        )
                        .await,
                );
                Ok(response)
            },
        )
        .await
    }

    /// Describe the application at `query.path`.
    ///
    /// The source type is always detected from the files; there is no
    /// explicit type to honor.
    ///
    /// # Errors
    ///
    /// Checkout failures are Internal; introspection errors are returned
    /// unchanged.
    pub async fn get_app_details(
        &self,
        query: &AppDetailsQuery,
        cancel: &CancellationToken,
    ) -> Result<AppDetailsResponse> {
        let (client, commit) = self.open(&query.repo, &query.revision, cancel).await?;
        let lock_key = lock_key(client.work_dir());

        compute_once(
            &self.locks,
            &lock_key,
            cancel,
            || {
                absorb(
                    "app details",
                    &commit,
                    false,
                    self.cache.get_app_details(&commit, &query.path, &query.value_files),
                )
            },
            || async {
                let details = self.describe(client.as_ref(), &commit, query, cancel).await?;
                stored(
                    "app details",
                    self.cache.set_app_details(&commit, &query.path, &query.value_files, &details).await,
                );
                Ok(details)
            },
        )
        .await
    }

    /// Client for `repo` and the commit `revision` resolves to.
    async fn open(
        &self,
        repo: &Repository,
        revision: &str,
        cancel: &CancellationToken,
    ) -> Result<(Arc<dyn RepoClient>, String)> {
        let work_dir = self.work_root.join(work_dir_name(&repo.repo));
        let client = self.clients.new_client(repo, &work_dir)?;
        let commit = client.resolve_revision(revision, cancel).await.map_err(|e| {
            if cancel.is_cancelled() {
                RepoServerError::cancelled("resolving the revision")
            } else {
                RepoServerError::Internal(e)
            }
        })?;
        tracing::debug!(target: "service", "Resolved '{}' to {}", revision, commit);
        Ok((client, commit))
    }

    async fn checkout(&self, client: &dyn RepoClient, commit: &str, cancel: &CancellationToken) -> Result<String> {
        client.checkout(commit, cancel).await.map_err(|e| {
            if cancel.is_cancelled() {
                RepoServerError::cancelled("checking out")
            } else {
                RepoServerError::CheckoutFailed {
                    revision: commit.to_string(),
                    source: e.into(),
                }
            }
        })
    }

    fn plugins_for(&self, request: &[ConfigManagementPlugin]) -> Vec<ConfigManagementPlugin> {
        request.iter().chain(&self.plugins).cloned().collect()
    }

    async fn render_manifests(
        &self,
        client: &dyn RepoClient,
        commit: &str,
        request: &ManifestRequest,
        cancel: &CancellationToken,
    ) -> Result<ManifestResponse> {
        let source = &request.application_source;
        let repo_root = client.work_dir().to_path_buf();
        self.checkout(client, commit, cancel).await?;
        let app_path = app_path(&repo_root, &source.path)?;
        let source_type = resolve_source_type(source, &app_path)?;
        let plugins = self.plugins_for(&request.plugins);

        let ctx = RenderContext {
            repo_root: &repo_root,
            app_path: &app_path,
            app_name: &request.app_label_value,
            namespace: &request.namespace,
            label_key: &request.app_label_key,
            repo: &request.repo,
            helm_repos: &request.repos,
            plugins: &plugins,
            tools: &self.tools,
            timeout: self.exec_timeout,
            cancel,
        };
        let output = Renderer::new(source_type, source).render(&ctx).await?;
        let manifests = assemble(output.objects, &request.app_label_key, &request.app_label_value)?;
        let destination = output.destination.unwrap_or_default();

        tracing::info!(
            target: "service",
            "Generated {} manifests for {} at {}",
            manifests.len(),
            source,
            commit
        );
        Ok(ManifestResponse {
            manifests,
            namespace: destination.namespace,
            server: destination.server,
            revision: commit.to_string(),
            source_type: source_type.as_str().to_string(),
        })
    }

    async fn describe(
        &self,
        client: &dyn RepoClient,
        commit: &str,
        query: &AppDetailsQuery,
        cancel: &CancellationToken,
    ) -> Result<AppDetailsResponse> {
        let repo_root = client.work_dir().to_path_buf();
        self.checkout(client, commit, cancel).await?;
        let app_path = app_path(&repo_root, &query.path)?;
        let source_type = detect_source_type(&app_path);

        let ctx = RenderContext {
            repo_root: &repo_root,
            app_path: &app_path,
            app_name: "",
            namespace: "",
            label_key: "",
            repo: &query.repo,
            helm_repos: &query.repos,
            plugins: &self.plugins,
            tools: &self.tools,
            timeout: self.exec_timeout,
            cancel,
        };
        let mut details = AppDetailsResponse {
            source_type: source_type.as_str().to_string(),
            ..AppDetailsResponse::default()
        };
        match source_type {
            ApplicationSourceType::Ksonnet => {
                details.ksonnet = Some(render::ksonnet::app_details(&ctx).await?);
            }
            ApplicationSourceType::Helm => {
                details.helm = Some(
                    render::helm::app_details(&repo_root, &app_path, &query.path, &query.value_files)
                        .await?,
                );
            }
            ApplicationSourceType::Kustomize => {
                let output = render::kustomize::render(&ctx, None).await?;
                details.kustomize = Some(KustomizeAppSpec {
                    path: query.path.clone(),
                    image_tags: output.images,
                });
            }
            ApplicationSourceType::Plugin | ApplicationSourceType::Directory => {}
        }
        Ok(details)
    }
}

/// Lock key for a working directory.
fn lock_key(work_dir: &Path) -> String {
    work_dir.display().to_string()
}

/// Application directory for `path` below `repo_root`.
fn app_path(repo_root: &Path, path: &str) -> Result<PathBuf> {
    let app_path = safe_join(repo_root, path)?;
    if !app_path.is_dir() {
        return Err(RepoServerError::NotFound {
            path: path.to_string(),
        });
    }
    Ok(app_path)
}

/// Run a cache lookup, counting errors as misses. Skipped entirely with `no_cache`.
async fn absorb<T>(
    what: &str,
    commit: &str,
    no_cache: bool,
    lookup: impl Future<Output = anyhow::Result<Option<T>>>,
) -> Option<T> {
    if no_cache {
        return None;
    }
    match lookup.await {
        Ok(Some(hit)) => {
            tracing::info!(target: "cache", "{} cache hit at {}", what, commit);
            Some(hit)
        }
        Ok(None) => {
            tracing::info!(target: "cache", "{} cache miss at {}", what, commit);
            None
        }
        Err(e) => {
            tracing::warn!(target: "cache", "{} cache lookup failed at {}: {:#}", what, commit, e);
            None
        }
    }
}

/// Log a failed cache store; stores never fail a request.
fn stored(what: &str, result: anyhow::Result<()>) {
    if let Err(e) = result {
        tracing::warn!(target: "cache", "Failed to store {} in cache: {:#}", what, e);
    }
}
