//! Content cache and the concurrency primitives around it.
//!
//! Rendering an application means a checkout and one or more external tool
//! runs, so results are cached by the commit they were produced from. The
//! cache is split into four logical namespaces:
//!
//! | Namespace     | Key                                                   | Value                 |
//! |---------------|-------------------------------------------------------|-----------------------|
//! | directory     | commit, path pattern                                  | file list             |
//! | file          | commit, path                                          | raw bytes             |
//! | manifests     | commit, normalized source, namespace, label key/value | [`ManifestResponse`]  |
//! | app details   | commit, path, value files                             | [`AppDetailsResponse`]|
//!
//! Keys are built from a JSON array of their parts, so no choice of path or
//! label value can make two different keys collide. Values other than raw
//! file content are stored as JSON.
//!
//! A lookup distinguishes a miss (`Ok(None)`) from a storage failure (`Err`).
//! The service treats both as "render it", but only the latter is logged as a
//! warning.
//!
//! # Submodules
//!
//! - [`store`]: byte-level backends ([`InMemoryStore`], [`DiskStore`])
//! - [`lock`]: [`KeyLock`], per-working-directory mutual exclusion
//! - [`limiter`]: [`ParallelismLimiter`], the render admission gate
//! - [`single_flight`]: the double-checked lookup/lock/compute sequence

pub mod limiter;
pub mod lock;
pub mod single_flight;
pub mod store;

pub use limiter::{ParallelismLimiter, RenderPermit};
pub use lock::{KeyGuard, KeyLock};
pub use single_flight::compute_once;
pub use store::{CacheStore, DiskStore, InMemoryStore};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::models::{AppDetailsResponse, ApplicationSource, ManifestResponse};

/// Logical cache namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// Directory listings
    ListDir,
    /// File contents
    File,
    /// Generated manifest bundles
    Manifests,
    /// Per-type application details
    AppDetails,
}

impl Namespace {
    const fn prefix(self) -> &'static str {
        match self {
            Self::ListDir => "ldir",
            Self::File => "file",
            Self::Manifests => "mfst",
            Self::AppDetails => "appdetails",
        }
    }
}

/// Namespaced, typed view over a [`CacheStore`].
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").field("store", &self.store.name()).finish()
    }
}

impl Cache {
    /// Cache writing through to `store`.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
        }
    }

    /// Cache backed by a fresh [`InMemoryStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    /// Build the storage key for `parts` in `namespace`.
    #[must_use]
    pub fn key(namespace: Namespace, parts: &[&str]) -> String {
        let mut all = Vec::with_capacity(parts.len() + 1);
        all.push(namespace.prefix());
        all.extend_from_slice(parts);
        // Serializing a slice of strings cannot fail
        serde_json::to_string(&all).unwrap_or_else(|_| all.join("|"))
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key).await? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Corrupt cache entry {key}"))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value).context("Failed to serialize cache entry")?;
        self.store.set(key, bytes).await
    }

    /// Cached file list for `pattern` at `commit`.
    pub async fn get_list_dir(&self, commit: &str, pattern: &str) -> Result<Option<Vec<String>>> {
        self.get_json(&Self::key(Namespace::ListDir, &[commit, pattern])).await
    }

    /// Store the file list for `pattern` at `commit`.
    pub async fn set_list_dir(&self, commit: &str, pattern: &str, files: &[String]) -> Result<()> {
        self.set_json(&Self::key(Namespace::ListDir, &[commit, pattern]), &files).await
    }

    /// Cached content of `path` at `commit`.
    pub async fn get_file(&self, commit: &str, path: &str) -> Result<Option<Vec<u8>>> {
        self.store.get(&Self::key(Namespace::File, &[commit, path])).await
    }

    /// Store the content of `path` at `commit`.
    pub async fn set_file(&self, commit: &str, path: &str, content: &[u8]) -> Result<()> {
        self.store.set(&Self::key(Namespace::File, &[commit, path]), content.to_vec()).await
    }

    fn manifest_key(
        commit: &str,
        source: &ApplicationSource,
        namespace: &str,
        label_key: &str,
        label_value: &str,
    ) -> String {
        let normalized = source.normalized();
        Self::key(Namespace::Manifests, &[commit, &normalized, namespace, label_key, label_value])
    }

    /// Cached manifests for `source` rendered at `commit`.
    pub async fn get_manifests(
        &self,
        commit: &str,
        source: &ApplicationSource,
        namespace: &str,
        label_key: &str,
        label_value: &str,
    ) -> Result<Option<ManifestResponse>> {
        self.get_json(&Self::manifest_key(commit, source, namespace, label_key, label_value)).await
    }

    /// Store manifests for `source` rendered at `commit`.
    pub async fn set_manifests(
        &self,
        commit: &str,
        source: &ApplicationSource,
        namespace: &str,
        label_key: &str,
        label_value: &str,
        response: &ManifestResponse,
    ) -> Result<()> {
        self.set_json(&Self::manifest_key(commit, source, namespace, label_key, label_value), response)
            .await
    }

    /// Cached application details for `path` at `commit`.
    pub async fn get_app_details(
        &self,
        commit: &str,
        path: &str,
        value_files: &[String],
    ) -> Result<Option<AppDetailsResponse>> {
        let files = value_files.join(",");
        self.get_json(&Self::key(Namespace::AppDetails, &[commit, path, &files])).await
    }

    /// Store application details for `path` at `commit`.
    pub async fn set_app_details(
        &self,
        commit: &str,
        path: &str,
        value_files: &[String],
        details: &AppDetailsResponse,
    ) -> Result<()> {
        let files = value_files.join(",");
        self.set_json(&Self::key(Namespace::AppDetails, &[commit, path, &files]), details).await
    }
}
