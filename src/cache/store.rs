//! Storage backends for the content cache.
//!
//! A [`CacheStore`] is a plain byte-oriented key-value store. Namespacing,
//! key construction and serialization live one layer up in
//! [`super::Cache`]; stores only move bytes.
//!
//! Two backends ship with the crate:
//!
//! - [`InMemoryStore`]: a concurrent map, lost on restart
//! - [`DiskStore`]: one file per entry under a directory, named by the
//!   SHA-256 of the key, written atomically so concurrent writers of the
//!   same key never produce a torn entry

use anyhow::{Context, Result};
use dashmap::DashMap;
use futures::future::BoxFuture;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::utils::fs::atomic_write;

/// Byte-oriented key-value backend.
///
/// `get` returns `Ok(None)` for a miss; `Err` is reserved for storage
/// failures.
pub trait CacheStore: Send + Sync {
    /// Look up `key`.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>) -> BoxFuture<'a, Result<()>>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Process-local store backed by a concurrent hash map.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: DashMap<String, Vec<u8>>,
}

impl InMemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for InMemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
        Box::pin(async move { Ok(self.entries.get(key).map(|v| v.value().clone())) })
    }

    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.entries.insert(key.to_string(), value);
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Store keeping one file per entry under a directory.
///
/// ```text
/// {directory}/{sha256(key)}.json
/// ```
#[derive(Debug, Clone)]
pub struct DiskStore {
    directory: PathBuf,
}

impl DiskStore {
    /// Store rooted at `directory`, created on first write.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Root directory of the store.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn key_to_filename(key: &str) -> String {
        let digest = Sha256::digest(key.as_bytes());
        format!("{}.json", hex::encode(digest))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.directory.join(Self::key_to_filename(key))
    }
}

impl CacheStore for DiskStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
        Box::pin(async move {
            let path = self.entry_path(key);
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e)
                    .with_context(|| format!("Failed to read cache entry {}", path.display())),
            }
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { atomic_write(&self.entry_path(key), &value).await })
    }

    fn name(&self) -> &'static str {
        "disk"
    }
}
