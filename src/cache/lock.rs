//! Per-key async mutual exclusion.
//!
//! [`KeyLock`] hands out one async mutex per key, created on first use. Holders
//! of different keys never wait on each other; holders of the same key are
//! strictly serialized. The manifest service keys it by working directory so
//! that at most one checkout and render touches a given clone at a time.
//!
//! Entries are never removed. The number of keys is the number of distinct
//! repositories the process has served, which stays small in practice.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::core::{RepoServerError, Result};

/// A lazily populated set of named async mutexes.
#[derive(Debug, Default, Clone)]
pub struct KeyLock {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Exclusive hold on one key of a [`KeyLock`].
///
/// The key is released when the guard is dropped, on every exit path.
#[derive(Debug)]
pub struct KeyGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl KeyGuard {
    /// The key this guard holds.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        tracing::trace!(target: "cache::lock", "Released lock {}", self.key);
    }
}

impl KeyLock {
    /// An empty lock set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn mutex_for(&self, key: &str) -> Arc<Mutex<()>> {
        // The DashMap shard guard must be dropped before awaiting.
        self.locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Wait until no other holder of `key` remains, then take it.
    pub async fn acquire(&self, key: &str) -> KeyGuard {
        let mutex = self.mutex_for(key);
        tracing::trace!(target: "cache::lock", "Waiting for lock {}", key);
        let guard = mutex.lock_owned().await;
        tracing::trace!(target: "cache::lock", "Acquired lock {}", key);
        KeyGuard {
            key: key.to_string(),
            _guard: guard,
        }
    }

    /// Like [`KeyLock::acquire`], but gives up when `cancel` fires.
    ///
    /// # Errors
    ///
    /// [`RepoServerError::Cancelled`] if the token fires before the key is free.
    pub async fn acquire_cancellable(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<KeyGuard> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                Err(RepoServerError::cancelled(format!("waiting for lock on {key}")))
            }
            guard = self.acquire(key) => Ok(guard),
        }
    }

    /// Number of keys that have ever been locked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True when no key has been locked yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
