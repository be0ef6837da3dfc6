//! Process-wide admission gate for expensive rendering work.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::core::{RepoServerError, Result};

/// Bounds the number of concurrent renders.
///
/// A capacity of zero or less disables the limiter: every acquire succeeds
/// immediately and holds nothing.
#[derive(Debug, Clone)]
pub struct ParallelismLimiter {
    semaphore: Option<Arc<Semaphore>>,
    capacity: u32,
}

/// Units held on a [`ParallelismLimiter`]; released on drop.
#[derive(Debug)]
pub struct RenderPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl ParallelismLimiter {
    /// Limiter admitting at most `capacity` units at once.
    #[must_use]
    pub fn new(capacity: i64) -> Self {
        if capacity <= 0 {
            return Self::unbounded();
        }
        let capacity = u32::try_from(capacity)
            .unwrap_or(u32::MAX)
            .min(u32::try_from(Semaphore::MAX_PERMITS).unwrap_or(u32::MAX));
        Self {
            semaphore: Some(Arc::new(Semaphore::new(capacity as usize))),
            capacity,
        }
    }

    /// Limiter that never blocks.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            semaphore: None,
            capacity: 0,
        }
    }

    /// Configured capacity, 0 when unbounded.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Units currently free, `None` when unbounded.
    #[must_use]
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }

    /// Wait for `weight` units.
    ///
    /// A weight above the capacity is clamped to the capacity so it can
    /// still be admitted once the limiter drains.
    ///
    /// # Errors
    ///
    /// [`RepoServerError::Cancelled`] if `cancel` fires while waiting.
    pub async fn acquire(&self, weight: u32, cancel: &CancellationToken) -> Result<RenderPermit> {
        let Some(semaphore) = &self.semaphore else {
            return Ok(RenderPermit { _permit: None });
        };
        let weight = weight.clamp(1, self.capacity);
        let semaphore = Arc::clone(semaphore);
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                Err(RepoServerError::cancelled("waiting for a render slot"))
            }
            permit = semaphore.acquire_many_owned(weight) => {
                let permit = permit.map_err(|e| anyhow::anyhow!("render limiter closed: {e}"))?;
                Ok(RenderPermit { _permit: Some(permit) })
            }
        }
    }
}

impl Default for ParallelismLimiter {
    fn default() -> Self {
        Self::unbounded()
    }
}
