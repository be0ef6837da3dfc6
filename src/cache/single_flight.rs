//! Double-checked lookup around an exclusive computation.
//!
//! The sequence is: look up, and on a miss take the key's lock, look up
//! again, and only then compute. The second lookup catches results written by
//! whoever held the lock before us, so N concurrent requests for the same
//! uncached value do the work once instead of N times.

use std::future::Future;
use tokio_util::sync::CancellationToken;

use super::KeyLock;
use crate::core::Result;

/// Return the cached value if `lookup` finds one, otherwise compute it while
/// holding `key` in `locks`.
///
/// `lookup` runs at most twice and `compute` at most once. `compute` is
/// expected to store its result itself (before returning) so the next waiter's
/// second lookup finds it. The lock is released when this function returns,
/// on success and on error.
///
/// # Errors
///
/// Whatever `compute` returns, or [`crate::core::RepoServerError::Cancelled`]
/// if `cancel` fires while waiting for the lock.
pub async fn compute_once<T, L, LFut, C, CFut>(
    locks: &KeyLock,
    key: &str,
    cancel: &CancellationToken,
    lookup: L,
    compute: C,
) -> Result<T>
where
    L: Fn() -> LFut,
    LFut: Future<Output = Option<T>>,
    C: FnOnce() -> CFut,
    CFut: Future<Output = Result<T>>,
{
    if let Some(hit) = lookup().await {
        return Ok(hit);
    }

    let _guard = locks.acquire_cancellable(key, cancel).await?;

    if let Some(hit) = lookup().await {
        tracing::debug!(target: "cache", "Filled by a concurrent request while waiting for {}", key);
        return Ok(hit);
    }

    compute().await
}
