//! Test utilities for reposerve
//!
//! This module provides helpers for writing tests against the manifest
//! service without a network or the real tool binaries.
//!
//! - [`FakeClientFactory`]: in-process repositories with instrumented checkouts
//! - [`TestGit`]: real throwaway git repositories for the git client
//! - [`fixtures`]: application trees and fake tool scripts
//!
//! # Example
//!
//! ```rust,no_run
//! use reposerve::cache::Cache;
//! use reposerve::service::ManifestService;
//! use reposerve::test_utils::{AppFixture, FakeClientFactory};
//! use std::sync::Arc;
//!
//! let factory = FakeClientFactory::new().with_revision("main", "a".repeat(40), AppFixture::guestbook().tree());
//! let service = ManifestService::new(Arc::new(factory.clone()), Cache::in_memory(), "/tmp/work");
//! ```

pub mod fake_repo;
pub mod fixtures;
pub mod git_helper;

pub use fake_repo::{FakeClient, FakeClientFactory};
pub use fixtures::AppFixture;
#[cfg(unix)]
pub use fixtures::write_tool_script;
pub use git_helper::TestGit;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Initializes the tracing subscriber once, no matter how often it is called.
/// Uses `level` when given, otherwise `RUST_LOG`; with neither, logging stays off.
///
/// ```bash
/// RUST_LOG=cache=info,service=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
