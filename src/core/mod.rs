//! Core types shared by every layer of the service.
//!
//! This module hosts the error taxonomy. Everything that can fail in a way the
//! caller must distinguish returns [`RepoServerError`]; internal plumbing that
//! only needs context uses `anyhow` and converts at the boundary.

pub mod error;

pub use error::{BoxError, ErrorContext, ErrorKind, RepoServerError, user_friendly_error};

/// Result alias used by the manifest service and renderers.
pub type Result<T, E = RepoServerError> = std::result::Result<T, E>;
