//! Cross-platform utilities and helpers
//!
//! - [`exec`] - Cancellable external command execution
//! - [`fs`] - Atomic file writes
//! - [`platform`] - Platform-specific helpers and path resolution
//! - [`security`] - Containment of request-supplied paths

pub mod exec;
pub mod fs;
pub mod platform;
pub mod security;

pub use exec::{CommandOutput, ExecCommand};
pub use fs::atomic_write;
pub use platform::{get_git_command, is_windows, resolve_path};
pub use security::safe_join;
