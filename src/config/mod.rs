//! Configuration for the manifest service.
//!
//! Settings come from a TOML file, then environment overrides are applied on
//! top. A missing file is not an error; every field has a default.
//!
//! # Location
//!
//! 1. the `--config` flag of the CLI
//! 2. the `REPOSERVE_CONFIG` environment variable
//! 3. `~/.reposerve/config.toml` (`%LOCALAPPDATA%\reposerve\config.toml` on Windows)
//!
//! # Example
//!
//! ```toml
//! # Maximum concurrent renders; 0 or less means unbounded
//! parallelism_limit = 4
//!
//! # Where repositories are cloned, one directory per repository
//! work_root = "$TMPDIR/_reposerve"
//!
//! # Seconds before an external tool is killed; 0 disables the timeout
//! exec_timeout_secs = 90
//!
//! [cache]
//! backend = "disk"
//! dir = "~/.cache/reposerve"
//!
//! [tools]
//! helm = "/usr/local/bin/helm"
//!
//! [[plugins]]
//! name = "kasane"
//! init = { command = ["kasane", "update"] }
//! generate = { command = ["kasane", "show"] }
//! ```
//!
//! # Environment overrides
//!
//! - `REPOSERVE_PARALLELISM_LIMIT` replaces `parallelism_limit`

mod server;

pub use server::{CacheBackend, CacheConfig, ServerConfig, ToolPaths};
