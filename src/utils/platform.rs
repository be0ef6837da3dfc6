//! Platform-specific helpers.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Checks if the current platform is Windows.
#[must_use]
pub const fn is_windows() -> bool {
    cfg!(windows)
}

/// Returns the platform-appropriate Git command name.
#[must_use]
pub const fn get_git_command() -> &'static str {
    if is_windows() {
        "git.exe"
    } else {
        "git"
    }
}

/// Resolves a path with tilde expansion and environment variable substitution.
///
/// # Examples
///
/// ```rust,no_run
/// use reposerve::utils::platform::resolve_path;
///
/// # fn example() -> anyhow::Result<()> {
/// let work_root = resolve_path("~/.reposerve/work")?;
/// let cache_dir = resolve_path("$TMPDIR/reposerve-cache")?;
/// # Ok(())
/// # }
/// ```
pub fn resolve_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path)
        .with_context(|| format!("Failed to expand path: {path}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Locate an executable, accepting either a bare name on `PATH` or a path.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}
