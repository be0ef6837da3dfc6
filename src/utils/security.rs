//! Path containment for request-supplied paths.
//!
//! Application paths, file paths and value-file names all arrive from the
//! request and are joined onto a working directory. None of them may climb
//! out of it.

use std::path::{Component, Path, PathBuf};

use crate::core::{RepoServerError, Result};

/// Join `relative` onto `root`, rejecting absolute paths and `..` components.
///
/// An empty path or `.` names `root` itself.
///
/// ```rust
/// use reposerve::utils::security::safe_join;
/// use std::path::Path;
///
/// let root = Path::new("/work/repo");
/// assert_eq!(safe_join(root, "apps/guestbook").unwrap(), root.join("apps/guestbook"));
/// assert!(safe_join(root, "../other").is_err());
/// assert!(safe_join(root, "/etc").is_err());
/// ```
pub fn safe_join(root: &Path, relative: &str) -> Result<PathBuf> {
    let mut joined = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(RepoServerError::invalid_argument(format!(
                    "path '{relative}' must not contain '..'"
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(RepoServerError::invalid_argument(format!(
                    "path '{relative}' must be relative to the repository root"
                )));
            }
        }
    }
    Ok(joined)
}

/// Resolve `relative` against `base`, allowing `..` as long as the result
/// stays below `root`.
///
/// Used for Helm value files, which may legitimately live in a parent
/// directory of the chart but not outside the repository.
pub fn resolve_within(root: &Path, base: &Path, relative: &str) -> Result<PathBuf> {
    if Path::new(relative).has_root() {
        return Err(RepoServerError::invalid_argument(format!(
            "path '{relative}' must be relative to the repository root"
        )));
    }
    let mut resolved = PathBuf::new();
    for component in base.join(relative).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    if !resolved.starts_with(root) {
        return Err(RepoServerError::invalid_argument(format!(
            "path '{relative}' resolves outside the repository"
        )));
    }
    Ok(resolved)
}
