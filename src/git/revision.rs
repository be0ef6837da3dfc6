//! Revision expression resolution.
//!
//! A revision is one of: empty or `HEAD` (the remote default branch), a full
//! commit SHA, a branch or tag name, or a semver constraint such as `^1.2` or
//! `>=1.0, <2.0` that selects the greatest matching tag.

use semver::{Version, VersionReq};

use super::url::{ensure_prefix, is_commit_sha};

/// A reference advertised by `git ls-remote`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    /// Commit (or tag object) SHA
    pub sha: String,
    /// Full reference name, e.g. `refs/heads/master`
    pub name: String,
}

/// Parse `git ls-remote` output (`<sha>\t<ref>` per line).
#[must_use]
pub fn parse_ls_remote(output: &str) -> Vec<RemoteRef> {
    output
        .lines()
        .filter_map(|line| {
            let (sha, name) = line.split_once('\t')?;
            Some(RemoteRef {
                sha: sha.trim().to_string(),
                name: name.trim().to_string(),
            })
        })
        .collect()
}

/// Resolve `revision` against advertised refs.
///
/// Annotated tags resolve to the commit they point to (the peeled `^{}` entry).
/// Returns `None` when nothing matches.
#[must_use]
pub fn resolve_from_refs(revision: &str, refs: &[RemoteRef]) -> Option<String> {
    let revision = revision.trim();
    if is_commit_sha(revision) {
        return Some(revision.to_lowercase());
    }
    let revision = if revision.is_empty() { "HEAD" } else { revision };

    let candidates = [
        revision.to_string(),
        ensure_prefix(revision, "refs/heads/"),
        ensure_prefix(revision, "refs/tags/"),
    ];
    for candidate in &candidates {
        let peeled = format!("{candidate}^{{}}");
        if let Some(r) = refs.iter().find(|r| r.name == peeled) {
            return Some(r.sha.clone());
        }
        if let Some(r) = refs.iter().find(|r| &r.name == candidate) {
            return Some(r.sha.clone());
        }
    }

    let tags: Vec<&str> = refs
        .iter()
        .filter_map(|r| r.name.strip_prefix("refs/tags/"))
        .filter(|t| !t.ends_with("^{}"))
        .collect();
    let tag = max_version(revision, &tags)?;
    resolve_from_refs(&format!("refs/tags/{tag}"), refs)
}

fn parse_tag_version(tag: &str) -> Option<Version> {
    Version::parse(tag.strip_prefix('v').unwrap_or(tag)).ok()
}

/// Greatest tag satisfying the semver constraint `constraint`.
///
/// Tags may carry a leading `v`; tags that are not valid semver are ignored.
/// Returns `None` when `constraint` is not a semver requirement or no tag matches.
#[must_use]
pub fn max_version(constraint: &str, tags: &[&str]) -> Option<String> {
    let req = VersionReq::parse(constraint.trim().trim_start_matches('v')).ok()?;
    tags.iter()
        .filter_map(|tag| parse_tag_version(tag).map(|v| (v, *tag)))
        .filter(|(v, _)| req.matches(v))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, tag)| tag.to_string())
}
