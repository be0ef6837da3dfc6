//! Source repository access.
//!
//! The manifest service never talks to git directly; it goes through the
//! [`RepoClient`] trait so tests can substitute an in-process fake. The
//! production implementation, [`client::GitClient`], shells out to the system
//! `git` binary through the [`command_builder::GitCommand`] builder.
//!
//! # Working directories
//!
//! Each remote repository gets exactly one clone under the work root, named
//! after its normalized URL (see [`url::work_dir_name`]). The clone is shared
//! by every request against that repository, so checkouts must be serialized
//! by the caller.
//!
//! # Revisions
//!
//! [`RepoClient::resolve_revision`] turns a revision expression into a commit
//! SHA without touching the working tree; see [`revision`] for the accepted
//! forms.

pub mod client;
pub mod command_builder;
pub mod revision;
pub mod url;

use anyhow::Result;
use futures::future::BoxFuture;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::models::Repository;

pub use client::{GitClient, GitClientFactory};
pub use url::{normalize_git_url, strip_auth_from_url, work_dir_name};

/// Access to one repository's working directory.
///
/// Methods take the request's cancellation token; implementations abort
/// in-flight work when it fires.
pub trait RepoClient: Send + Sync {
    /// Root of the working tree.
    fn work_dir(&self) -> &Path;

    /// Fetch and check out `revision`, returning the commit now at `HEAD`.
    ///
    /// The whole tree is checked out; callers read their path below
    /// [`RepoClient::work_dir`]. Mutates the working directory.
    fn checkout<'a>(
        &'a self,
        revision: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<String>>;

    /// Resolve a revision expression to a commit SHA without checking it out.
    fn resolve_revision<'a>(
        &'a self,
        revision: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<String>>;

    /// Tracked files matching a git pathspec, relative to the repository root.
    fn ls_files<'a>(
        &'a self,
        pattern: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Vec<String>>>;
}

/// Creates repository clients.
pub trait ClientFactory: Send + Sync {
    /// Client for `repo` whose clone lives at `work_dir`.
    fn new_client(&self, repo: &Repository, work_dir: &Path) -> Result<Arc<dyn RepoClient>>;
}
