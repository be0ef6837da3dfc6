//! In-process repository fake
//!
//! [`FakeClientFactory`] hands out clients that "check out" a fixed file tree
//! per revision by writing it into the working directory. Every client made by
//! one factory shares its counters, so tests can assert how many checkouts
//! happened and whether two ever overlapped in the same working directory.

use anyhow::{Result, anyhow, bail};
use futures::future::BoxFuture;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::git::{ClientFactory, RepoClient};
use crate::models::Repository;

#[derive(Debug, Clone)]
struct Snapshot {
    commit: String,
    files: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct FakeState {
    revisions: Mutex<HashMap<String, Snapshot>>,
    checkouts: AtomicUsize,
    active: Mutex<HashMap<PathBuf, usize>>,
    overlapped: AtomicBool,
    fail_checkouts: AtomicBool,
    checkout_delay: Mutex<Duration>,
}

/// Factory for [`FakeClient`]s sharing one set of revisions and counters.
#[derive(Debug, Clone, Default)]
pub struct FakeClientFactory {
    state: Arc<FakeState>,
}

impl FakeClientFactory {
    /// Factory with no revisions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `files` (path, content) at `commit` when `revision` or `commit` is requested.
    pub fn with_revision(self, revision: &str, commit: impl Into<String>, files: &[(&str, &str)]) -> Self {
        self.set_revision(revision, commit, files);
        self
    }

    /// Replace what `revision` points at, e.g. to simulate a push.
    pub fn set_revision(&self, revision: &str, commit: impl Into<String>, files: &[(&str, &str)]) {
        let snapshot = Snapshot {
            commit: commit.into(),
            files: files.iter().map(|(p, c)| ((*p).to_string(), (*c).to_string())).collect(),
        };
        let mut revisions = lock(&self.state.revisions);
        revisions.insert(snapshot.commit.clone(), snapshot.clone());
        revisions.insert(revision.to_string(), snapshot);
    }

    /// Make every checkout sleep for `delay`, widening race windows.
    pub fn with_checkout_delay(self, delay: Duration) -> Self {
        *lock(&self.state.checkout_delay) = delay;
        self
    }

    /// Make every checkout fail.
    pub fn failing_checkouts(self) -> Self {
        self.state.fail_checkouts.store(true, Ordering::SeqCst);
        self
    }

    /// Checkouts started so far.
    pub fn checkouts(&self) -> usize {
        self.state.checkouts.load(Ordering::SeqCst)
    }

    /// True if two checkouts ever ran in the same working directory at once.
    pub fn overlapped(&self) -> bool {
        self.state.overlapped.load(Ordering::SeqCst)
    }
}

impl ClientFactory for FakeClientFactory {
    fn new_client(&self, _repo: &Repository, work_dir: &Path) -> Result<Arc<dyn RepoClient>> {
        Ok(Arc::new(FakeClient {
            work_dir: work_dir.to_path_buf(),
            state: Arc::clone(&self.state),
        }))
    }
}

/// Client over a [`FakeClientFactory`]'s revisions.
#[derive(Debug)]
pub struct FakeClient {
    work_dir: PathBuf,
    state: Arc<FakeState>,
}

impl FakeClient {
    fn snapshot(&self, revision: &str) -> Result<Snapshot> {
        let key = if revision.is_empty() { "HEAD" } else { revision };
        lock(&self.state.revisions)
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("Unable to resolve '{revision}' to a commit SHA"))
    }

    async fn do_checkout(&self, revision: &str, cancel: &CancellationToken) -> Result<String> {
        self.state.checkouts.fetch_add(1, Ordering::SeqCst);
        {
            let mut active = lock(&self.state.active);
            let count = active.entry(self.work_dir.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                self.state.overlapped.store(true, Ordering::SeqCst);
            }
        }
        let result = self.write_tree(revision, cancel).await;
        if let Some(count) = lock(&self.state.active).get_mut(&self.work_dir) {
            *count -= 1;
        }
        result
    }

    async fn write_tree(&self, revision: &str, cancel: &CancellationToken) -> Result<String> {
        let delay = *lock(&self.state.checkout_delay);
        if !delay.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => bail!("checkout cancelled"),
            }
        }
        if self.state.fail_checkouts.load(Ordering::SeqCst) {
            bail!("fatal: reference is not a tree: {revision}");
        }

        let snapshot = self.snapshot(revision)?;
        if self.work_dir.exists() {
            tokio::fs::remove_dir_all(&self.work_dir).await?;
        }
        tokio::fs::create_dir_all(&self.work_dir).await?;
        for (path, content) in &snapshot.files {
            let target = self.work_dir.join(path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, content).await?;
        }
        Ok(snapshot.commit)
    }

    fn files_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = glob_regex(pattern)?;
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.work_dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.work_dir)?
                .to_string_lossy()
                .replace('\\', "/");
            if matcher.is_match(&relative) {
                files.push(relative);
            }
        }
        Ok(files)
    }
}

impl RepoClient for FakeClient {
    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn checkout<'a>(
        &'a self,
        revision: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.do_checkout(revision, cancel))
    }

    fn resolve_revision<'a>(
        &'a self,
        revision: &'a str,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { Ok(self.snapshot(revision)?.commit) })
    }

    fn ls_files<'a>(
        &'a self,
        pattern: &'a str,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move { self.files_matching(pattern) })
    }
}

/// Git-pathspec-like glob: `*` matches anything, including `/`.
fn glob_regex(pattern: &str) -> Result<Regex> {
    let body = regex::escape(pattern).replace(r"\*", ".*").replace(r"\?", ".");
    Ok(Regex::new(&format!("^{body}$"))?)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
