//! Common helpers for reposerve integration tests
//!
//! Most tests run the manifest service against a [`FakeClientFactory`] so no
//! network access or git server is needed. Tool binaries are replaced with
//! shell scripts written by [`write_tool_script`](reposerve::test_utils::write_tool_script).

// Not every helper is used by every test module
#![allow(dead_code)]

use anyhow::{Context, Result};
use reposerve::cache::Cache;
use reposerve::constants::DEFAULT_APP_INSTANCE_LABEL_KEY;
use reposerve::models::{
    AppDetailsQuery, ApplicationSource, ConfigManagementPlugin, ManifestRequest, PluginCommand,
    Repository,
};
use reposerve::service::ManifestService;
use reposerve::test_utils::FakeClientFactory;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;

/// URL every fake repository is registered under.
pub const REPO_URL: &str = "https://github.com/example/apps";

/// A 40 character commit id made of `c`.
pub fn commit(c: char) -> String {
    c.to_string().repeat(40)
}

/// A manifest service over a fake repository, with its own working root.
pub struct TestService {
    pub work: TempDir,
    pub factory: FakeClientFactory,
    pub service: ManifestService,
}

impl TestService {
    /// Service with an in-memory cache and default settings.
    pub fn new(factory: FakeClientFactory) -> Result<Self> {
        let work = TempDir::new().context("Failed to create working root")?;
        let service = ManifestService::new(Arc::new(factory.clone()), Cache::in_memory(), work.path());
        Ok(Self {
            work,
            factory,
            service,
        })
    }

    /// Reconfigure the service through its builder methods.
    pub fn configure(mut self, f: impl FnOnce(ManifestService) -> ManifestService) -> Self {
        self.service = f(self.service);
        self
    }
}

/// Request for the application at `path` on `main`, labelled `guestbook`.
pub fn request(path: &str) -> ManifestRequest {
    ManifestRequest {
        repo: Repository::new(REPO_URL),
        application_source: ApplicationSource {
            repo_url: REPO_URL.to_string(),
            path: path.to_string(),
            target_revision: "main".to_string(),
            ..ApplicationSource::default()
        },
        namespace: "default".to_string(),
        app_label_key: DEFAULT_APP_INSTANCE_LABEL_KEY.to_string(),
        app_label_value: "guestbook".to_string(),
        ..ManifestRequest::default()
    }
}

/// Details query for the application at `path` on `main`.
pub fn details_query(path: &str) -> AppDetailsQuery {
    AppDetailsQuery {
        repo: Repository::new(REPO_URL),
        path: path.to_string(),
        revision: "main".to_string(),
        ..AppDetailsQuery::default()
    }
}

/// Plugin whose generate step runs `script` with `sh -c`.
pub fn shell_plugin(name: &str, script: &str) -> ConfigManagementPlugin {
    ConfigManagementPlugin {
        name: name.to_string(),
        init: None,
        generate: PluginCommand {
            command: vec!["sh".to_string(), "-c".to_string()],
            args: vec![script.to_string()],
        },
    }
}

/// Parse serialized manifests back into JSON values.
pub fn parse_manifests(manifests: &[String]) -> Result<Vec<Value>> {
    manifests
        .iter()
        .map(|m| serde_json::from_str(m).with_context(|| format!("Not JSON: {m}")))
        .collect()
}

/// `metadata.name` of each manifest.
pub fn manifest_names(manifests: &[String]) -> Result<Vec<String>> {
    Ok(parse_manifests(manifests)?
        .iter()
        .map(|m| m["metadata"]["name"].as_str().unwrap_or_default().to_string())
        .collect())
}

/// Instance label of a parsed manifest, if set.
pub fn instance_label(manifest: &Value) -> Option<&str> {
    manifest["metadata"]["labels"][DEFAULT_APP_INSTANCE_LABEL_KEY].as_str()
}
