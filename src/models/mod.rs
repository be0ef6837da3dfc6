//! Request, response and application source types.
//!
//! These are the transient values exchanged with the RPC layer. Every type is
//! `serde`-serializable: requests arrive as JSON from the CLI or transport, and
//! responses are stored verbatim in the content cache.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::core::{RepoServerError, Result};

/// Repository descriptor including credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Repository {
    /// Clone URL
    pub repo: String,
    /// Repository kind (`git` or `helm`)
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub repo_type: String,
    /// Display name, also used as the `helm repo add` name
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// HTTPS username
    #[serde(skip_serializing_if = "String::is_empty")]
    pub username: String,
    /// HTTPS password or token
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// PEM encoded SSH private key
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ssh_private_key: String,
    /// Skip SSH host key verification
    pub insecure_ignore_host_key: bool,
}

impl Repository {
    /// Descriptor with only a URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            repo: url.into(),
            ..Self::default()
        }
    }
}

/// Application source type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationSourceType {
    /// ksonnet-style templating project
    Ksonnet,
    /// Helm chart
    Helm,
    /// Kustomize overlay
    Kustomize,
    /// External config management plugin
    Plugin,
    /// Plain directory of YAML/JSON/Jsonnet files
    Directory,
}

impl ApplicationSourceType {
    /// Identifier reported in responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ksonnet => "Ksonnet",
            Self::Helm => "Helm",
            Self::Kustomize => "Kustomize",
            Self::Plugin => "Plugin",
            Self::Directory => "Directory",
        }
    }
}

impl fmt::Display for ApplicationSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Helm parameter override (`--set` / `--set-string`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HelmParameter {
    /// Dotted parameter name
    pub name: String,
    /// Value to set
    pub value: String,
    /// Pass with `--set-string` instead of `--set`
    pub force_string: bool,
}

/// Helm options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApplicationSourceHelm {
    /// Value files relative to the chart directory, applied in order
    pub value_files: Vec<String>,
    /// Parameter overrides
    pub parameters: Vec<HelmParameter>,
    /// Release name; defaults to the application name
    #[serde(skip_serializing_if = "String::is_empty")]
    pub release_name: String,
}

/// Kustomize options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApplicationSourceKustomize {
    /// Prefix prepended to every resource name
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name_prefix: String,
    /// Image overrides in `name:tag` or `name=newName:tag` form
    pub images: Vec<String>,
}

/// A single ksonnet component parameter override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct KsonnetParameter {
    /// Component name; empty for global parameters
    pub component: String,
    /// Parameter name
    pub name: String,
    /// Parameter value
    pub value: String,
}

/// ksonnet options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSourceKsonnet {
    /// Environment to render
    pub environment: String,
    /// Overrides applied in order before rendering
    pub parameters: Vec<KsonnetParameter>,
}

/// Plugin options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSourcePlugin {
    /// Registered plugin name
    pub name: String,
}

/// A Jsonnet top-level argument or external variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonnetVar {
    /// Variable name
    pub name: String,
    /// Literal string, or Jsonnet code when `code` is set
    pub value: String,
    /// Interpret `value` as Jsonnet code
    pub code: bool,
}

/// Jsonnet options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApplicationSourceJsonnet {
    /// Top-level arguments
    pub tlas: Vec<JsonnetVar>,
    /// External variables
    pub ext_vars: Vec<JsonnetVar>,
}

/// Plain directory options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSourceDirectory {
    /// Descend into subdirectories
    pub recurse: bool,
    /// Jsonnet evaluation settings
    pub jsonnet: ApplicationSourceJsonnet,
}

/// Where and how to render an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApplicationSource {
    /// Repository URL
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    /// Path within the repository
    pub path: String,
    /// Revision expression (branch, tag, SHA, semver constraint)
    pub target_revision: String,
    /// Explicit type tag; wins over the option bags and over detection
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub source_type: Option<ApplicationSourceType>,
    /// Helm options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helm: Option<ApplicationSourceHelm>,
    /// Kustomize options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kustomize: Option<ApplicationSourceKustomize>,
    /// ksonnet options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ksonnet: Option<ApplicationSourceKsonnet>,
    /// Plugin options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<ApplicationSourcePlugin>,
    /// Directory options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<ApplicationSourceDirectory>,
}

impl ApplicationSource {
    /// The explicitly requested source type, if any.
    ///
    /// An explicit tag wins. Otherwise the type is implied by whichever option
    /// bag is present; more than one bag is ambiguous and rejected.
    pub fn explicit_type(&self) -> Result<Option<ApplicationSourceType>> {
        if let Some(tag) = self.source_type {
            return Ok(Some(tag));
        }

        let mut implied = Vec::new();
        if self.ksonnet.is_some() {
            implied.push(ApplicationSourceType::Ksonnet);
        }
        if self.helm.is_some() {
            implied.push(ApplicationSourceType::Helm);
        }
        if self.kustomize.is_some() {
            implied.push(ApplicationSourceType::Kustomize);
        }
        if self.plugin.is_some() {
            implied.push(ApplicationSourceType::Plugin);
        }
        if self.directory.is_some() {
            implied.push(ApplicationSourceType::Directory);
        }

        match implied.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(*only)),
            many => Err(RepoServerError::invalid_argument(format!(
                "multiple application sources defined: {}",
                many.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", ")
            ))),
        }
    }

    /// Stable textual form used in cache keys and log lines.
    ///
    /// Serialized with sorted keys so two equal sources always produce the same
    /// string regardless of how they were constructed.
    #[must_use]
    pub fn normalized(&self) -> String {
        serde_json::to_value(self)
            .map(|v| v.to_string())
            .unwrap_or_else(|_| format!("{}/{}@{}", self.repo_url, self.path, self.target_revision))
    }
}

impl fmt::Display for ApplicationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} @ {}", self.repo_url, self.path, self.target_revision)
    }
}

/// Command line of a plugin step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginCommand {
    /// Program followed by fixed arguments
    pub command: Vec<String>,
    /// Additional arguments
    pub args: Vec<String>,
}

/// A registered config management plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigManagementPlugin {
    /// Lookup name
    pub name: String,
    /// Optional preparation step
    pub init: Option<PluginCommand>,
    /// Step whose standard output is the manifest stream
    pub generate: PluginCommand,
}

/// Everything needed to generate manifests for one application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ManifestRequest {
    /// Repository holding the source, with credentials
    pub repo: Repository,
    /// Where and how to render
    pub application_source: ApplicationSource,
    /// Revision to resolve; falls back to the source's target revision when empty
    pub revision: String,
    /// Target namespace
    pub namespace: String,
    /// Instance label key
    pub app_label_key: String,
    /// Instance label value (the application name)
    pub app_label_value: String,
    /// Skip cache reads
    pub no_cache: bool,
    /// Known plugins
    pub plugins: Vec<ConfigManagementPlugin>,
    /// Helm repositories needed to build chart dependencies
    pub repos: Vec<Repository>,
}

impl ManifestRequest {
    /// The revision expression to resolve for this request.
    #[must_use]
    pub fn effective_revision(&self) -> &str {
        if self.revision.is_empty() {
            &self.application_source.target_revision
        } else {
            &self.revision
        }
    }
}

/// Generated manifests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ManifestResponse {
    /// Serialized manifests in render order
    pub manifests: Vec<String>,
    /// Destination namespace reported by the source, if any
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Destination server reported by the source, if any
    #[serde(skip_serializing_if = "String::is_empty")]
    pub server: String,
    /// Resolved commit identity
    pub revision: String,
    /// Resolved source type identifier
    pub source_type: String,
}

/// Destination reported by a ksonnet environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationDestination {
    /// Cluster API server URL
    pub server: String,
    /// Namespace
    pub namespace: String,
}

/// Request for per-type introspection of an application path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppDetailsQuery {
    /// Repository with credentials
    pub repo: Repository,
    /// Path within the repository
    pub path: String,
    /// Revision expression
    pub revision: String,
    /// Helm value files to include in the parameter listing
    pub value_files: Vec<String>,
    /// Helm repositories needed for dependencies
    pub repos: Vec<Repository>,
}

/// ksonnet environment as declared in `app.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KsonnetEnvironment {
    /// Environment name
    pub name: String,
    /// Kubernetes version targeted
    #[serde(rename = "k8sVersion")]
    pub k8s_version: String,
    /// Destination
    pub destination: ApplicationDestination,
}

/// ksonnet application details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KsonnetAppSpec {
    /// Application name
    pub name: String,
    /// Environments keyed by name
    pub environments: BTreeMap<String, KsonnetEnvironment>,
    /// Component parameters
    pub parameters: Vec<KsonnetParameter>,
}

/// Helm chart details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HelmAppSpec {
    /// Chart path within the repository
    pub path: String,
    /// Value files found next to the chart
    pub value_files: Vec<String>,
    /// Flattened parameters from the default and requested value files
    pub parameters: Vec<HelmParameter>,
}

/// Kustomize overlay details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KustomizeAppSpec {
    /// Overlay path within the repository
    pub path: String,
    /// Images used by the built resources, image name to tag
    pub image_tags: BTreeMap<String, String>,
}

/// Per-type introspection bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppDetailsResponse {
    /// Detected source type identifier
    #[serde(rename = "type")]
    pub source_type: String,
    /// ksonnet details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ksonnet: Option<KsonnetAppSpec>,
    /// Helm details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helm: Option<HelmAppSpec>,
    /// Kustomize details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kustomize: Option<KustomizeAppSpec>,
}
