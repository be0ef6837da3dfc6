//! Global constants used throughout the reposerve codebase.
//!
//! This module contains timeout durations, marker filenames, label keys and
//! environment variable names that are shared across multiple modules.
//! Defining them centrally makes magic values discoverable.

use std::time::Duration;

/// Default timeout for external tool invocations (90 seconds).
///
/// Applies to `helm`, `kustomize`, `ks`, `jsonnet` and plugin commands unless
/// the server configuration overrides it.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(90);

/// Timeout for Git fetch operations (60 seconds).
pub const GIT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for Git clone/init operations (120 seconds).
pub const GIT_CLONE_TIMEOUT: Duration = Duration::from_secs(120);

/// Commands slower than this are reported at `info` level.
pub const SLOW_COMMAND_THRESHOLD: Duration = Duration::from_secs(1);

/// Marker file identifying a ksonnet-style templating project.
pub const KSONNET_APP_MARKER: &str = "app.yaml";

/// Marker file identifying a Helm chart.
pub const HELM_CHART_MARKER: &str = "Chart.yaml";

/// Filenames that identify a Kustomize overlay, probed in order.
pub const KUSTOMIZATION_NAMES: &[&str] = &["kustomization.yaml", "kustomization.yml", "Kustomization"];

/// Default value file shipped with every Helm chart.
pub const HELM_DEFAULT_VALUES: &str = "values.yaml";

/// Default label key used to mark resources as owned by an application.
pub const DEFAULT_APP_INSTANCE_LABEL_KEY: &str = "app.kubernetes.io/instance";

/// Legacy application-name label key.
///
/// When a request uses this key, ksonnet output has its component label removed
/// so the two labels never disagree on older clusters.
pub const LEGACY_APP_NAME_LABEL_KEY: &str = "applications.argoproj.io/app-name";

/// Component label stamped by ksonnet on every rendered object.
pub const KSONNET_COMPONENT_LABEL: &str = "ksonnet.io/component";

/// Environment variable carrying the application name into plugin processes.
pub const PLUGIN_ENV_APP_NAME: &str = "ARGOCD_APP_NAME";

/// Environment variable carrying the target namespace into plugin processes.
pub const PLUGIN_ENV_APP_NAMESPACE: &str = "ARGOCD_APP_NAMESPACE";

/// Environment variable naming an alternative configuration file.
pub const CONFIG_PATH_ENV: &str = "REPOSERVE_CONFIG";

/// Environment variable overriding the configured parallelism limit.
pub const PARALLELISM_LIMIT_ENV: &str = "REPOSERVE_PARALLELISM_LIMIT";

/// Directory (under the system temp dir) holding working directories by default.
pub const DEFAULT_WORK_ROOT_NAME: &str = "_reposerve";
