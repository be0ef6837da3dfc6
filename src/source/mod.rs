//! Application source type detection.
//!
//! An application path is classified by the marker files it contains. Only
//! presence is checked; nothing is parsed here, so a malformed `Chart.yaml`
//! still classifies the path as Helm and the renderer reports the problem.
//!
//! Precedence, first match wins:
//!
//! 1. `app.yaml` ([`ApplicationSourceType::Ksonnet`])
//! 2. `Chart.yaml` ([`ApplicationSourceType::Helm`])
//! 3. `kustomization.yaml`, `kustomization.yml` or `Kustomization`
//!    ([`ApplicationSourceType::Kustomize`])
//! 4. anything else ([`ApplicationSourceType::Directory`])
//!
//! Plugins are never detected; they are only selected explicitly.

use std::path::Path;

use crate::constants::{HELM_CHART_MARKER, KSONNET_APP_MARKER, KUSTOMIZATION_NAMES};
use crate::core::Result;
use crate::models::{ApplicationSource, ApplicationSourceType};

/// Classify the directory at `app_path` from its marker files.
#[must_use]
pub fn detect_source_type(app_path: &Path) -> ApplicationSourceType {
    if app_path.join(KSONNET_APP_MARKER).exists() {
        return ApplicationSourceType::Ksonnet;
    }
    if app_path.join(HELM_CHART_MARKER).exists() {
        return ApplicationSourceType::Helm;
    }
    if KUSTOMIZATION_NAMES.iter().any(|name| app_path.join(name).exists()) {
        return ApplicationSourceType::Kustomize;
    }
    ApplicationSourceType::Directory
}

/// The type to render `source` as: the explicit or implied type when there is
/// one, otherwise whatever the files at `app_path` indicate.
///
/// # Errors
///
/// InvalidArgument when more than one option bag is set without an explicit tag.
pub fn resolve_source_type(
    source: &ApplicationSource,
    app_path: &Path,
) -> Result<ApplicationSourceType> {
    match source.explicit_type()? {
        Some(explicit) => Ok(explicit),
        None => {
            let detected = detect_source_type(app_path);
            tracing::debug!(target: "render", "Detected {} at {}", detected, app_path.display());
            Ok(detected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApplicationSourceHelm;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), "").unwrap();
    }

    #[test]
    fn test_empty_directory_is_directory() {
        let dir = TempDir::new().unwrap();
        assert_eq!(detect_source_type(dir.path()), ApplicationSourceType::Directory);
    }

    #[test]
    fn test_markers() {
        for (marker, expected) in [
            ("app.yaml", ApplicationSourceType::Ksonnet),
            ("Chart.yaml", ApplicationSourceType::Helm),
            ("kustomization.yaml", ApplicationSourceType::Kustomize),
            ("kustomization.yml", ApplicationSourceType::Kustomize),
            ("Kustomization", ApplicationSourceType::Kustomize),
        ] {
            let dir = TempDir::new().unwrap();
            touch(dir.path(), marker);
            assert_eq!(detect_source_type(dir.path()), expected, "marker: {marker}");
        }
    }

    #[test]
    fn test_ksonnet_beats_helm_beats_kustomize() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "kustomization.yaml");
        touch(dir.path(), "Chart.yaml");
        assert_eq!(detect_source_type(dir.path()), ApplicationSourceType::Helm);
        touch(dir.path(), "app.yaml");
        assert_eq!(detect_source_type(dir.path()), ApplicationSourceType::Ksonnet);
    }

    #[test]
    fn test_explicit_type_skips_detection() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "app.yaml");
        let source = ApplicationSource {
            source_type: Some(ApplicationSourceType::Directory),
            ..ApplicationSource::default()
        };
        assert_eq!(resolve_source_type(&source, dir.path()).unwrap(), ApplicationSourceType::Directory);

        let implied = ApplicationSource {
            helm: Some(ApplicationSourceHelm::default()),
            ..ApplicationSource::default()
        };
        assert_eq!(resolve_source_type(&implied, dir.path()).unwrap(), ApplicationSourceType::Helm);
    }
}
