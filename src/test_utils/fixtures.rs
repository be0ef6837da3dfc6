//! Test fixtures for application trees and fake tools
//!
//! Trees are `(path, content)` pairs ready for
//! [`FakeClientFactory::with_revision`](super::FakeClientFactory::with_revision).

/// A single ConfigMap.
pub const CONFIG_MAP: &str = r"apiVersion: v1
kind: ConfigMap
metadata:
  name: guestbook-config
data:
  greeting: hello
";

/// A `List` of two pods.
pub const POD_LIST: &str = r"apiVersion: v1
kind: List
items:
- apiVersion: v1
  kind: Pod
  metadata:
    name: guestbook-a
  spec:
    containers:
    - name: app
      image: nginx:1.15
- apiVersion: v1
  kind: Pod
  metadata:
    name: guestbook-b
  spec:
    containers:
    - name: app
      image: nginx:1.15
";

/// A CustomResourceDefinition, which never receives the instance label.
pub const CRD: &str = r"apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: widgets.example.com
";

/// Test fixture for application trees
#[derive(Clone, Debug)]
pub struct AppFixture {
    /// Files as (path relative to the repository root, content)
    pub files: Vec<(&'static str, &'static str)>,
}

impl AppFixture {
    /// `guestbook/cm.yaml` and `guestbook/pods.yaml`: three objects in order.
    pub fn guestbook() -> Self {
        Self {
            files: vec![("guestbook/cm.yaml", CONFIG_MAP), ("guestbook/pods.yaml", POD_LIST)],
        }
    }

    /// A directory that also holds a `Chart.yaml` and an `app.yaml`.
    pub fn ambiguous() -> Self {
        Self {
            files: vec![
                ("mixed/app.yaml", "apiVersion: 0.3.0\nkind: ksonnet.io/app\nname: mixed\n"),
                ("mixed/Chart.yaml", "name: mixed\nversion: 0.1.0\n"),
            ],
        }
    }

    /// A list with `items: null`, which contributes nothing.
    pub fn null_list() -> Self {
        Self {
            files: vec![
                ("empty/list.yaml", "apiVersion: v1\nkind: ConfigMapList\nitems: null\n"),
                ("empty/crd.yaml", CRD),
            ],
        }
    }

    /// Files in the form the fake client expects.
    pub fn tree(&self) -> &[(&'static str, &'static str)] {
        &self.files
    }
}

/// Write an executable shell script named `name` into `dir`.
///
/// Used to stand in for `helm`, `kustomize`, `ks` and `jsonnet`.
#[cfg(unix)]
pub fn write_tool_script(
    dir: &std::path::Path,
    name: &str,
    body: &str,
) -> anyhow::Result<std::path::PathBuf> {
    use anyhow::Context;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}"))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .with_context(|| format!("Failed to make {} executable", path.display()))?;
    Ok(path)
}
