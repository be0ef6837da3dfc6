//! Kubernetes object handling and manifest assembly.
//!
//! Renderers produce loosely typed Kubernetes objects (JSON maps). Before
//! they leave the service each object goes through [`assemble`]:
//!
//! 1. list-kind objects (an `items` array) are expanded into their items,
//!    keeping item order; a `List` whose `items` is `null` and that has no
//!    `spec` or `status` contributes nothing
//! 2. the application instance label is set on every object except CRDs,
//!    when both the key and value are non-empty
//! 3. each object is serialized on its own to JSON
//!
//! `serde_json` maps keep keys sorted, so serialization is canonical: the same
//! object always yields the same string.

pub mod yaml;

pub use yaml::{SplitError, split_yaml};

use serde_json::{Map, Value};

use crate::core::{RepoServerError, Result};

/// A Kubernetes object as a JSON map.
pub type Object = Map<String, Value>;

/// API group of CustomResourceDefinitions.
const CRD_GROUP: &str = "apiextensions.k8s.io";
const CRD_KIND: &str = "CustomResourceDefinition";

/// True when `obj` is a list whose `items` is an array.
#[must_use]
pub fn is_list(obj: &Object) -> bool {
    matches!(obj.get("items"), Some(Value::Array(_)))
}

/// True for a list object serialized with `items: null` and no `spec` or `status`.
#[must_use]
pub fn is_null_list(obj: &Object) -> bool {
    if obj.contains_key("spec") || obj.contains_key("status") {
        return false;
    }
    matches!(obj.get("items"), Some(Value::Null))
}

/// True when `obj` is a CustomResourceDefinition.
#[must_use]
pub fn is_crd(obj: &Object) -> bool {
    let kind = obj.get("kind").and_then(Value::as_str).unwrap_or_default();
    let api_version = obj.get("apiVersion").and_then(Value::as_str).unwrap_or_default();
    let group = api_version.split_once('/').map_or("", |(group, _)| group);
    kind == CRD_KIND && group == CRD_GROUP
}

/// `metadata.name` of `obj`, empty when absent.
#[must_use]
pub fn name_of(obj: &Object) -> &str {
    obj.get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
}

/// Set `metadata.labels[key] = value`, creating `metadata` and `labels` as needed.
///
/// # Errors
///
/// FailedPrecondition when `metadata` or `metadata.labels` exists but is not a mapping.
pub fn set_app_instance_label(obj: &mut Object, key: &str, value: &str) -> Result<()> {
    let metadata = obj.entry("metadata").or_insert_with(|| Value::Object(Map::new()));
    if metadata.is_null() {
        *metadata = Value::Object(Map::new());
    }
    let Value::Object(metadata) = metadata else {
        return Err(RepoServerError::failed_precondition("metadata is not a mapping"));
    };
    let labels = metadata.entry("labels").or_insert_with(|| Value::Object(Map::new()));
    if labels.is_null() {
        *labels = Value::Object(Map::new());
    }
    let Value::Object(labels) = labels else {
        return Err(RepoServerError::failed_precondition("metadata.labels is not a mapping"));
    };
    labels.insert(key.to_string(), Value::String(value.to_string()));
    Ok(())
}

/// Remove `metadata.labels[key]` if present.
pub fn unset_label(obj: &mut Object, key: &str) {
    if let Some(Value::Object(labels)) =
        obj.get_mut("metadata").and_then(|m| m.get_mut("labels"))
    {
        labels.remove(key);
    }
}

/// Expand `obj` into the objects it stands for.
///
/// # Errors
///
/// FailedPrecondition when a list contains an item that is not a mapping.
pub fn expand(obj: Object) -> Result<Vec<Object>> {
    if is_list(&obj) {
        let Some(Value::Array(items)) = obj.get("items") else {
            return Ok(Vec::new());
        };
        return items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(map) => Ok(map.clone()),
                _ => Err(RepoServerError::failed_precondition(format!(
                    "item {i} of list '{}' is not an object",
                    name_of(&obj)
                ))),
            })
            .collect();
    }
    if is_null_list(&obj) {
        return Ok(Vec::new());
    }
    Ok(vec![obj])
}

/// Turn rendered objects into serialized manifests.
///
/// # Errors
///
/// Fails when a list item is malformed, a label cannot be set, or an object
/// cannot be serialized.
pub fn assemble(objects: Vec<Object>, label_key: &str, label_value: &str) -> Result<Vec<String>> {
    let mut manifests = Vec::with_capacity(objects.len());
    for obj in objects {
        for mut target in expand(obj)? {
            if !label_key.is_empty() && !label_value.is_empty() && !is_crd(&target) {
                set_app_instance_label(&mut target, label_key, label_value)?;
            }
            let serialized = serde_json::to_string(&target)
                .map_err(|e| anyhow::anyhow!("Failed to serialize manifest: {e}"))?;
            manifests.push(serialized);
        }
    }
    Ok(manifests)
}

/// Container images referenced by `obj`, in declaration order.
///
/// Looks at `containers` and `initContainers` of both a bare pod spec
/// (`spec`) and a pod template (`spec.template.spec`).
#[must_use]
pub fn container_images(obj: &Object) -> Vec<String> {
    let spec = obj.get("spec");
    let template_spec = spec.and_then(|s| s.get("template")).and_then(|t| t.get("spec"));
    let mut images = Vec::new();
    for pod_spec in [spec, template_spec].into_iter().flatten() {
        for field in ["initContainers", "containers"] {
            if let Some(Value::Array(containers)) = pod_spec.get(field) {
                images.extend(
                    containers
                        .iter()
                        .filter_map(|c| c.get("image").and_then(Value::as_str))
                        .map(str::to_string),
                );
            }
        }
    }
    images
}
