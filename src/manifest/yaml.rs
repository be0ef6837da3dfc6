//! Multi-document YAML splitting.

use serde::Deserialize;
use serde_json::Value;

use super::Object;

/// A stream stopped parsing part way through.
///
/// `parsed` holds every object decoded before the failing document, in order.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct SplitError {
    /// Objects decoded before the failure
    pub parsed: Vec<Object>,
    /// The decoding failure
    #[source]
    pub source: anyhow::Error,
}

/// Split a `---` separated YAML stream into Kubernetes objects.
///
/// Empty and `null` documents are skipped. Parsing stops at the first
/// document that is not valid YAML or is not a mapping.
pub fn split_yaml(text: &str) -> Result<Vec<Object>, SplitError> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = match Value::deserialize(document) {
            Ok(value) => value,
            Err(e) => {
                return Err(SplitError {
                    parsed: objects,
                    source: e.into(),
                });
            }
        };
        match value {
            Value::Null => {}
            Value::Object(map) => objects.push(map),
            other => {
                return Err(SplitError {
                    parsed: objects,
                    source: anyhow::anyhow!(
                        "expected a mapping, found {}",
                        value_kind(&other)
                    ),
                });
            }
        }
    }
    Ok(objects)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
