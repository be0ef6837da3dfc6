//! Plain directories of YAML, JSON and Jsonnet files.
//!
//! Files are visited in file-name order, so manifest order follows the
//! directory layout. Subdirectories are entered only when `recurse` is set.
//!
//! | Extension       | Handling                                                   |
//! |-----------------|------------------------------------------------------------|
//! | `.json`         | exactly one object                                         |
//! | `.jsonnet`      | evaluated, result is an array of objects or one object     |
//! | `.yaml`, `.yml` | multi-document stream                                      |
//!
//! A YAML file that yields some objects and then fails to parse is reported
//! as FailedPrecondition. A YAML file that fails before yielding any object
//! is skipped, since it is most likely not a Kubernetes manifest at all
//! (a Helm values file, a CI config, and so on).

use regex::Regex;
use std::path::Path;
use walkdir::WalkDir;

use super::{RenderContext, RenderOutput};
use crate::core::{RepoServerError, Result};
use crate::manifest::{Object, split_yaml};
use crate::models::{ApplicationSourceDirectory, ApplicationSourceJsonnet};

/// File names that are manifest candidates.
const MANIFEST_FILE_PATTERN: &str = r"^.*\.(yaml|yml|json|jsonnet)$";

/// Render every manifest file under `ctx.app_path`.
///
/// # Errors
///
/// FailedPrecondition for malformed JSON, failed Jsonnet evaluation, or a
/// partially valid YAML stream.
pub async fn render(
    ctx: &RenderContext<'_>,
    opts: Option<&ApplicationSourceDirectory>,
) -> Result<RenderOutput> {
    let default = ApplicationSourceDirectory::default();
    let opts = opts.unwrap_or(&default);

    let mut objects = Vec::new();
    for path in manifest_files(ctx.app_path, opts.recurse)? {
        let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let content = tokio::fs::read(&path).await?;
        let text = String::from_utf8_lossy(&content);

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                let obj: Object = serde_json::from_str(&text).map_err(|e| {
                    RepoServerError::failed_precondition(format!(
                        "Failed to unmarshal \"{file_name}\": {e}"
                    ))
                })?;
                objects.push(obj);
            }
            Some("jsonnet") => {
                let output = evaluate_jsonnet(ctx, &opts.jsonnet, &path, &file_name).await?;
                objects.extend(parse_jsonnet_output(&output, &file_name)?);
            }
            _ => match split_yaml(&text) {
                Ok(parsed) => objects.extend(parsed),
                Err(e) if !e.parsed.is_empty() => {
                    return Err(RepoServerError::failed_precondition(format!(
                        "Failed to unmarshal \"{file_name}\": {}",
                        e.source
                    )));
                }
                Err(e) => {
                    tracing::debug!(
                        target: "render",
                        "Skipping {} which is not a manifest: {}",
                        path.display(),
                        e.source
                    );
                }
            },
        }
    }
    Ok(RenderOutput::objects(objects))
}

/// Manifest candidates below `app_path` in traversal order.
fn manifest_files(app_path: &Path, recurse: bool) -> Result<Vec<std::path::PathBuf>> {
    let mut walker = WalkDir::new(app_path).sort_by_file_name().follow_links(false);
    if !recurse {
        walker = walker.max_depth(1);
    }
    let manifest_file = Regex::new(MANIFEST_FILE_PATTERN)
        .map_err(|e| anyhow::anyhow!("Invalid manifest file pattern: {e}"))?;
    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| anyhow::anyhow!("Failed to walk {}: {e}", app_path.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if manifest_file.is_match(&entry.file_name().to_string_lossy()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

async fn evaluate_jsonnet(
    ctx: &RenderContext<'_>,
    opts: &ApplicationSourceJsonnet,
    path: &Path,
    file_name: &str,
) -> Result<String> {
    let mut cmd = ctx.command(&ctx.tools.jsonnet).arg("-J").arg(ctx.app_path.display().to_string());
    for tla in &opts.tlas {
        let flag = if tla.code { "--tla-code" } else { "--tla-str" };
        cmd = cmd.arg(flag).arg(format!("{}={}", tla.name, tla.value));
    }
    for ext in &opts.ext_vars {
        let flag = if ext.code { "--ext-code" } else { "--ext-str" };
        cmd = cmd.arg(flag).arg(format!("{}={}", ext.name, ext.value));
    }
    cmd = cmd.arg(path.display().to_string());

    match cmd.execute_stdout().await {
        Ok(out) => Ok(out),
        Err(RepoServerError::CommandFailed { stderr, .. }) => {
            Err(RepoServerError::failed_precondition(format!(
                "Failed to evaluate jsonnet \"{file_name}\": {stderr}"
            )))
        }
        Err(other) => Err(other),
    }
}

/// Interpret Jsonnet output as an array of objects, falling back to one object.
fn parse_jsonnet_output(output: &str, file_name: &str) -> Result<Vec<Object>> {
    if let Ok(many) = serde_json::from_str::<Vec<Object>>(output) {
        return Ok(many);
    }
    serde_json::from_str::<Object>(output).map(|one| vec![one]).map_err(|e| {
        RepoServerError::failed_precondition(format!(
            "Failed to unmarshal generated json \"{file_name}\": {e}"
        ))
    })
}
