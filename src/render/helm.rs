//! Helm charts.
//!
//! Charts are rendered with `helm template`. When a chart declares
//! dependencies that are not vendored under `charts/`, the first render fails
//! with a recognizable message; the renderer then registers the auxiliary Helm
//! repositories, runs `helm dependency build` and retries exactly once.

use serde_json::{Map, Value};
use std::path::Path;

use super::{RenderContext, RenderOutput, parse_tool_output};
use crate::constants::HELM_DEFAULT_VALUES;
use crate::core::{RepoServerError, Result};
use crate::git::url::url_credentials;
use crate::models::{ApplicationSourceHelm, HelmAppSpec, HelmParameter, Repository};
use crate::utils::security::resolve_within;

/// Messages `helm template` prints for dependencies missing from `charts/`.
const MISSING_DEPENDENCY_MARKERS: &[&str] = &[
    "found in requirements.yaml, but missing in charts/ directory",
    "found in Chart.yaml, but missing in charts/ directory",
];

/// Render the chart at `ctx.app_path`.
///
/// # Errors
///
/// InvalidArgument for a value file outside the repository. Tool failures
/// after the single dependency-build retry are returned as they are.
pub async fn render(
    ctx: &RenderContext<'_>,
    opts: Option<&ApplicationSourceHelm>,
) -> Result<RenderOutput> {
    let default = ApplicationSourceHelm::default();
    let opts = opts.unwrap_or(&default);
    let args = template_args(ctx, opts)?;

    let stdout = match ctx.command(&ctx.tools.helm).args(args.iter().cloned()).execute_stdout().await {
        Ok(out) => out,
        Err(RepoServerError::CommandFailed { stderr, .. }) if is_missing_dependency(&stderr) => {
            tracing::info!(
                target: "render",
                "Chart at {} has missing dependencies, building them",
                ctx.app_path.display()
            );
            build_dependencies(ctx).await?;
            ctx.command(&ctx.tools.helm).args(args).execute_stdout().await?
        }
        Err(e) => return Err(e),
    };

    Ok(RenderOutput::objects(parse_tool_output("helm", &stdout)?))
}

/// Release name: explicit, else the application name, else the chart directory.
fn release_name<'a>(ctx: &'a RenderContext<'_>, opts: &'a ApplicationSourceHelm) -> &'a str {
    if !opts.release_name.is_empty() {
        return &opts.release_name;
    }
    if !ctx.app_name.is_empty() {
        return ctx.app_name;
    }
    ctx.app_path.file_name().and_then(|n| n.to_str()).unwrap_or("release")
}

fn template_args(ctx: &RenderContext<'_>, opts: &ApplicationSourceHelm) -> Result<Vec<String>> {
    let mut args = vec!["template".to_string(), release_name(ctx, opts).to_string(), ".".to_string()];
    if !ctx.namespace.is_empty() {
        args.push("--namespace".to_string());
        args.push(ctx.namespace.to_string());
    }
    for value_file in &opts.value_files {
        args.push("-f".to_string());
        args.push(value_file_arg(ctx.repo_root, ctx.app_path, value_file)?);
    }
    for param in &opts.parameters {
        args.push(if param.force_string { "--set-string" } else { "--set" }.to_string());
        args.push(format!("{}={}", param.name, param.value));
    }
    Ok(args)
}

/// Value files given as URLs pass through; anything else must resolve inside the repository.
fn value_file_arg(repo_root: &Path, app_path: &Path, value_file: &str) -> Result<String> {
    if value_file.contains("://") {
        return Ok(value_file.to_string());
    }
    Ok(resolve_within(repo_root, app_path, value_file)?.display().to_string())
}

fn is_missing_dependency(stderr: &str) -> bool {
    MISSING_DEPENDENCY_MARKERS.iter().any(|marker| stderr.contains(marker))
}

async fn build_dependencies(ctx: &RenderContext<'_>) -> Result<()> {
    for repo in ctx.helm_repos {
        let name = helm_repo_name(repo);
        let mut cmd = ctx.command(&ctx.tools.helm).args(["repo", "add", name.as_str(), repo.repo.as_str()]);
        if !repo.username.is_empty() {
            cmd = cmd.args(["--username", repo.username.as_str()]);
        }
        if !repo.password.is_empty() {
            cmd = cmd.args(["--password", repo.password.as_str()]).secret(repo.password.as_str());
        }
        if let Some(userinfo) = url_credentials(&repo.repo) {
            cmd = cmd.secret(userinfo);
        }
        cmd.execute().await?;
    }
    ctx.command(&ctx.tools.helm).args(["dependency", "build"]).execute().await?;
    Ok(())
}

/// Name for `helm repo add`: the configured name, else one derived from the URL.
fn helm_repo_name(repo: &Repository) -> String {
    if !repo.name.is_empty() {
        return repo.name.clone();
    }
    let without_scheme = repo.repo.split_once("://").map_or(repo.repo.as_str(), |(_, rest)| rest);
    without_scheme
        .trim_end_matches('/')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

/// Introspect the chart at `app_path`.
///
/// `path` is the chart path reported back to the caller. Value files are the
/// chart directory's own `*values*.yaml` files. Parameters are the flattened
/// merge of `values.yaml` and the requested `value_files`.
///
/// # Errors
///
/// InvalidArgument for a value file outside the repository, FailedPrecondition
/// for a value file that is not valid YAML.
pub async fn app_details(
    repo_root: &Path,
    app_path: &Path,
    path: &str,
    value_files: &[String],
) -> Result<HelmAppSpec> {
    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(app_path).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        let is_yaml = name.ends_with(".yaml") || name.ends_with(".yml");
        if is_yaml && name.contains("values") && entry.file_type().await?.is_file() {
            found.push(name);
        }
    }
    found.sort();

    let mut merged = Value::Object(Map::new());
    let mut sources = vec![app_path.join(HELM_DEFAULT_VALUES)];
    for value_file in value_files {
        if value_file.contains("://") {
            continue;
        }
        sources.push(resolve_within(repo_root, app_path, value_file)?);
    }
    for source in sources {
        let content = match tokio::fs::read_to_string(&source).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        let values: Value = serde_yaml::from_str(&content).map_err(|e| {
            RepoServerError::failed_precondition(format!(
                "Failed to parse values file {}: {e}",
                source.display()
            ))
        })?;
        merge_values(&mut merged, values);
    }

    let mut parameters = Vec::new();
    flatten("", &merged, &mut parameters);

    Ok(HelmAppSpec {
        path: path.to_string(),
        value_files: found,
        parameters,
    })
}

/// Deep merge `overlay` into `base`; maps merge key by key, anything else replaces.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (base, overlay) => *base = overlay,
    }
}

/// Flatten nested values into dotted `--set` style names.
fn flatten(prefix: &str, value: &Value, out: &mut Vec<HelmParameter>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let name = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                flatten(&name, child, out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                flatten(&format!("{prefix}[{i}]"), child, out);
            }
        }
        Value::Null => {}
        Value::String(s) => out.push(param(prefix, s.clone())),
        other => out.push(param(prefix, other.to_string())),
    }
}

fn param(name: &str, value: String) -> HelmParameter {
    HelmParameter {
        name: name.to_string(),
        value,
        force_string: false,
    }
}
