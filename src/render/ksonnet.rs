//! ksonnet applications.
//!
//! The application is described by `app.yaml`, whose environments carry the
//! destination cluster and namespace. Parameter overrides are written with
//! `ks param set` before `ks show` renders the environment.

use serde::Deserialize;
use std::path::Path;

use super::{RenderContext, RenderOutput, parse_tool_output};
use crate::constants::{KSONNET_APP_MARKER, KSONNET_COMPONENT_LABEL, LEGACY_APP_NAME_LABEL_KEY};
use crate::core::{RepoServerError, Result};
use crate::manifest::unset_label;
use crate::models::{ApplicationSourceKsonnet, KsonnetAppSpec, KsonnetParameter};
use crate::utils::exec::ExecCommand;

/// Load `app.yaml` from `app_path`.
///
/// Environment names are filled in from the map keys.
///
/// # Errors
///
/// FailedPrecondition when the file is missing or malformed.
pub async fn load_app(app_path: &Path) -> Result<KsonnetAppSpec> {
    let mut spec = read_app_yaml(app_path).await.map_err(|e| {
        RepoServerError::failed_precondition(format!(
            "unable to load application from {}: {e}",
            app_path.display()
        ))
    })?;
    for (name, env) in &mut spec.environments {
        if env.name.is_empty() {
            env.name.clone_from(name);
        }
    }
    Ok(spec)
}

async fn read_app_yaml(app_path: &Path) -> anyhow::Result<KsonnetAppSpec> {
    let content = tokio::fs::read_to_string(app_path.join(KSONNET_APP_MARKER)).await?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Render the requested environment.
///
/// # Errors
///
/// - FailedPrecondition when `app.yaml` cannot be loaded
/// - InvalidArgument when no environment is given or it is not declared
/// - the `ks` failure when a parameter override or the render fails
pub async fn render(
    ctx: &RenderContext<'_>,
    opts: Option<&ApplicationSourceKsonnet>,
) -> Result<RenderOutput> {
    let app = load_app(ctx.app_path).await?;
    let Some(opts) = opts else {
        return Err(RepoServerError::invalid_argument("Ksonnet environment not set"));
    };

    for param in &opts.parameters {
        ks(ctx)
            .args(["param", "set", param.component.as_str(), param.name.as_str(), param.value.as_str()])
            .args(["--env", opts.environment.as_str()])
            .execute()
            .await?;
    }

    let Some(env) = app.environments.get(&opts.environment) else {
        return Err(RepoServerError::invalid_argument(format!(
            "environment '{}' does not exist in ksonnet app",
            opts.environment
        )));
    };
    let destination = env.destination.clone();

    let stdout = ks(ctx).args(["show", opts.environment.as_str()]).execute_stdout().await?;
    let mut objects = parse_tool_output("ks", &stdout)?;
    if ctx.label_key == LEGACY_APP_NAME_LABEL_KEY {
        for obj in &mut objects {
            unset_label(obj, KSONNET_COMPONENT_LABEL);
        }
    }

    Ok(RenderOutput {
        objects,
        destination: Some(destination),
        images: Default::default(),
    })
}

fn ks(ctx: &RenderContext<'_>) -> ExecCommand {
    ctx.command(&ctx.tools.ks)
}

#[derive(Debug, Deserialize)]
struct ParamList {
    #[serde(default)]
    data: Vec<ParamEntry>,
}

#[derive(Debug, Deserialize)]
struct ParamEntry {
    #[serde(default)]
    component: String,
    #[serde(default)]
    param: String,
    #[serde(default)]
    value: String,
}

/// The application spec with its component parameters.
///
/// # Errors
///
/// FailedPrecondition when `app.yaml` cannot be loaded; Internal when
/// `ks param list` fails or prints something unexpected.
pub async fn app_details(ctx: &RenderContext<'_>) -> Result<KsonnetAppSpec> {
    let mut spec = load_app(ctx.app_path).await?;
    let stdout = ks(ctx).args(["param", "list", "-o", "json"]).execute_stdout().await?;
    spec.parameters = parse_param_list(&stdout)?;
    Ok(spec)
}

fn parse_param_list(stdout: &str) -> Result<Vec<KsonnetParameter>> {
    let list: ParamList = serde_json::from_str(stdout)
        .map_err(|e| anyhow::anyhow!("Failed to parse ks param list output: {e}"))?;
    Ok(list
        .data
        .into_iter()
        .map(|entry| KsonnetParameter {
            component: entry.component,
            name: entry.param,
            value: entry.value,
        })
        .collect())
}
