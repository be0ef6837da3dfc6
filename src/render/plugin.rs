//! Config management plugins.
//!
//! A plugin is a pair of commands registered by name. The optional `init`
//! step prepares the directory; the `generate` step prints the manifest
//! stream. Both run in the application directory with the inherited
//! environment plus the application name and namespace.

use super::{RenderContext, RenderOutput, parse_tool_output};
use crate::constants::{PLUGIN_ENV_APP_NAME, PLUGIN_ENV_APP_NAMESPACE};
use crate::core::{RepoServerError, Result};
use crate::models::{ApplicationSourcePlugin, ConfigManagementPlugin, PluginCommand};
use crate::utils::exec::ExecCommand;

/// Find a plugin by exact name.
///
/// # Errors
///
/// [`RepoServerError::PluginNotRegistered`] when no plugin has that name.
pub fn lookup<'a>(
    plugins: &'a [ConfigManagementPlugin],
    name: &str,
) -> Result<&'a ConfigManagementPlugin> {
    plugins.iter().find(|p| p.name == name).ok_or_else(|| RepoServerError::PluginNotRegistered {
        name: name.to_string(),
    })
}

/// Run the named plugin and parse its output.
///
/// # Errors
///
/// PluginNotRegistered for an unknown name, InvalidArgument for a step with
/// no command, and the command's own failure when a step fails.
pub async fn render(
    ctx: &RenderContext<'_>,
    opts: Option<&ApplicationSourcePlugin>,
) -> Result<RenderOutput> {
    let name = opts.map(|o| o.name.as_str()).unwrap_or_default();
    let plugin = lookup(ctx.plugins, name)?;

    if let Some(init) = &plugin.init {
        tracing::debug!(target: "render", "Running init step of plugin '{}'", plugin.name);
        step(ctx, &plugin.name, init)?.execute().await?;
    }

    let stdout = step(ctx, &plugin.name, &plugin.generate)?.execute_stdout().await?;
    let objects = parse_tool_output(&format!("plugin '{}'", plugin.name), &stdout)?;
    Ok(RenderOutput::objects(objects))
}

fn step(ctx: &RenderContext<'_>, plugin: &str, cmd: &PluginCommand) -> Result<ExecCommand> {
    let Some((program, fixed)) = cmd.command.split_first() else {
        return Err(RepoServerError::invalid_argument(format!(
            "plugin '{plugin}' has an empty command"
        )));
    };
    Ok(ctx
        .command(program)
        .args(fixed.iter().chain(&cmd.args).cloned())
        .env(PLUGIN_ENV_APP_NAME, ctx.app_name)
        .env(PLUGIN_ENV_APP_NAMESPACE, ctx.namespace))
}
