//! Rendering application sources into Kubernetes objects.
//!
//! Each source type has its own renderer module. [`Renderer`] is the tagged
//! union over them: it pairs the resolved type with the matching option bag
//! from the [`ApplicationSource`] and dispatches with a plain `match`.
//!
//! Every renderer shares one contract: given the application directory and
//! the request context, produce objects in a deterministic order plus an
//! optional destination. Renderers never touch the cache or locks; the
//! service holds the working directory lock for the whole render.
//!
//! | Type      | Module        | External tool                  |
//! |-----------|---------------|--------------------------------|
//! | Ksonnet   | [`ksonnet`]   | `ks`                           |
//! | Helm      | [`helm`]      | `helm`                         |
//! | Kustomize | [`kustomize`] | `kustomize`                    |
//! | Plugin    | [`plugin`]    | the plugin's commands          |
//! | Directory | [`directory`] | `jsonnet` for `.jsonnet` files |

pub mod directory;
pub mod helm;
pub mod ksonnet;
pub mod kustomize;
pub mod plugin;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::ToolPaths;
use crate::core::{RepoServerError, Result};
use crate::manifest::{Object, split_yaml};
use crate::models::{
    ApplicationDestination, ApplicationSource, ApplicationSourceDirectory, ApplicationSourceHelm,
    ApplicationSourceKsonnet, ApplicationSourceKustomize, ApplicationSourcePlugin,
    ApplicationSourceType, ConfigManagementPlugin, Repository,
};
use crate::utils::exec::ExecCommand;

/// Everything a renderer may need besides its option bag.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// Root of the checked-out repository
    pub repo_root: &'a Path,
    /// Application directory inside `repo_root`
    pub app_path: &'a Path,
    /// Application name (the instance label value)
    pub app_name: &'a str,
    /// Target namespace
    pub namespace: &'a str,
    /// Instance label key requested by the caller
    pub label_key: &'a str,
    /// Repository descriptor, for tools that fetch remote bases
    pub repo: &'a Repository,
    /// Helm repositories for dependency builds
    pub helm_repos: &'a [Repository],
    /// Registered plugins
    pub plugins: &'a [ConfigManagementPlugin],
    /// Tool executables
    pub tools: &'a ToolPaths,
    /// Timeout for each tool invocation
    pub timeout: Option<Duration>,
    /// Request cancellation
    pub cancel: &'a CancellationToken,
}

impl RenderContext<'_> {
    /// A command for `program` bound to this request's timeout and cancellation,
    /// running in the application directory.
    pub fn command(&self, program: &str) -> ExecCommand {
        ExecCommand::new(program)
            .current_dir(self.app_path)
            .with_timeout(self.timeout)
            .with_cancellation(self.cancel.clone())
            .with_context(if self.app_name.is_empty() { "-" } else { self.app_name })
    }
}

/// What a renderer produced.
#[derive(Debug, Clone, Default)]
pub struct RenderOutput {
    /// Objects in render order
    pub objects: Vec<Object>,
    /// Destination reported by the source itself
    pub destination: Option<ApplicationDestination>,
    /// Images used by the objects, name to tag (Kustomize only)
    pub images: BTreeMap<String, String>,
}

impl RenderOutput {
    /// Output carrying only objects.
    #[must_use]
    pub fn objects(objects: Vec<Object>) -> Self {
        Self {
            objects,
            ..Self::default()
        }
    }
}

/// A source type paired with its options.
#[derive(Debug, Clone, Copy)]
pub enum Renderer<'a> {
    /// `ks show`
    Ksonnet(Option<&'a ApplicationSourceKsonnet>),
    /// `helm template`
    Helm(Option<&'a ApplicationSourceHelm>),
    /// `kustomize build`
    Kustomize(Option<&'a ApplicationSourceKustomize>),
    /// A registered config management plugin
    Plugin(Option<&'a ApplicationSourcePlugin>),
    /// YAML, JSON and Jsonnet files
    Directory(Option<&'a ApplicationSourceDirectory>),
}

impl<'a> Renderer<'a> {
    /// Renderer for `source_type` with the options carried by `source`.
    #[must_use]
    pub fn new(source_type: ApplicationSourceType, source: &'a ApplicationSource) -> Self {
        match source_type {
            ApplicationSourceType::Ksonnet => Self::Ksonnet(source.ksonnet.as_ref()),
            ApplicationSourceType::Helm => Self::Helm(source.helm.as_ref()),
            ApplicationSourceType::Kustomize => Self::Kustomize(source.kustomize.as_ref()),
            ApplicationSourceType::Plugin => Self::Plugin(source.plugin.as_ref()),
            ApplicationSourceType::Directory => Self::Directory(source.directory.as_ref()),
        }
    }

    /// The source type this renderer handles.
    #[must_use]
    pub const fn source_type(&self) -> ApplicationSourceType {
        match self {
            Self::Ksonnet(_) => ApplicationSourceType::Ksonnet,
            Self::Helm(_) => ApplicationSourceType::Helm,
            Self::Kustomize(_) => ApplicationSourceType::Kustomize,
            Self::Plugin(_) => ApplicationSourceType::Plugin,
            Self::Directory(_) => ApplicationSourceType::Directory,
        }
    }

    /// Render the application at `ctx.app_path`.
    ///
    /// # Errors
    ///
    /// Each renderer documents its own failure kinds; subprocess failures are
    /// Internal, cancellation is Cancelled.
    pub async fn render(&self, ctx: &RenderContext<'_>) -> Result<RenderOutput> {
        tracing::debug!(
            target: "render",
            "Rendering {} at {}",
            self.source_type(),
            ctx.app_path.display()
        );
        match *self {
            Self::Ksonnet(opts) => ksonnet::render(ctx, opts).await,
            Self::Helm(opts) => helm::render(ctx, opts).await,
            Self::Kustomize(opts) => kustomize::render(ctx, opts).await,
            Self::Plugin(opts) => plugin::render(ctx, opts).await,
            Self::Directory(opts) => directory::render(ctx, opts).await,
        }
    }
}

/// Parse a tool's standard output as a YAML stream.
pub(crate) fn parse_tool_output(tool: &str, stdout: &str) -> Result<Vec<Object>> {
    split_yaml(stdout).map_err(|e| {
        RepoServerError::Internal(anyhow::anyhow!("Failed to parse {tool} output: {}", e.source))
    })
}
