//! Kustomize overlays.
//!
//! Overrides are applied with `kustomize edit` before the build, so they
//! modify the checked-out `kustomization.yaml` in place. The working tree is
//! reset by the next checkout.

use std::collections::BTreeMap;

use super::{RenderContext, RenderOutput, parse_tool_output};
use crate::core::Result;
use crate::manifest::{Object, container_images};
use crate::models::ApplicationSourceKustomize;
use crate::utils::exec::ExecCommand;

/// Build the overlay at `ctx.app_path`.
///
/// The images used by the built objects are returned alongside them.
pub async fn render(
    ctx: &RenderContext<'_>,
    opts: Option<&ApplicationSourceKustomize>,
) -> Result<RenderOutput> {
    if let Some(opts) = opts {
        if !opts.name_prefix.is_empty() {
            kustomize(ctx)
                .args(["edit", "set", "nameprefix", "--", opts.name_prefix.as_str()])
                .execute()
                .await?;
        }
        if !opts.images.is_empty() {
            kustomize(ctx)
                .args(["edit", "set", "image"])
                .args(opts.images.iter().cloned())
                .execute()
                .await?;
        }
    }

    let stdout = kustomize(ctx).args(["build", "."]).execute_stdout().await?;
    let objects = parse_tool_output("kustomize", &stdout)?;
    let images = image_tags(&objects);
    Ok(RenderOutput {
        objects,
        destination: None,
        images,
    })
}

/// `kustomize` in the overlay directory, with repository credentials for
/// remote bases when a password is configured.
fn kustomize(ctx: &RenderContext<'_>) -> ExecCommand {
    let cmd = ctx.command(&ctx.tools.kustomize);
    if ctx.repo.password.is_empty() {
        return cmd;
    }
    cmd.env("GIT_USERNAME", ctx.repo.username.as_str())
        .env("GIT_PASSWORD", ctx.repo.password.as_str())
        .env("GIT_TERMINAL_PROMPT", "0")
}

/// Image name to tag for every container image in `objects`.
#[must_use]
pub fn image_tags(objects: &[Object]) -> BTreeMap<String, String> {
    objects
        .iter()
        .flat_map(container_images)
        .map(|image| {
            let (name, tag) = split_image(&image);
            (name.to_string(), tag.to_string())
        })
        .collect()
}

/// Split an image reference into name and tag (or digest).
///
/// The tag separator is the last `:` after the last `/`, so registry ports
/// stay part of the name. A digest (`@sha256:...`) wins over a tag.
fn split_image(image: &str) -> (&str, &str) {
    if let Some((name, digest)) = image.split_once('@') {
        return (name, digest);
    }
    let slash = image.rfind('/').map_or(0, |i| i + 1);
    match image[slash..].rfind(':') {
        Some(colon) => {
            let at = slash + colon;
            (&image[..at], &image[at + 1..])
        }
        None => (image, ""),
    }
}
