//! The `deploy` flow: snapshot the project into the prod tree and point the
//! serverless endpoint at a fresh template built from it.

use anyhow::{Context, Result};
use podflow_remote::{Provisioner, RemoteSession};
use tracing::info;

use crate::context::ProjectContext;
use crate::orchestrator::prepare_dirs_command;

/// Deploy the project and print the endpoint id.
pub async fn run_deploy(ctx: &ProjectContext) -> Result<()> {
    let session = ctx.connect().await?;
    let layout = &ctx.layout;

    info!("Syncing files to pod");
    let _ = session
        .run(&prepare_dirs_command(layout))
        .await
        .context("preparing remote directories")?;
    session
        .copy_tree(&ctx.root, &layout.prod_project, false)
        .await
        .context("copying project to prod tree")?;

    Provisioner::new(&session, &ctx.project, layout)
        .ensure_release_environment()
        .await
        .context("provisioning release environment")?;

    let outcome = ctx
        .reconciler()
        .deploy(&ctx.project, layout, ctx.network_volume_id.as_deref())
        .await
        .context("deploying endpoint")?;

    let verb = if outcome.created { "Created" } else { "Updated" };
    println!(
        "{verb} endpoint {} (template {})",
        outcome.endpoint_id, outcome.template_id
    );
    Ok(())
}
