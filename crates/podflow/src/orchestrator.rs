//! The `dev` flow: pod, session, environment, background sync, supervisor.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use podflow_core::shell::quote;
use podflow_core::{IgnoreMatcher, RemoteLayout};
use podflow_remote::{CommandOutput, FileSyncLoop, Provisioner, RemoteSession, TreeWatcher};
use tracing::info;

use crate::context::ProjectContext;

/// Run a development session until the supervisor exits or the user interrupts.
pub async fn run_dev(ctx: &ProjectContext) -> Result<()> {
    let session = Arc::new(ctx.connect().await?);
    let layout = &ctx.layout;

    info!("Syncing files to pod");
    let _ = session
        .run(&prepare_dirs_command(layout))
        .await
        .context("preparing remote directories")?;
    session
        .copy_tree(&ctx.root, &layout.dev_project, false)
        .await
        .context("syncing project")?;

    let provisioner = Provisioner::new(session.as_ref(), &ctx.project, layout);
    let _ = provisioner
        .ensure_environment()
        .await
        .context("provisioning environment")?;
    let binary = supervisor_binary(ctx.settings.supervisor_binary.clone())?;
    provisioner
        .upload_supervisor(&binary)
        .await
        .context("uploading supervisor")?;

    let ignore = IgnoreMatcher::load(&ctx.root).context("reading ignore patterns")?;
    let watcher = TreeWatcher::new(&ctx.root, ignore).context("watching project directory")?;
    let sync = FileSyncLoop::new(
        session.clone(),
        &ctx.root,
        layout.dev_project.clone(),
        ctx.settings.sync_debounce(),
    )
    .spawn(watcher);

    info!("Starting API server");
    let command = supervise_command(layout, session.pod_id());
    let outcome = run_until_interrupted(session.run(&command), interrupted()).await;
    sync.abort();
    outcome
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Drive the supervisor command until it ends or `interrupt` fires. An
/// interrupt wins over a command that failed at the same moment.
async fn run_until_interrupted<F, I>(command: F, interrupt: I) -> Result<()>
where
    F: Future<Output = podflow_core::Result<CommandOutput>>,
    I: Future<Output = ()>,
{
    tokio::select! {
        biased;
        () = interrupt => {
            info!("interrupted; stopping session");
            Ok(())
        }
        result = command => result.map(|_| ()).context("running supervisor"),
    }
}

/// `mkdir -p` for the dev tree and the prod root.
pub fn prepare_dirs_command(layout: &RemoteLayout) -> String {
    format!(
        "mkdir -p {} {}",
        quote(&layout.dev_project),
        quote(&layout.prod_root)
    )
}

/// Invocation of the uploaded supervisor. It stops when the session's stdin
/// closes, so dropping the connection tears the served process down.
pub fn supervise_command(layout: &RemoteLayout, pod_id: &str) -> String {
    format!(
        "{} supervise --project-dir {} --pod-id {} --watch-stdin",
        quote(&layout.supervisor_binary),
        quote(&layout.dev_project),
        quote(pod_id),
    )
}

/// Local binary to upload as the supervisor.
fn supervisor_binary(configured: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if !path.is_file() {
            bail!("supervisor_binary {} does not exist", path.display());
        }
        return Ok(path);
    }
    if !cfg!(target_os = "linux") {
        bail!("this build cannot run on the pod; set supervisor_binary to a Linux build of podflow");
    }
    std::env::current_exe().context("locating the running executable")
}
