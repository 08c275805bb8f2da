//! # podflow
//!
//! Develop serverless GPU workers on a remote pod with live code sync and hot
//! reload, then deploy them to a serverless endpoint.

#![deny(unsafe_code)]

mod context;
mod deploy;
mod orchestrator;
mod resolver;

#[cfg(test)]
pub(crate) mod test_helpers;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use podflow_core::RemoteLayout;
use podflow_core::logging::{init_json_subscriber, init_subscriber};
use podflow_settings::load_project;
use podflow_supervisor::{SuperviseConfig, supervise};

use crate::context::ProjectContext;

/// Remote GPU pod development workflow.
#[derive(Parser, Debug)]
#[command(name = "podflow", version, about = "Develop and deploy serverless workers on remote GPU pods")]
struct Cli {
    /// Minimum log level (overridden by `RUST_LOG`).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a development session on the project pod.
    Dev(ProjectArgs),
    /// Deploy the project to its serverless endpoint.
    Deploy(ProjectArgs),
    /// Run the hot-reload supervisor (invoked on the pod).
    #[command(hide = true)]
    Supervise(SuperviseArgs),
}

#[derive(Args, Debug)]
struct ProjectArgs {
    /// Project root containing `podflow.toml`.
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Network volume to attach to newly created pods and endpoints.
    #[arg(long)]
    network_volume_id: Option<String>,
}

#[derive(Args, Debug)]
struct SuperviseArgs {
    /// Synced project tree on the pod.
    #[arg(long)]
    project_dir: PathBuf,

    /// Pod id for the public URL. Defaults to `RUNPOD_POD_ID`.
    #[arg(long)]
    pod_id: Option<String>,

    /// Stop when stdin closes.
    #[arg(long)]
    watch_stdin: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.log_json {
        init_json_subscriber(&cli.log_level);
    } else {
        init_subscriber(&cli.log_level);
    }

    match cli.command {
        Command::Dev(args) => {
            let ctx = ProjectContext::load(&args.project_dir, args.network_volume_id)?;
            orchestrator::run_dev(&ctx).await
        }
        Command::Deploy(args) => {
            let ctx = ProjectContext::load(&args.project_dir, args.network_volume_id)?;
            deploy::run_deploy(&ctx).await
        }
        Command::Supervise(args) => run_supervise(args).await,
    }
}

async fn run_supervise(args: SuperviseArgs) -> Result<()> {
    let project = load_project(&args.project_dir).context("loading project descriptor")?;
    let layout = RemoteLayout::new(&project);
    let mut config = SuperviseConfig::for_project(&project, &layout).with_process_env();
    config.project_dir.clone_from(&args.project_dir);
    if args.pod_id.is_some() {
        config.pod_id = args.pod_id;
    }
    config.watch_stdin = args.watch_stdin;
    supervise(config).await.context("supervisor")
}
