//! Entry point for `podflow supervise` on the pod.

use std::path::PathBuf;
use std::sync::Arc;

use podflow_core::constants::{BASE_RELEASE_ENV, POD_ID_ENV};
use podflow_core::layout::{install_script, join};
use podflow_core::{IgnoreMatcher, Project, RemoteLayout};
use podflow_remote::TreeWatcher;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::drain::DrainPolicy;
use crate::env::VenvEnvironment;
use crate::errors::{Result, SupervisorError};
use crate::process::{ChildLauncher, LaunchSpec, connect_url, select_port};
use crate::supervisor::Supervisor;

/// Everything the supervisor needs to know about the project on this pod.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuperviseConfig {
    /// Synced project tree; watched and used as working directory.
    pub project_dir: PathBuf,
    /// Development venv.
    pub venv: PathBuf,
    /// Handler script.
    pub handler: PathBuf,
    /// Port the project asks for.
    pub port: u16,
    /// Cached environment archive on shared storage.
    pub archive: String,
    /// Shell command that reinstalls the manifest into the venv.
    pub install_script: String,
    /// Pod id, used for the public URL.
    pub pod_id: Option<String>,
    /// Set when the base image runs its own supervisor.
    pub base_release: Option<String>,
    /// Stop when stdin reaches EOF.
    pub watch_stdin: bool,
}

impl SuperviseConfig {
    /// Development settings for `project`.
    pub fn for_project(project: &Project, layout: &RemoteLayout) -> Self {
        Self {
            project_dir: PathBuf::from(&layout.dev_project),
            venv: PathBuf::from(&layout.dev_venv),
            handler: PathBuf::from(join(&layout.dev_project, &project.runtime.handler_path)),
            port: project.api_port(),
            archive: layout.venv_archive.clone(),
            install_script: install_script(project, &layout.dev_project, &layout.dev_venv),
            pod_id: None,
            base_release: None,
            watch_stdin: false,
        }
    }

    /// Fill pod id and base release marker from the process environment.
    #[must_use]
    pub fn with_process_env(mut self) -> Self {
        self.pod_id = std::env::var(POD_ID_ENV).ok().filter(|v| !v.is_empty());
        self.base_release = std::env::var(BASE_RELEASE_ENV).ok();
        self
    }

    /// `(bind, advertised)` ports.
    pub fn ports(&self) -> (u16, u16) {
        select_port(self.port, self.base_release.as_deref())
    }
}

/// Run the supervisor until a shutdown signal or a fatal error.
pub async fn supervise(config: SuperviseConfig) -> Result<()> {
    let (bind, advertised) = config.ports();
    if bind != advertised {
        info!(bind, advertised, "base release detected; binding alternate port");
    }

    let ignore = IgnoreMatcher::load(&config.project_dir)?;
    let mut watcher =
        TreeWatcher::new(&config.project_dir, ignore).map_err(|e| SupervisorError::Watch(e.to_string()))?;

    let launcher = ChildLauncher::new(LaunchSpec {
        project_dir: config.project_dir.clone(),
        venv: config.venv.clone(),
        handler: config.handler.clone(),
        port: bind,
    });
    let env = VenvEnvironment::new(
        config.install_script.clone(),
        config.venv.to_string_lossy(),
        config.archive.clone(),
    );

    match &config.pod_id {
        Some(pod_id) => println!("\nConnect to the API server at:\n> {}\n", connect_url(pod_id, advertised)),
        None => println!("\nAPI server listening on port {advertised}\n"),
    }

    let mut supervisor = Supervisor::new(Arc::new(launcher), Arc::new(env), DrainPolicy::default());
    supervisor
        .run(&mut watcher, shutdown_signal(config.watch_stdin))
        .await
}

async fn shutdown_signal(watch_stdin: bool) {
    let stdin_closed = async {
        if watch_stdin {
            stdin_eof().await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
            (Ok(mut term), Ok(mut hup)) => {
                tokio::select! {
                    _ = term.recv() => {}
                    _ = hup.recv() => {}
                }
            }
            _ => {
                warn!("could not install signal handlers");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        () = terminate => info!("received termination signal"),
        () = stdin_closed => info!("controlling session closed"),
    }
}

async fn stdin_eof() {
    let mut stdin = tokio::io::stdin();
    let mut buf = [0_u8; 256];
    loop {
        match stdin.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}
