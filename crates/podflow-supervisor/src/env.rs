//! The served process's environment: dependency reinstall and archive refresh.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use podflow_core::archive::capture_command;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::{Result, SupervisorError};

/// Operations the supervisor performs on the environment between launches.
#[async_trait]
pub trait Environment: Send + Sync {
    /// Reinstall the project manifest. Blocks until done.
    async fn reinstall(&self) -> Result<()>;

    /// Refresh the cached environment archive in the background.
    fn capture_archive(&self);
}

/// Whether a changed path touches the dependency manifest.
pub fn is_manifest_change(path: &std::path::Path) -> bool {
    path.to_string_lossy().contains("requirements")
}

/// Environment backed by a venv directory on the local filesystem.
///
/// Archive captures run one at a time. A request made while one runs is
/// queued behind it; further requests fold into the queued one.
#[derive(Clone, Debug)]
pub struct VenvEnvironment {
    install_script: String,
    capture_script: String,
    archive: String,
    capture_lock: Arc<Mutex<()>>,
    capture_queued: Arc<AtomicBool>,
}

impl VenvEnvironment {
    /// `install_script` is a complete shell command that activates the venv
    /// and installs the manifest.
    pub fn new(install_script: impl Into<String>, venv: impl Into<String>, archive: impl Into<String>) -> Self {
        let archive = archive.into();
        Self {
            install_script: install_script.into(),
            capture_script: capture_command(&venv.into(), &archive),
            archive,
            capture_lock: Arc::default(),
            capture_queued: Arc::default(),
        }
    }
}

#[async_trait]
impl Environment for VenvEnvironment {
    async fn reinstall(&self) -> Result<()> {
        info!("dependency manifest changed; reinstalling");
        let status = Command::new("bash")
            .arg("-c")
            .arg(&self.install_script)
            .stdin(Stdio::null())
            .status()
            .await?;
        if status.success() {
            info!("Installed Python dependencies");
            Ok(())
        } else {
            Err(SupervisorError::InstallFailed {
                exit_code: status.code().unwrap_or(-1),
            })
        }
    }

    fn capture_archive(&self) {
        if self.capture_queued.swap(true, Ordering::SeqCst) {
            debug!(archive = %self.archive, "archive refresh already queued");
            return;
        }
        let script = self.capture_script.clone();
        let archive = self.archive.clone();
        let lock = self.capture_lock.clone();
        let queued = self.capture_queued.clone();
        let _ = tokio::spawn(async move {
            let _running = lock.lock().await;
            queued.store(false, Ordering::SeqCst);
            debug!(archive = %archive, "refreshing environment archive");
            let result = Command::new("bash")
                .arg("-c")
                .arg(&script)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .status()
                .await;
            match result {
                Ok(status) if status.success() => debug!(archive = %archive, "environment archive refreshed"),
                Ok(status) => warn!(archive = %archive, code = ?status.code(), "archive refresh failed"),
                Err(e) => warn!(archive = %archive, error = %e, "archive refresh failed"),
            }
        });
    }
}
