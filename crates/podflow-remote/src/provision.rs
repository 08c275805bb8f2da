//! Environment provisioning on the pod.
//!
//! Steps run in order and each is safe to repeat:
//! 1. `tools`: OS packages the workflow relies on, plus the `uv` installer
//! 2. `environment`: the development venv, restored from the shared-storage
//!    archive when one exists, otherwise created fresh
//! 3. `dependencies`: the project manifest installed into the venv
//! 4. `supervisor`: this binary uploaded to the pod
//!
//! Any failure is fatal and reported as [`PodflowError::ProvisionFailed`]
//! naming the step.

use std::fmt;
use std::path::Path;

use podflow_core::archive::restore_command;
use podflow_core::layout::{activation_marker, install_script};
use podflow_core::shell::quote;
use podflow_core::{PodflowError, Project, RemoteLayout, Result};
use tracing::{info, warn};

use crate::session::RemoteSession;

/// Binaries the workflow needs on the pod, with the package providing each.
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("wget", "wget"),
    ("sudo", "sudo"),
    ("lsof", "lsof"),
    ("git", "git"),
    ("rsync", "rsync"),
    ("zstd", "zstd"),
    ("inotifywait", "inotify-tools"),
    ("sshd", "openssh-server"),
];

/// Provisioning stage, used in error reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisionStep {
    /// OS packages and the package installer.
    Tools,
    /// The virtual environment itself.
    Environment,
    /// Project dependencies.
    Dependencies,
    /// Supervisor binary upload.
    Supervisor,
}

impl ProvisionStep {
    /// Step name as reported to the user.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tools => "tools",
            Self::Environment => "environment",
            Self::Dependencies => "dependencies",
            Self::Supervisor => "supervisor",
        }
    }

    fn fail(self, cause: &PodflowError) -> PodflowError {
        PodflowError::ProvisionFailed {
            step: self.as_str().to_string(),
            reason: cause.to_string(),
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the development environment came to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvironmentOrigin {
    /// Already present on the pod.
    Existing,
    /// Extracted from the shared-storage archive.
    Restored,
    /// Built from scratch.
    Created,
}

/// Command installing missing OS packages and `uv`.
pub fn tools_command() -> String {
    let checks: Vec<String> = REQUIRED_TOOLS
        .iter()
        .map(|(bin, pkg)| format!("command -v {bin} >/dev/null 2>&1 || missing=\"$missing {pkg}\""))
        .collect();
    format!(
        "set -e\nmissing=\"\"\n{}\nif [ -n \"$missing\" ]; then\n  echo \"[INFO] Installing$missing ...\"\n  apt-get update -qq\n  DEBIAN_FRONTEND=noninteractive apt-get install -y -qq $missing\nfi\ncommand -v uv >/dev/null 2>&1 || {{ echo \"[INFO] Installing uv ...\"; pip install -q uv; }}",
        checks.join("\n")
    )
}

/// Brings a pod's environment up to the project's requirements.
pub struct Provisioner<'a> {
    session: &'a dyn RemoteSession,
    project: &'a Project,
    layout: &'a RemoteLayout,
}

impl<'a> Provisioner<'a> {
    /// Provision `project` through `session`.
    pub fn new(session: &'a dyn RemoteSession, project: &'a Project, layout: &'a RemoteLayout) -> Self {
        Self {
            session,
            project,
            layout,
        }
    }

    /// Run tools, environment, and dependency steps in order. The project
    /// tree must already be copied to the dev directory.
    pub async fn ensure_environment(&self) -> Result<EnvironmentOrigin> {
        self.ensure_tools().await?;
        let origin = self.ensure_venv().await?;
        self.install_dependencies().await?;
        Ok(origin)
    }

    /// Install missing OS tools.
    pub async fn ensure_tools(&self) -> Result<()> {
        info!(pod_id = %self.session.pod_id(), "checking required tools");
        let _ = self
            .session
            .run(&tools_command())
            .await
            .map_err(|e| ProvisionStep::Tools.fail(&e))?;
        Ok(())
    }

    /// Make sure the development venv has an activation marker.
    pub async fn ensure_venv(&self) -> Result<EnvironmentOrigin> {
        let step = ProvisionStep::Environment;
        let venv = &self.layout.dev_venv;
        let marker = self.layout.dev_activation_marker();

        if self.file_exists(&marker).await.map_err(|e| step.fail(&e))? {
            info!(venv = %venv, "environment already present");
            return Ok(EnvironmentOrigin::Existing);
        }

        let archive = &self.layout.venv_archive;
        if self.file_exists(archive).await.map_err(|e| step.fail(&e))? {
            info!(archive = %archive, "Extracting existing venv from archive");
            match self.session.run(&restore_command(archive, venv)).await {
                Ok(_) => {
                    if self.file_exists(&marker).await.map_err(|e| step.fail(&e))? {
                        return Ok(EnvironmentOrigin::Restored);
                    }
                    warn!(archive = %archive, "archive held no usable environment; rebuilding");
                }
                Err(e) => warn!(archive = %archive, error = %e, "archive restore failed; rebuilding"),
            }
            let _ = self
                .session
                .run(&format!("rm -rf {}", quote(venv)))
                .await
                .map_err(|e| step.fail(&e))?;
        }

        let runtime = &self.project.runtime;
        info!(
            package_manager = %runtime.package_manager,
            python = %runtime.python_version,
            "Creating new venv"
        );
        let create = runtime
            .package_manager
            .create_env_command(&runtime.python_version, venv);
        let _ = self
            .session
            .run(&create)
            .await
            .map_err(|e| step.fail(&e))?;
        Ok(EnvironmentOrigin::Created)
    }

    /// Install the project manifest into the development venv.
    pub async fn install_dependencies(&self) -> Result<()> {
        let _ = self
            .session
            .run(&self.install_command())
            .await
            .map_err(|e| ProvisionStep::Dependencies.fail(&e))?;
        info!("Installed Python dependencies");
        Ok(())
    }

    /// Build the release venv from the prod tree for serverless workers. The
    /// venv is created once and reused; the manifest is reinstalled every time.
    pub async fn ensure_release_environment(&self) -> Result<()> {
        self.ensure_tools().await?;

        let venv = &self.layout.prod_venv;
        let step = ProvisionStep::Environment;
        let marker = activation_marker(venv);
        if !self.file_exists(&marker).await.map_err(|e| step.fail(&e))? {
            let runtime = &self.project.runtime;
            info!(venv = %venv, python = %runtime.python_version, "Creating release venv");
            let create = runtime
                .package_manager
                .create_env_command(&runtime.python_version, venv);
            let _ = self.session.run(&create).await.map_err(|e| step.fail(&e))?;
        }

        let install = install_script(self.project, &self.layout.prod_project, venv);
        let _ = self
            .session
            .run(&install)
            .await
            .map_err(|e| ProvisionStep::Dependencies.fail(&e))?;
        info!("Installed release dependencies");
        Ok(())
    }

    /// Upload the supervisor binary to its place on shared storage.
    pub async fn upload_supervisor(&self, binary: &Path) -> Result<()> {
        let step = ProvisionStep::Supervisor;
        let remote = &self.layout.supervisor_binary;
        info!(binary = %binary.display(), remote = %remote, "uploading supervisor");
        self.session
            .upload_file(binary, remote)
            .await
            .map_err(|e| step.fail(&e))?;
        let _ = self
            .session
            .run(&format!("chmod +x {}", quote(remote)))
            .await
            .map_err(|e| step.fail(&e))?;
        Ok(())
    }

    /// Install script for the development tree and venv.
    pub fn install_command(&self) -> String {
        install_script(self.project, &self.layout.dev_project, &self.layout.dev_venv)
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        let output = self.session.exec(&format!("test -f {}", quote(path))).await?;
        Ok(output.success())
    }
}
