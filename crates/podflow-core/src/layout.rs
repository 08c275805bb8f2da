//! Remote filesystem layout.
//!
//! Everything podflow writes on the pod hangs off the project directory on the
//! shared volume:
//!
//! ```text
//! <volume_mount>/<project_id>/
//!     dev/<project_name>/...      development code tree (synced continuously)
//!     prod/<project_name>/...     code tree captured by `deploy`
//!     prod/venv/                  environment used by serverless workers
//!     dev-venv.tar.zst            cached development environment
//!     bin/podflow                 supervisor binary
//! ```
//!
//! The development environment itself lives on the container disk at
//! `/<project_id>/venv`, outside the volume, and is restored from the archive
//! when a fresh pod comes up.

use serde::{Deserialize, Serialize};

use crate::project::Project;
use crate::shell::quote;

/// File name of the cached environment archive.
pub const VENV_ARCHIVE_NAME: &str = "dev-venv.tar.zst";

/// Every path on the pod derived from one project. Paths are POSIX strings
/// regardless of the local platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLayout {
    /// `<volume_mount>/<project_id>`.
    pub project_root: String,
    /// `<project_root>/dev`.
    pub dev_root: String,
    /// `<project_root>/prod`.
    pub prod_root: String,
    /// `<dev_root>/<project_name>`.
    pub dev_project: String,
    /// `<prod_root>/<project_name>`.
    pub prod_project: String,
    /// `/<project_id>/venv`.
    pub dev_venv: String,
    /// `<prod_root>/venv`.
    pub prod_venv: String,
    /// `<project_root>/dev-venv.tar.zst`.
    pub venv_archive: String,
    /// `<project_root>/bin/podflow`.
    pub supervisor_binary: String,
}

impl RemoteLayout {
    /// Derive the layout for `project`.
    pub fn new(project: &Project) -> Self {
        let project_root = join(&project.project.volume_mount_path, project.id());
        let dev_root = join(&project_root, "dev");
        let prod_root = join(&project_root, "prod");
        Self {
            dev_project: join(&dev_root, &project.name),
            prod_project: join(&prod_root, &project.name),
            dev_venv: join(&format!("/{}", project.id()), "venv"),
            prod_venv: join(&prod_root, "venv"),
            venv_archive: join(&project_root, VENV_ARCHIVE_NAME),
            supervisor_binary: join(&join(&project_root, "bin"), "podflow"),
            project_root,
            dev_root,
            prod_root,
        }
    }

    /// Activation marker of the development environment.
    pub fn dev_activation_marker(&self) -> String {
        activation_marker(&self.dev_venv)
    }
}

/// Activation marker inside an environment directory.
pub fn activation_marker(venv: &str) -> String {
    join(&join(venv, "bin"), "activate")
}

/// `cd <project_dir> && . <venv>/bin/activate && <install manifest>`.
///
/// The manifest path is resolved against `project_dir`.
pub fn install_script(project: &Project, project_dir: &str, venv: &str) -> String {
    let runtime = &project.runtime;
    format!(
        "cd {} && . {} && {}",
        quote(project_dir),
        quote(&activation_marker(venv)),
        runtime
            .package_manager
            .install_command(&join(project_dir, &runtime.requirements_path)),
    )
}

/// Join two POSIX path segments with exactly one separator.
pub fn join(base: &str, segment: &str) -> String {
    let base = base.trim_end_matches('/');
    let segment = segment.trim_start_matches('/');
    if base.is_empty() {
        format!("/{segment}")
    } else {
        format!("{base}/{segment}")
    }
}
