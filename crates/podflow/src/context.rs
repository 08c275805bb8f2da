//! What every lifecycle command loads first, and how it reaches the pod.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use podflow_control::{ControlPlane, GraphqlControlPlane, Reconciler};
use podflow_core::{Project, RemoteLayout};
use podflow_remote::{ConnectOptions, SshCommandProbe, SshSession};
use podflow_settings::{UserSettings, api_config, load_project, load_user_settings};
use tracing::info;

use crate::resolver::ControlPlaneResolver;

/// Project, settings, and control-plane access for one command.
pub struct ProjectContext {
    /// Local project root.
    pub root: PathBuf,
    /// Parsed project descriptor.
    pub project: Project,
    /// Paths on the pod.
    pub layout: RemoteLayout,
    /// User settings.
    pub settings: UserSettings,
    /// Network volume to attach, if any.
    pub network_volume_id: Option<String>,
    control: Arc<dyn ControlPlane>,
}

impl ProjectContext {
    /// Load the descriptor under `project_dir` and the user settings.
    pub fn load(project_dir: &Path, network_volume_id: Option<String>) -> Result<Self> {
        let root = project_dir
            .canonicalize()
            .with_context(|| format!("project directory {} not found", project_dir.display()))?;
        let project = load_project(&root).context("loading project descriptor")?;
        let settings = load_user_settings().context("loading user settings")?;
        let api = api_config(&settings).context("loading API credentials")?;
        let control: Arc<dyn ControlPlane> =
            Arc::new(GraphqlControlPlane::new(api).context("creating control-plane client")?);
        Ok(Self::new(root, project, settings, network_volume_id, control))
    }

    /// Assemble a context from parts already loaded.
    pub fn new(
        root: PathBuf,
        project: Project,
        settings: UserSettings,
        network_volume_id: Option<String>,
        control: Arc<dyn ControlPlane>,
    ) -> Self {
        let network_volume_id = network_volume_id
            .or_else(|| project.project.network_volume_id.clone())
            .filter(|id| !id.trim().is_empty());
        Self {
            layout: RemoteLayout::new(&project),
            root,
            project,
            settings,
            network_volume_id,
            control,
        }
    }

    /// Reconciler over this context's control plane.
    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.control.clone())
    }

    /// Find or launch the project pod and open a session to it.
    pub async fn connect(&self) -> Result<SshSession> {
        let pod_id = self
            .reconciler()
            .ensure_pod(&self.project, self.network_volume_id.as_deref())
            .await
            .context("reconciling pod")?;
        info!(pod_id = %pod_id, "using pod");

        let resolver = ControlPlaneResolver::new(self.control.clone());
        let options = ConnectOptions::from_settings(&self.settings);
        SshSession::open(&pod_id, &resolver, &SshCommandProbe, &options)
            .await
            .context("connecting to pod")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::StaticPods;
    use podflow_core::ProjectSection;

    fn context(flag: Option<&str>, descriptor: Option<&str>) -> ProjectContext {
        let project = Project {
            name: "hello".into(),
            project: ProjectSection {
                uuid: "abcd1234".into(),
                network_volume_id: descriptor.map(ToString::to_string),
                ..ProjectSection::default()
            },
            ..Project::default()
        };
        ProjectContext::new(
            PathBuf::from("/work/hello"),
            project,
            UserSettings::default(),
            flag.map(ToString::to_string),
            Arc::new(StaticPods(Vec::new())),
        )
    }

    #[test]
    fn flag_overrides_descriptor_volume() {
        let ctx = context(Some("vol-flag"), Some("vol-file"));
        assert_eq!(ctx.network_volume_id.as_deref(), Some("vol-flag"));
    }

    #[test]
    fn descriptor_volume_is_the_fallback() {
        assert_eq!(context(None, Some("vol-file")).network_volume_id.as_deref(), Some("vol-file"));
        assert_eq!(context(None, Some("  ")).network_volume_id, None);
        assert_eq!(context(None, None).network_volume_id, None);
    }

    #[test]
    fn layout_follows_project() {
        let ctx = context(None, None);
        assert_eq!(ctx.layout.dev_project, "/runpod-volume/abcd1234/dev/hello");
    }

    #[test]
    fn missing_project_dir_is_reported() {
        let err = ProjectContext::load(Path::new("/nonexistent/podflow-project"), None)
            .err()
            .unwrap();
        assert!(err.to_string().contains("/nonexistent/podflow-project"));
    }
}
