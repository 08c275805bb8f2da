//! Resource reconciliation: map a project identity onto control-plane pods
//! and endpoints.
//!
//! Discovery is by name substring: pod and endpoint names embed the project
//! identity, so a second session reuses whatever the first one created. Pod
//! creation walks the project's capacity candidates in order and stops at the
//! first success; each candidate is tried exactly once per call.

use std::sync::Arc;

use podflow_core::{PodflowError, Project, RemoteLayout, Result};
use tracing::{info, instrument, warn};

use crate::client::ControlPlane;
use crate::types::{CreateEndpointInput, CreatePodInput, CreateTemplateInput, Endpoint, Pod};

/// Outcome of a deploy reconciliation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeployOutcome {
    /// Template created for this deploy.
    pub template_id: String,
    /// Endpoint now serving the template.
    pub endpoint_id: String,
    /// Whether the endpoint was created rather than repointed.
    pub created: bool,
}

/// Reconciles desired project resources against the control plane.
#[derive(Clone)]
pub struct Reconciler {
    control: Arc<dyn ControlPlane>,
}

impl Reconciler {
    /// Create a reconciler over `control`.
    pub fn new(control: Arc<dyn ControlPlane>) -> Self {
        Self { control }
    }

    /// The underlying control plane.
    pub fn control(&self) -> &Arc<dyn ControlPlane> {
        &self.control
    }

    /// First pod whose name contains the project identity.
    pub async fn find_pod(&self, project_id: &str) -> Result<Option<Pod>> {
        let pods = self.control.list_pods().await?;
        Ok(pods.into_iter().find(|p| p.name.contains(project_id)))
    }

    /// Return the project's pod id, creating a pod if none exists.
    #[instrument(skip_all, fields(project_id = %project.id()))]
    pub async fn ensure_pod(&self, project: &Project, network_volume_id: Option<&str>) -> Result<String> {
        if let Some(pod) = self.find_pod(project.id()).await? {
            info!(pod_id = %pod.id, "Pod already exists for the project");
            return Ok(pod.id);
        }
        let pod = self.launch_pod(project, network_volume_id).await?;
        Ok(pod.id)
    }

    /// Create a pod, trying each capacity candidate once in order.
    pub async fn launch_pod(&self, project: &Project, network_volume_id: Option<&str>) -> Result<Pod> {
        let candidates = project.capacity_candidates();
        for candidate in &candidates {
            info!(candidate = %candidate, "Trying to get a Pod with {candidate}...");
            let input = CreatePodInput::for_project(project, candidate, network_volume_id);
            match self.control.create_pod(&input).await {
                Ok(pod) => {
                    info!(candidate = %candidate, pod_id = %pod.id, "Success!");
                    return Ok(pod);
                }
                Err(e) => {
                    info!(candidate = %candidate, error = %e, "Unavailable.");
                }
            }
        }
        Err(PodflowError::ResourceUnavailable { candidates })
    }

    /// First endpoint whose name contains the project identity.
    pub async fn find_endpoint(&self, project_id: &str) -> Result<Option<Endpoint>> {
        let endpoints = self.control.list_endpoints().await?;
        Ok(endpoints.into_iter().find(|e| e.name.contains(project_id)))
    }

    /// Point the project's endpoint at `template_id`, creating the endpoint
    /// when none exists. Returns the endpoint id and whether it was created.
    #[instrument(skip_all, fields(project_id = %project.id(), template_id = %template_id))]
    pub async fn ensure_endpoint(
        &self,
        project: &Project,
        template_id: &str,
        network_volume_id: Option<&str>,
    ) -> Result<(String, bool)> {
        let existing = self
            .find_endpoint(project.id())
            .await
            .map_err(|e| deploy_failed("listing endpoints", &e))?;

        if let Some(endpoint) = existing {
            self.control
                .update_endpoint_template(&endpoint.id, template_id)
                .await
                .map_err(|e| deploy_failed("updating endpoint template", &e))?;
            info!(endpoint_id = %endpoint.id, "Endpoint updated to the new template");
            return Ok((endpoint.id, false));
        }

        let input = CreateEndpointInput::for_project(project, template_id, network_volume_id);
        let endpoint = self
            .control
            .create_endpoint(&input)
            .await
            .map_err(|e| deploy_failed("creating endpoint", &e))?;
        info!(endpoint_id = %endpoint.id, "Endpoint created");
        Ok((endpoint.id, true))
    }

    /// Create a fresh template for the prod tree. Templates are immutable, so
    /// every deploy gets a new one.
    pub async fn create_template(
        &self,
        project: &Project,
        layout: &RemoteLayout,
        timestamp_millis: i64,
    ) -> Result<String> {
        let input = CreateTemplateInput::for_project(project, layout, timestamp_millis);
        let id = self
            .control
            .create_template(&input)
            .await
            .map_err(|e| deploy_failed("creating template", &e))?;
        info!(template_id = %id, name = %input.name, "Template created");
        Ok(id)
    }

    /// Create a template and reconcile the endpoint onto it.
    ///
    /// A template created before an endpoint failure is left in place.
    pub async fn deploy(
        &self,
        project: &Project,
        layout: &RemoteLayout,
        network_volume_id: Option<&str>,
    ) -> Result<DeployOutcome> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let template_id = self.create_template(project, layout, timestamp).await?;
        match self
            .ensure_endpoint(project, &template_id, network_volume_id)
            .await
        {
            Ok((endpoint_id, created)) => Ok(DeployOutcome {
                template_id,
                endpoint_id,
                created,
            }),
            Err(e) => {
                warn!(template_id = %template_id, "endpoint reconciliation failed; template left orphaned");
                Err(e)
            }
        }
    }
}

fn deploy_failed(stage: &str, cause: &PodflowError) -> PodflowError {
    PodflowError::DeployFailed {
        stage: stage.to_string(),
        reason: cause.to_string(),
    }
}
