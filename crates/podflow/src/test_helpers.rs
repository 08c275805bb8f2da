use async_trait::async_trait;
use podflow_control::{
    ControlPlane, CreateEndpointInput, CreatePodInput, CreateTemplateInput, Endpoint, Pod,
};
use podflow_core::{PodflowError, Result};

/// Control plane with a fixed pod list. Mutating calls fail.
pub struct StaticPods(pub Vec<Pod>);

#[async_trait]
impl ControlPlane for StaticPods {
    async fn list_pods(&self) -> Result<Vec<Pod>> {
        Ok(self.0.clone())
    }

    async fn create_pod(&self, _input: &CreatePodInput) -> Result<Pod> {
        Err(PodflowError::control_plane("create_pod", "unused"))
    }

    async fn list_endpoints(&self) -> Result<Vec<Endpoint>> {
        Ok(Vec::new())
    }

    async fn create_endpoint(&self, _input: &CreateEndpointInput) -> Result<Endpoint> {
        Err(PodflowError::control_plane("create_endpoint", "unused"))
    }

    async fn update_endpoint_template(&self, _endpoint_id: &str, _template_id: &str) -> Result<()> {
        Ok(())
    }

    async fn create_template(&self, _input: &CreateTemplateInput) -> Result<String> {
        Err(PodflowError::control_plane("create_template", "unused"))
    }
}
