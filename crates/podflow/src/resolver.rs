//! Pod address lookup through the control plane.

use std::sync::Arc;

use async_trait::async_trait;
use podflow_control::ControlPlane;
use podflow_core::Result;
use podflow_remote::PodAddressResolver;

/// Resolves a pod's public ssh address from its runtime port mappings.
pub struct ControlPlaneResolver {
    control: Arc<dyn ControlPlane>,
}

impl ControlPlaneResolver {
    /// Resolve through `control`.
    pub fn new(control: Arc<dyn ControlPlane>) -> Self {
        Self { control }
    }
}

#[async_trait]
impl PodAddressResolver for ControlPlaneResolver {
    async fn resolve(&self, pod_id: &str) -> Result<Option<(String, u16)>> {
        let pods = self.control.list_pods().await?;
        Ok(pods
            .iter()
            .find(|pod| pod.id == pod_id)
            .and_then(podflow_control::Pod::ssh_address))
    }
}
