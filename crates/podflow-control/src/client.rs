//! The control-plane RPC seam.
//!
//! Everything that provisions or inspects remote resources goes through
//! [`ControlPlane`]. Production uses [`crate::GraphqlControlPlane`]; tests
//! substitute fakes.

use async_trait::async_trait;
use podflow_core::Result;

use crate::types::{CreateEndpointInput, CreatePodInput, CreateTemplateInput, Endpoint, Pod};

/// Remote resource operations used by the reconciler and the session
/// address resolver. Failures surface as [`podflow_core::PodflowError::ControlPlane`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// All pods owned by the account.
    async fn list_pods(&self) -> Result<Vec<Pod>>;

    /// Request a new pod. Fails when the capacity class has no availability.
    async fn create_pod(&self, input: &CreatePodInput) -> Result<Pod>;

    /// All serverless endpoints owned by the account.
    async fn list_endpoints(&self) -> Result<Vec<Endpoint>>;

    /// Create a serverless endpoint.
    async fn create_endpoint(&self, input: &CreateEndpointInput) -> Result<Endpoint>;

    /// Point an existing endpoint at a different template.
    async fn update_endpoint_template(&self, endpoint_id: &str, template_id: &str) -> Result<()>;

    /// Create a template, returning its id.
    async fn create_template(&self, input: &CreateTemplateInput) -> Result<String>;
}
