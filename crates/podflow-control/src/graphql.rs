//! GraphQL implementation of [`ControlPlane`].

use std::time::Duration;

use async_trait::async_trait;
use podflow_core::constants::VERSION;
use podflow_core::{PodflowError, Result};
use podflow_settings::ApiConfig;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::client::ControlPlane;
use crate::types::{CreateEndpointInput, CreatePodInput, CreateTemplateInput, Endpoint, Pod};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const LIST_PODS: &str = "query Pods { myself { pods { id name desiredStatus runtime { ports { ip isIpPublic privatePort publicPort type } } } } }";
const CREATE_POD: &str = "mutation CreatePod($input: PodFindAndDeployOnDemandInput) { podFindAndDeployOnDemand(input: $input) { id name desiredStatus } }";
const LIST_ENDPOINTS: &str = "query Endpoints { myself { endpoints { id name templateId } } }";
const CREATE_ENDPOINT: &str = "mutation SaveEndpoint($input: EndpointInput!) { saveEndpoint(input: $input) { id name templateId } }";
const UPDATE_ENDPOINT_TEMPLATE: &str = "mutation UpdateEndpointTemplate($input: UpdateEndpointTemplateInput!) { updateEndpointTemplate(input: $input) { id templateId } }";
const CREATE_TEMPLATE: &str =
    "mutation SaveTemplate($input: SaveTemplateInput) { saveTemplate(input: $input) { id } }";

#[derive(Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize)]
struct Myself<T> {
    myself: T,
}

#[derive(Deserialize)]
struct PodList {
    #[serde(default)]
    pods: Vec<Pod>,
}

#[derive(Deserialize)]
struct EndpointList {
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePodData {
    pod_find_and_deploy_on_demand: Option<Pod>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveEndpointData {
    save_endpoint: Endpoint,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveTemplateData {
    save_template: IdOnly,
}

#[derive(Deserialize)]
struct IdOnly {
    id: String,
}

/// Control-plane client speaking GraphQL over HTTPS. The API key travels as
/// the `api_key` query parameter.
pub struct GraphqlControlPlane {
    client: reqwest::Client,
    config: ApiConfig,
}

impl GraphqlControlPlane {
    /// Build a client for `config`.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(format!("podflow/{VERSION}"))
            .build()
            .map_err(|e| PodflowError::control_plane("client", e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: Value,
    ) -> Result<T> {
        debug!(operation, "control plane request");
        let body = json!({ "query": query, "variables": variables });
        let response = self
            .client
            .post(&self.config.api_url)
            .query(&[("api_key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| PodflowError::control_plane(operation, redacted(e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PodflowError::control_plane(
                operation,
                format!("HTTP {status}: {error_text}"),
            ));
        }

        let parsed: GraphqlResponse<T> = response
            .json()
            .await
            .map_err(|e| {
                PodflowError::control_plane(operation, format!("bad response: {}", redacted(e)))
            })?;

        if !parsed.errors.is_empty() {
            let messages: Vec<&str> = parsed.errors.iter().map(|e| e.message.as_str()).collect();
            return Err(PodflowError::control_plane(operation, messages.join("; ")));
        }
        parsed
            .data
            .ok_or_else(|| PodflowError::control_plane(operation, "response carried no data"))
    }
}

#[async_trait]
impl ControlPlane for GraphqlControlPlane {
    #[instrument(skip(self))]
    async fn list_pods(&self) -> Result<Vec<Pod>> {
        let data: Myself<PodList> = self.execute("listPods", LIST_PODS, json!({})).await?;
        Ok(data.myself.pods)
    }

    #[instrument(skip(self, input), fields(gpu = %input.gpu_type_id))]
    async fn create_pod(&self, input: &CreatePodInput) -> Result<Pod> {
        let data: CreatePodData = self
            .execute("createPod", CREATE_POD, json!({ "input": input }))
            .await?;
        data.pod_find_and_deploy_on_demand.ok_or_else(|| {
            PodflowError::control_plane("createPod", "no pod returned for requested capacity")
        })
    }

    #[instrument(skip(self))]
    async fn list_endpoints(&self) -> Result<Vec<Endpoint>> {
        let data: Myself<EndpointList> = self
            .execute("listEndpoints", LIST_ENDPOINTS, json!({}))
            .await?;
        Ok(data.myself.endpoints)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    async fn create_endpoint(&self, input: &CreateEndpointInput) -> Result<Endpoint> {
        let data: SaveEndpointData = self
            .execute("createEndpoint", CREATE_ENDPOINT, json!({ "input": input }))
            .await?;
        Ok(data.save_endpoint)
    }

    #[instrument(skip(self))]
    async fn update_endpoint_template(&self, endpoint_id: &str, template_id: &str) -> Result<()> {
        let variables = json!({
            "input": { "endpointId": endpoint_id, "templateId": template_id }
        });
        let _: Value = self
            .execute("updateEndpointTemplate", UPDATE_ENDPOINT_TEMPLATE, variables)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    async fn create_template(&self, input: &CreateTemplateInput) -> Result<String> {
        let data: SaveTemplateData = self
            .execute("createTemplate", CREATE_TEMPLATE, json!({ "input": input }))
            .await?;
        Ok(data.save_template.id)
    }
}

/// Transport errors print their URL, which carries the API key.
fn redacted(error: reqwest::Error) -> String {
    error.without_url().to_string()
}
