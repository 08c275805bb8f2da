//! Control-plane resource records and request specs.
//!
//! Requests are flat records of strings, integers, and booleans; they
//! serialize to the camelCase field names the GraphQL API expects.

use std::collections::BTreeMap;

use podflow_core::layout::join;
use podflow_core::{Project, RemoteLayout};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Resources
// ─────────────────────────────────────────────────────────────────────────────

/// A pod as reported by the control plane.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    /// Pod id.
    pub id: String,
    /// Display name; embeds the project identity.
    pub name: String,
    /// Requested status (`RUNNING`, `EXITED`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_status: Option<String>,
    /// Runtime information, absent while the pod is still booting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<PodRuntime>,
}

/// Runtime section of a pod.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodRuntime {
    /// Port mappings exposed by the pod.
    #[serde(default)]
    pub ports: Vec<PortMapping>,
}

/// One exposed port of a running pod.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    /// Address the port is reachable on.
    pub ip: String,
    /// Whether `ip` is publicly routable.
    pub is_ip_public: bool,
    /// Port inside the container.
    pub private_port: u16,
    /// Port on `ip`.
    pub public_port: u16,
    /// `tcp` or `http`.
    #[serde(rename = "type", default)]
    pub port_type: String,
}

impl Pod {
    /// Public address of the pod's ssh service, once the runtime reports it.
    pub fn ssh_address(&self) -> Option<(String, u16)> {
        self.runtime
            .as_ref()?
            .ports
            .iter()
            .find(|p| p.private_port == 22 && p.is_ip_public)
            .map(|p| (p.ip.clone(), p.public_port))
    }
}

/// A serverless endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Endpoint id.
    pub id: String,
    /// Display name; embeds the project identity.
    pub name: String,
    /// Template the endpoint currently runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
}

/// Environment variable entry as the API expects it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodEnv {
    /// Variable name.
    pub key: String,
    /// Variable value.
    pub value: String,
}

/// Convert an env map into the API list form.
pub fn to_api_env(env: &BTreeMap<String, String>) -> Vec<PodEnv> {
    env.iter()
        .map(|(key, value)| PodEnv {
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// Request for `createPod`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePodInput {
    /// Cloud selection (`ALL`, `SECURE`, `COMMUNITY`).
    pub cloud_type: String,
    /// Container disk size.
    pub container_disk_in_gb: u32,
    /// Extra docker arguments.
    pub docker_args: String,
    /// Environment variables.
    pub env: Vec<PodEnv>,
    /// GPUs per pod.
    pub gpu_count: u32,
    /// Capacity class requested.
    pub gpu_type_id: String,
    /// Container image.
    pub image_name: String,
    /// Minimum memory.
    pub min_memory_in_gb: u32,
    /// Minimum vCPUs.
    pub min_vcpu_count: u32,
    /// Pod name.
    pub name: String,
    /// Network volume to attach.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_volume_id: Option<String>,
    /// Ports string.
    pub ports: String,
    /// Request a public IP.
    pub support_public_ip: bool,
    /// Start the ssh service.
    pub start_ssh: bool,
    /// Pod-local volume size (the network volume is used instead).
    pub volume_in_gb: u32,
    /// Mount path for the network volume.
    pub volume_mount_path: String,
}

impl CreatePodInput {
    /// Build the development pod request for `project` on one capacity class.
    pub fn for_project(project: &Project, capacity_class: &str, network_volume_id: Option<&str>) -> Self {
        Self {
            cloud_type: "ALL".to_string(),
            container_disk_in_gb: project.project.container_disk_size_gb,
            docker_args: String::new(),
            env: to_api_env(&project.environment_variables()),
            gpu_count: project.project.gpu_count,
            gpu_type_id: capacity_class.to_string(),
            image_name: project.project.base_image.clone(),
            min_memory_in_gb: project.project.min_memory_gb,
            min_vcpu_count: project.project.min_vcpu_count,
            name: project.dev_pod_name(),
            network_volume_id: network_volume_id.map(str::to_string),
            ports: project.ports(),
            support_public_ip: true,
            start_ssh: true,
            volume_in_gb: 0,
            volume_mount_path: project.project.volume_mount_path.clone(),
        }
    }
}

/// Request for `createTemplate`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplateInput {
    /// Template name (unique per deploy).
    pub name: String,
    /// Container image.
    pub image_name: String,
    /// Environment variables.
    pub env: Vec<PodEnv>,
    /// Container start command.
    pub docker_start_cmd: String,
    /// Serverless template flag.
    pub is_serverless: bool,
    /// Container disk size.
    pub container_disk_in_gb: u32,
    /// Mount path for the network volume.
    pub volume_mount_path: String,
    /// Start the ssh service in workers.
    pub start_ssh: bool,
    /// Publish the template.
    pub is_public: bool,
    /// Template readme.
    pub readme: String,
}

impl CreateTemplateInput {
    /// Build the serverless template for `project`. Workers activate the prod
    /// environment on the shared volume and run the handler unbuffered.
    pub fn for_project(project: &Project, layout: &RemoteLayout, timestamp_millis: i64) -> Self {
        Self {
            name: project.template_name(timestamp_millis),
            image_name: project.project.base_image.clone(),
            env: to_api_env(&project.environment_variables()),
            docker_start_cmd: template_start_command(project, layout),
            is_serverless: true,
            container_disk_in_gb: project.project.container_disk_size_gb,
            volume_mount_path: project.project.volume_mount_path.clone(),
            start_ssh: true,
            is_public: false,
            readme: String::new(),
        }
    }
}

/// Start command baked into deploy templates.
pub fn template_start_command(project: &Project, layout: &RemoteLayout) -> String {
    let handler = join(&layout.prod_project, &project.runtime.handler_path);
    format!(
        "bash -c \". {}/bin/activate && python -u {handler}\"",
        layout.prod_venv
    )
}

/// Request for `createEndpoint`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEndpointInput {
    /// Endpoint name.
    pub name: String,
    /// Template to run.
    pub template_id: String,
    /// Network volume to attach to workers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_volume_id: Option<String>,
    /// GPU pools for workers.
    pub gpu_ids: String,
    /// Idle timeout in seconds.
    pub idle_timeout: u32,
    /// Autoscale trigger type.
    pub scaler_type: String,
    /// Autoscale trigger value.
    pub scaler_value: u32,
    /// Minimum workers.
    pub workers_min: u32,
    /// Maximum workers.
    pub workers_max: u32,
}

impl CreateEndpointInput {
    /// Build the endpoint request for `project` from its endpoint policy.
    pub fn for_project(project: &Project, template_id: &str, network_volume_id: Option<&str>) -> Self {
        let policy = &project.endpoint;
        Self {
            name: project.endpoint_name(),
            template_id: template_id.to_string(),
            network_volume_id: network_volume_id.map(str::to_string),
            gpu_ids: policy.gpu_ids.clone(),
            idle_timeout: policy.idle_timeout,
            scaler_type: policy.scaler_type.clone(),
            scaler_value: policy.scaler_value,
            workers_min: policy.active_workers,
            workers_max: policy.max_workers,
        }
    }
}
