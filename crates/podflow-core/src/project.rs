//! Project descriptor model.
//!
//! A [`Project`] is created once at project initialization and read at the start
//! of every lifecycle command. It is never deleted by podflow; pods and endpoints
//! are discovered by the project identity embedded in their names.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{ALTERNATE_API_PORT, DEFAULT_API_PORT, PROJECT_ID_ENV};
use crate::errors::PodflowError;
use crate::shell::quote;

/// Full project descriptor, as stored in `podflow.toml`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    /// Display name; also the directory name of the code tree on the pod.
    pub name: String,
    /// Identity, resource descriptor, and storage binding.
    pub project: ProjectSection,
    /// Interpreter and dependency settings.
    pub runtime: RuntimeDescriptor,
    /// Serverless endpoint overrides.
    pub endpoint: EndpointPolicy,
}

/// The `[project]` table: identity plus the resource descriptor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSection {
    /// Opaque short unique id, embedded in every resource name.
    pub uuid: String,
    /// Container image for pods and templates.
    pub base_image: String,
    /// Capacity classes in order of preference.
    pub gpu_types: Vec<String>,
    /// Legacy single capacity class, tried after `gpu_types`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu: Option<String>,
    /// GPUs per pod.
    pub gpu_count: u32,
    /// Container disk in GB.
    pub container_disk_size_gb: u32,
    /// Minimum memory in GB.
    pub min_memory_gb: u32,
    /// Minimum vCPU count.
    pub min_vcpu_count: u32,
    /// Where the network volume is mounted inside pods.
    pub volume_mount_path: String,
    /// Exposed ports, e.g. `"8080/http, 22/tcp"`.
    pub ports: String,
    /// Network volume to attach, if not given on the command line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_volume_id: Option<String>,
    /// Extra environment variables for pods and templates.
    pub env_vars: BTreeMap<String, String>,
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            uuid: String::new(),
            base_image: "runpod/base:0.4.4-cuda12.1.0".to_string(),
            gpu_types: Vec::new(),
            gpu: None,
            gpu_count: 1,
            container_disk_size_gb: 10,
            min_memory_gb: 1,
            min_vcpu_count: 1,
            volume_mount_path: "/runpod-volume".to_string(),
            ports: "8080/http, 22/tcp".to_string(),
            network_volume_id: None,
            env_vars: BTreeMap::new(),
        }
    }
}

/// The `[runtime]` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeDescriptor {
    /// Interpreter version, e.g. `"3.10"`.
    pub python_version: String,
    /// Package manager used to build and update the environment.
    pub package_manager: PackageManager,
    /// Dependency manifest, relative to the project root.
    pub requirements_path: String,
    /// Served-process entry point, relative to the project root.
    pub handler_path: String,
}

impl Default for RuntimeDescriptor {
    fn default() -> Self {
        Self {
            python_version: "3.10".to_string(),
            package_manager: PackageManager::Uv,
            requirements_path: "builder/requirements.txt".to_string(),
            handler_path: "src/handler.py".to_string(),
        }
    }
}

/// The `[endpoint]` table: serverless worker policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointPolicy {
    /// Minimum (always-on) workers.
    pub active_workers: u32,
    /// Maximum workers.
    pub max_workers: u32,
    /// Fast-start flag; adds the ` -fb` suffix to the endpoint name.
    pub flashboot: bool,
    /// Idle timeout in seconds.
    pub idle_timeout: u32,
    /// Autoscale trigger type.
    pub scaler_type: String,
    /// Autoscale trigger value.
    pub scaler_value: u32,
    /// GPU pool identifiers for workers.
    pub gpu_ids: String,
}

impl Default for EndpointPolicy {
    fn default() -> Self {
        Self {
            active_workers: 0,
            max_workers: 3,
            flashboot: true,
            idle_timeout: 5,
            scaler_type: "QUEUE_DELAY".to_string(),
            scaler_value: 4,
            gpu_ids: "AMPERE_16".to_string(),
        }
    }
}

/// Package manager used inside the virtual environment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    /// `uv`, the default.
    #[default]
    Uv,
    /// Plain `pip` with the stdlib `venv` module.
    Pip,
}

impl PackageManager {
    /// Command that creates a fresh environment at `venv_path`.
    pub fn create_env_command(self, python_version: &str, venv_path: &str) -> String {
        match self {
            Self::Pip => format!(
                "python{python_version} -m venv --upgrade-deps {}",
                quote(venv_path)
            ),
            Self::Uv => format!(
                "uv venv --python=python{python_version} {}",
                quote(venv_path)
            ),
        }
    }

    /// Command that installs the manifest into the currently active environment.
    pub fn install_command(self, requirements_path: &str) -> String {
        match self {
            Self::Pip => format!(
                "python -m pip install --upgrade pip && python -m pip install --requirement {}",
                quote(requirements_path)
            ),
            Self::Uv => format!("uv pip install --requirement {}", quote(requirements_path)),
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uv => f.write_str("uv"),
            Self::Pip => f.write_str("pip"),
        }
    }
}

impl FromStr for PackageManager {
    type Err = PodflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uv" => Ok(Self::Uv),
            "pip" => Ok(Self::Pip),
            other => Err(PodflowError::config_invalid(format!(
                "unsupported package manager: {other}"
            ))),
        }
    }
}

impl Project {
    /// Project identity.
    pub fn id(&self) -> &str {
        &self.project.uuid
    }

    /// Capacity classes to try, in order. The legacy `gpu` field goes last.
    pub fn capacity_candidates(&self) -> Vec<String> {
        self.project
            .gpu_types
            .iter()
            .chain(self.project.gpu.iter())
            .filter(|c| !c.trim().is_empty())
            .cloned()
            .collect()
    }

    /// Environment variables for pods and templates, including the injected
    /// project identity.
    pub fn environment_variables(&self) -> BTreeMap<String, String> {
        let mut env = self.project.env_vars.clone();
        let _ = env.insert(PROJECT_ID_ENV.to_string(), self.id().to_string());
        env
    }

    /// Ports string with whitespace removed, as the control plane expects it.
    pub fn ports(&self) -> String {
        self.project.ports.replace(' ', "")
    }

    /// Port the served process listens on during development.
    pub fn api_port(&self) -> u16 {
        pick_api_port(&self.project.ports)
    }

    /// Name of the development pod. Embeds the identity for discovery.
    pub fn dev_pod_name(&self) -> String {
        format!("{}-dev ({})", self.name, self.id())
    }

    /// Name of the serverless endpoint.
    pub fn endpoint_name(&self) -> String {
        let suffix = if self.endpoint.flashboot { " -fb" } else { "" };
        format!("{}-endpoint-{}{suffix}", self.name, self.id())
    }

    /// Name of a freshly built template. Templates are immutable, so each
    /// deploy gets a unique name.
    pub fn template_name(&self, timestamp_millis: i64) -> String {
        format!("{}-endpoint-{}-{timestamp_millis}", self.name, self.id())
    }
}

/// Pick the served-process port from the exposed ports string: 8080 when only
/// `8080/http` is exposed, otherwise the default 7270.
pub fn pick_api_port(ports: &str) -> u16 {
    if ports.contains("8080/http") && !ports.contains("7270/http") {
        ALTERNATE_API_PORT
    } else {
        DEFAULT_API_PORT
    }
}
