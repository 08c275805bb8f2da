//! User-level settings (credentials, connection tuning).
//!
//! Project-level settings are the [`podflow_core::Project`] descriptor; this
//! module covers what belongs to the developer's machine rather than the
//! project.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default control-plane API URL.
pub const DEFAULT_API_URL: &str = "https://api.runpod.io/graphql";

/// Settings read from `~/.podflow/config.toml` and `PODFLOW_*` variables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    /// Control-plane API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Control-plane API URL.
    pub api_url: String,
    /// Private key used for ssh and rsync. Falls back to the ssh defaults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_key_path: Option<PathBuf>,
    /// Remote user.
    pub ssh_user: String,
    /// Total time to wait for a booting pod to accept connections.
    pub connect_timeout_secs: u64,
    /// Interval between connection attempts.
    pub connect_poll_secs: u64,
    /// Quiet period the sync loop waits for before copying.
    pub sync_debounce_ms: u64,
    /// Pod-compatible build of this binary to upload as the supervisor.
    /// Defaults to the running executable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supervisor_binary: Option<PathBuf>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: DEFAULT_API_URL.to_string(),
            ssh_key_path: None,
            ssh_user: "root".to_string(),
            connect_timeout_secs: 300,
            connect_poll_secs: 5,
            sync_debounce_ms: 500,
            supervisor_binary: None,
        }
    }
}

impl UserSettings {
    /// Connection budget as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Connection poll interval as a [`Duration`].
    pub fn connect_poll(&self) -> Duration {
        Duration::from_secs(self.connect_poll_secs.max(1))
    }

    /// Sync debounce window as a [`Duration`].
    pub fn sync_debounce(&self) -> Duration {
        Duration::from_millis(self.sync_debounce_ms)
    }
}

/// Credentials and endpoint for the control-plane client.
///
/// Passed explicitly to the client constructor; there is no process-wide
/// API state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiConfig {
    /// API key.
    pub api_key: String,
    /// GraphQL endpoint URL.
    pub api_url: String,
}
