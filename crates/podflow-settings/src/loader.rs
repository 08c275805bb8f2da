//! Settings loading with figment.
//!
//! Project descriptor flow:
//! 1. Start with compiled [`Project::default()`]
//! 2. Merge `<root>/podflow.toml` (must exist)
//! 3. Validate required fields; the descriptor is applied whole or not at all
//!
//! User settings flow:
//! 1. Start with compiled [`UserSettings::default()`]
//! 2. Merge `~/.podflow/config.toml` if present
//! 3. Merge `PODFLOW_*` environment variables (highest priority)

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use podflow_core::Project;
use podflow_core::constants::PROJECT_FILE;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{ApiConfig, UserSettings};

/// Prefix for environment overrides of user settings.
pub const ENV_PREFIX: &str = "PODFLOW_";

/// Resolve the path to the user settings file (`~/.podflow/config.toml`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".podflow").join("config.toml")
}

/// Load and validate the project descriptor from `<root>/podflow.toml`.
pub fn load_project(root: &Path) -> Result<Project> {
    let path = root.join(PROJECT_FILE);
    if !path.is_file() {
        return Err(SettingsError::MissingProjectFile(path));
    }
    debug!(?path, "loading project descriptor");

    let project: Project = Figment::from(Serialized::defaults(Project::default()))
        .merge(Toml::file(&path))
        .extract()?;
    validate_project(&project)?;
    Ok(project)
}

/// Check the fields every lifecycle command relies on.
pub fn validate_project(project: &Project) -> Result<()> {
    let invalid = |msg: &str| Err(SettingsError::InvalidValue(msg.to_string()));

    if project.name.trim().is_empty() {
        return invalid("project name must not be empty");
    }
    if project.name.contains('/') {
        return invalid("project name must not contain '/'");
    }
    if project.id().trim().is_empty() {
        return invalid("project.uuid must not be empty");
    }
    if project.id().chars().any(char::is_whitespace) {
        return invalid("project.uuid must not contain whitespace");
    }
    if !project.project.volume_mount_path.starts_with('/') {
        return invalid("project.volume_mount_path must be absolute");
    }
    if project.runtime.python_version.trim().is_empty() {
        return invalid("runtime.python_version must not be empty");
    }
    if project.runtime.handler_path.trim().is_empty() {
        return invalid("runtime.handler_path must not be empty");
    }
    if project.runtime.requirements_path.trim().is_empty() {
        return invalid("runtime.requirements_path must not be empty");
    }
    if project.endpoint.max_workers < project.endpoint.active_workers {
        return invalid("endpoint.max_workers must be >= endpoint.active_workers");
    }
    Ok(())
}

/// Load user settings from the default path with env var overrides.
pub fn load_user_settings() -> Result<UserSettings> {
    load_user_settings_from_path(&settings_path())
}

/// Load user settings from a specific path with env var overrides.
///
/// A missing file contributes nothing; a malformed one is an error.
pub fn load_user_settings_from_path(path: &Path) -> Result<UserSettings> {
    debug!(?path, "loading user settings");
    let settings = Figment::from(Serialized::defaults(UserSettings::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX))
        .extract()?;
    Ok(settings)
}

/// Build the control-plane client configuration.
pub fn api_config(settings: &UserSettings) -> Result<ApiConfig> {
    let api_key = settings
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| SettingsError::MissingApiKey(settings_path()))?;
    Ok(ApiConfig {
        api_key,
        api_url: settings.api_url.clone(),
    })
}
