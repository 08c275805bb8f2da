//! Settings error types.

use std::path::PathBuf;

use podflow_core::PodflowError;
use thiserror::Error;

/// Errors that can occur when loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The project descriptor does not exist.
    #[error("project file not found: {}", .0.display())]
    MissingProjectFile(PathBuf),
    /// A layered source could not be read or parsed.
    #[error("failed to load settings: {0}")]
    Figment(Box<figment::Error>),
    /// A required value is missing or out of range.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
    /// No API key in the user settings or the environment.
    #[error("no API key configured (set PODFLOW_API_KEY or api_key in {})", .0.display())]
    MissingApiKey(PathBuf),
}

impl From<figment::Error> for SettingsError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<SettingsError> for PodflowError {
    fn from(err: SettingsError) -> Self {
        PodflowError::config_invalid(err.to_string())
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
