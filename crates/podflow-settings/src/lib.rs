//! # podflow-settings
//!
//! Configuration loading with layered sources.
//!
//! Two documents are loaded, both through `figment`:
//! - **Project descriptor**: `podflow.toml` in the project root, read at the start
//!   of every lifecycle command and validated before anything is applied.
//! - **User settings**: `~/.podflow/config.toml` with `PODFLOW_*` environment
//!   overrides, holding credentials and connection tuning.
//!
//! # Usage
//!
//! ```no_run
//! use podflow_settings::{api_config, load_project, load_user_settings};
//!
//! let project = load_project(std::path::Path::new(".")).unwrap();
//! let user = load_user_settings().unwrap();
//! let api = api_config(&user).unwrap();
//! println!("{} -> {}", project.name, api.api_url);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    api_config, load_project, load_user_settings, load_user_settings_from_path, settings_path,
    validate_project,
};
pub use types::{ApiConfig, DEFAULT_API_URL, UserSettings};
