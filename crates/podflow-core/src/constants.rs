//! Package-level constants.

/// Current version of podflow (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "podflow";

/// File name of the project descriptor, looked up in the project root.
pub const PROJECT_FILE: &str = "podflow.toml";

/// File name of the project-local ignore-pattern file (gitignore syntax).
pub const IGNORE_FILE: &str = ".podflowignore";

/// Environment variable injected into every pod with the project identity.
pub const PROJECT_ID_ENV: &str = "PODFLOW_PROJECT_ID";

/// Marker variable set by base images that already run an outer supervisor.
pub const BASE_RELEASE_ENV: &str = "BASE_RELEASE_VERSION";

/// Variable the control plane sets to the pod id inside every pod.
pub const POD_ID_ENV: &str = "RUNPOD_POD_ID";

/// Port the served process uses by default.
pub const DEFAULT_API_PORT: u16 = 7270;

/// Alternate port used when the ports string only exposes 8080.
pub const ALTERNATE_API_PORT: u16 = 8080;

/// Port the served process binds when an outer supervisor owns the default one.
pub const BASE_RELEASE_API_PORT: u16 = 7271;
