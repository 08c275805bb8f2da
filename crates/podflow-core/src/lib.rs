//! # podflow-core
//!
//! Foundation types shared by every podflow crate.
//!
//! - **Errors**: [`PodflowError`] taxonomy (`ResourceUnavailable`, `ConnectTimeout`,
//!   `CommandFailed`, `ProvisionFailed`, `DeployFailed`, `ConfigInvalid`)
//! - **Project model**: [`Project`] with runtime, resource, and endpoint descriptors
//! - **Remote layout**: [`RemoteLayout`] derives every path on the pod from a project
//! - **Ignore matching**: [`IgnoreMatcher`] with gitignore-compatible semantics
//! - **Archive commands**: capture/restore of the cached environment archive
//! - **Shell quoting**: [`shell::quote`] for commands sent to the pod
//! - **Logging**: [`logging::init_subscriber`]

#![deny(unsafe_code)]

pub mod archive;
pub mod constants;
pub mod errors;
pub mod ignore;
pub mod layout;
pub mod logging;
pub mod project;
pub mod shell;

pub use errors::{PodflowError, Result};
pub use ignore::IgnoreMatcher;
pub use layout::RemoteLayout;
pub use project::{
    EndpointPolicy, PackageManager, Project, ProjectSection, RuntimeDescriptor,
};
