//! # podflow-supervisor
//!
//! Runs on the development pod and keeps the handler's local API server up
//! while code changes underneath it.
//!
//! - [`Supervisor`]: the restart state machine ([`SupervisorState`])
//! - [`drain`]: SIGTERM, then SIGKILL, each with a bounded wait
//! - [`Environment`]: dependency reinstall and archive refresh
//! - [`supervise`]: wiring for the `podflow supervise` subcommand

#![deny(unsafe_code)]

pub mod drain;
pub mod env;
pub mod errors;
pub mod process;
pub mod run;
pub mod state;
pub mod supervisor;

pub use drain::{DrainOutcome, DrainPolicy};
pub use env::{Environment, VenvEnvironment, is_manifest_change};
pub use errors::{Result, SupervisorError};
pub use process::{ChildLauncher, ChildProcess, LaunchSpec, ProcessLauncher, ServedProcess, connect_url, select_port};
pub use run::{SuperviseConfig, supervise};
pub use state::SupervisorState;
pub use supervisor::Supervisor;
