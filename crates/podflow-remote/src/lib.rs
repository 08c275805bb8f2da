//! # podflow-remote
//!
//! Everything that talks to a pod once it exists.
//!
//! - [`RemoteSession`]: command execution and bulk transfer against one pod,
//!   with [`SshSession`] as the `ssh`/`rsync` implementation
//! - [`Provisioner`]: tools, virtual environment, dependencies, supervisor upload
//! - [`FileSyncLoop`]: debounced local-to-remote mirroring on file changes
//! - [`TreeWatcher`]: ignore-aware filesystem notifications, shared with the
//!   supervisor that runs on the pod

#![deny(unsafe_code)]

pub mod provision;
pub mod session;
pub mod ssh;
pub mod sync;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use provision::{EnvironmentOrigin, ProvisionStep, Provisioner};
pub use session::{CommandOutput, RemoteSession};
pub use ssh::{ConnectOptions, PodAddressResolver, SshCommandProbe, SshProbe, SshSession, SshTarget};
pub use sync::FileSyncLoop;
pub use watch::{ChangeSource, TreeWatcher};
