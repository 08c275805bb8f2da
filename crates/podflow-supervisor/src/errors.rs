//! Supervisor error types.

use podflow_core::PodflowError;
use thiserror::Error;

/// Fatal supervisor conditions. Each one ends the supervise loop with a
/// non-zero exit, which the orchestrator sees as a failed remote command.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The served process survived both the graceful and the forced budget.
    #[error("failed to kill process with PID {pid} after SIGKILL attempt")]
    DrainFailed {
        /// Process id of the survivor.
        pid: u32,
    },

    /// Reinstalling dependencies after a manifest change failed.
    #[error("dependency reinstall exited with code {exit_code}")]
    InstallFailed {
        /// Exit code of the install command.
        exit_code: i32,
    },

    /// The served process could not be started.
    #[error("failed to start served process: {0}")]
    Spawn(#[source] std::io::Error),

    /// The change watcher could not be set up.
    #[error("failed to watch project directory: {0}")]
    Watch(String),

    /// The change watcher stopped delivering events.
    #[error("file change watcher closed unexpectedly")]
    WatchClosed,

    /// Any other local I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InstallFailed { exit_code } if *exit_code > 0 => *exit_code,
            _ => 1,
        }
    }
}

impl From<SupervisorError> for PodflowError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::Io(e) => PodflowError::Io(e),
            other => PodflowError::command_failed(other.exit_code(), &other.to_string()),
        }
    }
}

/// Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;
