//! Error taxonomy shared across podflow.
//!
//! Capacity-candidate failures are recovered locally by the reconciler; every
//! other variant propagates to the orchestrator and ends the current lifecycle
//! command. [`PodflowError::stage`] names the lifecycle stage for the
//! user-visible message.

use thiserror::Error;

/// Top-level error type for podflow operations.
#[derive(Debug, Error)]
pub enum PodflowError {
    /// No capacity-class candidate produced a pod.
    #[error("none of the capacity classes were available (tried: {})", candidates.join(", "))]
    ResourceUnavailable {
        /// Candidates attempted, in order.
        candidates: Vec<String>,
    },

    /// The pod's remote-access service never became reachable.
    #[error("pod {pod_id} was not reachable after {waited_secs}s")]
    ConnectTimeout {
        /// The pod that was being connected to.
        pod_id: String,
        /// Seconds spent waiting before giving up.
        waited_secs: u64,
    },

    /// A remote command exited with a non-zero status.
    #[error("remote command `{command}` exited with code {exit_code}")]
    CommandFailed {
        /// Exit code reported by the remote side (-1 when killed by a signal).
        exit_code: i32,
        /// First line of the command, for context.
        command: String,
    },

    /// An environment setup step failed.
    #[error("environment provisioning failed at step `{step}`: {reason}")]
    ProvisionFailed {
        /// The failing step.
        step: String,
        /// Underlying cause.
        reason: String,
    },

    /// Template or endpoint reconciliation failed.
    #[error("deploy failed while {stage}: {reason}")]
    DeployFailed {
        /// What the deploy was doing.
        stage: String,
        /// Underlying cause.
        reason: String,
    },

    /// The project descriptor is missing or has invalid fields.
    #[error("invalid project configuration: {message}")]
    ConfigInvalid {
        /// Description of the problem.
        message: String,
    },

    /// Opaque failure from the control-plane RPC surface.
    #[error("control plane {operation} failed: {message}")]
    ControlPlane {
        /// RPC operation name.
        operation: String,
        /// Error text returned by the transport or the API.
        message: String,
    },

    /// Local I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PodflowError {
    /// Build a [`PodflowError::CommandFailed`], keeping only the first line of
    /// the command so multi-line scripts don't flood the message.
    pub fn command_failed(exit_code: i32, command: &str) -> Self {
        let first = command.trim().lines().next().unwrap_or_default();
        Self::CommandFailed {
            exit_code,
            command: first.to_string(),
        }
    }

    /// Build a [`PodflowError::ControlPlane`] error.
    pub fn control_plane(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ControlPlane {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Build a [`PodflowError::ConfigInvalid`] error.
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
        }
    }

    /// Lifecycle stage this error belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::ResourceUnavailable { .. } | Self::ControlPlane { .. } => "pod reconciliation",
            Self::ConnectTimeout { .. } => "session connect",
            Self::CommandFailed { .. } | Self::Io(_) => "remote command",
            Self::ProvisionFailed { .. } => "environment provisioning",
            Self::DeployFailed { .. } => "deploy",
            Self::ConfigInvalid { .. } => "configuration",
        }
    }
}

/// Result type for podflow operations.
pub type Result<T> = std::result::Result<T, PodflowError>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn resource_unavailable_lists_candidates() {
        let err = PodflowError::ResourceUnavailable {
            candidates: vec!["A100".into(), "A6000".into()],
        };
        assert_eq!(
            err.to_string(),
            "none of the capacity classes were available (tried: A100, A6000)"
        );
    }

    #[test]
    fn command_failed_keeps_first_line() {
        let err = PodflowError::command_failed(2, "\n  set -e\n  echo hi\n");
        assert_matches!(err, PodflowError::CommandFailed { exit_code: 2, ref command } if command == "set -e");
    }

    #[test]
    fn connect_timeout_display() {
        let err = PodflowError::ConnectTimeout {
            pod_id: "pod-1".into(),
            waited_secs: 300,
        };
        assert_eq!(err.to_string(), "pod pod-1 was not reachable after 300s");
    }

    #[test]
    fn stages_are_named() {
        assert_eq!(PodflowError::config_invalid("x").stage(), "configuration");
        assert_eq!(
            PodflowError::control_plane("listPods", "boom").stage(),
            "pod reconciliation"
        );
    }

    #[test]
    fn io_error_from_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PodflowError = io_err.into();
        assert_matches!(err, PodflowError::Io(_));
        assert!(err.to_string().contains("gone"));
    }
}
