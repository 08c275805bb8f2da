//! Supervisor states and the transitions between them.
//!
//! ```text
//! STARTING -> RUNNING -> CHANGE_DETECTED -> DRAINING -> [REINSTALLING] -> RESTARTING -> RUNNING
//! ```
//!
//! `RUNNING` is the steady state; there is no terminal state.

use std::fmt;

/// Where the supervisor is in its restart cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SupervisorState {
    /// Environment activated, first launch pending.
    Starting,
    /// Served process up, waiting for changes.
    Running,
    /// A qualifying change arrived.
    ChangeDetected,
    /// Terminating the served process.
    Draining,
    /// Reinstalling dependencies after a manifest change.
    Reinstalling,
    /// Relaunching the served process.
    Restarting,
}

impl SupervisorState {
    /// Whether `next` may follow `self`.
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Starting | Self::Restarting, Self::Running)
                | (Self::Running, Self::ChangeDetected)
                | (Self::ChangeDetected, Self::Draining)
                | (Self::Draining, Self::Reinstalling | Self::Restarting)
                | (Self::Reinstalling, Self::Restarting)
        )
    }

    /// Upper-case name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::ChangeDetected => "CHANGE_DETECTED",
            Self::Draining => "DRAINING",
            Self::Reinstalling => "REINSTALLING",
            Self::Restarting => "RESTARTING",
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::SupervisorState::*;

    #[test]
    fn restart_cycle_is_allowed() {
        let cycle = [Starting, Running, ChangeDetected, Draining, Reinstalling, Restarting, Running];
        for pair in cycle.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(Draining.can_advance_to(Restarting));
    }

    #[test]
    fn shortcuts_are_rejected() {
        assert!(!Running.can_advance_to(Draining));
        assert!(!ChangeDetected.can_advance_to(Restarting));
        assert!(!Starting.can_advance_to(ChangeDetected));
        assert!(!Reinstalling.can_advance_to(Running));
    }

    #[test]
    fn display_uses_upper_case() {
        assert_eq!(ChangeDetected.to_string(), "CHANGE_DETECTED");
    }
}
