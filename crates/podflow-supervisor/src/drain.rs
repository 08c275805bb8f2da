//! Graceful-then-forced termination of the served process.
//!
//! SIGTERM first, then up to `polls` checks spaced by `interval`. If the
//! process is still alive, SIGKILL and the same budget again. A process that
//! survives both is a fatal error.

use std::time::Duration;

use tracing::{info, warn};

use crate::errors::{Result, SupervisorError};
use crate::process::ServedProcess;

/// Poll budget for each drain phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrainPolicy {
    /// Liveness checks per phase.
    pub polls: u32,
    /// Pause between checks.
    pub interval: Duration,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            polls: 5,
            interval: Duration::from_secs(1),
        }
    }
}

impl DrainPolicy {
    /// Upper bound on the time a drain can take.
    pub fn worst_case(&self) -> Duration {
        self.interval * self.polls * 2
    }
}

/// How a drain ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The process was already gone.
    AlreadyExited,
    /// It exited after SIGTERM.
    Graceful,
    /// It needed SIGKILL.
    Forced,
}

/// Stop `process`, escalating to SIGKILL when SIGTERM is not enough.
pub async fn drain(process: &mut dyn ServedProcess, policy: &DrainPolicy) -> Result<DrainOutcome> {
    let pid = process.pid().unwrap_or_default();
    if process.has_exited()? {
        return Ok(DrainOutcome::AlreadyExited);
    }

    info!(pid, "sending SIGTERM");
    process.terminate().await?;
    if wait_for_exit(process, policy).await? {
        return Ok(DrainOutcome::Graceful);
    }

    warn!(pid, "process ignored SIGTERM; sending SIGKILL");
    process.kill()?;
    if wait_for_exit(process, policy).await? {
        return Ok(DrainOutcome::Forced);
    }

    Err(SupervisorError::DrainFailed { pid })
}

async fn wait_for_exit(process: &mut dyn ServedProcess, policy: &DrainPolicy) -> Result<bool> {
    for _ in 0..policy.polls {
        if process.has_exited()? {
            return Ok(true);
        }
        tokio::time::sleep(policy.interval).await;
    }
    Ok(process.has_exited()?)
}
