//! The remote session seam.
//!
//! A session runs shell commands on one pod and mirrors local trees onto it.
//! It does not serialize calls: the background sync loop and foreground
//! commands share one session and may interleave.

use std::path::Path;

use async_trait::async_trait;
use podflow_core::{PodflowError, Result};

/// Captured result of one remote command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Everything the command wrote to stdout.
    pub stdout: String,
    /// Everything the command wrote to stderr.
    pub stderr: String,
    /// Exit code (-1 when the remote side reported none).
    pub exit_code: i32,
}

impl CommandOutput {
    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Command execution and bulk transfer against one pod.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Pod this session is attached to.
    fn pod_id(&self) -> &str;

    /// Execute `command` and report its exit code without judging it. Output
    /// is streamed to the caller's terminal as it arrives.
    async fn exec(&self, command: &str) -> Result<CommandOutput>;

    /// Copy `local_root` onto `remote_root` with a delta-copy strategy.
    ///
    /// With `delete_extraneous`, remote files absent locally are removed; sync
    /// loops pass `false` and reserve deletion for explicit resets.
    async fn copy_tree(&self, local_root: &Path, remote_root: &str, delete_extraneous: bool)
    -> Result<()>;

    /// Copy one local file to `remote_path`, creating parent directories.
    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<()>;

    /// Execute `command`; a non-zero exit becomes [`PodflowError::CommandFailed`].
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        let output = self.exec(command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(PodflowError::command_failed(output.exit_code, command))
        }
    }

    /// Execute commands strictly in order, stopping at the first failure.
    async fn run_all(&self, commands: &[String]) -> Result<()> {
        for command in commands {
            let _ = self.run(command).await?;
        }
        Ok(())
    }
}
