use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use podflow_core::{PodflowError, Result};

use crate::session::{CommandOutput, RemoteSession};

/// One recorded `copy_tree` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CopyCall {
    pub local: PathBuf,
    pub remote: String,
    pub delete_extraneous: bool,
}

struct Failure {
    needle: String,
    exit_code: i32,
    remaining: Option<usize>,
}

/// Session fake that records every call. Commands containing a registered
/// substring exit with the registered code; everything else succeeds.
#[derive(Default)]
pub struct RecordingSession {
    commands: Mutex<Vec<String>>,
    failures: Mutex<Vec<Failure>>,
    copies: Mutex<Vec<CopyCall>>,
    uploads: Mutex<Vec<(PathBuf, String)>>,
    failing_copies: Mutex<usize>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_when(&self, needle: &str, exit_code: i32) {
        self.failures.lock().push(Failure {
            needle: needle.to_string(),
            exit_code,
            remaining: None,
        });
    }

    pub fn fail_once(&self, needle: &str, exit_code: i32) {
        self.failures.lock().push(Failure {
            needle: needle.to_string(),
            exit_code,
            remaining: Some(1),
        });
    }

    pub fn fail_next_copies(&self, count: usize) {
        *self.failing_copies.lock() = count;
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn copies(&self) -> Vec<CopyCall> {
        self.copies.lock().clone()
    }

    pub fn uploads(&self) -> Vec<(PathBuf, String)> {
        self.uploads.lock().clone()
    }
}

#[async_trait]
impl RemoteSession for RecordingSession {
    fn pod_id(&self) -> &str {
        "pod-test"
    }

    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        self.commands.lock().push(command.to_string());
        let mut failures = self.failures.lock();
        let exit_code = failures
            .iter_mut()
            .find(|f| command.contains(f.needle.as_str()) && f.remaining != Some(0))
            .map_or(0, |f| {
                if let Some(n) = f.remaining.as_mut() {
                    *n -= 1;
                }
                f.exit_code
            });
        Ok(CommandOutput {
            exit_code,
            ..CommandOutput::default()
        })
    }

    async fn copy_tree(&self, local_root: &Path, remote_root: &str, delete_extraneous: bool) -> Result<()> {
        self.copies.lock().push(CopyCall {
            local: local_root.to_path_buf(),
            remote: remote_root.to_string(),
            delete_extraneous,
        });
        let mut failing = self.failing_copies.lock();
        if *failing > 0 {
            *failing -= 1;
            return Err(PodflowError::command_failed(23, "rsync"));
        }
        Ok(())
    }

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        self.uploads
            .lock()
            .push((local_path.to_path_buf(), remote_path.to_string()));
        Ok(())
    }
}
