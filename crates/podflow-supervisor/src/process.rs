//! The served process and how it is launched.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use podflow_core::constants::{BASE_RELEASE_API_PORT, DEFAULT_API_PORT};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Handle to one running instance of the served process.
#[async_trait]
pub trait ServedProcess: Send {
    /// Process id, if still known.
    fn pid(&self) -> Option<u32>;

    /// Ask the process to exit (SIGTERM).
    async fn terminate(&mut self) -> io::Result<()>;

    /// Force the process to exit (SIGKILL).
    fn kill(&mut self) -> io::Result<()>;

    /// Whether the process has exited. Never blocks.
    fn has_exited(&mut self) -> io::Result<bool>;
}

/// Starts fresh instances of the served process.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Launch one instance.
    async fn launch(&self) -> io::Result<Box<dyn ServedProcess>>;
}

/// Ports for the served process: `(bind, advertised)`.
///
/// When an outer supervisor in the base image already owns the default port
/// (`base_release` set and non-empty), the process binds the alternate port
/// while the advertised port stays the default.
pub fn select_port(port: u16, base_release: Option<&str>) -> (u16, u16) {
    match base_release {
        Some(v) if !v.trim().is_empty() => (BASE_RELEASE_API_PORT, DEFAULT_API_PORT),
        _ => (port, port),
    }
}

/// Public proxy URL for a port on a pod.
pub fn connect_url(pod_id: &str, port: u16) -> String {
    format!("https://{pod_id}-{port}.proxy.runpod.net")
}

/// How to run the handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Working directory.
    pub project_dir: PathBuf,
    /// Virtual environment root.
    pub venv: PathBuf,
    /// Handler script.
    pub handler: PathBuf,
    /// Port to bind.
    pub port: u16,
}

impl LaunchSpec {
    /// Interpreter inside the venv.
    pub fn python(&self) -> PathBuf {
        self.venv.join("bin").join("python")
    }

    /// Interpreter arguments: unbuffered handler serving its local API.
    pub fn args(&self) -> Vec<OsString> {
        vec![
            "-u".into(),
            self.handler.clone().into_os_string(),
            "--rp_serve_api".into(),
            "--rp_api_host=0.0.0.0".into(),
            format!("--rp_api_port={}", self.port).into(),
            "--rp_api_concurrency=1".into(),
        ]
    }

    /// `PATH` with the venv's `bin` first.
    pub fn path_env(&self, current: Option<OsString>) -> io::Result<OsString> {
        let bin = self.venv.join("bin");
        let rest = current.iter().flat_map(std::env::split_paths);
        std::env::join_paths(std::iter::once(bin).chain(rest))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }
}

/// Launches the handler as a child process.
pub struct ChildLauncher {
    spec: LaunchSpec,
}

impl ChildLauncher {
    /// Create a launcher for `spec`.
    pub fn new(spec: LaunchSpec) -> Self {
        Self { spec }
    }

    /// Launch parameters.
    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }
}

#[async_trait]
impl ProcessLauncher for ChildLauncher {
    async fn launch(&self) -> io::Result<Box<dyn ServedProcess>> {
        free_port(self.spec.port).await;

        let path = self.spec.path_env(std::env::var_os("PATH"))?;
        let mut cmd = Command::new(self.spec.python());
        let _ = cmd
            .args(self.spec.args())
            .current_dir(&self.spec.project_dir)
            .env("VIRTUAL_ENV", &self.spec.venv)
            .env("PATH", path)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        let child = cmd.spawn()?;
        debug!(pid = ?child.id(), port = self.spec.port, "served process spawned");
        Ok(Box::new(ChildProcess { child }))
    }
}

/// Force-kill whatever still listens on `port`. Best effort.
pub async fn free_port(port: u16) {
    let script = format!("lsof -ti:{port} | xargs --no-run-if-empty kill -9 2>/dev/null || true");
    let result = Command::new("sh")
        .arg("-c")
        .arg(&script)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = result {
        warn!(port, error = %e, "could not free port");
    }
}

/// A served process backed by [`tokio::process::Child`]. Dropping it kills
/// the process.
pub struct ChildProcess {
    child: Child,
}

impl ChildProcess {
    /// Wrap an already spawned child.
    pub fn new(child: Child) -> Self {
        Self { child }
    }
}

#[async_trait]
impl ServedProcess for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn terminate(&mut self) -> io::Result<()> {
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let status = Command::new("kill")
            .args(["-TERM", &pid.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        if !status.success() {
            debug!(pid, "SIGTERM not delivered; process likely gone");
        }
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    fn has_exited(&mut self) -> io::Result<bool> {
        Ok(self.child.try_wait()?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> LaunchSpec {
        LaunchSpec {
            project_dir: PathBuf::from("/vol/id/dev/hello"),
            venv: PathBuf::from("/id/venv"),
            handler: PathBuf::from("/vol/id/dev/hello/src/handler.py"),
            port: 8080,
        }
    }

    #[test]
    fn port_without_base_release() {
        assert_eq!(select_port(8080, None), (8080, 8080));
        assert_eq!(select_port(7270, Some("")), (7270, 7270));
    }

    #[test]
    fn port_with_base_release() {
        assert_eq!(select_port(8080, Some("1.2.0")), (7271, 7270));
        assert_eq!(select_port(7270, Some("1.2.0")), (7271, 7270));
    }

    #[test]
    fn proxy_url() {
        assert_eq!(connect_url("abc123", 7270), "https://abc123-7270.proxy.runpod.net");
    }

    #[test]
    fn handler_arguments() {
        let args: Vec<String> = spec()
            .args()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-u",
                "/vol/id/dev/hello/src/handler.py",
                "--rp_serve_api",
                "--rp_api_host=0.0.0.0",
                "--rp_api_port=8080",
                "--rp_api_concurrency=1",
            ]
        );
        assert_eq!(spec().python(), PathBuf::from("/id/venv/bin/python"));
    }

    #[test]
    fn venv_bin_comes_first_on_path() {
        let path = spec().path_env(Some("/usr/bin:/bin".into())).unwrap();
        let parts: Vec<PathBuf> = std::env::split_paths(&path).collect();
        assert_eq!(parts[0], PathBuf::from("/id/venv/bin"));
        assert_eq!(parts[1], PathBuf::from("/usr/bin"));
    }

    #[tokio::test]
    async fn child_process_terminates_on_sigterm() {
        let child = Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let mut process = ChildProcess::new(child);
        assert!(!process.has_exited().unwrap());
        process.terminate().await.unwrap();
        let mut exited = false;
        for _ in 0..50 {
            if process.has_exited().unwrap() {
                exited = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        assert!(exited);
    }
}
