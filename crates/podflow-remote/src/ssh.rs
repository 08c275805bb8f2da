//! `ssh` + `rsync` implementation of [`RemoteSession`].
//!
//! Commands travel as the remote command line (`bash -c '<command>'`). The
//! channel's stdin stays open for the lifetime of the command, so a remote
//! process reading it sees EOF once the connection drops. Bulk transfers
//! shell out to `rsync` over the same ssh options.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use podflow_core::shell::quote;
use podflow_core::{IgnoreMatcher, PodflowError, Result};
use podflow_settings::UserSettings;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::session::{CommandOutput, RemoteSession};

/// Upper bound on output kept in memory per command; streaming is unaffected.
const CAPTURE_LIMIT: usize = 1 << 20;

/// Time allowed for a single reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Where and as whom to connect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SshTarget {
    /// Public address of the pod.
    pub host: String,
    /// Public port mapped to the pod's ssh service.
    pub port: u16,
    /// Remote user.
    pub user: String,
    /// Identity file, if not the ssh default.
    pub key_path: Option<PathBuf>,
}

impl SshTarget {
    /// `user@host`.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Options shared by `ssh` and `rsync -e`. Pods are ephemeral, so host
    /// keys are never recorded.
    pub fn ssh_options(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "-p",
            &self.port.to_string(),
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "UserKnownHostsFile=/dev/null",
            "-o",
            "LogLevel=ERROR",
            "-o",
            "BatchMode=yes",
            "-o",
            "ConnectTimeout=10",
            "-o",
            "ServerAliveInterval=30",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        if let Some(key) = &self.key_path {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args
    }

    /// The remote-shell string handed to `rsync -e`.
    pub fn rsync_shell(&self) -> String {
        std::iter::once("ssh".to_string())
            .chain(self.ssh_options().iter().map(|a| quote_if_needed(a)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote_if_needed(arg: &str) -> String {
    if arg.chars().any(char::is_whitespace) {
        quote(arg)
    } else {
        arg.to_string()
    }
}

/// Arguments for an `rsync` run mirroring `local_root` onto `remote_root`.
///
/// The remote root is created on demand. `filters` are rsync filter rules,
/// as produced by [`IgnoreMatcher::rsync_filters`].
pub fn rsync_args(
    target: &SshTarget,
    local_root: &Path,
    remote_root: &str,
    delete_extraneous: bool,
    filters: &[String],
) -> Vec<String> {
    let remote_root = remote_root.trim_end_matches('/');
    let mut args = vec![
        "-az".to_string(),
        "--rsync-path".to_string(),
        format!("mkdir -p {} && rsync", quote(remote_root)),
        "-e".to_string(),
        target.rsync_shell(),
    ];
    if delete_extraneous {
        args.push("--delete".to_string());
    }
    args.extend(filters.iter().map(|rule| format!("--filter={rule}")));
    args.push(format!("{}/", local_root.display().to_string().trim_end_matches('/')));
    args.push(format!("{}:{remote_root}/", target.destination()));
    args
}

/// Connection tuning.
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    /// Remote user.
    pub user: String,
    /// Identity file.
    pub key_path: Option<PathBuf>,
    /// Delay between connection attempts.
    pub poll_interval: Duration,
    /// Total budget before giving up.
    pub timeout: Duration,
    /// Echo remote output to the local terminal.
    pub stream_output: bool,
}

impl ConnectOptions {
    /// Options taken from the user settings.
    pub fn from_settings(settings: &UserSettings) -> Self {
        Self {
            user: settings.ssh_user.clone(),
            key_path: settings.ssh_key_path.clone(),
            poll_interval: settings.connect_poll(),
            timeout: settings.connect_timeout(),
            stream_output: true,
        }
    }
}

/// Looks up a pod's public ssh address.
#[async_trait]
pub trait PodAddressResolver: Send + Sync {
    /// `Ok(None)` while the pod has not reported a public ssh port yet.
    async fn resolve(&self, pod_id: &str) -> Result<Option<(String, u16)>>;
}

/// Checks that a target accepts ssh logins.
#[async_trait]
pub trait SshProbe: Send + Sync {
    /// Whether a trivial command succeeds on `target`.
    async fn probe(&self, target: &SshTarget) -> bool;
}

/// Probe that runs `true` over a real ssh connection.
pub struct SshCommandProbe;

#[async_trait]
impl SshProbe for SshCommandProbe {
    async fn probe(&self, target: &SshTarget) -> bool {
        let mut cmd = Command::new("ssh");
        let _ = cmd
            .args(target.ssh_options())
            .arg(target.destination())
            .arg("true")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        match tokio::time::timeout(PROBE_TIMEOUT, cmd.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                warn!(error = %e, "failed to run ssh probe");
                false
            }
            Err(_) => false,
        }
    }
}

/// Session over `ssh`/`rsync` subprocesses.
#[derive(Clone, Debug)]
pub struct SshSession {
    pod_id: String,
    target: SshTarget,
    stream_output: bool,
}

impl SshSession {
    /// Wrap an already reachable target.
    pub fn new(pod_id: impl Into<String>, target: SshTarget) -> Self {
        Self {
            pod_id: pod_id.into(),
            target,
            stream_output: true,
        }
    }

    /// Toggle echoing of remote output to the local terminal.
    #[must_use]
    pub fn with_streaming(mut self, stream_output: bool) -> Self {
        self.stream_output = stream_output;
        self
    }

    /// Connection target.
    pub fn target(&self) -> &SshTarget {
        &self.target
    }

    /// Wait for `pod_id` to accept ssh logins.
    ///
    /// A booting pod first lacks a public ssh port, then refuses logins for a
    /// while. Both are retried every `poll_interval` until `timeout` runs
    /// out, which yields [`PodflowError::ConnectTimeout`].
    pub async fn open(
        pod_id: &str,
        resolver: &dyn PodAddressResolver,
        probe: &dyn SshProbe,
        options: &ConnectOptions,
    ) -> Result<Self> {
        let started = Instant::now();
        loop {
            match resolver.resolve(pod_id).await {
                Ok(Some((host, port))) => {
                    let target = SshTarget {
                        host,
                        port,
                        user: options.user.clone(),
                        key_path: options.key_path.clone(),
                    };
                    if probe.probe(&target).await {
                        info!(pod_id, host = %target.host, port = target.port, "session established");
                        return Ok(Self::new(pod_id, target).with_streaming(options.stream_output));
                    }
                    debug!(pod_id, "ssh not accepting logins yet");
                }
                Ok(None) => debug!(pod_id, "pod has no public ssh port yet"),
                Err(e) => warn!(pod_id, error = %e, "failed to resolve pod address"),
            }

            let waited = started.elapsed();
            if waited + options.poll_interval > options.timeout {
                return Err(PodflowError::ConnectTimeout {
                    pod_id: pod_id.to_string(),
                    waited_secs: waited.as_secs(),
                });
            }
            info!(pod_id, "Waiting for Pod to come online...");
            tokio::time::sleep(options.poll_interval).await;
        }
    }

    async fn rsync(&self, args: Vec<String>, label: &str) -> Result<()> {
        debug!(?args, "running rsync");
        let output = Command::new("rsync")
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(stderr = %stderr.trim(), "{label} failed");
        Err(PodflowError::command_failed(
            output.status.code().unwrap_or(-1),
            label,
        ))
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    fn pod_id(&self) -> &str {
        &self.pod_id
    }

    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let mut cmd = Command::new("ssh");
        let _ = cmd
            .args(self.target.ssh_options())
            .arg(self.target.destination())
            .arg(format!("bash -c {}", quote(command)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group: a terminal Ctrl-C reaches podflow only, and the
        // connection is torn down by dropping the child.
        #[cfg(unix)]
        let _ = cmd.process_group(0);

        debug!(pod_id = %self.pod_id, command = %first_line(command), "remote exec");
        let mut child = cmd.spawn()?;

        // Held until the command exits; dropping it signals EOF remotely.
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let echo = self.stream_output;
        let (stdout, stderr, status) = tokio::join!(
            collect_lines(stdout, echo.then(tokio::io::stdout)),
            collect_lines(stderr, echo.then(tokio::io::stderr)),
            child.wait(),
        );
        drop(stdin);
        let exit_code = status?.code().unwrap_or(-1);
        debug!(pod_id = %self.pod_id, exit_code, "remote exec finished");

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    /// Ignore rules are re-read from `local_root` on every call and handed
    /// to rsync as filter rules, so negation and anchoring behave as in the
    /// change watcher.
    async fn copy_tree(&self, local_root: &Path, remote_root: &str, delete_extraneous: bool) -> Result<()> {
        let filters = IgnoreMatcher::load(local_root)?.rsync_filters();
        let args = rsync_args(
            &self.target,
            local_root,
            remote_root,
            delete_extraneous,
            &filters,
        );
        self.rsync(args, "rsync").await
    }

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let parent = remote_path
            .rsplit_once('/')
            .map_or("/", |(dir, _)| if dir.is_empty() { "/" } else { dir });
        let args = vec![
            "-az".to_string(),
            "--rsync-path".to_string(),
            format!("mkdir -p {} && rsync", quote(parent)),
            "-e".to_string(),
            self.target.rsync_shell(),
            local_path.display().to_string(),
            format!("{}:{remote_path}", self.target.destination()),
        ];
        self.rsync(args, "upload").await
    }
}

fn first_line(command: &str) -> &str {
    command.trim().lines().next().unwrap_or_default()
}

async fn collect_lines<R, W>(reader: Option<R>, mut echo: Option<W>) -> String
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut captured = String::new();
    let Some(reader) = reader else {
        return captured;
    };
    // Split on raw bytes; invalid UTF-8 is replaced, never fatal.
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "remote output stream failed");
                break;
            }
        }
        if buf.last() == Some(&b'\n') {
            let _ = buf.pop();
        }
        let line = String::from_utf8_lossy(&buf);
        if let Some(out) = echo.as_mut() {
            let _ = out.write_all(line.as_bytes()).await;
            let _ = out.write_all(b"\n").await;
            let _ = out.flush().await;
        }
        if captured.len() < CAPTURE_LIMIT {
            captured.push_str(&line);
            captured.push('\n');
        }
    }
    captured
}
