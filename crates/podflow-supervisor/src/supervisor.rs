//! The hot-reload loop.
//!
//! One served process at a time. Each qualifying change drains it, reinstalls
//! dependencies when the manifest changed, and relaunches. Changes that pile
//! up while a cycle runs are folded into that cycle instead of triggering
//! another restart right after.

use std::future::Future;
use std::sync::Arc;

use podflow_remote::ChangeSource;
use tracing::{debug, info};

use crate::drain::{DrainPolicy, drain};
use crate::env::{Environment, is_manifest_change};
use crate::errors::{Result, SupervisorError};
use crate::process::{ProcessLauncher, ServedProcess};
use crate::state::SupervisorState;

const HISTORY_LIMIT: usize = 64;

/// Keeps the served process running and restarts it on change.
pub struct Supervisor {
    launcher: Arc<dyn ProcessLauncher>,
    env: Arc<dyn Environment>,
    policy: DrainPolicy,
    process: Option<Box<dyn ServedProcess>>,
    state: SupervisorState,
    history: Vec<SupervisorState>,
}

impl Supervisor {
    /// Create a supervisor in the `STARTING` state.
    pub fn new(launcher: Arc<dyn ProcessLauncher>, env: Arc<dyn Environment>, policy: DrainPolicy) -> Self {
        Self {
            launcher,
            env,
            policy,
            process: None,
            state: SupervisorState::Starting,
            history: vec![SupervisorState::Starting],
        }
    }

    /// Current state.
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Recent states, oldest first.
    pub fn history(&self) -> &[SupervisorState] {
        &self.history
    }

    /// Serve until `shutdown` resolves or a fatal error occurs. The served
    /// process is drained on every exit path.
    pub async fn run<C, S>(&mut self, changes: &mut C, shutdown: S) -> Result<()>
    where
        C: ChangeSource + ?Sized,
        S: Future<Output = ()>,
    {
        self.env.capture_archive();
        let outcome = tokio::select! {
            result = self.serve(changes) => result,
            () = shutdown => {
                info!("shutdown requested");
                Ok(())
            }
        };
        let stopped = self.stop_process().await;
        outcome.and(stopped)
    }

    async fn serve<C>(&mut self, changes: &mut C) -> Result<()>
    where
        C: ChangeSource + ?Sized,
    {
        self.launch().await?;
        self.transition(SupervisorState::Running);

        loop {
            let Some(path) = changes.next_change().await else {
                return Err(SupervisorError::WatchClosed);
            };
            info!(path = %path.display(), "change detected");
            self.transition(SupervisorState::ChangeDetected);

            self.transition(SupervisorState::Draining);
            self.stop_process().await?;

            let pending = changes.take_pending();
            let reinstall =
                is_manifest_change(&path) || pending.iter().any(|p| is_manifest_change(p));
            if reinstall {
                self.transition(SupervisorState::Reinstalling);
                self.env.reinstall().await?;
                self.env.capture_archive();
            }

            self.transition(SupervisorState::Restarting);
            let dropped = changes.take_pending().len() + pending.len();
            if dropped > 0 {
                debug!(dropped, "folded queued changes into this restart");
            }
            self.launch().await?;
            self.transition(SupervisorState::Running);
        }
    }

    async fn launch(&mut self) -> Result<()> {
        let process = self.launcher.launch().await.map_err(SupervisorError::Spawn)?;
        info!(pid = ?process.pid(), "served process started");
        self.process = Some(process);
        Ok(())
    }

    async fn stop_process(&mut self) -> Result<()> {
        if let Some(process) = self.process.as_mut() {
            let outcome = drain(process.as_mut(), &self.policy).await?;
            debug!(?outcome, "served process stopped");
            self.process = None;
        }
        Ok(())
    }

    fn transition(&mut self, next: SupervisorState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {} -> {next}",
            self.state
        );
        info!(from = %self.state, to = %next, "supervisor state");
        self.state = next;
        if self.history.len() == HISTORY_LIMIT {
            let _ = self.history.remove(0);
        }
        self.history.push(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::io;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::{mpsc, oneshot};
    use crate::state::SupervisorState::{ChangeDetected, Draining, Reinstalling, Restarting, Running, Starting};

    #[derive(Default)]
    struct Counters {
        launches: AtomicUsize,
        terminations: AtomicUsize,
        reinstalls: AtomicUsize,
        captures: AtomicUsize,
        fail_launch: AtomicBool,
        fail_reinstall: AtomicBool,
    }

    impl Counters {
        fn get(counter: &AtomicUsize) -> usize {
            counter.load(Ordering::SeqCst)
        }
    }

    struct FakeProcess {
        counters: Arc<Counters>,
        exited: bool,
    }

    #[async_trait]
    impl ServedProcess for FakeProcess {
        fn pid(&self) -> Option<u32> {
            Some(100)
        }

        async fn terminate(&mut self) -> io::Result<()> {
            let _ = self.counters.terminations.fetch_add(1, Ordering::SeqCst);
            self.exited = true;
            Ok(())
        }

        fn kill(&mut self) -> io::Result<()> {
            self.exited = true;
            Ok(())
        }

        fn has_exited(&mut self) -> io::Result<bool> {
            Ok(self.exited)
        }
    }

    struct FakeLauncher(Arc<Counters>);

    #[async_trait]
    impl ProcessLauncher for FakeLauncher {
        async fn launch(&self) -> io::Result<Box<dyn ServedProcess>> {
            if self.0.fail_launch.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::NotFound, "python missing"));
            }
            let _ = self.0.launches.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeProcess {
                counters: self.0.clone(),
                exited: false,
            }))
        }
    }

    struct FakeEnvironment(Arc<Counters>);

    #[async_trait]
    impl Environment for FakeEnvironment {
        async fn reinstall(&self) -> Result<()> {
            let _ = self.0.reinstalls.fetch_add(1, Ordering::SeqCst);
            if self.0.fail_reinstall.load(Ordering::SeqCst) {
                return Err(SupervisorError::InstallFailed { exit_code: 1 });
            }
            Ok(())
        }

        fn capture_archive(&self) {
            let _ = self.0.captures.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        counters: Arc<Counters>,
        changes: mpsc::UnboundedSender<PathBuf>,
        stop: oneshot::Sender<()>,
        handle: tokio::task::JoinHandle<(Supervisor, Result<()>)>,
    }

    impl Harness {
        fn start(counters: Arc<Counters>) -> Self {
            let (changes, mut rx) = mpsc::unbounded_channel();
            let (stop, stop_rx) = oneshot::channel::<()>();
            let mut supervisor = Supervisor::new(
                Arc::new(FakeLauncher(counters.clone())),
                Arc::new(FakeEnvironment(counters.clone())),
                DrainPolicy {
                    polls: 2,
                    interval: Duration::from_millis(10),
                },
            );
            let handle = tokio::spawn(async move {
                let result = supervisor
                    .run(&mut rx, async {
                        let _ = stop_rx.await;
                    })
                    .await;
                (supervisor, result)
            });
            Self {
                counters,
                changes,
                stop,
                handle,
            }
        }

        fn change(&self, path: &str) {
            self.changes.send(PathBuf::from(path)).unwrap();
        }

        async fn settle() {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        async fn shutdown(self) -> (Supervisor, Result<()>, Arc<Counters>) {
            let _ = self.stop.send(());
            let (supervisor, result) = self.handle.await.unwrap();
            (supervisor, result, self.counters)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn code_change_restarts_without_reinstall() {
        let h = Harness::start(Arc::default());
        Harness::settle().await;
        h.change("src/handler.py");
        Harness::settle().await;

        let (supervisor, result, c) = h.shutdown().await;
        result.unwrap();
        assert_eq!(
            supervisor.history(),
            &[Starting, Running, ChangeDetected, Draining, Restarting, Running]
        );
        assert_eq!(Counters::get(&c.launches), 2);
        assert_eq!(Counters::get(&c.reinstalls), 0);
        assert_eq!(Counters::get(&c.captures), 1);
        assert_eq!(Counters::get(&c.terminations), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn manifest_change_reinstalls_and_refreshes_archive() {
        let h = Harness::start(Arc::default());
        Harness::settle().await;
        h.change("builder/requirements.txt");
        Harness::settle().await;

        let (supervisor, result, c) = h.shutdown().await;
        result.unwrap();
        assert_eq!(
            supervisor.history(),
            &[Starting, Running, ChangeDetected, Draining, Reinstalling, Restarting, Running]
        );
        assert_eq!(Counters::get(&c.reinstalls), 1);
        assert_eq!(Counters::get(&c.captures), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_changes_fold_into_one_restart() {
        let h = Harness::start(Arc::default());
        Harness::settle().await;
        h.change("src/handler.py");
        h.change("builder/requirements.txt");
        h.change("src/util.py");
        Harness::settle().await;

        let (supervisor, result, c) = h.shutdown().await;
        result.unwrap();
        assert_eq!(Counters::get(&c.launches), 2);
        assert_eq!(Counters::get(&c.reinstalls), 1);
        assert_eq!(supervisor.state(), Running);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_watcher_is_fatal_and_drains() {
        let h = Harness::start(Arc::default());
        Harness::settle().await;
        let Harness {
            counters,
            changes,
            handle,
            stop: _stop,
        } = h;
        drop(changes);

        let (_, result) = handle.await.unwrap();
        assert_matches!(result, Err(SupervisorError::WatchClosed));
        assert_eq!(Counters::get(&counters.terminations), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reinstall_is_fatal() {
        let counters = Arc::new(Counters::default());
        counters.fail_reinstall.store(true, Ordering::SeqCst);
        let h = Harness::start(counters);
        Harness::settle().await;
        h.change("requirements.txt");

        let Harness {
            counters,
            handle,
            changes: _changes,
            stop: _stop,
        } = h;
        let (supervisor, result) = handle.await.unwrap();
        assert_matches!(result, Err(SupervisorError::InstallFailed { exit_code: 1 }));
        assert_eq!(supervisor.state(), Reinstalling);
        assert_eq!(Counters::get(&counters.launches), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_launch_is_fatal() {
        let counters = Arc::new(Counters::default());
        counters.fail_launch.store(true, Ordering::SeqCst);
        let h = Harness::start(counters);

        let Harness {
            handle,
            changes: _changes,
            stop: _stop,
            ..
        } = h;
        let (supervisor, result) = handle.await.unwrap();
        assert_matches!(result, Err(SupervisorError::Spawn(_)));
        assert_eq!(supervisor.state(), Starting);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drains_running_process() {
        let h = Harness::start(Arc::default());
        Harness::settle().await;
        let (supervisor, result, c) = h.shutdown().await;
        result.unwrap();
        assert_eq!(supervisor.history(), &[Starting, Running]);
        assert_eq!(Counters::get(&c.terminations), 1);
    }
}
