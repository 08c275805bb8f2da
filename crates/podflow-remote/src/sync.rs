//! Continuous local-to-remote mirroring.
//!
//! Every local change triggers an additive [`RemoteSession::copy_tree`] of the
//! whole project. Bursts are coalesced: after the first change the loop waits
//! for a quiet period before copying, so a save-all produces one transfer.
//! A tree that never goes quiet is still copied at least every `max_wait`.
//! The copy itself is idempotent, so a missed coalescing window only costs
//! an extra transfer. A failed copy is logged and the loop keeps going.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::session::RemoteSession;
use crate::watch::ChangeSource;

/// Longest a burst may postpone its copy.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(5);

/// Background mirror of one local tree onto one remote directory.
pub struct FileSyncLoop {
    session: Arc<dyn RemoteSession>,
    local_root: PathBuf,
    remote_root: String,
    debounce: Duration,
    max_wait: Duration,
}

impl FileSyncLoop {
    /// Create a loop copying `local_root` to `remote_root` through `session`.
    pub fn new(
        session: Arc<dyn RemoteSession>,
        local_root: impl Into<PathBuf>,
        remote_root: impl Into<String>,
        debounce: Duration,
    ) -> Self {
        Self {
            session,
            local_root: local_root.into(),
            remote_root: remote_root.into(),
            debounce,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    /// Cap on how long continuous changes may delay a copy. Never shorter
    /// than the debounce.
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Run the loop on its own task. The task ends only when `changes`
    /// closes; otherwise it lives until process exit.
    pub fn spawn<C>(self, changes: C) -> JoinHandle<()>
    where
        C: ChangeSource + 'static,
    {
        tokio::spawn(self.run(changes))
    }

    /// Consume changes until the source closes.
    pub async fn run<C: ChangeSource>(self, mut changes: C) {
        info!(
            local = %self.local_root.display(),
            remote = %self.remote_root,
            "file sync started"
        );
        while let Some(first) = changes.next_change().await {
            debug!(path = %first.display(), "local change");
            let mut burst = 1_usize;
            let mut closed = false;
            let deadline = Instant::now() + self.max_wait.max(self.debounce);
            loop {
                let quiet = (Instant::now() + self.debounce).min(deadline);
                match tokio::time::timeout_at(quiet, changes.next_change()).await {
                    Ok(Some(_)) => burst += 1,
                    Ok(None) => {
                        closed = true;
                        break;
                    }
                    Err(_) => break,
                }
            }
            let _ = self.sync_once(burst).await;
            if closed {
                break;
            }
        }
        debug!("change source closed; file sync stopped");
    }

    /// Copy the tree once. Returns whether the copy succeeded.
    pub async fn sync_once(&self, changes: usize) -> bool {
        match self
            .session
            .copy_tree(&self.local_root, &self.remote_root, false)
            .await
        {
            Ok(()) => {
                debug!(changes, "synced local changes");
                true
            }
            Err(e) => {
                warn!(error = %e, "sync failed; retrying on next change");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{CopyCall, RecordingSession};
    use tokio::sync::mpsc;

    const DEBOUNCE: Duration = Duration::from_millis(500);

    fn start(session: &Arc<RecordingSession>) -> mpsc::UnboundedSender<PathBuf> {
        let (tx, rx) = mpsc::unbounded_channel();
        let sync = FileSyncLoop::new(session.clone(), "/work/hello", "/vol/id/dev/hello", DEBOUNCE);
        let _ = sync.spawn(rx);
        tx
    }

    #[tokio::test(start_paused = true)]
    async fn burst_is_coalesced_into_one_additive_copy() {
        let session = Arc::new(RecordingSession::new());
        let tx = start(&session);

        for name in ["a.py", "b.py", "c.py"] {
            tx.send(PathBuf::from(name)).unwrap();
        }
        tokio::time::sleep(DEBOUNCE * 3).await;

        assert_eq!(
            session.copies(),
            vec![CopyCall {
                local: PathBuf::from("/work/hello"),
                remote: "/vol/id/dev/hello".into(),
                delete_extraneous: false,
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn separate_bursts_copy_separately() {
        let session = Arc::new(RecordingSession::new());
        let tx = start(&session);

        tx.send(PathBuf::from("a.py")).unwrap();
        tokio::time::sleep(DEBOUNCE * 3).await;
        tx.send(PathBuf::from("b.py")).unwrap();
        tokio::time::sleep(DEBOUNCE * 3).await;

        assert_eq!(session.copies().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_copy_does_not_stop_loop() {
        let session = Arc::new(RecordingSession::new());
        session.fail_next_copies(1);
        let tx = start(&session);

        tx.send(PathBuf::from("a.py")).unwrap();
        tokio::time::sleep(DEBOUNCE * 3).await;
        tx.send(PathBuf::from("a.py")).unwrap();
        tokio::time::sleep(DEBOUNCE * 3).await;

        assert_eq!(session.copies().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_source_flushes_and_stops() {
        let session = Arc::new(RecordingSession::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let sync = FileSyncLoop::new(session.clone(), "/w", "/r", DEBOUNCE);
        let handle = sync.spawn(rx);

        tx.send(PathBuf::from("a.py")).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(session.copies().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_changes_still_copy_periodically() {
        let session = Arc::new(RecordingSession::new());
        let tx = start(&session);

        // A file rewritten faster than the debounce never lets the tree go quiet.
        for _ in 0..300 {
            tx.send(PathBuf::from("train.log")).unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        let copies = session.copies().len();
        assert!(copies >= 10, "only {copies} copies in 60s of edits");
    }

    #[tokio::test(start_paused = true)]
    async fn max_wait_never_undercuts_debounce() {
        let session = Arc::new(RecordingSession::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = FileSyncLoop::new(session.clone(), "/w", "/r", DEBOUNCE)
            .with_max_wait(Duration::ZERO)
            .spawn(rx);

        tx.send(PathBuf::from("a.py")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(PathBuf::from("b.py")).unwrap();
        tokio::time::sleep(DEBOUNCE * 3).await;

        assert_eq!(session.copies().len(), 1);
    }

    #[tokio::test]
    async fn zero_debounce_still_syncs() {
        let session = Arc::new(RecordingSession::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let sync = FileSyncLoop::new(session.clone(), "/w", "/r", Duration::ZERO);
        let handle = sync.spawn(rx);

        tx.send(PathBuf::from("a.py")).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert!(!session.copies().is_empty());
    }
}
