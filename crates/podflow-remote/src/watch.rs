//! Filesystem change notifications filtered through the ignore rules.
//!
//! A `notify` watcher runs on its own thread and forwards qualifying paths
//! into a tokio channel. Only create, modify, and remove events count; access
//! events and paths matched by the ignore rules never reach the consumer.
//! Editing the ignore file itself reloads the rules for later events.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher, recommended_watcher};
use podflow_core::IgnoreMatcher;
use podflow_core::constants::IGNORE_FILE;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A stream of changed paths, relative to the watched root.
#[async_trait]
pub trait ChangeSource: Send {
    /// Wait for the next change. `None` once the source is closed.
    async fn next_change(&mut self) -> Option<PathBuf>;

    /// Take every change already queued without waiting.
    fn take_pending(&mut self) -> Vec<PathBuf>;
}

#[async_trait]
impl ChangeSource for mpsc::UnboundedReceiver<PathBuf> {
    async fn next_change(&mut self) -> Option<PathBuf> {
        self.recv().await
    }

    fn take_pending(&mut self) -> Vec<PathBuf> {
        let mut pending = Vec::new();
        while let Ok(path) = self.try_recv() {
            pending.push(path);
        }
        pending
    }
}

/// Recursive watcher over one directory tree.
pub struct TreeWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<PathBuf>,
}

impl TreeWatcher {
    /// Watch `root` recursively, skipping paths `ignore` matches. The rules
    /// are re-read from `root` whenever its ignore file changes.
    pub fn new(root: &Path, ignore: IgnoreMatcher) -> notify::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut filter = WatchFilter::new(root, ignore);
        let mut watcher = recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for path in filter.paths(&event) {
                    let _ = tx.send(path);
                }
            }
            Err(err) => warn!(?err, "file watcher error"),
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        debug!(root = %root.display(), "watching for changes");
        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }
}

#[async_trait]
impl ChangeSource for TreeWatcher {
    async fn next_change(&mut self) -> Option<PathBuf> {
        self.rx.recv().await
    }

    fn take_pending(&mut self) -> Vec<PathBuf> {
        self.rx.take_pending()
    }
}

/// Ignore rules bound to one root.
struct WatchFilter {
    root: PathBuf,
    ignore: IgnoreMatcher,
}

impl WatchFilter {
    fn new(root: &Path, ignore: IgnoreMatcher) -> Self {
        Self {
            root: root.to_path_buf(),
            ignore,
        }
    }

    fn paths(&mut self, event: &Event) -> Vec<PathBuf> {
        let touches_rules = is_change(&event.kind)
            && event
                .paths
                .iter()
                .any(|p| p.strip_prefix(&self.root).is_ok_and(|rel| rel == Path::new(IGNORE_FILE)));
        if touches_rules {
            self.reload();
        }
        qualifying_paths(&self.root, &self.ignore, event)
    }

    fn reload(&mut self) {
        match IgnoreMatcher::load(&self.root) {
            Ok(ignore) => {
                debug!(rules = ignore.len(), "ignore rules reloaded");
                self.ignore = ignore;
            }
            Err(e) => warn!(error = %e, "could not reload ignore rules; keeping previous"),
        }
    }
}

/// Whether an event kind represents a content change.
pub fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Paths of `event` relative to `root` that are changes and not ignored.
pub fn qualifying_paths(root: &Path, ignore: &IgnoreMatcher, event: &Event) -> Vec<PathBuf> {
    if !is_change(&event.kind) {
        return Vec::new();
    }
    event
        .paths
        .iter()
        .filter_map(|path| {
            let rel = path.strip_prefix(root).ok()?;
            if rel.as_os_str().is_empty() || ignore.is_ignored(rel, path.is_dir()) {
                return None;
            }
            Some(rel.to_path_buf())
        })
        .collect()
}
