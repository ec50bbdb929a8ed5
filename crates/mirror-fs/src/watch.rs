//! A local directory as a remote event source.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │               Blocking Thread (spawn_blocking)               │
//! │  ┌────────────────────┐    ┌──────────────────────────────┐  │
//! │  │ RecommendedWatcher │ -> │ Callback (translate, publish)│  │
//! │  │ (notify)           │    └──────────────┬───────────────┘  │
//! │  └────────────────────┘                   │                  │
//! └───────────────────────────────────────────│──────────────────┘
//!                          blocking_publish   │
//!                                             ▼
//!                              EventSink -> Dispatcher
//! ```
//!
//! No debouncer sits in front of the watcher: the pipeline debounces renames
//! and deletes itself, and every create or change must reach it. What the loop
//! does do is pair rename halves. inotify reports one move as `From`, `To`
//! and `Both` with a shared tracker, followed by a trackerless `From` for the
//! moved directory's own watch. Only one [`RemoteEvent::Renamed`] may come out
//! of that, or the pipeline would delete the old placeholder tree before
//! moving it.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use mirror_pipeline::{EventSink, PipelineError, RemoteEvent, RemoteEventSource};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::FsError;
use crate::root::MirrorRoot;

/// How long the first half of a rename waits for its partner.
const RENAME_PAIR_WINDOW: Duration = Duration::from_millis(250);

/// Longest wait between shutdown checks in the watcher loop.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Publishes changes under a local directory as remote events.
#[derive(Debug, Clone)]
pub struct LocalEventSource {
    root: MirrorRoot,
}

impl LocalEventSource {
    /// Creates a source watching `root` recursively.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::RootNotFound`] if `root` is not a directory.
    pub fn new(root: &Utf8Path) -> Result<Self, FsError> {
        Ok(Self {
            root: MirrorRoot::open(root)?,
        })
    }

    /// Returns the watched directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        self.root.path()
    }
}

#[async_trait::async_trait]
impl RemoteEventSource for LocalEventSource {
    async fn run(self, sink: EventSink, cancel: CancellationToken) -> Result<(), PipelineError> {
        let root = self.root;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let mut watcher = tokio::task::spawn_blocking(move || run_watcher_loop(&root, &sink, shutdown_rx));

        let finished = tokio::select! {
            () = cancel.cancelled() => None,
            result = &mut watcher => Some(result),
        };
        let result = match finished {
            Some(result) => result,
            None => {
                // Receiver may already be gone if the loop failed at the same time.
                let _ = shutdown_tx.send(());
                watcher.await
            }
        };

        result?.map_err(PipelineError::source_failed)
    }
}

fn run_watcher_loop(
    root: &MirrorRoot,
    sink: &EventSink,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> Result<(), FsError> {
    let (raw_tx, raw_rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        // The loop below is gone once shutdown starts.
        let _ = raw_tx.send(res);
    })?;

    watcher.watch(root.path().as_std_path(), RecursiveMode::Recursive)?;
    tracing::info!(path = %root.path(), "Local event source started");

    let mut pairer = RenamePairer::new(RENAME_PAIR_WINDOW);
    while matches!(shutdown_rx.try_recv(), Err(oneshot::error::TryRecvError::Empty)) {
        let wait = pairer
            .next_deadline()
            .map_or(POLL_INTERVAL, |due| due.saturating_duration_since(Instant::now()).min(POLL_INTERVAL));

        let mut events = match raw_rx.recv_timeout(wait) {
            Ok(Ok(event)) => pairer.accept(root, &event, Instant::now()),
            Ok(Err(error)) => {
                tracing::warn!(error = %error, "Watcher error");
                Vec::new()
            }
            Err(RecvTimeoutError::Timeout) => Vec::new(),
            Err(RecvTimeoutError::Disconnected) => break,
        };
        events.extend(pairer.expire(Instant::now()));

        for event in events {
            if sink.blocking_publish(event).is_err() {
                tracing::debug!("Event sink closed, dropping watcher events");
                return Ok(());
            }
        }
    }

    tracing::info!(path = %root.path(), "Local event source stopped");
    Ok(())
}

/// A `From` half still waiting for its `To`.
#[derive(Debug)]
struct PendingFrom {
    expires: Instant,
    tracker: Option<usize>,
    path: String,
}

/// A rename already published, remembered so its echoes are dropped.
#[derive(Debug)]
struct PairedRename {
    expires: Instant,
    tracker: Option<usize>,
    from: Option<String>,
}

/// Collapses the halves of a rename into one event.
///
/// A `From` is held for the pairing window. A matching `To` or `Both` (same
/// tracker, or both trackerless) turns it into one rename; later halves of
/// that rename, and a trackerless `From` on its old path, are dropped. A
/// `From` that stays unmatched becomes a delete, and a `To` without a `From`
/// becomes a create.
#[derive(Debug)]
pub struct RenamePairer {
    window: Duration,
    pending: VecDeque<PendingFrom>,
    paired: VecDeque<PairedRename>,
}

impl RenamePairer {
    /// Creates a pairer that waits `window` for the second half of a rename.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: VecDeque::new(),
            paired: VecDeque::new(),
        }
    }

    /// Maps one notify event, holding back rename halves that may pair up.
    pub fn accept(&mut self, root: &MirrorRoot, event: &notify::Event, now: Instant) -> Vec<RemoteEvent> {
        while self.paired.front().is_some_and(|pair| pair.expires <= now) {
            self.paired.pop_front();
        }

        let EventKind::Modify(ModifyKind::Name(mode)) = event.kind else {
            return translate(root, event);
        };
        let tracker = event.tracker();

        match mode {
            RenameMode::From => {
                for path in event.paths.iter().filter_map(|path| relative(root, path)) {
                    if tracker.is_none() && self.was_moved_from(&path) {
                        tracing::trace!(path = %path, "Dropping echo of paired rename");
                        continue;
                    }
                    self.pending.push_back(PendingFrom {
                        expires: now + self.window,
                        tracker,
                        path,
                    });
                }
                Vec::new()
            }
            RenameMode::To => {
                if self.was_paired(tracker) {
                    return Vec::new();
                }
                let from = self.take_pending(tracker);
                let to = event.paths.first().and_then(|path| relative(root, path));
                self.complete(tracker, from, to, now)
            }
            RenameMode::Both => {
                if self.was_paired(tracker) {
                    return Vec::new();
                }
                let from = event.paths.first().and_then(|path| relative(root, path));
                let to = event.paths.get(1).and_then(|path| relative(root, path));
                self.pending.retain(|pending| {
                    let same_tracker = tracker.is_some() && pending.tracker == tracker;
                    !same_tracker && Some(&pending.path) != from.as_ref()
                });
                self.complete(tracker, from, to, now)
            }
            RenameMode::Any | RenameMode::Other => translate(root, event),
        }
    }

    /// Turns `From` halves whose window has passed into deletes.
    pub fn expire(&mut self, now: Instant) -> Vec<RemoteEvent> {
        let mut expired = Vec::new();
        while self.pending.front().is_some_and(|pending| pending.expires <= now) {
            if let Some(pending) = self.pending.pop_front() {
                tracing::trace!(path = %pending.path, "Unpaired rename source treated as delete");
                expired.push(RemoteEvent::deleted(pending.path));
            }
        }
        expired
    }

    /// Returns when the oldest held `From` expires.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.front().map(|pending| pending.expires)
    }

    fn was_paired(&self, tracker: Option<usize>) -> bool {
        tracker.is_some() && self.paired.iter().any(|pair| pair.tracker == tracker)
    }

    fn was_moved_from(&self, path: &str) -> bool {
        self.paired.iter().any(|pair| pair.from.as_deref() == Some(path))
    }

    fn take_pending(&mut self, tracker: Option<usize>) -> Option<String> {
        let index = self.pending.iter().position(|pending| pending.tracker == tracker)?;
        self.pending.remove(index).map(|pending| pending.path)
    }

    fn complete(
        &mut self,
        tracker: Option<usize>,
        from: Option<String>,
        to: Option<String>,
        now: Instant,
    ) -> Vec<RemoteEvent> {
        self.paired.push_back(PairedRename {
            expires: now + self.window,
            tracker,
            from: from.clone(),
        });
        match (from, to) {
            (Some(from), Some(to)) => vec![RemoteEvent::renamed(from, to)],
            (Some(from), None) => vec![RemoteEvent::deleted(from)],
            (None, Some(to)) => vec![RemoteEvent::created(to)],
            (None, None) => Vec::new(),
        }
    }
}

fn relative(root: &MirrorRoot, path: &Path) -> Option<String> {
    match root.relativize(path) {
        Ok(rel) if rel.is_empty() => None,
        Ok(rel) => Some(rel),
        Err(error) => {
            tracing::warn!(error = %error, "Skipping watcher event path");
            None
        }
    }
}

/// Maps one notify event to remote events without pairing rename halves.
///
/// Paths that cannot be expressed under the root are logged and skipped, as
/// are events on the root itself.
pub fn translate(root: &MirrorRoot, event: &notify::Event) -> Vec<RemoteEvent> {
    let paths: Vec<String> = event.paths.iter().filter_map(|path| relative(root, path)).collect();

    match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.into_iter().map(RemoteEvent::created).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match paths.as_slice() {
            [from, to] => vec![RemoteEvent::renamed(from.as_str(), to.as_str())],
            _ => {
                tracing::trace!(paths = paths.len(), "Incomplete rename event");
                Vec::new()
            }
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) | EventKind::Remove(_) => {
            paths.into_iter().map(RemoteEvent::deleted).collect()
        }
        // Platforms that cannot pair rename halves report each side alone.
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .into_iter()
            .map(|rel| {
                let on_disk: Utf8PathBuf = root.path().join(&rel);
                if on_disk.exists() {
                    RemoteEvent::created(rel)
                } else {
                    RemoteEvent::deleted(rel)
                }
            })
            .collect(),
        EventKind::Modify(_) => paths.into_iter().map(RemoteEvent::changed).collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}
