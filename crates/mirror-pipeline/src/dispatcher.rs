//! Translation of remote events into queued mutations.
//!
//! ```text
//! RemoteEvent ──► Created / Changed ─────────────────────────► normalize ──► MutationQueue
//!             └─► Renamed / Deleted ──► delay line (debounce) ─► normalize ──┘
//! ```
//!
//! The delay line is a FIFO of `(deadline, event)`. Every debounced event
//! waits the same window, so FIFO order is deadline order: renames and deletes
//! leave the line in arrival order, and creates and changes are never held up
//! behind them.
//!
//! The dispatcher never touches the backend. Classification into file or
//! directory happens when the task runs, so a remote entry that changes kind
//! between notification and execution is handled by what it is at that point.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use mirror_core::{DrainPolicy, PathNormalizer, ReservedFilter};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::events::RemoteEvent;
use crate::queue::MutationQueue;
use crate::stats::PipelineStats;
use crate::task::Mutation;

/// What the dispatcher did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A task was queued with this sequence number.
    Queued(u64),
    /// The event was dropped without a task.
    Skipped,
    /// The event is waiting in the delay line until `due`.
    Debounced {
        /// When the event leaves the delay line.
        due: Instant,
    },
}

/// Turns remote events into mutation tasks.
pub struct Dispatcher {
    normalizer: Arc<dyn PathNormalizer>,
    reserved: Arc<dyn ReservedFilter>,
    queue: MutationQueue,
    debounce: Duration,
    delayed: VecDeque<(Instant, RemoteEvent)>,
    stats: Arc<PipelineStats>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("debounce", &self.debounce)
            .field("delayed", &self.delayed.len())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher feeding `queue`.
    #[must_use]
    pub fn new(
        normalizer: Arc<dyn PathNormalizer>,
        reserved: Arc<dyn ReservedFilter>,
        queue: MutationQueue,
        debounce: Duration,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            normalizer,
            reserved,
            queue,
            debounce,
            delayed: VecDeque::new(),
            stats,
        }
    }

    /// Handles one event.
    ///
    /// Renames and deletes enter the delay line unless the debounce window is
    /// zero; everything else is normalized and queued at once.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::QueueClosed`] if the queue consumer is gone.
    pub fn dispatch(&mut self, event: RemoteEvent) -> Result<Dispatch, PipelineError> {
        self.stats.record_received();
        tracing::debug!(event = %event, "Remote event received");

        if event.is_debounced() && !self.debounce.is_zero() {
            let due = Instant::now() + self.debounce;
            self.delayed.push_back((due, event));
            return Ok(Dispatch::Debounced { due });
        }
        self.submit(event)
    }

    /// Queues every delayed event whose deadline is at or before `now`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::QueueClosed`] if the queue consumer is gone.
    pub fn release_due(&mut self, now: Instant) -> Result<usize, PipelineError> {
        let mut released = 0;
        while self.delayed.front().is_some_and(|(due, _)| *due <= now) {
            if let Some((_, event)) = self.delayed.pop_front() {
                self.submit(event)?;
                released += 1;
            }
        }
        Ok(released)
    }

    /// Returns the deadline of the oldest delayed event.
    #[must_use]
    pub fn next_due(&self) -> Option<Instant> {
        self.delayed.front().map(|(due, _)| *due)
    }

    /// Returns the number of events in the delay line.
    #[must_use]
    pub fn delayed(&self) -> usize {
        self.delayed.len()
    }

    /// Receives events until cancelled or the source is exhausted.
    ///
    /// On exit the event channel is closed, so publishing fails from then on.
    /// Under [`DrainPolicy::Drain`] events already buffered in the channel are
    /// still dispatched and the delay line is flushed on its own schedule.
    /// Under [`DrainPolicy::Discard`] both are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::QueueClosed`] if the consumer stopped while
    /// the pipeline was still meant to be running.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<RemoteEvent>,
        cancel: CancellationToken,
        policy: DrainPolicy,
    ) -> Result<(), PipelineError> {
        let discard = matches!(policy, DrainPolicy::Discard);

        loop {
            let next_due = self.next_due();
            let step = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                    self.release_due(Instant::now()).map(drop)
                }
                event = events.recv() => match event {
                    Some(event) => self.dispatch(event).map(drop),
                    None => {
                        tracing::debug!("Event source finished");
                        break;
                    }
                },
            };
            if let Err(err) = step {
                return self.stop_on_closed_queue(err, &cancel);
            }
        }

        events.close();
        if discard && cancel.is_cancelled() {
            let mut dropped = 0_u64;
            while events.try_recv().is_ok() {
                dropped += 1;
            }
            dropped += self.delayed.len() as u64;
            self.delayed.clear();
            self.stats.record_discarded_events(dropped);
            tracing::info!(dropped, "Dispatcher stopped, pending events discarded");
            return Ok(());
        }

        while let Some(event) = events.recv().await {
            if let Err(err) = self.dispatch(event) {
                return self.stop_on_closed_queue(err, &cancel);
            }
        }
        if let Err(err) = self.flush().await {
            return self.stop_on_closed_queue(err, &cancel);
        }
        tracing::debug!("Dispatcher stopped");
        Ok(())
    }

    /// Waits out and queues every delayed event.
    async fn flush(&mut self) -> Result<(), PipelineError> {
        if !self.delayed.is_empty() {
            tracing::debug!(delayed = self.delayed.len(), "Flushing delay line");
        }
        while let Some(due) = self.next_due() {
            sleep_until(due).await;
            self.release_due(Instant::now())?;
        }
        Ok(())
    }

    fn stop_on_closed_queue(
        &self,
        err: PipelineError,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        if cancel.is_cancelled() {
            self.stats.record_discarded_events(self.delayed.len() as u64 + 1);
            tracing::debug!("Mutation queue closed during shutdown");
            return Ok(());
        }
        tracing::error!(error = %err, "Mutation queue closed unexpectedly");
        Err(err)
    }

    fn submit(&self, event: RemoteEvent) -> Result<Dispatch, PipelineError> {
        let Some(mutation) = self.translate(event) else {
            self.stats.record_skipped();
            return Ok(Dispatch::Skipped);
        };
        let sequence = self.queue.enqueue(mutation)?;
        Ok(Dispatch::Queued(sequence))
    }

    fn translate(&self, event: RemoteEvent) -> Option<Mutation> {
        match event {
            RemoteEvent::Created { path } => {
                let path = self.normalizer.normalize(&path);
                if self.reserved.is_reserved(&path) {
                    tracing::trace!(path = %path, "Skipping reserved path");
                    return None;
                }
                Some(Mutation::Create(path))
            }
            RemoteEvent::Changed { path } => Some(Mutation::Update(self.normalizer.normalize(&path))),
            RemoteEvent::Renamed { from, to } => {
                let from = self.normalizer.normalize(&from);
                let to = self.normalizer.normalize(&to);
                if from.is_root() || to.is_root() {
                    tracing::warn!(from = %from, to = %to, "Ignoring rename involving the sync root");
                    return None;
                }
                Some(Mutation::Rename { from, to })
            }
            RemoteEvent::Deleted { path } => {
                let path = self.normalizer.normalize(&path);
                if path.is_root() {
                    tracing::warn!("Ignoring delete of the sync root");
                    return None;
                }
                Some(Mutation::Delete(path))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PlaceholderBackend;
    use crate::lock::PathLockManager;
    use crate::queue::QueueConsumer;
    use crate::task::MutationExecutor;
    use crate::test_support::{MapReadService, RecordingBackend};
    use mirror_core::{DefaultNormalizer, PrefixReserved, RelativePath};

    fn rel(path: &str) -> RelativePath {
        RelativePath::from_normalized(path)
    }

    fn dispatcher(debounce_ms: u64) -> (Dispatcher, QueueConsumer, Arc<PipelineStats>) {
        let stats = Arc::new(PipelineStats::new());
        let executor = MutationExecutor::new(
            Arc::new(RecordingBackend::new()) as Arc<dyn PlaceholderBackend>,
            Arc::new(MapReadService::new()),
            PathLockManager::new(),
        );
        let (queue, consumer) = MutationQueue::new(executor, Arc::clone(&stats));
        let dispatcher = Dispatcher::new(
            Arc::new(DefaultNormalizer::new(false)),
            Arc::new(PrefixReserved::default()),
            queue,
            Duration::from_millis(debounce_ms),
            Arc::clone(&stats),
        );
        (dispatcher, consumer, stats)
    }

    #[tokio::test(start_paused = true)]
    async fn test_created_and_changed_are_queued_immediately() {
        let (mut dispatcher, _consumer, stats) = dispatcher(1000);
        assert_eq!(
            dispatcher.dispatch(RemoteEvent::created("a")).expect("dispatch"),
            Dispatch::Queued(0)
        );
        assert_eq!(
            dispatcher.dispatch(RemoteEvent::changed("a")).expect("dispatch"),
            Dispatch::Queued(1)
        );
        assert_eq!(stats.snapshot().enqueued, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rename_and_delete_wait_for_window() {
        let (mut dispatcher, _consumer, stats) = dispatcher(1000);
        let start = Instant::now();

        let dispatched = dispatcher.dispatch(RemoteEvent::renamed("a", "b")).expect("dispatch");
        assert_eq!(
            dispatched,
            Dispatch::Debounced {
                due: start + Duration::from_millis(1000)
            }
        );
        dispatcher.dispatch(RemoteEvent::deleted("a")).expect("dispatch");
        assert_eq!(dispatcher.delayed(), 2);

        assert_eq!(dispatcher.release_due(start + Duration::from_millis(999)).expect("release"), 0);
        assert_eq!(stats.snapshot().enqueued, 0);

        assert_eq!(dispatcher.release_due(start + Duration::from_millis(1000)).expect("release"), 2);
        assert_eq!(stats.snapshot().enqueued, 2);
        assert!(dispatcher.next_due().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_debounce_queues_at_once() {
        let (mut dispatcher, _consumer, _stats) = dispatcher(0);
        assert_eq!(
            dispatcher.dispatch(RemoteEvent::deleted("a")).expect("dispatch"),
            Dispatch::Queued(0)
        );
        assert_eq!(dispatcher.delayed(), 0);
    }

    #[tokio::test]
    async fn test_reserved_create_is_skipped() {
        let (mut dispatcher, _consumer, stats) = dispatcher(0);
        assert_eq!(
            dispatcher
                .dispatch(RemoteEvent::created("Android/data/com.app/cache"))
                .expect("dispatch"),
            Dispatch::Skipped
        );
        let snap = stats.snapshot();
        assert_eq!(snap.received, 1);
        assert_eq!(snap.skipped, 1);
        assert_eq!(snap.enqueued, 0);
    }

    #[tokio::test]
    async fn test_root_delete_and_rename_are_skipped() {
        let (mut dispatcher, _consumer, stats) = dispatcher(0);
        assert_eq!(dispatcher.dispatch(RemoteEvent::deleted("/")).expect("dispatch"), Dispatch::Skipped);
        assert_eq!(
            dispatcher.dispatch(RemoteEvent::renamed("a", "./")).expect("dispatch"),
            Dispatch::Skipped
        );
        assert_eq!(stats.snapshot().skipped, 2);
    }

    #[test]
    fn test_translate_normalizes_paths() {
        let (dispatcher, _consumer, _stats) = dispatcher(0);
        assert_eq!(
            dispatcher.translate(RemoteEvent::renamed("\\DCIM\\a.jpg", "DCIM//b.jpg/")),
            Some(Mutation::Rename {
                from: rel("DCIM/a.jpg"),
                to: rel("DCIM/b.jpg"),
            })
        );
        assert_eq!(
            dispatcher.translate(RemoteEvent::changed("./Music")),
            Some(Mutation::Update(rel("Music")))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_flushes_delay_line_when_source_ends() {
        let (dispatcher, consumer, stats) = dispatcher(1000);
        let (tx, rx) = mpsc::channel(8);
        tx.send(RemoteEvent::deleted("x")).await.expect("send");
        drop(tx);

        let start = Instant::now();
        dispatcher
            .run(rx, CancellationToken::new(), DrainPolicy::Drain)
            .await
            .expect("run");

        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert_eq!(stats.snapshot().enqueued, 1);
        drop(consumer);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_discards_delay_line_on_cancel() {
        let (dispatcher, _consumer, stats) = dispatcher(1000);
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(dispatcher.run(rx, cancel.clone(), DrainPolicy::Discard));
        tx.send(RemoteEvent::deleted("x")).await.expect("send");
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        handle.await.expect("join").expect("run");

        let snap = stats.snapshot();
        assert_eq!(snap.enqueued, 0);
        assert_eq!(snap.discarded_events, 1);
        assert!(tx.is_closed());
    }
}
