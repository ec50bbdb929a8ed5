//! The running pipeline and its lifecycle.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐  EventSink   ┌────────────┐ MutationQueue ┌───────────────┐
//! │ RemoteEventSource  │ ───────────► │ Dispatcher │ ────────────► │ QueueConsumer │
//! │ (spawned task)     │ bounded mpsc │ (task)     │  unbounded    │ (task)        │
//! └────────────────────┘              └────────────┘               └───────┬───────┘
//!                                                                          │
//!                                         PathLockManager ◄── MutationExecutor ──► PlaceholderBackend
//! ```
//!
//! All three tasks observe one [`CancellationToken`], a child of the token
//! passed to [`RemotePipeline::start`]. The source and dispatcher stop when it
//! fires; the consumer then follows the configured [`DrainPolicy`].

use std::fmt;
use std::sync::Arc;

use mirror_core::{DrainPolicy, PathNormalizer, PipelineConfig, ReservedFilter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{PlaceholderBackend, RemoteReadService};
use crate::dispatcher::Dispatcher;
use crate::error::PipelineError;
use crate::lock::PathLockManager;
use crate::queue::MutationQueue;
use crate::source::{EventSink, RemoteEventSource};
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::task::MutationExecutor;

/// The external services a pipeline drives.
#[derive(Clone)]
pub struct Collaborators {
    /// Materializes placeholders.
    pub backend: Arc<dyn PlaceholderBackend>,
    /// Answers file-or-directory and listing queries.
    pub reader: Arc<dyn RemoteReadService>,
    /// Canonicalizes raw remote paths.
    pub normalizer: Arc<dyn PathNormalizer>,
    /// Marks system areas that are never created locally.
    pub reserved: Arc<dyn ReservedFilter>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// A running remote change pipeline.
///
/// # Lifecycle
///
/// 1. **Start**: [`start`](Self::start) spawns the event source, the
///    dispatcher, and the queue consumer on the current runtime.
/// 2. **Run**: the source publishes; tasks execute one at a time.
/// 3. **Stop**: [`shutdown`](Self::shutdown) cancels and waits for all three
///    tasks; [`finished`](Self::finished) waits for a source that ends on its
///    own. Dropping the pipeline cancels without waiting.
///
/// # Examples
///
/// ```no_run
/// use mirror_core::PipelineConfig;
/// use mirror_pipeline::{ChannelEventSource, Collaborators, RemoteEvent, RemotePipeline};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example(collaborators: Collaborators) -> Result<(), mirror_pipeline::PipelineError> {
/// let (tx, source) = ChannelEventSource::new(64);
/// let pipeline = RemotePipeline::start(
///     source,
///     collaborators,
///     &PipelineConfig::default(),
///     &CancellationToken::new(),
/// );
///
/// tx.send(RemoteEvent::created("DCIM/IMG_0001.jpg")).await.ok();
/// drop(tx);
///
/// let stats = pipeline.finished().await?;
/// println!("{} mutations applied", stats.succeeded);
/// # Ok(())
/// # }
/// ```
pub struct RemotePipeline {
    cancel: CancellationToken,
    source: Option<JoinHandle<Result<(), PipelineError>>>,
    dispatcher: Option<JoinHandle<Result<(), PipelineError>>>,
    consumer: Option<JoinHandle<()>>,
    stats: Arc<PipelineStats>,
    locks: PathLockManager,
    policy: DrainPolicy,
}

impl fmt::Debug for RemotePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemotePipeline")
            .field("policy", &self.policy)
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl RemotePipeline {
    /// Subscribes to `source` and starts processing its events.
    ///
    /// Must be called from within a tokio runtime. Cancelling `parent` has
    /// the same effect as [`shutdown`](Self::shutdown) without the wait.
    pub fn start<S: RemoteEventSource>(
        source: S,
        collaborators: Collaborators,
        config: &PipelineConfig,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let stats = Arc::new(PipelineStats::new());
        let locks = PathLockManager::new();
        let policy = config.drain_policy;

        let executor = MutationExecutor::new(
            collaborators.backend,
            collaborators.reader,
            locks.clone(),
        );
        let (queue, consumer) = MutationQueue::new(executor, Arc::clone(&stats));
        let dispatcher = Dispatcher::new(
            collaborators.normalizer,
            collaborators.reserved,
            queue,
            config.debounce(),
            Arc::clone(&stats),
        );

        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity.max(1));
        let sink = EventSink::new(event_tx);

        let consumer = tokio::spawn(consumer.run(cancel.clone(), policy));
        let dispatcher = tokio::spawn(dispatcher.run(event_rx, cancel.clone(), policy));
        let source = tokio::spawn(source.run(sink, cancel.clone()));

        tracing::info!(
            debounce_ms = config.debounce_ms,
            drain_policy = ?policy,
            "Remote change pipeline started"
        );

        Self {
            cancel,
            source: Some(source),
            dispatcher: Some(dispatcher),
            consumer: Some(consumer),
            stats,
            locks,
            policy,
        }
    }

    /// Returns the current counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns the lock manager used by the pipeline's tasks.
    #[must_use]
    pub const fn locks(&self) -> &PathLockManager {
        &self.locks
    }

    /// Returns `true` until all pipeline tasks have stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        [
            self.source.as_ref().map(JoinHandle::is_finished),
            self.dispatcher.as_ref().map(JoinHandle::is_finished),
            self.consumer.as_ref().map(JoinHandle::is_finished),
        ]
        .into_iter()
        .any(|finished| finished == Some(false))
    }

    /// Returns a token that stops this pipeline when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops the pipeline and waits for it to wind down.
    ///
    /// No event is accepted once this returns. Queued mutations run or are
    /// dropped according to the configured [`DrainPolicy`].
    ///
    /// # Errors
    ///
    /// Returns the event source's error if it failed, or
    /// [`PipelineError::Join`] if a pipeline task panicked.
    pub async fn shutdown(mut self) -> Result<StatsSnapshot, PipelineError> {
        tracing::info!("Shutting down remote change pipeline");
        self.cancel.cancel();
        self.join().await
    }

    /// Waits for the event source to finish on its own, then for every
    /// queued mutation to run.
    ///
    /// # Errors
    ///
    /// See [`shutdown`](Self::shutdown).
    pub async fn finished(mut self) -> Result<StatsSnapshot, PipelineError> {
        self.join().await
    }

    async fn join(&mut self) -> Result<StatsSnapshot, PipelineError> {
        let mut first_error = None;

        if let Some(handle) = self.source.take() {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::error!(error = %err, "Event source failed");
                    first_error.get_or_insert(err);
                }
                Err(err) => {
                    first_error.get_or_insert(PipelineError::Join(err));
                }
            }
        }
        if let Some(handle) = self.dispatcher.take() {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    first_error.get_or_insert(err);
                }
                Err(err) => {
                    first_error.get_or_insert(PipelineError::Join(err));
                }
            }
        }
        if let Some(handle) = self.consumer.take() {
            if let Err(err) = handle.await {
                first_error.get_or_insert(PipelineError::Join(err));
            }
        }

        let snapshot = self.stats.snapshot();
        tracing::info!(
            received = snapshot.received,
            succeeded = snapshot.succeeded,
            failed = snapshot.failed,
            "Remote change pipeline stopped"
        );
        first_error.map_or(Ok(snapshot), Err)
    }
}

impl Drop for RemotePipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
