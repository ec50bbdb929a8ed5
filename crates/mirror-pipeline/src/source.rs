//! The boundary between the remote transport and the pipeline.
//!
//! A transport implements [`RemoteEventSource`] and publishes notifications
//! through the [`EventSink`] it is handed when the pipeline starts. The sink
//! is the subscription: it is created by [`RemotePipeline::start`] and stops
//! accepting events once the pipeline has shut down, so no event is delivered
//! after shutdown completes.
//!
//! [`RemotePipeline::start`]: crate::RemotePipeline::start

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::events::RemoteEvent;

/// Publishing handle for remote notifications.
///
/// Cloneable, so a transport may publish from several tasks at once. Events
/// published from a single task are delivered in publication order.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<RemoteEvent>,
}

impl EventSink {
    pub(crate) const fn new(tx: mpsc::Sender<RemoteEvent>) -> Self {
        Self { tx }
    }

    /// Publishes an event, waiting for channel capacity if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::SinkClosed`] once the pipeline has stopped.
    pub async fn publish(&self, event: RemoteEvent) -> Result<(), PipelineError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| PipelineError::SinkClosed)
    }

    /// Publishes an event from a synchronous context.
    ///
    /// Must not be called from within an async task; use it from a watcher
    /// callback thread or `spawn_blocking`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::SinkClosed`] once the pipeline has stopped.
    pub fn blocking_publish(&self, event: RemoteEvent) -> Result<(), PipelineError> {
        self.tx
            .blocking_send(event)
            .map_err(|_| PipelineError::SinkClosed)
    }

    /// Publishes a [`RemoteEvent::Created`].
    ///
    /// # Errors
    ///
    /// See [`publish`](Self::publish).
    pub async fn created(&self, path: impl Into<String>) -> Result<(), PipelineError> {
        self.publish(RemoteEvent::created(path)).await
    }

    /// Publishes a [`RemoteEvent::Changed`].
    ///
    /// # Errors
    ///
    /// See [`publish`](Self::publish).
    pub async fn changed(&self, path: impl Into<String>) -> Result<(), PipelineError> {
        self.publish(RemoteEvent::changed(path)).await
    }

    /// Publishes a [`RemoteEvent::Renamed`].
    ///
    /// # Errors
    ///
    /// See [`publish`](Self::publish).
    pub async fn renamed(
        &self,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Result<(), PipelineError> {
        self.publish(RemoteEvent::renamed(from, to)).await
    }

    /// Publishes a [`RemoteEvent::Deleted`].
    ///
    /// # Errors
    ///
    /// See [`publish`](Self::publish).
    pub async fn deleted(&self, path: impl Into<String>) -> Result<(), PipelineError> {
        self.publish(RemoteEvent::deleted(path)).await
    }

    /// Returns `true` if the pipeline has stopped receiving events.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A producer of remote filesystem notifications.
///
/// `run` is spawned once by the pipeline. It should publish into `sink` until
/// `cancel` fires or the remote side goes away, then return. Returning an
/// error does not stop the rest of the pipeline; the error is reported by
/// [`RemotePipeline::shutdown`](crate::RemotePipeline::shutdown).
#[async_trait]
pub trait RemoteEventSource: Send + 'static {
    /// Publishes events until cancelled or exhausted.
    async fn run(self, sink: EventSink, cancel: CancellationToken) -> Result<(), PipelineError>;
}

/// An event source fed from an in-process channel.
///
/// Useful for transports that already own a receive loop: they keep the
/// sender half and push decoded notifications into it.
///
/// # Examples
///
/// ```
/// use mirror_pipeline::{ChannelEventSource, RemoteEvent};
///
/// let (tx, source) = ChannelEventSource::new(16);
/// tx.try_send(RemoteEvent::created("notes.txt")).unwrap();
/// # drop(source);
/// ```
#[derive(Debug)]
pub struct ChannelEventSource {
    rx: mpsc::Receiver<RemoteEvent>,
}

impl ChannelEventSource {
    /// Creates a source and the sender that feeds it.
    #[must_use]
    pub fn new(capacity: usize) -> (mpsc::Sender<RemoteEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

#[async_trait]
impl RemoteEventSource for ChannelEventSource {
    async fn run(mut self, sink: EventSink, cancel: CancellationToken) -> Result<(), PipelineError> {
        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!("Channel event source cancelled");
                    return Ok(());
                }
                event = self.rx.recv() => event,
            };

            let Some(event) = event else {
                tracing::debug!("Channel event source exhausted");
                return Ok(());
            };

            if sink.publish(event).await.is_err() {
                tracing::debug!("Event sink closed, stopping channel source");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_helpers_publish_each_kind() {
        let (tx, mut rx) = mpsc::channel(8);
        let sink = EventSink::new(tx);

        sink.created("a").await.expect("created");
        sink.changed("a").await.expect("changed");
        sink.renamed("a", "b").await.expect("renamed");
        sink.deleted("b").await.expect("deleted");

        assert_eq!(rx.recv().await, Some(RemoteEvent::created("a")));
        assert_eq!(rx.recv().await, Some(RemoteEvent::changed("a")));
        assert_eq!(rx.recv().await, Some(RemoteEvent::renamed("a", "b")));
        assert_eq!(rx.recv().await, Some(RemoteEvent::deleted("b")));
    }

    #[tokio::test]
    async fn test_sink_reports_closed() {
        let (tx, rx) = mpsc::channel(1);
        let sink = EventSink::new(tx);
        drop(rx);

        assert!(sink.is_closed());
        assert!(matches!(
            sink.created("a").await,
            Err(PipelineError::SinkClosed)
        ));
    }

    #[tokio::test]
    async fn test_channel_source_forwards_until_exhausted() {
        let (tx, source) = ChannelEventSource::new(4);
        let (sink_tx, mut sink_rx) = mpsc::channel(4);

        tx.send(RemoteEvent::created("one")).await.expect("send");
        tx.send(RemoteEvent::deleted("two")).await.expect("send");
        drop(tx);

        source
            .run(EventSink::new(sink_tx), CancellationToken::new())
            .await
            .expect("run");

        assert_eq!(sink_rx.recv().await, Some(RemoteEvent::created("one")));
        assert_eq!(sink_rx.recv().await, Some(RemoteEvent::deleted("two")));
        assert_eq!(sink_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_channel_source_stops_on_cancel() {
        let (_tx, source) = ChannelEventSource::new(4);
        let (sink_tx, _sink_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = source.run(EventSink::new(sink_tx), cancel).await;
        assert!(result.is_ok());
    }
}
