//! The serialized mutation queue.
//!
//! ```text
//! MutationQueue (dispatcher) ──unbounded mpsc──► QueueConsumer ──► MutationExecutor
//! ```
//!
//! Tasks run one at a time in submission order. A failed or panicking task is
//! logged with its path and the consumer moves on to the next one; nothing a
//! task does can stop the consumer.
//!
//! The queue is unbounded: enqueueing never blocks the dispatcher, and
//! back-pressure, if any, is applied on the event channel in front of it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::FutureExt;
use mirror_core::DrainPolicy;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, TaskError};
use crate::stats::PipelineStats;
use crate::task::{Mutation, MutationExecutor, MutationTask};

/// Submission handle for the mutation queue.
#[derive(Debug, Clone)]
pub struct MutationQueue {
    tx: mpsc::UnboundedSender<MutationTask>,
    sequence: Arc<AtomicU64>,
    stats: Arc<PipelineStats>,
}

impl MutationQueue {
    /// Creates a queue and the consumer that executes its tasks.
    #[must_use]
    pub fn new(executor: MutationExecutor, stats: Arc<PipelineStats>) -> (Self, QueueConsumer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Self {
            tx,
            sequence: Arc::new(AtomicU64::new(0)),
            stats: Arc::clone(&stats),
        };
        let consumer = QueueConsumer {
            rx,
            executor,
            stats,
        };
        (queue, consumer)
    }

    /// Appends a mutation and returns its sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::QueueClosed`] if the consumer has stopped.
    pub fn enqueue(&self, mutation: Mutation) -> Result<u64, PipelineError> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let task = MutationTask {
            mutation,
            sequence,
            enqueued_at: Instant::now(),
        };
        self.tx.send(task).map_err(|_| PipelineError::QueueClosed)?;
        self.stats.record_enqueued();
        Ok(sequence)
    }

    /// Returns `true` if the consumer has stopped accepting tasks.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Executes queued tasks one at a time.
#[derive(Debug)]
pub struct QueueConsumer {
    rx: mpsc::UnboundedReceiver<MutationTask>,
    executor: MutationExecutor,
    stats: Arc<PipelineStats>,
}

impl QueueConsumer {
    /// Runs tasks until the queue is finished.
    ///
    /// With [`DrainPolicy::Drain`] the consumer ignores `cancel` and stops once
    /// every [`MutationQueue`] handle is dropped and the backlog is empty.
    /// With [`DrainPolicy::Discard`] it stops at `cancel`, letting only the
    /// in-flight task finish and dropping the backlog.
    pub async fn run(mut self, cancel: CancellationToken, policy: DrainPolicy) {
        let discard = matches!(policy, DrainPolicy::Discard);

        loop {
            let task = tokio::select! {
                biased;
                () = cancel.cancelled(), if discard => {
                    self.discard_backlog();
                    break;
                }
                task = self.rx.recv() => task,
            };

            let Some(task) = task else {
                tracing::debug!("Mutation queue drained");
                break;
            };
            self.run_task(task).await;
        }
    }

    fn discard_backlog(&mut self) {
        self.rx.close();
        let mut dropped = 0_u64;
        while let Ok(task) = self.rx.try_recv() {
            tracing::debug!(sequence = task.sequence, mutation = %task.mutation, "Discarding queued mutation");
            dropped += 1;
        }
        self.stats.record_discarded_tasks(dropped);
        tracing::info!(dropped, "Mutation queue stopped, backlog discarded");
    }

    async fn run_task(&self, task: MutationTask) {
        let mutation = &task.mutation;
        let queued_for = task.enqueued_at.elapsed();
        tracing::debug!(
            sequence = task.sequence,
            mutation = %mutation,
            queued_ms = queued_for.as_millis(),
            "Running mutation"
        );

        let result = AssertUnwindSafe(self.executor.execute(mutation))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(TaskError::Panicked {
                    kind: mutation.kind(),
                    path: mutation.path().clone(),
                    message: panic_message(payload.as_ref()),
                })
            });

        match result {
            Ok(outcome) => {
                self.stats.record_succeeded(outcome.entries_failed);
                tracing::trace!(
                    sequence = task.sequence,
                    entries_updated = outcome.entries_updated,
                    entries_failed = outcome.entries_failed,
                    "Mutation finished"
                );
            }
            Err(err) => {
                self.stats.record_failed();
                tracing::error!(
                    sequence = task.sequence,
                    kind = %err.kind(),
                    path = %err.path(),
                    error = %err,
                    "Mutation failed"
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
