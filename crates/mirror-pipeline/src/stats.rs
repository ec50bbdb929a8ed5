//! Pipeline counters.
//!
//! [`PipelineStats`] is shared between the dispatcher and the queue consumer
//! and only ever incremented. [`StatsSnapshot`] is the serializable view
//! returned by [`RemotePipeline::stats`](crate::RemotePipeline::stats) and by
//! shutdown.
//!
//! Counters use [`Relaxed`](Ordering::Relaxed) ordering; they are informational
//! and never used for synchronization.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic counters for one pipeline run.
#[derive(Debug, Default)]
pub struct PipelineStats {
    received: AtomicU64,
    skipped: AtomicU64,
    enqueued: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    entry_failures: AtomicU64,
    discarded_tasks: AtomicU64,
    discarded_events: AtomicU64,
}

impl PipelineStats {
    /// Creates a new [`PipelineStats`] with all counters at zero.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An event arrived from the source.
    #[inline]
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// An event was dropped by the reserved-path filter or the root guard.
    #[inline]
    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// A mutation task was queued.
    #[inline]
    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// A task ran to completion. `entry_failures` counts skipped fan-out entries.
    #[inline]
    pub fn record_succeeded(&self, entry_failures: usize) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.entry_failures
            .fetch_add(entry_failures as u64, Ordering::Relaxed);
    }

    /// A task failed or panicked.
    #[inline]
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Queued tasks dropped by a discarding shutdown.
    #[inline]
    pub fn record_discarded_tasks(&self, count: u64) {
        self.discarded_tasks.fetch_add(count, Ordering::Relaxed);
    }

    /// Debounced events dropped by a discarding shutdown.
    #[inline]
    pub fn record_discarded_events(&self, count: u64) {
        self.discarded_events.fetch_add(count, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            entry_failures: self.entry_failures.load(Ordering::Relaxed),
            discarded_tasks: self.discarded_tasks.load(Ordering::Relaxed),
            discarded_events: self.discarded_events.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Events received from the source.
    pub received: u64,
    /// Events dropped before queuing.
    pub skipped: u64,
    /// Tasks queued.
    pub enqueued: u64,
    /// Tasks that completed.
    pub succeeded: u64,
    /// Tasks that failed or panicked.
    pub failed: u64,
    /// Directory entries that failed during update fan-out.
    pub entry_failures: u64,
    /// Queued tasks dropped at shutdown.
    pub discarded_tasks: u64,
    /// Debounced events dropped at shutdown.
    pub discarded_events: u64,
}

impl StatsSnapshot {
    /// Returns the number of queued tasks that have finished, either way.
    #[inline]
    #[must_use]
    pub const fn completed(&self) -> u64 {
        self.succeeded + self.failed
    }

    /// Returns the number of queued tasks still waiting or running.
    #[inline]
    #[must_use]
    pub const fn pending(&self) -> u64 {
        self.enqueued
            .saturating_sub(self.completed())
            .saturating_sub(self.discarded_tasks)
    }
}
