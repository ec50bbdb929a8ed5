//! Remote change pipeline.
//!
//! Mirrors filesystem notifications from a remote device into placeholder
//! mutations. Notifications arrive asynchronously, out of order, and in
//! bursts; this crate turns them into a consistent, serialized sequence of
//! backend calls.
//!
//! # Overview
//!
//! - [`PathLockManager`]: exclusive, scoped locks keyed by [`RelativePath`]
//! - [`MutationQueue`]: one-at-a-time execution of [`MutationTask`] records,
//!   with per-task failure isolation
//! - [`Dispatcher`]: normalization, reserved-path filtering, and the
//!   rename/delete debounce
//! - [`RemotePipeline`]: spawns and stops the whole thing
//!
//! The transport, the placeholder storage, and remote metadata reads are
//! collaborators behind [`RemoteEventSource`], [`PlaceholderBackend`], and
//! [`RemoteReadService`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌─────────────────────────────┐   ┌──────────────────────┐
//! │ RemoteEventSource│──►│ Dispatcher                  │──►│ QueueConsumer        │
//! │  (transport)     │   │  normalize, filter,         │   │  one task at a time  │
//! └──────────────────┘   │  debounce rename/delete     │   └──────────┬───────────┘
//!                        └─────────────────────────────┘              │
//!                                                                     ▼
//!                       ┌─────────────────┐   lock(s)   ┌──────────────────────┐
//!                       │ PathLockManager │◄────────────│ MutationExecutor     │
//!                       └─────────────────┘             │  classify, call      │
//!                                                       └──────────┬───────────┘
//!                                                                  ▼
//!                                          PlaceholderBackend / RemoteReadService
//! ```
//!
//! # Crate Dependencies
//!
//! ```text
//! mirror-cli ──► mirror-fs ──► mirror-pipeline ──► mirror-core
//! ```
//!
//! [`RelativePath`]: mirror_core::RelativePath

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod backend;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod lock;
pub mod pipeline;
pub mod queue;
pub mod source;
pub mod stats;
pub mod task;

#[cfg(test)]
mod test_support;

pub use backend::{DirectoryEntry, PlaceholderBackend, RemoteReadService};
pub use dispatcher::{Dispatch, Dispatcher};
pub use error::{BackendError, PipelineError, TaskError};
pub use events::{EventKind, RemoteEvent};
pub use lock::{PathLock, PathLockManager, PathLockSet};
pub use pipeline::{Collaborators, RemotePipeline};
pub use queue::{MutationQueue, QueueConsumer};
pub use source::{ChannelEventSource, EventSink, RemoteEventSource};
pub use stats::{PipelineStats, StatsSnapshot};
pub use task::{Mutation, MutationExecutor, MutationKind, MutationTask, Outcome};
