//! Error types for the mirror-pipeline crate.
//!
//! Three layers of failure are kept apart:
//!
//! - [`BackendError`] is what a collaborator (read service or placeholder
//!   backend) reports for a single call.
//! - [`TaskError`] is a failed mutation task. It is logged at the task
//!   boundary and never leaves the queue consumer.
//! - [`PipelineError`] covers the lifecycle of the pipeline itself.

use mirror_core::RelativePath;

use crate::task::MutationKind;

/// A failure reported by a collaborator for one call.
///
/// # Error Recovery Strategy
///
/// None of these are retried by the pipeline. The affected path keeps
/// whatever state it had, and a later event or a reconciliation pass is
/// expected to correct it.
///
/// # Examples
///
/// ```
/// use mirror_core::RelativePath;
/// use mirror_pipeline::BackendError;
///
/// let err = BackendError::not_found(RelativePath::from_normalized("a.txt"));
/// assert!(!err.is_transient());
/// assert_eq!(err.path().map(RelativePath::as_str), Some("a.txt"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// An I/O error while touching the placeholder or the remote entry.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The path being operated on.
        path: RelativePath,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The remote entry no longer exists.
    #[error("remote entry not found: {0}")]
    NotFound(RelativePath),

    /// The remote device or transport is unreachable.
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the operation.
    #[error("operation rejected for {path}: {reason}")]
    Rejected {
        /// The path being operated on.
        path: RelativePath,
        /// Why the backend refused.
        reason: String,
    },
}

impl BackendError {
    /// Creates a new [`BackendError::Io`] error.
    #[inline]
    pub fn io(path: RelativePath, source: std::io::Error) -> Self {
        Self::Io { path, source }
    }

    /// Creates a new [`BackendError::NotFound`] error.
    #[inline]
    pub fn not_found(path: RelativePath) -> Self {
        Self::NotFound(path)
    }

    /// Creates a new [`BackendError::Rejected`] error.
    #[inline]
    pub fn rejected(path: RelativePath, reason: impl Into<String>) -> Self {
        Self::Rejected {
            path,
            reason: reason.into(),
        }
    }

    /// Returns `true` if a later attempt could plausibly succeed.
    #[inline]
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Unavailable(_))
    }

    /// Returns the path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&RelativePath> {
        match self {
            Self::Io { path, .. } | Self::Rejected { path, .. } | Self::NotFound(path) => Some(path),
            Self::Unavailable(_) => None,
        }
    }
}

/// A mutation task that did not complete.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// A collaborator call failed.
    #[error("{kind} failed for {path}: {source}")]
    Backend {
        /// The mutation that failed.
        kind: MutationKind,
        /// The path the mutation was keyed on.
        path: RelativePath,
        /// The collaborator's error.
        #[source]
        source: BackendError,
    },

    /// The task panicked. Its locks were released during unwinding.
    #[error("{kind} panicked for {path}: {message}")]
    Panicked {
        /// The mutation that panicked.
        kind: MutationKind,
        /// The path the mutation was keyed on.
        path: RelativePath,
        /// The panic payload, if it was a string.
        message: String,
    },
}

impl TaskError {
    /// Wraps a collaborator error.
    #[inline]
    pub fn backend(kind: MutationKind, path: &RelativePath, source: BackendError) -> Self {
        Self::Backend {
            kind,
            path: path.clone(),
            source,
        }
    }

    /// Returns the mutation kind that failed.
    #[must_use]
    pub const fn kind(&self) -> MutationKind {
        match self {
            Self::Backend { kind, .. } | Self::Panicked { kind, .. } => *kind,
        }
    }

    /// Returns the path the failed mutation was keyed on.
    #[must_use]
    pub const fn path(&self) -> &RelativePath {
        match self {
            Self::Backend { path, .. } | Self::Panicked { path, .. } => path,
        }
    }
}

/// Errors in the lifecycle of the pipeline.
///
/// # Error Recovery Strategy
///
/// - **Sink closed** ([`PipelineError::SinkClosed`]): the pipeline has shut
///   down; the event source should stop producing.
/// - **Queue closed** ([`PipelineError::QueueClosed`]): the consumer is gone;
///   nothing more can be mirrored.
/// - **Source failed** ([`PipelineError::Source`]): reported by `shutdown`.
/// - **Join** ([`PipelineError::Join`]): a pipeline task panicked or was aborted.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The dispatcher is no longer receiving events.
    #[error("event sink closed")]
    SinkClosed,

    /// The mutation queue consumer is no longer running.
    #[error("mutation queue closed")]
    QueueClosed,

    /// The event source stopped with an error.
    #[error("event source failed: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A pipeline task could not be joined.
    #[error("pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PipelineError {
    /// Wraps an event source error.
    pub fn source_failed(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Source(Box::new(err))
    }

    /// Returns `true` if the pipeline can no longer make progress.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::SinkClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn rel(path: &str) -> RelativePath {
        RelativePath::from_normalized(path)
    }

    #[test]
    fn test_backend_error_io() {
        let err = BackendError::io(
            rel("docs/a.txt"),
            io::Error::new(io::ErrorKind::PermissionDenied, "access denied"),
        );
        assert!(err.is_transient());
        assert_eq!(err.path(), Some(&rel("docs/a.txt")));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn test_backend_error_unavailable_has_no_path() {
        let err = BackendError::Unavailable("device asleep".to_owned());
        assert!(err.is_transient());
        assert!(err.path().is_none());
        assert_eq!(err.to_string(), "remote unavailable: device asleep");
    }

    #[test]
    fn test_backend_error_rejected() {
        let err = BackendError::rejected(rel("x"), "read-only");
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "operation rejected for x: read-only");
    }

    #[test]
    fn test_task_error_accessors() {
        let err = TaskError::backend(
            MutationKind::Rename,
            &rel("a"),
            BackendError::not_found(rel("a")),
        );
        assert_eq!(err.kind(), MutationKind::Rename);
        assert_eq!(err.path(), &rel("a"));
        assert_eq!(err.to_string(), "rename failed for a: remote entry not found: a");

        let panicked = TaskError::Panicked {
            kind: MutationKind::Delete,
            path: rel("b"),
            message: "boom".to_owned(),
        };
        assert_eq!(panicked.to_string(), "delete panicked for b: boom");
    }

    #[test]
    fn test_pipeline_error_fatality() {
        assert!(!PipelineError::SinkClosed.is_fatal());
        assert!(PipelineError::QueueClosed.is_fatal());
        let err = PipelineError::source_failed(io::Error::other("socket reset"));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("socket reset"));
    }
}
