//! Mutation tasks and their execution.
//!
//! A [`MutationTask`] is a plain record: the operation and the normalized
//! path(s) it applies to. The [`MutationExecutor`] owns the collaborators and
//! turns a record into lock acquisition plus backend calls. Keeping the two
//! apart means a queued task never captures anything but its own paths.

use std::fmt;
use std::sync::Arc;

use mirror_core::RelativePath;
use smallvec::SmallVec;
use tokio::time::Instant;

use crate::backend::{PlaceholderBackend, RemoteReadService};
use crate::error::TaskError;
use crate::lock::PathLockManager;

/// The four placeholder operations the pipeline schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// Create or refresh a placeholder.
    Create,
    /// Refresh a placeholder, fanning out over a directory's files.
    Update,
    /// Move a placeholder.
    Rename,
    /// Remove a placeholder.
    Delete,
}

impl MutationKind {
    /// Returns a lowercase label for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Rename => "rename",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A placeholder operation on normalized paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Create or refresh the placeholder at a path.
    Create(RelativePath),
    /// Refresh the placeholder at a path.
    Update(RelativePath),
    /// Move a placeholder.
    Rename {
        /// Path before the move.
        from: RelativePath,
        /// Path after the move.
        to: RelativePath,
    },
    /// Remove the placeholder at a path.
    Delete(RelativePath),
}

impl Mutation {
    /// Returns the kind of this mutation.
    #[must_use]
    pub const fn kind(&self) -> MutationKind {
        match self {
            Self::Create(_) => MutationKind::Create,
            Self::Update(_) => MutationKind::Update,
            Self::Rename { .. } => MutationKind::Rename,
            Self::Delete(_) => MutationKind::Delete,
        }
    }

    /// Returns the path used to report this mutation (the source of a rename).
    #[must_use]
    pub const fn path(&self) -> &RelativePath {
        match self {
            Self::Create(path) | Self::Update(path) | Self::Delete(path) => path,
            Self::Rename { from, .. } => from,
        }
    }

    /// Returns every path this mutation locks.
    #[must_use]
    pub fn paths(&self) -> SmallVec<[&RelativePath; 2]> {
        match self {
            Self::Create(path) | Self::Update(path) | Self::Delete(path) => {
                SmallVec::from_slice(&[path])
            }
            Self::Rename { from, to } => SmallVec::from_slice(&[from, to]),
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rename { from, to } => write!(f, "rename {from} -> {to}"),
            other => write!(f, "{} {}", other.kind(), other.path()),
        }
    }
}

/// A queued mutation.
#[derive(Debug, Clone)]
pub struct MutationTask {
    /// The operation to perform.
    pub mutation: Mutation,
    /// Position in the queue, starting at zero.
    pub sequence: u64,
    /// When the task was queued.
    pub enqueued_at: Instant,
}

/// What a successful task did beyond its primary call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Directory entries refreshed during an update fan-out.
    pub entries_updated: usize,
    /// Directory entries whose refresh failed and was skipped.
    pub entries_failed: usize,
}

/// Executes mutations against the collaborators under per-path locks.
#[derive(Clone)]
pub struct MutationExecutor {
    backend: Arc<dyn PlaceholderBackend>,
    reader: Arc<dyn RemoteReadService>,
    locks: PathLockManager,
}

impl fmt::Debug for MutationExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationExecutor")
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

impl MutationExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(
        backend: Arc<dyn PlaceholderBackend>,
        reader: Arc<dyn RemoteReadService>,
        locks: PathLockManager,
    ) -> Self {
        Self {
            backend,
            reader,
            locks,
        }
    }

    /// Returns the lock manager the executor acquires from.
    #[must_use]
    pub const fn locks(&self) -> &PathLockManager {
        &self.locks
    }

    /// Performs one mutation.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Backend`] if the primary backend call, or the
    /// directory listing of an update, fails. Failures of individual entries
    /// in an update fan-out are logged and counted in the [`Outcome`].
    pub async fn execute(&self, mutation: &Mutation) -> Result<Outcome, TaskError> {
        match mutation {
            Mutation::Create(path) => self.create(path).await,
            Mutation::Update(path) => self.update(path).await,
            Mutation::Rename { from, to } => self.rename(from, to).await,
            Mutation::Delete(path) => self.delete(path).await,
        }
    }

    async fn create(&self, path: &RelativePath) -> Result<Outcome, TaskError> {
        let _lock = self.locks.lock(path).await;
        let result = if self.reader.is_directory(path) {
            self.backend.create_or_update_directory(path).await
        } else {
            self.backend.create_or_update_file(path).await
        };
        result.map_err(|source| TaskError::backend(MutationKind::Create, path, source))?;
        Ok(Outcome::default())
    }

    async fn update(&self, path: &RelativePath) -> Result<Outcome, TaskError> {
        let _lock = self.locks.lock(path).await;
        let fail = |source| TaskError::backend(MutationKind::Update, path, source);

        if !self.reader.is_directory(path) {
            self.backend.update_file(path).await.map_err(fail)?;
            return Ok(Outcome::default());
        }

        self.backend.update_directory(path).await.map_err(fail)?;

        let mut outcome = Outcome::default();
        for entry in self.reader.enumerate_files(path).map_err(fail)? {
            if entry.is_directory {
                tracing::trace!(path = %entry.path, "Skipping subdirectory in update fan-out");
                continue;
            }
            match self.backend.update_file(&entry.path).await {
                Ok(()) => outcome.entries_updated += 1,
                Err(error) => {
                    outcome.entries_failed += 1;
                    tracing::error!(
                        directory = %path,
                        path = %entry.path,
                        error = %error,
                        "Failed to update file placeholder"
                    );
                }
            }
        }
        Ok(outcome)
    }

    async fn rename(&self, from: &RelativePath, to: &RelativePath) -> Result<Outcome, TaskError> {
        let _locks = self.locks.lock_pair(from, to).await;
        let result = if self.reader.is_directory(to) {
            self.backend.rename_directory(from, to).await
        } else {
            self.backend.rename_file(from, to).await
        };
        result.map_err(|source| TaskError::backend(MutationKind::Rename, from, source))?;
        Ok(Outcome::default())
    }

    async fn delete(&self, path: &RelativePath) -> Result<Outcome, TaskError> {
        let _lock = self.locks.lock(path).await;
        self.backend
            .delete(path)
            .map_err(|source| TaskError::backend(MutationKind::Delete, path, source))?;
        Ok(Outcome::default())
    }
}
