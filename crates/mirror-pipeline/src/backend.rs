//! Collaborator contracts consumed by the pipeline.
//!
//! The pipeline decides *when* and *in what order* placeholders change; how a
//! placeholder is materialized and how remote metadata is read belong to the
//! implementations of these traits.

use async_trait::async_trait;
use mirror_core::RelativePath;

use crate::error::BackendError;

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Normalized path of the entry.
    pub path: RelativePath,
    /// Whether the entry is a directory.
    pub is_directory: bool,
}

impl DirectoryEntry {
    /// Creates a file entry.
    #[inline]
    #[must_use]
    pub const fn file(path: RelativePath) -> Self {
        Self {
            path,
            is_directory: false,
        }
    }

    /// Creates a directory entry.
    #[inline]
    #[must_use]
    pub const fn directory(path: RelativePath) -> Self {
        Self {
            path,
            is_directory: true,
        }
    }
}

/// Read-side queries against the remote filesystem.
pub trait RemoteReadService: Send + Sync + 'static {
    /// Returns `true` if the remote entry is a directory.
    ///
    /// Unknown entries are reported as files.
    fn is_directory(&self, path: &RelativePath) -> bool;

    /// Lists the entries directly inside `directory`.
    ///
    /// The listing is finite and may be queried again at any time; returned
    /// paths are already normalized.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if the directory cannot be listed.
    fn enumerate_files(&self, directory: &RelativePath) -> Result<Vec<DirectoryEntry>, BackendError>;
}

/// Placeholder mutations.
///
/// Every operation must be idempotent: the pipeline tolerates out-of-order and
/// repeated remote notifications by relying on create-or-update semantics.
#[async_trait]
pub trait PlaceholderBackend: Send + Sync + 'static {
    /// Creates a directory placeholder, or refreshes an existing one.
    async fn create_or_update_directory(&self, path: &RelativePath) -> Result<(), BackendError>;

    /// Creates a file placeholder, or refreshes an existing one.
    async fn create_or_update_file(&self, path: &RelativePath) -> Result<(), BackendError>;

    /// Refreshes a directory placeholder's metadata.
    async fn update_directory(&self, path: &RelativePath) -> Result<(), BackendError>;

    /// Refreshes a file placeholder's metadata and invalidates hydrated content.
    async fn update_file(&self, path: &RelativePath) -> Result<(), BackendError>;

    /// Moves a directory placeholder.
    async fn rename_directory(&self, from: &RelativePath, to: &RelativePath) -> Result<(), BackendError>;

    /// Moves a file placeholder.
    async fn rename_file(&self, from: &RelativePath, to: &RelativePath) -> Result<(), BackendError>;

    /// Removes a placeholder. Removing a missing placeholder succeeds.
    fn delete(&self, path: &RelativePath) -> Result<(), BackendError>;
}
