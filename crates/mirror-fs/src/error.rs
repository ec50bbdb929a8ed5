//! Error types for the mirror-fs crate.

use std::path::PathBuf;

use camino::Utf8PathBuf;

/// Errors raised by the local collaborators.
///
/// # Error Recovery Strategy
///
/// - **Notify errors** ([`FsError::Notify`]): Fatal - the watcher cannot run
/// - **Root not found** ([`FsError::RootNotFound`]): Fatal - roots must exist
/// - **Non-UTF-8 path** ([`FsError::NonUtf8Path`]): Recoverable - skip the event
/// - **Outside root** ([`FsError::OutsideRoot`]): Recoverable - skip the event
/// - **I/O errors** ([`FsError::Io`]): Fatal - propagate immediately
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Failed to initialize or operate the notify watcher.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// A root directory does not exist or is not a directory.
    #[error("root directory does not exist: {0}")]
    RootNotFound(Utf8PathBuf),

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(PathBuf),

    /// A reported path is not inside the watched root.
    #[error("{path} is outside root {root}")]
    OutsideRoot {
        /// The offending path.
        path: Utf8PathBuf,
        /// The root it should have been under.
        root: Utf8PathBuf,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    /// Creates a new [`FsError::RootNotFound`] error.
    #[inline]
    pub fn root_not_found(path: impl Into<Utf8PathBuf>) -> Self {
        Self::RootNotFound(path.into())
    }

    /// Returns `true` if the event that caused this error can be skipped.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::NonUtf8Path(_) | Self::OutsideRoot { .. })
    }

    /// Returns `true` if the collaborator cannot continue.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns the UTF-8 path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::RootNotFound(path) | Self::OutsideRoot { path, .. } => Some(path),
            Self::Notify(_) | Self::NonUtf8Path(_) | Self::Io(_) => None,
        }
    }
}
