//! Raw events reported by the remote side.
//!
//! Paths inside a [`RemoteEvent`] are exactly what the remote reported; the
//! dispatcher normalizes them. Events serialize as internally tagged JSON so a
//! transport can forward them as JSON lines.
//!
//! ```text
//! {"kind":"created","path":"DCIM/Camera/IMG_0001.jpg"}
//! {"kind":"renamed","from":"a.txt","to":"b.txt"}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// A filesystem notification from the remote device.
///
/// # Examples
///
/// ```
/// use mirror_pipeline::{EventKind, RemoteEvent};
///
/// let event = RemoteEvent::renamed("old.txt", "new.txt");
/// assert_eq!(event.kind(), EventKind::Renamed);
/// assert!(event.is_debounced());
/// assert!(!RemoteEvent::created("new.txt").is_debounced());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteEvent {
    /// An entry appeared.
    Created {
        /// Raw path of the new entry.
        path: String,
    },
    /// An entry's content or metadata changed.
    Changed {
        /// Raw path of the changed entry.
        path: String,
    },
    /// An entry moved.
    Renamed {
        /// Raw path before the move.
        from: String,
        /// Raw path after the move.
        to: String,
    },
    /// An entry disappeared.
    Deleted {
        /// Raw path of the removed entry.
        path: String,
    },
}

impl RemoteEvent {
    /// Creates a [`RemoteEvent::Created`].
    #[must_use]
    pub fn created(path: impl Into<String>) -> Self {
        Self::Created { path: path.into() }
    }

    /// Creates a [`RemoteEvent::Changed`].
    #[must_use]
    pub fn changed(path: impl Into<String>) -> Self {
        Self::Changed { path: path.into() }
    }

    /// Creates a [`RemoteEvent::Renamed`].
    #[must_use]
    pub fn renamed(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::Renamed {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Creates a [`RemoteEvent::Deleted`].
    #[must_use]
    pub fn deleted(path: impl Into<String>) -> Self {
        Self::Deleted { path: path.into() }
    }

    /// Returns the kind of this event.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Created { .. } => EventKind::Created,
            Self::Changed { .. } => EventKind::Changed,
            Self::Renamed { .. } => EventKind::Renamed,
            Self::Deleted { .. } => EventKind::Deleted,
        }
    }

    /// Returns `true` if this event waits out the debounce window.
    #[inline]
    #[must_use]
    pub const fn is_debounced(&self) -> bool {
        self.kind().is_debounced()
    }
}

impl fmt::Display for RemoteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created { path } | Self::Changed { path } | Self::Deleted { path } => {
                write!(f, "{} {path}", self.kind())
            }
            Self::Renamed { from, to } => write!(f, "renamed {from} -> {to}"),
        }
    }
}

/// The four kinds of remote notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// See [`RemoteEvent::Created`].
    Created,
    /// See [`RemoteEvent::Changed`].
    Changed,
    /// See [`RemoteEvent::Renamed`].
    Renamed,
    /// See [`RemoteEvent::Deleted`].
    Deleted,
}

impl EventKind {
    /// Returns a lowercase label for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Changed => "changed",
            Self::Renamed => "renamed",
            Self::Deleted => "deleted",
        }
    }

    /// Renames and deletes are held for the debounce window so that an echo
    /// of a locally triggered mutation is not reflected straight back.
    #[must_use]
    pub const fn is_debounced(self) -> bool {
        matches!(self, Self::Renamed | Self::Deleted)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
