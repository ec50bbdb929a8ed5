//! Canonical relative paths.
//!
//! Every path that enters the pipeline from the remote side goes through a
//! [`PathNormalizer`] exactly once. The resulting [`RelativePath`] is the key
//! for per-path locks and the correlation key for queued mutations, so two
//! spellings of the same remote entry must produce the same string.
//!
//! # Examples
//!
//! ```
//! use mirror_core::{DefaultNormalizer, PathNormalizer};
//!
//! let normalizer = DefaultNormalizer::default();
//! let a = normalizer.normalize("\\DCIM\\Camera\\");
//! let b = normalizer.normalize("/DCIM//./Camera");
//! assert_eq!(a, b);
//! assert_eq!(a.as_str(), "DCIM/Camera");
//! ```

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Separator used by every [`RelativePath`].
pub const SEPARATOR: char = '/';

/// A normalized path relative to the sync root.
///
/// The empty path denotes the root itself. A `RelativePath` never starts or
/// ends with a separator and never contains empty, `.` or `..` segments when
/// produced by [`DefaultNormalizer`].
///
/// Ordering is plain lexicographic ordering on the underlying string; the lock
/// manager relies on it as the global acquisition order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelativePath(String);

impl RelativePath {
    /// Wraps a string that is already in canonical form.
    ///
    /// Callers are responsible for canonical form; use a [`PathNormalizer`]
    /// for anything that came from the remote side.
    #[inline]
    #[must_use]
    pub fn from_normalized(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The root of the sync tree.
    #[inline]
    #[must_use]
    pub const fn root() -> Self {
        Self(String::new())
    }

    /// Returns the path as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this is the sync root.
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the final segment, or `None` for the root.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit(SEPARATOR).next()
    }

    /// Returns the parent path, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(match self.0.rfind(SEPARATOR) {
            Some(idx) => Self(self.0[..idx].to_owned()),
            None => Self::root(),
        })
    }

    /// Appends a single canonical segment.
    #[must_use]
    pub fn join(&self, segment: &str) -> Self {
        if self.is_root() {
            Self(segment.to_owned())
        } else {
            Self(format!("{}{SEPARATOR}{segment}", self.0))
        }
    }

    /// Iterates over the segments of the path.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR).filter(|s| !s.is_empty())
    }

    /// Returns `true` if `self` equals `ancestor` or lies underneath it.
    #[must_use]
    pub fn starts_with(&self, ancestor: &Self) -> bool {
        if ancestor.is_root() {
            return true;
        }
        self.0 == ancestor.0
            || (self.0.starts_with(&ancestor.0)
                && self.0[ancestor.0.len()..].starts_with(SEPARATOR))
    }

    /// Consumes the path and returns the inner string.
    #[inline]
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl AsRef<str> for RelativePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for RelativePath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Produces canonical [`RelativePath`]s from raw remote paths.
///
/// Implementations must be pure: the same input always yields the same output
/// and nothing else is observed or changed.
pub trait PathNormalizer: Send + Sync + 'static {
    /// Normalizes a raw path reported by the remote side.
    fn normalize(&self, raw: &str) -> RelativePath;
}

/// The default normalization rules.
///
/// - `\` is treated as a separator and rewritten to `/`
/// - empty and `.` segments are dropped
/// - `..` removes the previous segment and never climbs above the root
/// - leading and trailing separators are removed
/// - with `fold_case`, the result is lower-cased
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultNormalizer {
    fold_case: bool,
}

impl DefaultNormalizer {
    /// Creates a normalizer, optionally folding case.
    #[inline]
    #[must_use]
    pub const fn new(fold_case: bool) -> Self {
        Self { fold_case }
    }

    /// Returns `true` if this normalizer lower-cases paths.
    #[inline]
    #[must_use]
    pub const fn folds_case(&self) -> bool {
        self.fold_case
    }
}

impl PathNormalizer for DefaultNormalizer {
    fn normalize(&self, raw: &str) -> RelativePath {
        let mut segments: SmallVec<[&str; 8]> = SmallVec::new();
        for segment in raw.split(['/', '\\']) {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                other => segments.push(other),
            }
        }

        let joined = segments.join("/");
        if self.fold_case {
            RelativePath(joined.to_lowercase())
        } else {
            RelativePath(joined)
        }
    }
}
