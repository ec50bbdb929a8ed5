//! Reserved-path classification.
//!
//! Some areas of the remote filesystem belong to the device's operating
//! system (trash folders, per-app private storage, thumbnail caches). Creation
//! events inside those areas are dropped before any mutation is queued.
//!
//! # Examples
//!
//! ```
//! use mirror_core::{PrefixReserved, RelativePath, ReservedFilter};
//!
//! let reserved = PrefixReserved::default();
//! assert!(reserved.is_reserved(&RelativePath::from_normalized("Android/data/com.app/cache")));
//! assert!(!reserved.is_reserved(&RelativePath::from_normalized("DCIM/Camera/img.jpg")));
//! ```

use smallvec::SmallVec;

use crate::path::{PathNormalizer, RelativePath};

/// Reserved prefixes used when nothing else is configured.
pub const DEFAULT_RESERVED_PREFIXES: &[&str] = &[".Trash", "Android/data", "Android/obb", ".thumbnails"];

/// Classifies paths that must never be mirrored.
///
/// Filters are shared between the event-receiving task and test code, so they
/// must be [`Send`] and [`Sync`].
pub trait ReservedFilter: Send + Sync + 'static {
    /// Returns `true` if the path belongs to a reserved area.
    fn is_reserved(&self, path: &RelativePath) -> bool;
}

/// A filter that reserves nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReserved;

impl ReservedFilter for NoReserved {
    #[inline]
    fn is_reserved(&self, _path: &RelativePath) -> bool {
        false
    }
}

/// Reserves every path equal to or underneath one of a set of prefixes.
///
/// Matching is segment-aware (`Android/data` does not reserve
/// `Android/database`) and ignores ASCII case, since device vendors are not
/// consistent about the spelling of these directories.
#[derive(Debug, Clone)]
pub struct PrefixReserved {
    prefixes: SmallVec<[RelativePath; 4]>,
}

impl PrefixReserved {
    /// Creates a filter from already-normalized prefixes.
    #[must_use]
    pub fn new(prefixes: impl IntoIterator<Item = RelativePath>) -> Self {
        Self {
            prefixes: prefixes
                .into_iter()
                .filter(|prefix| !prefix.is_root())
                .map(|prefix| RelativePath::from_normalized(prefix.as_str().to_ascii_lowercase()))
                .collect(),
        }
    }

    /// Creates a filter from raw prefix strings, normalizing each one.
    #[must_use]
    pub fn from_raw<N: PathNormalizer>(normalizer: &N, prefixes: &[String]) -> Self {
        Self::new(prefixes.iter().map(|raw| normalizer.normalize(raw)))
    }

    /// Returns the configured prefixes.
    #[must_use]
    pub fn prefixes(&self) -> &[RelativePath] {
        &self.prefixes
    }
}

impl Default for PrefixReserved {
    fn default() -> Self {
        Self::new(
            DEFAULT_RESERVED_PREFIXES
                .iter()
                .map(|p| RelativePath::from_normalized(*p)),
        )
    }
}

impl ReservedFilter for PrefixReserved {
    fn is_reserved(&self, path: &RelativePath) -> bool {
        if self.prefixes.is_empty() || path.is_root() {
            return false;
        }
        let folded = RelativePath::from_normalized(path.as_str().to_ascii_lowercase());
        self.prefixes.iter().any(|prefix| folded.starts_with(prefix))
    }
}

/// Combines several filters; a path is reserved if any of them reserves it.
///
/// An empty composite reserves nothing.
#[derive(Default)]
pub struct AnyReserved {
    filters: Vec<Box<dyn ReservedFilter>>,
}

impl AnyReserved {
    /// Creates an empty composite.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter to the composite.
    #[must_use]
    pub fn or<F: ReservedFilter>(mut self, filter: F) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Returns the number of filters in the composite.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns `true` if the composite has no filters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl std::fmt::Debug for AnyReserved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyReserved")
            .field("filters", &self.filters.len())
            .finish()
    }
}

impl ReservedFilter for AnyReserved {
    fn is_reserved(&self, path: &RelativePath) -> bool {
        self.filters.iter().any(|filter| filter.is_reserved(path))
    }
}
