//! Fast hash map and hash set type aliases.
//!
//! The lock table and the in-memory collaborators are keyed by
//! [`RelativePath`](crate::RelativePath) strings, which is exactly the workload
//! the Fx hash from `rustc-hash` is tuned for. Keys come from a trusted remote
//! device, so denial-of-service resistance is not a concern here.
//!
//! # Examples
//!
//! ```
//! use mirror_core::{FxHashMap, fx_hash_map};
//!
//! let mut holders: FxHashMap<&str, usize> = fx_hash_map();
//! *holders.entry("docs/a.txt").or_default() += 1;
//! assert_eq!(holders.get("docs/a.txt"), Some(&1));
//! ```

/// A [`HashMap`](std::collections::HashMap) using the Fx hash algorithm.
pub type FxHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// A [`HashSet`](std::collections::HashSet) using the Fx hash algorithm.
pub type FxHashSet<V> = rustc_hash::FxHashSet<V>;

/// The hasher used by [`FxHashMap`] and [`FxHashSet`].
pub type FxBuildHasher = rustc_hash::FxBuildHasher;

/// Creates a new empty [`FxHashMap`].
#[inline]
#[must_use]
pub fn fx_hash_map<K, V>() -> FxHashMap<K, V> {
    FxHashMap::default()
}

/// Creates a new empty [`FxHashSet`].
#[inline]
#[must_use]
pub fn fx_hash_set<V>() -> FxHashSet<V> {
    FxHashSet::default()
}
