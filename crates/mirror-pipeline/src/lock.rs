//! Per-path exclusive locks.
//!
//! [`PathLockManager`] hands out scoped [`PathLock`] guards keyed by
//! [`RelativePath`]. Distinct paths never contend; the same path is granted to
//! one holder at a time, in FIFO order of the waiters (tokio's mutex is fair).
//!
//! # Table
//!
//! ```text
//! parking_lot::Mutex<FxHashMap<RelativePath, Arc<tokio::sync::Mutex<()>>>>
//!                                   │
//!                 one slot per path that is held or awaited
//! ```
//!
//! A slot is created by the first claimant and removed by the last one to
//! leave, so the table never outgrows the set of paths currently in use.
//! Every claimant keeps an `Arc` to its slot. A departing claimant that finds,
//! under the table mutex, no reference besides the table's and its own removes
//! the slot.
//!
//! # Deadlock avoidance
//!
//! Two-path acquisition ([`PathLockManager::lock_pair`]) always locks in
//! lexicographic order of the normalized paths, so concurrent renames
//! `A -> B` and `B -> A` cannot wait on each other.

use std::fmt;
use std::sync::Arc;

use mirror_core::{FxHashMap, RelativePath};
use smallvec::SmallVec;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slot = Arc<Mutex<()>>;

#[derive(Debug, Default)]
struct LockTable {
    slots: parking_lot::Mutex<FxHashMap<RelativePath, Slot>>,
}

/// Grants exclusive, scoped locks on relative paths.
///
/// Cloning is cheap and every clone shares the same table.
///
/// # Examples
///
/// ```
/// use mirror_core::RelativePath;
/// use mirror_pipeline::PathLockManager;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let locks = PathLockManager::new();
/// let path = RelativePath::from_normalized("DCIM/a.jpg");
/// {
///     let _guard = locks.lock(&path).await;
///     assert!(locks.is_locked(&path));
/// }
/// assert!(!locks.is_locked(&path));
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct PathLockManager {
    table: Arc<LockTable>,
}

impl PathLockManager {
    /// Creates an empty lock manager.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks `path`, waiting until no other holder has it.
    ///
    /// Dropping the returned guard releases the lock. Dropping this future
    /// before it completes leaves no trace in the table.
    pub async fn lock(&self, path: &RelativePath) -> PathLock {
        let claim = self.claim(path);
        let guard = claim.acquire().await;
        tracing::trace!(path = %path, "Path lock acquired");
        PathLock {
            _guard: guard,
            claim,
        }
    }

    /// Locks two paths in canonical order.
    ///
    /// Equal paths are locked once.
    pub async fn lock_pair(&self, a: &RelativePath, b: &RelativePath) -> PathLockSet {
        let mut locks = SmallVec::new();
        if a == b {
            locks.push(self.lock(a).await);
        } else {
            let (first, second) = if a < b { (a, b) } else { (b, a) };
            locks.push(self.lock(first).await);
            locks.push(self.lock(second).await);
        }
        PathLockSet { locks }
    }

    /// Returns `true` if some holder currently has `path` locked.
    #[must_use]
    pub fn is_locked(&self, path: &RelativePath) -> bool {
        let slots = self.table.slots.lock();
        slots.get(path).is_some_and(|slot| slot.try_lock().is_err())
    }

    /// Returns the number of paths that are held or awaited.
    #[must_use]
    pub fn tracked_paths(&self) -> usize {
        self.table.slots.lock().len()
    }

    fn claim(&self, path: &RelativePath) -> Claim {
        let slot = {
            let mut slots = self.table.slots.lock();
            Arc::clone(slots.entry(path.clone()).or_default())
        };
        Claim {
            table: Arc::clone(&self.table),
            path: path.clone(),
            slot,
        }
    }
}

/// A reference to a table slot that cleans up after itself.
struct Claim {
    table: Arc<LockTable>,
    path: RelativePath,
    slot: Slot,
}

impl Claim {
    async fn acquire(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.slot).lock_owned().await
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut slots = self.table.slots.lock();
        // The table and this claim are the only references left.
        let unused = slots
            .get(&self.path)
            .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot) && Arc::strong_count(slot) == 2);
        if unused {
            slots.remove(&self.path);
        }
    }
}

/// An exclusive lock on one path, released on drop.
pub struct PathLock {
    // Declared before `claim`: the mutex must be released before the slot
    // reference is returned to the table.
    _guard: OwnedMutexGuard<()>,
    claim: Claim,
}

impl PathLock {
    /// Returns the locked path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &RelativePath {
        &self.claim.path
    }
}

impl fmt::Debug for PathLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathLock")
            .field("path", self.path())
            .finish_non_exhaustive()
    }
}

/// Locks acquired together by [`PathLockManager::lock_pair`].
#[derive(Debug)]
pub struct PathLockSet {
    locks: SmallVec<[PathLock; 2]>,
}

impl PathLockSet {
    /// Returns the locked paths in acquisition order.
    pub fn paths(&self) -> impl Iterator<Item = &RelativePath> {
        self.locks.iter().map(PathLock::path)
    }

    /// Returns the number of distinct paths held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns `true` if no path is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
