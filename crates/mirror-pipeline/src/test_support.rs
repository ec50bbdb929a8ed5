//! In-memory collaborators for unit tests.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mirror_core::{FxHashMap, FxHashSet, RelativePath};
use parking_lot::Mutex;

use crate::backend::{DirectoryEntry, PlaceholderBackend, RemoteReadService};
use crate::error::BackendError;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateOrUpdateDirectory(String),
    CreateOrUpdateFile(String),
    UpdateDirectory(String),
    UpdateFile(String),
    RenameDirectory(String, String),
    RenameFile(String, String),
    Delete(String),
}

impl Call {
    fn paths(&self) -> (&str, Option<&str>) {
        match self {
            Self::CreateOrUpdateDirectory(p)
            | Self::CreateOrUpdateFile(p)
            | Self::UpdateDirectory(p)
            | Self::UpdateFile(p)
            | Self::Delete(p) => (p, None),
            Self::RenameDirectory(from, to) | Self::RenameFile(from, to) => (from, Some(to)),
        }
    }

    const fn name(&self) -> &'static str {
        match self {
            Self::CreateOrUpdateDirectory(_) => "create_or_update_directory",
            Self::CreateOrUpdateFile(_) => "create_or_update_file",
            Self::UpdateDirectory(_) => "update_directory",
            Self::UpdateFile(_) => "update_file",
            Self::RenameDirectory(..) => "rename_directory",
            Self::RenameFile(..) => "rename_file",
            Self::Delete(_) => "delete",
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.paths() {
            (path, None) => write!(f, "{} {path}", self.name()),
            (from, Some(to)) => write!(f, "{} {from} -> {to}", self.name()),
        }
    }
}

/// Renders calls one per line, for snapshots.
pub fn render(calls: &[Call]) -> String {
    calls
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// A backend that records every call.
///
/// Calls on paths registered with [`fail_on`](Self::fail_on) return an error;
/// calls on paths registered with [`panic_on`](Self::panic_on) panic. With a
/// delay set, every async call sleeps while holding its place in the
/// per-path concurrency counter.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<Call>>,
    failing: Mutex<FxHashSet<String>>,
    panicking: Mutex<FxHashSet<String>>,
    delay: Mutex<Option<Duration>>,
    active: Mutex<FxHashMap<String, usize>>,
    max_active_per_path: AtomicUsize,
    max_active_total: AtomicUsize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        let backend = Self::default();
        *backend.delay.lock() = Some(delay);
        backend
    }

    pub fn fail_on(&self, path: &str) {
        self.failing.lock().insert(path.to_owned());
    }

    pub fn panic_on(&self, path: &str) {
        self.panicking.lock().insert(path.to_owned());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn rendered(&self) -> String {
        render(&self.calls.lock())
    }

    /// Highest number of calls seen running at once on a single path.
    pub fn max_active_per_path(&self) -> usize {
        self.max_active_per_path.load(Ordering::SeqCst)
    }

    /// Highest number of calls seen running at once on any paths.
    pub fn max_active_total(&self) -> usize {
        self.max_active_total.load(Ordering::SeqCst)
    }

    #[allow(clippy::panic)]
    fn record(&self, call: Call) -> Result<(), BackendError> {
        let (path, to) = call.paths();
        let path = path.to_owned();
        let to = to.map(str::to_owned);
        self.calls.lock().push(call);

        let involved = |set: &FxHashSet<String>| {
            set.contains(&path) || to.as_ref().is_some_and(|to| set.contains(to))
        };
        if involved(&self.panicking.lock()) {
            panic!("injected panic on {path}");
        }
        if involved(&self.failing.lock()) {
            return Err(BackendError::rejected(
                RelativePath::from_normalized(path),
                "injected failure",
            ));
        }
        Ok(())
    }

    async fn enter(&self, call: Call) -> Result<(), BackendError> {
        let key = call.paths().0.to_owned();
        {
            let mut active = self.active.lock();
            let count = active.entry(key.clone()).or_default();
            *count += 1;
            self.max_active_per_path.fetch_max(*count, Ordering::SeqCst);
            let total = active.values().sum();
            self.max_active_total.fetch_max(total, Ordering::SeqCst);
        }

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.record(call);

        let mut active = self.active.lock();
        if let Some(count) = active.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                active.remove(&key);
            }
        }
        result
    }
}

#[async_trait]
impl PlaceholderBackend for RecordingBackend {
    async fn create_or_update_directory(&self, path: &RelativePath) -> Result<(), BackendError> {
        self.enter(Call::CreateOrUpdateDirectory(path.to_string())).await
    }

    async fn create_or_update_file(&self, path: &RelativePath) -> Result<(), BackendError> {
        self.enter(Call::CreateOrUpdateFile(path.to_string())).await
    }

    async fn update_directory(&self, path: &RelativePath) -> Result<(), BackendError> {
        self.enter(Call::UpdateDirectory(path.to_string())).await
    }

    async fn update_file(&self, path: &RelativePath) -> Result<(), BackendError> {
        self.enter(Call::UpdateFile(path.to_string())).await
    }

    async fn rename_directory(&self, from: &RelativePath, to: &RelativePath) -> Result<(), BackendError> {
        self.enter(Call::RenameDirectory(from.to_string(), to.to_string()))
            .await
    }

    async fn rename_file(&self, from: &RelativePath, to: &RelativePath) -> Result<(), BackendError> {
        self.enter(Call::RenameFile(from.to_string(), to.to_string()))
            .await
    }

    fn delete(&self, path: &RelativePath) -> Result<(), BackendError> {
        self.record(Call::Delete(path.to_string()))
    }
}

/// A read service backed by in-memory sets.
///
/// A path is a directory if it was registered with
/// [`with_directory`](Self::with_directory) or given a listing.
#[derive(Debug, Default)]
pub struct MapReadService {
    directories: FxHashSet<String>,
    listings: FxHashMap<String, Vec<DirectoryEntry>>,
    failing: FxHashSet<String>,
}

impl MapReadService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_directory(mut self, path: &str) -> Self {
        self.directories.insert(path.to_owned());
        self
    }

    pub fn with_listing(mut self, path: &str, entries: Vec<DirectoryEntry>) -> Self {
        self.directories.insert(path.to_owned());
        self.listings.insert(path.to_owned(), entries);
        self
    }

    pub fn with_failing_listing(mut self, path: &str) -> Self {
        self.failing.insert(path.to_owned());
        self
    }
}

impl RemoteReadService for MapReadService {
    fn is_directory(&self, path: &RelativePath) -> bool {
        self.directories.contains(path.as_str())
    }

    fn enumerate_files(&self, directory: &RelativePath) -> Result<Vec<DirectoryEntry>, BackendError> {
        if self.failing.contains(directory.as_str()) {
            return Err(BackendError::Unavailable(format!("cannot list {directory}")));
        }
        Ok(self
            .listings
            .get(directory.as_str())
            .cloned()
            .unwrap_or_default())
    }
}
