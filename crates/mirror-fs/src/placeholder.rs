//! Placeholders materialized as empty files under a local root.
//!
//! A file placeholder is a zero-length file; a directory placeholder is a
//! plain directory. Refreshing a file truncates it, which stands in for
//! dropping hydrated content. Every operation is create-or-update, so
//! replaying or reordering calls converges on the same tree.

use std::io;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use mirror_core::RelativePath;
use mirror_pipeline::{BackendError, PlaceholderBackend};

use crate::error::FsError;
use crate::root::MirrorRoot;

/// A [`PlaceholderBackend`] writing stub entries under the local root.
#[derive(Debug, Clone)]
pub struct StubPlaceholderBackend {
    root: MirrorRoot,
}

impl StubPlaceholderBackend {
    /// Creates a backend writing under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::RootNotFound`] if `root` is not a directory.
    pub fn new(root: &Utf8Path) -> Result<Self, FsError> {
        Ok(Self {
            root: MirrorRoot::open(root)?,
        })
    }

    async fn write_file(&self, path: &RelativePath, truncate: bool) -> Result<(), BackendError> {
        let target = self.root.resolve(path);
        ensure_parent(path, &target).await?;
        tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(truncate)
            .open(&target)
            .await
            .map_err(|err| BackendError::io(path.clone(), err))?;
        tracing::trace!(path = %path, truncate, "File placeholder written");
        Ok(())
    }

    async fn make_directory(&self, path: &RelativePath) -> Result<(), BackendError> {
        let target = self.root.resolve(path);
        tokio::fs::create_dir_all(&target)
            .await
            .map_err(|err| BackendError::io(path.clone(), err))?;
        tracing::trace!(path = %path, "Directory placeholder written");
        Ok(())
    }

    async fn move_entry(
        &self,
        from: &RelativePath,
        to: &RelativePath,
        directory: bool,
    ) -> Result<(), BackendError> {
        if from.is_root() || to.is_root() {
            return Err(BackendError::rejected(from.clone(), "cannot move the sync root"));
        }
        let source = self.root.resolve(from);
        let target: Utf8PathBuf = self.root.resolve(to);
        ensure_parent(to, &target).await?;

        match tokio::fs::rename(&source, &target).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(from = %from, to = %to, "Rename source missing, creating target");
                if directory {
                    self.make_directory(to).await
                } else {
                    self.write_file(to, false).await
                }
            }
            Err(err) => Err(BackendError::io(from.clone(), err)),
        }
    }
}

async fn ensure_parent(path: &RelativePath, target: &Utf8Path) -> Result<(), BackendError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| BackendError::io(path.clone(), err))?;
    }
    Ok(())
}

#[async_trait]
impl PlaceholderBackend for StubPlaceholderBackend {
    async fn create_or_update_directory(&self, path: &RelativePath) -> Result<(), BackendError> {
        self.make_directory(path).await
    }

    async fn create_or_update_file(&self, path: &RelativePath) -> Result<(), BackendError> {
        self.write_file(path, false).await
    }

    async fn update_directory(&self, path: &RelativePath) -> Result<(), BackendError> {
        self.make_directory(path).await
    }

    async fn update_file(&self, path: &RelativePath) -> Result<(), BackendError> {
        self.write_file(path, true).await
    }

    async fn rename_directory(&self, from: &RelativePath, to: &RelativePath) -> Result<(), BackendError> {
        self.move_entry(from, to, true).await
    }

    async fn rename_file(&self, from: &RelativePath, to: &RelativePath) -> Result<(), BackendError> {
        self.move_entry(from, to, false).await
    }

    /// Removes the placeholder, recursively for directories.
    ///
    /// The removal runs on the calling thread. Inside the pipeline that is a
    /// tokio worker, which stays blocked until a large placeholder tree is
    /// gone.
    fn delete(&self, path: &RelativePath) -> Result<(), BackendError> {
        if path.is_root() {
            return Err(BackendError::rejected(path.clone(), "cannot delete the sync root"));
        }
        let target = self.root.resolve(path);
        let result = match std::fs::symlink_metadata(&target) {
            Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(&target),
            Ok(_) => std::fs::remove_file(&target),
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => {
                tracing::trace!(path = %path, "Placeholder removed");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(BackendError::io(path.clone(), err)),
        }
    }
}
