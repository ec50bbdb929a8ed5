//! Mapping between relative paths and a directory on disk.

use std::path::Path;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use mirror_core::RelativePath;

use crate::error::FsError;

/// A canonicalized directory that relative paths are resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRoot {
    root: Utf8PathBuf,
}

impl MirrorRoot {
    /// Opens an existing directory as a root.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::RootNotFound`] if `path` is not an existing
    /// directory, or [`FsError::Io`] if it cannot be canonicalized.
    pub fn open(path: &Utf8Path) -> Result<Self, FsError> {
        if !path.is_dir() {
            return Err(FsError::root_not_found(path));
        }
        let root = path.canonicalize_utf8()?;
        Ok(Self { root })
    }

    /// Returns the root directory.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the absolute location of `path` under this root.
    #[must_use]
    pub fn resolve(&self, path: &RelativePath) -> Utf8PathBuf {
        let mut resolved = self.root.clone();
        for segment in path.segments() {
            resolved.push(segment);
        }
        resolved
    }

    /// Returns `path` relative to this root, with `/` separators.
    ///
    /// The root itself yields an empty string.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::NonUtf8Path`] or [`FsError::OutsideRoot`] if the
    /// path cannot be expressed relative to the root.
    pub fn relativize(&self, path: &Path) -> Result<String, FsError> {
        let utf8 = Utf8Path::from_path(path).ok_or_else(|| FsError::NonUtf8Path(path.to_path_buf()))?;
        let rest = utf8
            .strip_prefix(&self.root)
            .map_err(|_| FsError::OutsideRoot {
                path: utf8.to_path_buf(),
                root: self.root.clone(),
            })?;

        let segments: Vec<&str> = rest
            .components()
            .filter_map(|component| match component {
                Utf8Component::Normal(segment) => Some(segment),
                _ => None,
            })
            .collect();
        Ok(segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn root() -> (TempDir, MirrorRoot) {
        let dir = TempDir::new().expect("temp dir");
        let path = Utf8Path::from_path(dir.path()).expect("utf-8 temp dir");
        let root = MirrorRoot::open(path).expect("open root");
        (dir, root)
    }

    #[test]
    fn test_open_rejects_missing_directory() {
        let err = MirrorRoot::open(Utf8Path::new("/nonexistent/mirror/root")).expect_err("missing");
        assert!(matches!(err, FsError::RootNotFound(_)));
    }

    #[test]
    fn test_resolve_and_relativize_agree() {
        let (_dir, root) = root();
        let rel = RelativePath::from_normalized("DCIM/Camera/a.jpg");

        let abs = root.resolve(&rel);
        assert!(abs.starts_with(root.path()));
        assert!(abs.ends_with("DCIM/Camera/a.jpg"));
        assert_eq!(root.relativize(abs.as_std_path()).expect("relativize"), "DCIM/Camera/a.jpg");
    }

    #[test]
    fn test_root_relativizes_to_empty() {
        let (_dir, root) = root();
        assert_eq!(root.resolve(&RelativePath::root()).as_path(), root.path());
        assert_eq!(root.relativize(root.path().as_std_path()).expect("relativize"), "");
    }

    #[test]
    fn test_relativize_rejects_outside_paths() {
        let (_dir, root) = root();
        let err = root.relativize(Path::new("/definitely/elsewhere")).expect_err("outside");
        assert!(err.is_recoverable());
    }
}
