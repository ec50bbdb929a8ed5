//! Read-side queries answered from a local directory.

use std::io;

use camino::Utf8Path;
use ignore::WalkBuilder;
use mirror_core::RelativePath;
use mirror_pipeline::{BackendError, DirectoryEntry, RemoteReadService};

use crate::error::FsError;
use crate::root::MirrorRoot;

/// Answers [`RemoteReadService`] queries from the remote root on disk.
#[derive(Debug, Clone)]
pub struct LocalReadService {
    root: MirrorRoot,
}

impl LocalReadService {
    /// Creates a read service over `root`.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::RootNotFound`] if `root` is not a directory.
    pub fn new(root: &Utf8Path) -> Result<Self, FsError> {
        Ok(Self {
            root: MirrorRoot::open(root)?,
        })
    }

    /// Builds a single-level walker that sees every entry.
    ///
    /// Hidden files and entries matched by ignore files are part of the remote
    /// filesystem, so none of the standard filters apply.
    fn build_walker(dir: &Utf8Path) -> ignore::Walk {
        WalkBuilder::new(dir)
            .standard_filters(false)
            .max_depth(Some(1))
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build()
    }
}

impl RemoteReadService for LocalReadService {
    fn is_directory(&self, path: &RelativePath) -> bool {
        self.root.resolve(path).is_dir()
    }

    fn enumerate_files(&self, directory: &RelativePath) -> Result<Vec<DirectoryEntry>, BackendError> {
        let dir = self.root.resolve(directory);
        if !dir.is_dir() {
            return Err(BackendError::not_found(directory.clone()));
        }

        let mut entries = Vec::new();
        for entry in Self::build_walker(&dir) {
            let entry = entry.map_err(|err| BackendError::io(directory.clone(), io::Error::other(err)))?;
            if entry.depth() == 0 {
                continue;
            }
            let relative = match self.root.relativize(entry.path()) {
                Ok(relative) => RelativePath::from_normalized(relative),
                Err(error) => {
                    tracing::warn!(error = %error, "Skipping directory entry");
                    continue;
                }
            };
            let is_directory = entry.file_type().is_some_and(|kind| kind.is_dir());
            entries.push(DirectoryEntry {
                path: relative,
                is_directory,
            });
        }

        tracing::trace!(directory = %directory, entries = entries.len(), "Listed directory");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn service() -> (TempDir, LocalReadService) {
        let dir = TempDir::new().expect("temp dir");
        let service = LocalReadService::new(Utf8Path::from_path(dir.path()).expect("utf-8")).expect("service");
        (dir, service)
    }

    fn rel(path: &str) -> RelativePath {
        RelativePath::from_normalized(path)
    }

    #[test]
    fn test_is_directory() {
        let (dir, service) = service();
        fs::create_dir(dir.path().join("Music")).expect("mkdir");
        fs::write(dir.path().join("notes.txt"), b"hi").expect("write");

        assert!(service.is_directory(&rel("Music")));
        assert!(!service.is_directory(&rel("notes.txt")));
        assert!(!service.is_directory(&rel("missing")));
        assert!(service.is_directory(&RelativePath::root()));
    }

    #[test]
    fn test_enumerate_lists_one_level_including_hidden() {
        let (dir, service) = service();
        let music = dir.path().join("Music");
        fs::create_dir_all(music.join("Albums/Deep")).expect("mkdir");
        fs::write(music.join("b.mp3"), b"").expect("write");
        fs::write(music.join("a.mp3"), b"").expect("write");
        fs::write(music.join(".hidden"), b"").expect("write");
        fs::write(music.join(".gitignore"), b"*.mp3\n").expect("write");
        fs::write(music.join("Albums/Deep/c.mp3"), b"").expect("write");

        let entries = service.enumerate_files(&rel("Music")).expect("list");
        let listed: Vec<(&str, bool)> = entries
            .iter()
            .map(|entry| (entry.path.as_str(), entry.is_directory))
            .collect();

        assert_eq!(
            listed,
            vec![
                ("Music/.gitignore", false),
                ("Music/.hidden", false),
                ("Music/Albums", true),
                ("Music/a.mp3", false),
                ("Music/b.mp3", false),
            ]
        );
    }

    #[test]
    fn test_enumerate_missing_directory_is_not_found() {
        let (_dir, service) = service();
        let err = service.enumerate_files(&rel("nope")).expect_err("missing");
        assert!(matches!(err, BackendError::NotFound(_)));
    }
}
