//! Local-directory collaborators for the remote change pipeline.
//!
//! Lets the pipeline run end to end with a plain directory standing in for
//! the remote device:
//!
//! - [`LocalEventSource`] watches the remote root with `notify`
//! - [`LocalReadService`] answers file-or-directory and listing queries
//! - [`StubPlaceholderBackend`] writes empty placeholder entries under the
//!   local root
//!
//! # Usage
//!
//! ```no_run
//! use mirror_core::Config;
//! use mirror_fs::{LocalEventSource, local_collaborators};
//! use mirror_pipeline::RemotePipeline;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(config: Config) -> Result<(), Box<dyn std::error::Error>> {
//! let source = LocalEventSource::new(&config.mirror.remote_root)?;
//! let pipeline = RemotePipeline::start(
//!     source,
//!     local_collaborators(&config)?,
//!     &config.pipeline,
//!     &CancellationToken::new(),
//! );
//! // ...
//! let stats = pipeline.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod placeholder;
pub mod reader;
pub mod root;
pub mod watch;

use std::sync::Arc;

use mirror_core::Config;
use mirror_pipeline::Collaborators;

pub use error::FsError;
pub use placeholder::StubPlaceholderBackend;
pub use reader::LocalReadService;
pub use root::MirrorRoot;
pub use watch::{LocalEventSource, RenamePairer};

/// Builds the local collaborators described by `config`.
///
/// # Errors
///
/// Returns [`FsError::RootNotFound`] if either mirror root is missing.
pub fn local_collaborators(config: &Config) -> Result<Collaborators, FsError> {
    Ok(Collaborators {
        backend: Arc::new(StubPlaceholderBackend::new(&config.mirror.local_root)?),
        reader: Arc::new(LocalReadService::new(&config.mirror.remote_root)?),
        normalizer: Arc::new(config.paths.normalizer()),
        reserved: Arc::new(config.paths.reserved_filter()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    use camino::Utf8PathBuf;
    use mirror_pipeline::RemotePipeline;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    const SETTLE: Duration = Duration::from_secs(5);

    fn utf8(path: &Path) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(path.to_path_buf()).expect("utf-8 temp dir")
    }

    fn config(remote: &TempDir, local: &TempDir) -> Config {
        let mut config = Config::default();
        config.mirror.remote_root = utf8(remote.path());
        config.mirror.local_root = utf8(local.path());
        config.pipeline.debounce_ms = 100;
        config
    }

    fn start(config: &Config) -> RemotePipeline {
        RemotePipeline::start(
            LocalEventSource::new(&config.mirror.remote_root).expect("source"),
            local_collaborators(config).expect("collaborators"),
            &config.pipeline,
            &CancellationToken::new(),
        )
    }

    /// Polls until `condition` holds, for at most [`SETTLE`].
    async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
        tokio::time::timeout(SETTLE, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .is_ok()
    }

    /// Touches a marker file until its placeholder shows up, so the watcher
    /// is known to be registered before the test changes anything.
    async fn wait_until_watching(remote: &Path, local: &Path) {
        let marker = local.join(".watch-ready");
        let ready = tokio::time::timeout(SETTLE, async {
            while !marker.exists() {
                fs::write(remote.join(".watch-ready"), b"").expect("write marker");
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        assert!(ready.is_ok(), "watcher never delivered an event");
    }

    #[test]
    fn test_collaborators_require_roots() {
        let remote = TempDir::new().expect("temp dir");
        let mut config = Config::default();
        config.mirror.remote_root = utf8(remote.path());
        config.mirror.local_root = Utf8PathBuf::from("/nonexistent/local/root");

        let err = local_collaborators(&config).expect_err("missing local root");
        assert!(matches!(err, FsError::RootNotFound(_)));
    }

    #[tokio::test]
    async fn test_remote_file_appears_as_placeholder() {
        let remote = TempDir::new().expect("temp dir");
        let local = TempDir::new().expect("temp dir");
        let config = config(&remote, &local);
        let pipeline = start(&config);
        wait_until_watching(remote.path(), local.path()).await;

        fs::write(remote.path().join("photo.jpg"), b"remote bytes").expect("write");

        let placeholder = local.path().join("photo.jpg");
        let appeared = eventually(|| placeholder.exists()).await;
        let stats = pipeline.shutdown().await.expect("shutdown");

        assert!(appeared, "placeholder never appeared");
        assert_eq!(fs::metadata(&placeholder).expect("meta").len(), 0);
        assert!(stats.succeeded >= 2);
    }

    #[tokio::test]
    async fn test_remote_file_rename_moves_placeholder() {
        let remote = TempDir::new().expect("temp dir");
        let local = TempDir::new().expect("temp dir");
        fs::write(remote.path().join("a.txt"), b"remote").expect("write");
        fs::write(local.path().join("a.txt"), b"hydrated").expect("write");

        let config = config(&remote, &local);
        let pipeline = start(&config);
        wait_until_watching(remote.path(), local.path()).await;

        fs::rename(remote.path().join("a.txt"), remote.path().join("b.txt")).expect("rename");

        let old = local.path().join("a.txt");
        let new = local.path().join("b.txt");
        let moved = eventually(|| new.exists() && !old.exists()).await;
        pipeline.shutdown().await.expect("shutdown");

        assert!(moved, "placeholder was not moved");
        // A move keeps hydrated content; a delete plus create would not.
        assert_eq!(fs::read(&new).expect("read"), b"hydrated");
    }

    #[tokio::test]
    async fn test_remote_directory_rename_keeps_children() {
        let remote = TempDir::new().expect("temp dir");
        let local = TempDir::new().expect("temp dir");
        for dir in [remote.path(), local.path()] {
            fs::create_dir(dir.join("Album")).expect("mkdir");
            fs::write(dir.join("Album/song.mp3"), b"").expect("write");
        }

        let config = config(&remote, &local);
        let pipeline = start(&config);
        wait_until_watching(remote.path(), local.path()).await;

        fs::rename(remote.path().join("Album"), remote.path().join("Renamed")).expect("rename");

        let child = local.path().join("Renamed/song.mp3");
        let old = local.path().join("Album");
        let moved = eventually(|| child.exists() && !old.exists()).await;
        // Let any late delete from an unpaired half run before checking again.
        tokio::time::sleep(Duration::from_millis(500)).await;
        pipeline.shutdown().await.expect("shutdown");

        assert!(moved, "directory placeholder was not moved");
        assert!(child.exists(), "child placeholder lost by directory rename");
        assert!(!old.exists());
    }

    #[tokio::test]
    async fn test_remote_delete_removes_placeholder() {
        let remote = TempDir::new().expect("temp dir");
        let local = TempDir::new().expect("temp dir");
        fs::write(remote.path().join("old.txt"), b"").expect("write");
        fs::write(local.path().join("old.txt"), b"").expect("write");

        let config = config(&remote, &local);
        let pipeline = start(&config);
        wait_until_watching(remote.path(), local.path()).await;

        fs::remove_file(remote.path().join("old.txt")).expect("remove");

        let placeholder = local.path().join("old.txt");
        let removed = eventually(|| !placeholder.exists()).await;
        let stats = pipeline.shutdown().await.expect("shutdown");

        assert!(removed, "placeholder was not removed");
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_watcher() {
        let remote = TempDir::new().expect("temp dir");
        let local = TempDir::new().expect("temp dir");
        let config = config(&remote, &local);

        let pipeline = start(&config);
        let stopped = tokio::time::timeout(Duration::from_secs(5), pipeline.shutdown()).await;
        assert!(matches!(stopped, Ok(Ok(_))));
    }
}
