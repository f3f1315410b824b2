// src/marker/fs.rs

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use super::{MarkerPath, MarkerStore, StorageError, StoreFuture};
use crate::fs::FileSystem;

/// Marker store backed by a [`FileSystem`] rooted at `root`.
///
/// `s3://bucket/out/Task` maps to `<root>/bucket/out/Task`; scheme-less paths
/// map to `<root>/<path>`.
#[derive(Debug, Clone)]
pub struct FsMarkerStore {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
}

impl FsMarkerStore {
    pub fn new(fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }

    /// Local location of the marker for `path`.
    pub fn location_of(&self, path: &MarkerPath) -> PathBuf {
        self.root.join(path.key())
    }
}

impl MarkerStore for FsMarkerStore {
    fn exists<'a>(&'a self, path: &'a MarkerPath) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let location = self.location_of(path);
            if self.fs.is_dir(&location) {
                return Err(StorageError::new(
                    path,
                    format!("{} is a directory, not a marker", location.display()),
                ));
            }
            Ok(self.fs.is_file(&location))
        })
    }

    fn write<'a>(&'a self, path: &'a MarkerPath, metadata: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let location = self.location_of(path);
            if self.fs.is_file(&location) {
                debug!(marker = %path, "marker already present; write is a no-op");
                return Ok(());
            }

            self.fs
                .write(&location, metadata.as_bytes())
                .map_err(|e| StorageError::new(path, format!("{e:#}")))?;
            debug!(marker = %path, location = %location.display(), "marker written");
            Ok(())
        })
    }
}
