// src/output/mod.rs

//! Output-location guard invoked around a job run.
//!
//! Before the job: refuse to run if the output location already exists, so a
//! partial previous attempt is never silently overwritten. After the job:
//! duplicate every visible output file with an extra extension (e.g. `.csv`)
//! for downstream consumers.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::fs::FileSystem;
use crate::marker::MarkerPath;

/// Pre-check / post-copy contract around a job's output location.
pub trait OutputGuard: Send + Sync + Debug {
    /// `Err(message)` if `location` must not be written to.
    fn pre_check(&self, location: &str) -> std::result::Result<(), String>;

    /// Copy every visible file under `location` to `<file><extension>`.
    /// Returns the number of copies made.
    fn post_process(&self, location: &str, extension: &str) -> Result<usize>;
}

/// Output guard over a [`FileSystem`] rooted at `root`.
///
/// Locations are mapped the same way as marker paths: any `scheme://` prefix
/// is dropped and the rest is joined onto `root`.
#[derive(Debug, Clone)]
pub struct FsOutputGuard {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
}

impl FsOutputGuard {
    pub fn new(fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }

    pub fn local_path(&self, location: &str) -> PathBuf {
        let key = MarkerPath::new(location);
        self.root.join(key.key())
    }

    fn collect_files(&self, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        for entry in self.fs.read_dir(dir)? {
            if self.fs.is_dir(&entry) {
                self.collect_files(&entry, out)?;
            } else if self.fs.is_file(&entry) {
                out.push(entry);
            }
        }
        Ok(())
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_none_or(|n| n.starts_with('.'))
}

impl OutputGuard for FsOutputGuard {
    fn pre_check(&self, location: &str) -> std::result::Result<(), String> {
        let path = self.local_path(location);
        if self.fs.exists(&path) {
            return Err(format!(
                "output location {location} already exists ({}); refusing to overwrite",
                path.display()
            ));
        }
        Ok(())
    }

    fn post_process(&self, location: &str, extension: &str) -> Result<usize> {
        let path = self.local_path(location);
        let mut files = Vec::new();
        if self.fs.is_dir(&path) {
            self.collect_files(&path, &mut files)?;
        } else if self.fs.is_file(&path) {
            files.push(path.clone());
        } else {
            debug!(location, "no output produced; nothing to copy");
            return Ok(0);
        }

        let mut copied = 0;
        for file in files {
            if is_hidden(&file) {
                continue;
            }
            let mut name = file.as_os_str().to_owned();
            if name.to_string_lossy().ends_with(extension) {
                continue;
            }
            name.push(extension);
            let target = PathBuf::from(name);
            if self.fs.exists(&target) {
                continue;
            }
            self.fs.copy(&file, &target)?;
            copied += 1;
        }

        info!(location, extension, copied, "duplicated output files");
        Ok(copied)
    }
}
