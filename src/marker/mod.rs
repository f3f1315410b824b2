// src/marker/mod.rs

//! Completion markers: durable evidence that a task already produced its
//! side effects.
//!
//! - [`MarkerStore`] is the two-operation contract (`exists`, `write`).
//! - [`fs`] stores markers as small files through the [`crate::fs::FileSystem`]
//!   abstraction (a mounted bucket, a local directory, or a mock).
//! - [`memory`] keeps markers in memory (tests, dry runs).
//! - [`retry`] wraps store calls in bounded exponential backoff.
//!
//! Markers are never deleted by the orchestrator.

use std::fmt::{self, Debug};
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

pub mod fs;
pub mod memory;
pub mod retry;

pub use fs::FsMarkerStore;
pub use memory::InMemoryMarkerStore;
pub use retry::{with_retry, RetryPolicy};

/// Path-like identifier of a marker, e.g. `s3://bucket/out/Characterize`.
///
/// Repeated slashes are collapsed and trailing slashes removed, so
/// `base/` joined with `/task` and `base/task` name the same marker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkerPath(String);

impl MarkerPath {
    pub fn new(path: impl AsRef<str>) -> Self {
        let raw = path.as_ref().trim();
        let (scheme, rest) = match raw.split_once("://") {
            Some((scheme, rest)) => (Some(scheme), rest),
            None => (None, raw),
        };

        let leading = rest.starts_with('/');
        let body = rest
            .split('/')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/");

        let normalized = match scheme {
            Some(scheme) => format!("{scheme}://{body}"),
            None if leading => format!("/{body}"),
            None => body,
        };
        Self(normalized)
    }

    /// Append a segment: `base/path` + `segment` -> `base/path/segment`.
    pub fn join(&self, segment: impl AsRef<str>) -> Self {
        Self::new(format!("{}/{}", self.0, segment.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path without any `scheme://` prefix.
    pub fn key(&self) -> &str {
        match self.0.split_once("://") {
            Some((_, rest)) => rest,
            None => self.0.trim_start_matches('/'),
        }
    }
}

impl fmt::Display for MarkerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The backing store could not be reached (or refused the operation).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("marker store unavailable at '{path}': {message}")]
pub struct StorageError {
    pub path: String,
    pub message: String,
}

impl StorageError {
    pub fn new(path: &MarkerPath, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Durable storage for completion markers.
///
/// Implementations must be safe under concurrent access to the same path;
/// `write` is idempotent, so last-write-wins is acceptable.
pub trait MarkerStore: Send + Sync + Debug {
    /// Whether a marker exists at `path`. Must not answer from a cache.
    fn exists<'a>(&'a self, path: &'a MarkerPath) -> StoreFuture<'a, bool>;

    /// Create the marker at `path` with opaque `metadata`.
    ///
    /// Writing a marker that already exists is a successful no-op.
    fn write<'a>(&'a self, path: &'a MarkerPath, metadata: &'a str) -> StoreFuture<'a, ()>;
}
