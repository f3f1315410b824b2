use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use batchdag::marker::{InMemoryMarkerStore, MarkerPath, MarkerStore, StorageError, StoreFuture};

/// Marker store that fails a scripted number of calls before delegating to
/// an [`InMemoryMarkerStore`]. `u32::MAX` failures means "always down".
#[derive(Debug, Clone, Default)]
pub struct FlakyMarkerStore {
    inner: InMemoryMarkerStore,
    exists_failures: Arc<AtomicU32>,
    write_failures: Arc<AtomicU32>,
    exists_calls: Arc<AtomicUsize>,
    write_calls: Arc<AtomicUsize>,
}

impl FlakyMarkerStore {
    pub fn new(inner: InMemoryMarkerStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// The next `n` calls to `exists` fail.
    pub fn fail_exists(&self, n: u32) {
        self.exists_failures.store(n, Ordering::SeqCst);
    }

    /// The next `n` calls to `write` fail.
    pub fn fail_writes(&self, n: u32) {
        self.write_failures.store(n, Ordering::SeqCst);
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &InMemoryMarkerStore {
        &self.inner
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                u32::MAX => Some(u32::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

impl MarkerStore for FlakyMarkerStore {
    fn exists<'a>(&'a self, path: &'a MarkerPath) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            self.exists_calls.fetch_add(1, Ordering::SeqCst);
            if Self::take_failure(&self.exists_failures) {
                return Err(StorageError::new(path, "connection reset"));
            }
            self.inner.exists(path).await
        })
    }

    fn write<'a>(&'a self, path: &'a MarkerPath, metadata: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.write_calls.fetch_add(1, Ordering::SeqCst);
            if Self::take_failure(&self.write_failures) {
                return Err(StorageError::new(path, "connection reset"));
            }
            self.inner.write(path, metadata).await
        })
    }
}
