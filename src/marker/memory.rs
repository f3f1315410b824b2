// src/marker/memory.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{MarkerPath, MarkerStore, StoreFuture};

/// In-memory marker store. Clones share the same markers.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMarkerStore {
    markers: Arc<Mutex<BTreeMap<MarkerPath, String>>>,
    write_log: Arc<Mutex<Vec<MarkerPath>>>,
}

impl InMemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a marker, as if a previous run had written it.
    pub fn insert(&self, path: MarkerPath, metadata: impl Into<String>) {
        self.markers.lock().insert(path, metadata.into());
    }

    pub fn contains(&self, path: &MarkerPath) -> bool {
        self.markers.lock().contains_key(path)
    }

    pub fn metadata(&self, path: &MarkerPath) -> Option<String> {
        self.markers.lock().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.markers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.lock().is_empty()
    }

    /// Every marker that was newly created through [`MarkerStore::write`], in
    /// order. No-op writes of existing markers are not recorded.
    pub fn writes(&self) -> Vec<MarkerPath> {
        self.write_log.lock().clone()
    }
}

impl MarkerStore for InMemoryMarkerStore {
    fn exists<'a>(&'a self, path: &'a MarkerPath) -> StoreFuture<'a, bool> {
        Box::pin(async move { Ok(self.contains(path)) })
    }

    fn write<'a>(&'a self, path: &'a MarkerPath, metadata: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut markers = self.markers.lock();
            if !markers.contains_key(path) {
                markers.insert(path.clone(), metadata.to_string());
                self.write_log.lock().push(path.clone());
            }
            Ok(())
        })
    }
}
