use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::anyhow;
use batchdag::cluster::provider::TeardownFuture;
use batchdag::cluster::{ClusterProvider, ClusterSpec};
use parking_lot::Mutex;

/// A cluster provider that records teardown calls instead of stopping
/// anything. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct RecordingClusterProvider {
    calls: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<BTreeSet<String>>>,
}

impl RecordingClusterProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every teardown of `cluster` fail.
    pub fn fail_for(&self, cluster: &str) {
        self.failing.lock().insert(cluster.to_string());
    }

    /// Cluster ids passed to `teardown`, in call order (failed calls included).
    pub fn teardowns(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl ClusterProvider for RecordingClusterProvider {
    fn teardown<'a>(&'a self, cluster: &'a ClusterSpec) -> TeardownFuture<'a> {
        Box::pin(async move {
            self.calls.lock().push(cluster.id.clone());
            if self.failing.lock().contains(&cluster.id) {
                return Err(anyhow!("provider refused to stop {}", cluster.id));
            }
            Ok(())
        })
    }
}
