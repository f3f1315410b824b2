#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use batchdag::cluster::{ClusterCoordinator, ClusterSpec};
use batchdag::dag::{Scheduler, Task, TaskRegistry};
use batchdag::marker::{InMemoryMarkerStore, MarkerStore, RetryPolicy};
use batchdag::types::ClusterKind;
use batchdag_test_utils::{FakeJobRunner, RecordingClusterProvider};

/// Retries quickly so storage tests don't sleep for real backoffs.
pub fn fast_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts: attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

/// A pipeline wired to fakes: one shared job runner, an in-memory marker
/// store and a recording cluster provider.
pub struct Harness {
    pub runner: FakeJobRunner,
    pub markers: InMemoryMarkerStore,
    pub provider: RecordingClusterProvider,
    pub coordinator: Arc<ClusterCoordinator>,
    pub registry: TaskRegistry,
    pub parallel: bool,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_runner(FakeJobRunner::new())
    }

    pub fn with_runner(runner: FakeJobRunner) -> Self {
        let provider = RecordingClusterProvider::new();
        let coordinator = Arc::new(ClusterCoordinator::new(Arc::new(provider.clone())));
        Self {
            runner,
            markers: InMemoryMarkerStore::new(),
            provider,
            coordinator,
            registry: TaskRegistry::new(),
            parallel: false,
        }
    }

    /// A job task backed by the shared fake runner.
    pub fn job(&self, name: &str) -> Task {
        Task::job(name, Arc::new(self.runner.clone()))
    }

    pub fn add(&mut self, task: Task) {
        self.registry.insert(task).expect("task names are unique");
    }

    pub fn cluster(&self, id: &str, size: u32, kind: ClusterKind) {
        self.coordinator
            .register_cluster(ClusterSpec::new(id, size, kind));
    }

    pub fn scheduler(&self) -> Scheduler {
        self.scheduler_with_store(Arc::new(self.markers.clone()))
    }

    pub fn scheduler_with_store(&self, store: Arc<dyn MarkerStore>) -> Scheduler {
        Scheduler::new(
            Arc::new(self.registry.clone()),
            store,
            Arc::clone(&self.coordinator),
        )
        .with_retry_policy(fast_retry(3))
        .with_parallel(self.parallel)
    }
}
