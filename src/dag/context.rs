// src/dag/context.rs

//! Everything one pipeline run shares between its tasks.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::cluster::ClusterCoordinator;
use crate::dag::registry::TaskRegistry;
use crate::dag::task::{RunState, TaskId, TaskOutcome};
use crate::marker::{with_retry, MarkerPath, MarkerStore, RetryPolicy, StorageError};

/// Run-scoped state: the task registry, marker store handle, cluster
/// coordinator, per-task memo and run states, and the cancellation token.
///
/// Create one per run. Reusing a context across runs would replay memoized
/// outcomes instead of re-checking markers.
#[derive(Debug)]
pub struct PipelineRunContext {
    registry: Arc<TaskRegistry>,
    markers: Arc<dyn MarkerStore>,
    retry: RetryPolicy,
    coordinator: Arc<ClusterCoordinator>,
    cancel: CancellationToken,
    parallel: bool,
    memo: Mutex<HashMap<TaskId, Arc<OnceCell<TaskOutcome>>>>,
    states: Mutex<BTreeMap<TaskId, RunState>>,
}

impl PipelineRunContext {
    pub fn new(
        registry: Arc<TaskRegistry>,
        markers: Arc<dyn MarkerStore>,
        coordinator: Arc<ClusterCoordinator>,
    ) -> Self {
        Self {
            registry,
            markers,
            retry: RetryPolicy::default(),
            coordinator,
            cancel: CancellationToken::new(),
            parallel: false,
            memo: Mutex::new(HashMap::new()),
            states: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Evaluate independent prerequisites concurrently.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn coordinator(&self) -> &ClusterCoordinator {
        &self.coordinator
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// The memo slot for `id`, created on first use.
    pub(crate) fn memo_cell(&self, id: &TaskId) -> Arc<OnceCell<TaskOutcome>> {
        self.memo
            .lock()
            .entry(id.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Number of tasks that have been evaluated (or are being evaluated).
    pub fn evaluated(&self) -> usize {
        self.memo.lock().len()
    }

    pub fn set_state(&self, id: &TaskId, state: RunState) {
        self.states.lock().insert(id.clone(), state);
    }

    pub fn state_of(&self, id: &TaskId) -> Option<RunState> {
        self.states.lock().get(id).copied()
    }

    pub fn states(&self) -> BTreeMap<TaskId, RunState> {
        self.states.lock().clone()
    }

    /// Whether any task is still pending or running.
    pub fn has_unfinished_tasks(&self) -> bool {
        self.states
            .lock()
            .values()
            .any(|s| matches!(s, RunState::Pending | RunState::Running))
    }

    pub async fn marker_exists(&self, path: &MarkerPath) -> Result<bool, StorageError> {
        with_retry(self.retry, "exists", || self.markers.exists(path)).await
    }

    pub async fn write_marker(&self, path: &MarkerPath, metadata: &str) -> Result<(), StorageError> {
        with_retry(self.retry, "write", || self.markers.write(path, metadata)).await
    }
}
