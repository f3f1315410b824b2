// src/dag/scheduler.rs

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cluster::{ClusterCoordinator, PipelinePhase};
use crate::dag::context::PipelineRunContext;
use crate::dag::graph::DagGraph;
use crate::dag::registry::TaskRegistry;
use crate::dag::task::{RunState, TaskId, TaskOutcome};
use crate::errors::{BatchdagError, FailureReason, Result};
use crate::marker::{MarkerPath, MarkerStore, RetryPolicy};

/// Final answer of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineResult {
    AllComplete,
    /// `task_id` is the first task that failed; its dependents were halted.
    Failed {
        task_id: TaskId,
        reason: FailureReason,
    },
}

impl PipelineResult {
    pub fn is_complete(&self) -> bool {
        matches!(self, PipelineResult::AllComplete)
    }
}

/// One line of a dry-run plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub name: String,
    pub task_id: TaskId,
    pub description: String,
    pub marker: MarkerPath,
    /// Whether the marker already exists, i.e. the task would be skipped.
    pub complete: bool,
}

/// Drives a pipeline from a root task.
///
/// It is responsible for:
/// - resolving the reachable graph and rejecting cycles and unknown tasks
/// - validating each runner's required parameters before anything runs
/// - moving the cluster coordinator through its phases
/// - evaluating the root through `ensure_complete` with a fresh run context
#[derive(Debug, Clone)]
pub struct Scheduler {
    registry: Arc<TaskRegistry>,
    markers: Arc<dyn MarkerStore>,
    coordinator: Arc<ClusterCoordinator>,
    retry: RetryPolicy,
    parallel: bool,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        registry: Arc<TaskRegistry>,
        markers: Arc<dyn MarkerStore>,
        coordinator: Arc<ClusterCoordinator>,
    ) -> Self {
        Self {
            registry,
            markers,
            coordinator,
            retry: RetryPolicy::default(),
            parallel: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn coordinator(&self) -> &Arc<ClusterCoordinator> {
        &self.coordinator
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// A fresh context for one run. Memoization never outlives it.
    pub fn new_context(&self) -> PipelineRunContext {
        PipelineRunContext::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.markers),
            Arc::clone(&self.coordinator),
        )
        .with_retry_policy(self.retry)
        .with_parallel(self.parallel)
        .with_cancel_token(self.cancel.clone())
    }

    /// Resolve the graph under `root` and validate parameter schemas.
    pub fn resolve(&self, root: &str) -> Result<DagGraph> {
        let graph = DagGraph::resolve(&self.registry, root)?;

        for name in graph.order() {
            let task = self
                .registry
                .get(name)
                .ok_or_else(|| BatchdagError::TaskNotFound(name.clone()))?;
            if let Some(cluster) = task.cluster() {
                if self.coordinator.cluster(cluster).is_none() {
                    return Err(BatchdagError::ConfigError(format!(
                        "task '{name}' references unknown cluster '{cluster}'"
                    )));
                }
            }
            if let Some(parameter) = task.missing_parameters().into_iter().next() {
                return Err(BatchdagError::MissingParameter {
                    task: name.clone(),
                    parameter,
                });
            }
        }

        Ok(graph)
    }

    /// Run the pipeline rooted at `root` with a fresh context.
    pub async fn run(&self, root: &str) -> Result<PipelineResult> {
        let ctx = self.new_context();
        self.run_in(&ctx, root).await
    }

    /// Run the pipeline rooted at `root` inside `ctx`.
    ///
    /// Configuration problems are returned as `Err` before any task runs.
    pub async fn run_in(&self, ctx: &PipelineRunContext, root: &str) -> Result<PipelineResult> {
        self.coordinator.set_phase(PipelinePhase::Resolving);

        let graph = match self.resolve(root) {
            Ok(graph) => graph,
            Err(e) => {
                error!(root, error = %e, "pipeline resolution failed");
                self.coordinator.set_phase(PipelinePhase::Failed);
                return Err(e);
            }
        };

        info!(root, tasks = graph.len(), order = ?graph.order(), "pipeline resolved");
        for name in graph.order() {
            if let Some(task) = self.registry.get(name) {
                ctx.set_state(task.id(), RunState::Pending);
                debug!(task = %task.id(), deps = ?graph.dependencies_of(name), "task pending");
            }
        }

        let root_task = self
            .registry
            .get(root)
            .ok_or_else(|| BatchdagError::TaskNotFound(root.to_string()))?;

        self.coordinator.set_phase(PipelinePhase::Executing);
        let outcome = root_task.ensure_complete(ctx).await;

        let result = match outcome {
            TaskOutcome::Complete => {
                info!(root, "pipeline complete");
                self.coordinator.set_phase(PipelinePhase::Completed);
                PipelineResult::AllComplete
            }
            TaskOutcome::Failed(failure) => {
                warn!(
                    root,
                    failed_task = %failure.task_id,
                    reason = %failure.reason,
                    "pipeline failed"
                );
                self.coordinator.set_phase(PipelinePhase::Failed);
                PipelineResult::Failed {
                    task_id: failure.task_id,
                    reason: failure.reason,
                }
            }
        };

        Ok(result)
    }

    /// Resolve `root` and report, in execution order, which tasks would run.
    ///
    /// Only reads markers; never runs jobs or writes anything.
    pub async fn plan(&self, root: &str) -> Result<Vec<PlanEntry>> {
        let graph = self.resolve(root)?;
        let ctx = self.new_context();

        let mut entries = Vec::with_capacity(graph.len());
        for name in graph.order() {
            let task = self
                .registry
                .get(name)
                .ok_or_else(|| BatchdagError::TaskNotFound(name.clone()))?;
            let complete = ctx
                .marker_exists(task.marker_path())
                .await
                .map_err(|e| BatchdagError::Other(e.into()))?;
            entries.push(PlanEntry {
                name: name.clone(),
                task_id: task.id().clone(),
                description: task.describe(),
                marker: task.marker_path().clone(),
                complete,
            });
        }
        Ok(entries)
    }
}
