// src/dag/task.rs

//! The unit of work in a pipeline, and how it is brought to completion.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::dag::context::PipelineRunContext;
use crate::errors::FailureReason;
use crate::exec::{JobFailure, JobRequest, JobRunner, RunResult};
use crate::marker::MarkerPath;
use crate::output::OutputGuard;
use crate::params::{canonical_lines, Parameters};
use crate::types::{ClusterId, TaskName};

/// Stable identifier derived from a task's name and parameters.
///
/// `Name` when there are no parameters, otherwise `Name-<12 hex>` where the
/// suffix is a blake3 digest of the sorted `KEY=VALUE` lines.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(String);

impl TaskId {
    pub fn derive(name: &str, parameters: &Parameters) -> Self {
        if parameters.is_empty() {
            return Self(name.to_string());
        }
        let digest = blake3::hash(canonical_lines(parameters).as_bytes());
        let hex = digest.to_hex();
        Self(format!("{name}-{}", &hex.as_str()[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transient per-run state of a task. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Running,
    Complete,
    Failed,
}

/// Where a job writes, and what to do with it afterwards.
#[derive(Debug, Clone)]
pub struct OutputSpec {
    pub guard: Arc<dyn OutputGuard>,
    pub location: String,
    /// Extension appended to copies of each output file, e.g. `.csv`.
    pub copy_extension: Option<String>,
}

#[derive(Debug, Clone)]
pub enum TaskAction {
    Job {
        runner: Arc<dyn JobRunner>,
        output: Option<OutputSpec>,
    },
    /// No job: complete as soon as every prerequisite is.
    Barrier,
}

/// A failed task, carrying the id of the task the failure originated in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub task_id: TaskId,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Complete,
    Failed(TaskFailure),
}

impl TaskOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, TaskOutcome::Complete)
    }
}

pub type OutcomeFuture<'a> = Pin<Box<dyn Future<Output = TaskOutcome> + Send + 'a>>;

#[derive(Debug, Clone)]
pub struct Task {
    name: TaskName,
    id: TaskId,
    parameters: Parameters,
    prerequisites: Vec<TaskName>,
    marker: MarkerPath,
    cluster: Option<ClusterId>,
    action: TaskAction,
}

impl Task {
    /// A task that runs `runner`. The marker defaults to the task name.
    pub fn job(name: impl Into<TaskName>, runner: Arc<dyn JobRunner>) -> Self {
        Self::with_action(
            name.into(),
            TaskAction::Job {
                runner,
                output: None,
            },
        )
    }

    pub fn barrier(name: impl Into<TaskName>) -> Self {
        Self::with_action(name.into(), TaskAction::Barrier)
    }

    fn with_action(name: TaskName, action: TaskAction) -> Self {
        Self {
            id: TaskId::derive(&name, &Parameters::new()),
            marker: MarkerPath::new(&name),
            name,
            parameters: Parameters::new(),
            prerequisites: Vec::new(),
            cluster: None,
            action,
        }
    }

    pub fn after(mut self, prerequisite: impl Into<TaskName>) -> Self {
        self.prerequisites.push(prerequisite.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self.id = TaskId::derive(&self.name, &self.parameters);
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self.id = TaskId::derive(&self.name, &self.parameters);
        self
    }

    pub fn marker(mut self, marker: MarkerPath) -> Self {
        self.marker = marker;
        self
    }

    pub fn on_cluster(mut self, cluster: impl Into<ClusterId>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    /// Guard the job's output location. Has no effect on barrier tasks.
    pub fn with_output(mut self, output: OutputSpec) -> Self {
        if let TaskAction::Job { output: slot, .. } = &mut self.action {
            *slot = Some(output);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn prerequisites(&self) -> &[TaskName] {
        &self.prerequisites
    }

    pub fn marker_path(&self) -> &MarkerPath {
        &self.marker
    }

    pub fn cluster(&self) -> Option<&str> {
        self.cluster.as_deref()
    }

    pub fn action(&self) -> &TaskAction {
        &self.action
    }

    /// Parameter keys missing for this task's runner, if any.
    pub fn missing_parameters(&self) -> Vec<String> {
        match &self.action {
            TaskAction::Job { runner, .. } => runner
                .required_parameters()
                .into_iter()
                .filter(|k| !self.parameters.contains_key(k))
                .collect(),
            TaskAction::Barrier => Vec::new(),
        }
    }

    /// Human-readable one-liner used by logs and dry runs.
    pub fn describe(&self) -> String {
        match &self.action {
            TaskAction::Job { runner, .. } => runner.describe(),
            TaskAction::Barrier => "barrier".to_string(),
        }
    }

    fn failed(&self, reason: FailureReason) -> TaskOutcome {
        TaskOutcome::Failed(TaskFailure {
            task_id: self.id.clone(),
            reason,
        })
    }

    fn marker_metadata(&self) -> String {
        format!("task_id={}\nname={}\n", self.id, self.name)
    }

    /// Bring this task to completion.
    ///
    /// Evaluated at most once per run context; later calls (e.g. through a
    /// diamond) observe the memoized outcome.
    pub fn ensure_complete<'a>(&'a self, ctx: &'a PipelineRunContext) -> OutcomeFuture<'a> {
        Box::pin(async move {
            let cell = ctx.memo_cell(&self.id);
            cell.get_or_init(|| self.evaluate(ctx)).await.clone()
        })
    }

    async fn evaluate(&self, ctx: &PipelineRunContext) -> TaskOutcome {
        ctx.set_state(&self.id, RunState::Pending);

        match ctx.marker_exists(&self.marker).await {
            Ok(true) => {
                info!(task = %self.id, marker = %self.marker, "marker present; already complete");
                ctx.set_state(&self.id, RunState::Complete);
                return TaskOutcome::Complete;
            }
            Ok(false) => {
                debug!(task = %self.id, marker = %self.marker, "no marker; task must run");
            }
            Err(e) => {
                error!(task = %self.id, error = %e, "could not check completion marker");
                return self.finish(ctx, self.failed(FailureReason::StorageUnavailable(e.to_string())));
            }
        }

        if let Some(failure) = self.ensure_prerequisites(ctx).await {
            info!(
                task = %self.id,
                failed_task = %failure.task_id,
                "prerequisite failed; not running"
            );
            return self.finish(ctx, TaskOutcome::Failed(failure));
        }

        if ctx.cancel_token().is_cancelled() {
            info!(task = %self.id, "run cancelled; not starting task");
            return self.finish(ctx, self.failed(FailureReason::Cancelled));
        }

        let outcome = match &self.action {
            TaskAction::Barrier => {
                info!(task = %self.id, "all prerequisites complete");
                self.record_completion(ctx).await
            }
            TaskAction::Job { runner, output } => {
                self.run_job(ctx, runner.as_ref(), output.as_ref()).await
            }
        };
        self.finish(ctx, outcome)
    }

    /// `None` when every prerequisite is complete; otherwise the first
    /// failure in declared order.
    async fn ensure_prerequisites(&self, ctx: &PipelineRunContext) -> Option<TaskFailure> {
        let mut tasks = Vec::with_capacity(self.prerequisites.len());
        for name in &self.prerequisites {
            match ctx.registry().get(name) {
                Some(task) => tasks.push(task),
                None => {
                    return Some(TaskFailure {
                        task_id: self.id.clone(),
                        reason: FailureReason::Configuration(format!(
                            "unknown prerequisite '{name}'"
                        )),
                    });
                }
            }
        }

        if ctx.is_parallel() {
            let outcomes = join_all(tasks.iter().map(|t| t.ensure_complete(ctx))).await;
            outcomes.into_iter().find_map(|o| match o {
                TaskOutcome::Failed(f) => Some(f),
                TaskOutcome::Complete => None,
            })
        } else {
            for task in &tasks {
                if let TaskOutcome::Failed(f) = task.ensure_complete(ctx).await {
                    return Some(f);
                }
            }
            None
        }
    }

    async fn run_job(
        &self,
        ctx: &PipelineRunContext,
        runner: &dyn JobRunner,
        output: Option<&OutputSpec>,
    ) -> TaskOutcome {
        if let Some(out) = output {
            if let Err(msg) = out.guard.pre_check(&out.location) {
                error!(task = %self.id, location = %out.location, "{msg}");
                return self.failed(FailureReason::Configuration(msg));
            }
        }

        let hint = match &self.cluster {
            Some(cluster) => match ctx.coordinator().register_lease(cluster, self.id.as_str()) {
                Ok(hint) => hint,
                Err(msg) => {
                    error!(task = %self.id, cluster = %cluster, "{msg}");
                    return self.failed(FailureReason::Configuration(msg));
                }
            },
            None => None,
        };

        let request = JobRequest {
            task_id: self.id.to_string(),
            parameters: self.parameters.clone(),
            cluster: hint.clone(),
        };

        ctx.set_state(&self.id, RunState::Running);
        info!(task = %self.id, job = %runner.describe(), "starting job");
        let result = runner.run(&request, ctx.cancel_token().child_token()).await;

        if let Some(hint) = &hint {
            ctx.coordinator().release_lease(&hint.cluster, self.id.as_str());
        }

        match result {
            RunResult::Success => {}
            RunResult::Failure(JobFailure::Abandoned) if ctx.cancel_token().is_cancelled() => {
                warn!(task = %self.id, "job abandoned after cancellation");
                return self.failed(FailureReason::Cancelled);
            }
            RunResult::Failure(failure) => {
                error!(task = %self.id, %failure, "job failed; no marker written");
                return self.failed(FailureReason::Job(failure));
            }
        }

        if let Some((out, ext)) = output.and_then(|o| o.copy_extension.as_ref().map(|e| (o, e))) {
            if let Err(e) = out.guard.post_process(&out.location, ext) {
                error!(task = %self.id, error = %e, "output post-processing failed");
                return self.failed(FailureReason::Job(JobFailure::PostProcess(format!("{e:#}"))));
            }
        }

        self.record_completion(ctx).await
    }

    async fn record_completion(&self, ctx: &PipelineRunContext) -> TaskOutcome {
        let metadata = self.marker_metadata();
        match ctx.write_marker(&self.marker, &metadata).await {
            Ok(()) => {
                info!(task = %self.id, marker = %self.marker, "task complete; marker written");
                TaskOutcome::Complete
            }
            Err(e) => {
                error!(task = %self.id, error = %e, "could not write completion marker");
                self.failed(FailureReason::StorageUnavailable(e.to_string()))
            }
        }
    }

    fn finish(&self, ctx: &PipelineRunContext, outcome: TaskOutcome) -> TaskOutcome {
        let state = if outcome.is_complete() {
            RunState::Complete
        } else {
            RunState::Failed
        };
        ctx.set_state(&self.id, state);
        outcome
    }
}
