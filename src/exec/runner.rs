// src/exec/runner.rs

//! Pluggable job runner abstraction.
//!
//! A task delegates its actual work to a [`JobRunner`]. The runner knows how
//! to submit one job to an external engine and wait for its outcome; it knows
//! nothing about dependencies or markers.
//!
//! Production code uses [`super::CommandJobRunner`] or
//! [`super::ScriptJobRunner`]; tests provide fakes that record invocations.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::params::Parameters;
use crate::types::ClusterId;

/// Cluster a job should run against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterHint {
    pub cluster: ClusterId,
    pub size: u32,
}

/// Everything a runner needs to submit a job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub task_id: String,
    pub parameters: Parameters,
    /// `None` means local mode (no cluster).
    pub cluster: Option<ClusterHint>,
}

/// Classified reason a job did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobFailure {
    /// The engine refused the job or it could not be started at all.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The job ran and exited unsuccessfully.
    #[error("crashed (exit code {})", .exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))]
    Crashed { exit_code: Option<i32> },

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The run was cancelled and the orchestrator stopped waiting for it.
    #[error("abandoned after cancellation")]
    Abandoned,

    /// The job succeeded but its post-run output step did not.
    #[error("post-processing failed: {0}")]
    PostProcess(String),
}

/// Outcome of one job invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunResult {
    Success,
    Failure(JobFailure),
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RunResult::Success)
    }
}

pub type RunFuture<'a> = Pin<Box<dyn Future<Output = RunResult> + Send + 'a>>;

/// Trait abstracting how a single job is executed.
///
/// Must be safe to call repeatedly with identical parameters.
pub trait JobRunner: Send + Sync + Debug {
    /// Short human-readable description for logs and dry-run output.
    fn describe(&self) -> String;

    /// Parameter keys that must be present before [`JobRunner::run`] is called.
    fn required_parameters(&self) -> Vec<String> {
        Vec::new()
    }

    /// Run the job to completion, failure, timeout or cancellation.
    fn run<'a>(&'a self, request: &'a JobRequest, cancel: CancellationToken) -> RunFuture<'a>;
}
