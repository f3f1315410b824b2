// src/engine/mod.rs

//! Orchestration engine for batchdag.
//!
//! This module ties together:
//! - the DAG scheduler
//! - the cluster coordinator's gated teardown
//! - cancellation on Ctrl-C
//!
//! The async shell lives in [`runtime`].

use crate::cluster::TeardownReport;
use crate::dag::PipelineResult;

pub mod runtime;

pub use runtime::PipelineRuntime;

/// Every task reachable from the root is complete.
pub const EXIT_SUCCESS: i32 = 0;
/// A task failed (job, storage or cancellation).
pub const EXIT_TASK_FAILURE: i32 = 1;
/// The pipeline could not start: invalid config, cycle, unknown task or
/// missing parameter.
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Everything one run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub result: PipelineResult,
    pub teardown: TeardownReport,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        if self.result.is_complete() {
            EXIT_SUCCESS
        } else {
            EXIT_TASK_FAILURE
        }
    }
}
