// src/engine/runtime.rs

use std::fmt;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cluster::TeardownReport;
use crate::dag::{PipelineResult, Scheduler};
use crate::errors::Result;

use super::RunOutcome;

/// Drives one pipeline run end to end: schedule, then gated cluster teardown.
///
/// This is the async shell around [`Scheduler`]; all execution semantics
/// live there and in `ensure_complete`.
pub struct PipelineRuntime {
    scheduler: Scheduler,
}

impl fmt::Debug for PipelineRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRuntime")
            .field("registry", &self.scheduler.registry())
            .finish_non_exhaustive()
    }
}

impl PipelineRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Token that cancels the run when triggered.
    pub fn cancel_token(&self) -> CancellationToken {
        self.scheduler.cancel_token().clone()
    }

    /// Ctrl-C -> cancel the run. Running jobs are killed and nothing new
    /// starts.
    pub fn spawn_ctrl_c_handler(&self) -> JoinHandle<()> {
        let token = self.cancel_token();
        tokio::spawn(async move {
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    if let Err(e) = res {
                        warn!(error = %e, "failed to listen for Ctrl+C");
                        return;
                    }
                    info!("Ctrl+C received; cancelling pipeline run");
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        })
    }

    /// Run the pipeline rooted at `root`, then tear down idle clusters if
    /// and only if every task completed and the run was not cancelled.
    pub async fn run(&self, root: &str) -> Result<RunOutcome> {
        info!(root, "batchdag run started");

        let result = self.scheduler.run(root).await?;
        let teardown = if self.scheduler.cancel_token().is_cancelled() {
            let reason = "run was cancelled; leaving clusters running".to_string();
            warn!(root, "skipping cluster teardown: {reason}");
            TeardownReport {
                gated: Some(reason),
                ..TeardownReport::default()
            }
        } else {
            self.scheduler
                .coordinator()
                .teardown_idle_clusters(&result)
                .await
        };

        for failure in &teardown.failed {
            error!(cluster = %failure.cluster, "{failure}");
        }

        match &result {
            PipelineResult::AllComplete => info!(
                root,
                torn_down = ?teardown.torn_down,
                "batchdag run finished"
            ),
            PipelineResult::Failed { task_id, reason } => warn!(
                root,
                failed_task = %task_id,
                %reason,
                "batchdag run failed; clusters left running"
            ),
        }

        Ok(RunOutcome { result, teardown })
    }
}
