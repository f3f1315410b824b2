// src/exec/process.rs

//! Child process supervision shared by the shell-based runners.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::runner::{JobFailure, JobRequest, RunResult};

/// Environment variables describing the request, exported to every job.
pub fn apply_request_env(cmd: &mut Command, request: &JobRequest) {
    cmd.envs(request.parameters.iter());
    cmd.env("BATCHDAG_TASK_ID", &request.task_id);
    match &request.cluster {
        Some(hint) => {
            cmd.env("BATCHDAG_CLUSTER_ID", &hint.cluster);
            cmd.env("BATCHDAG_CLUSTER_SIZE", hint.size.to_string());
        }
        None => {
            cmd.env("BATCHDAG_CLUSTER_SIZE", "0");
        }
    }
}

/// Spawn `cmd` and wait for it to exit, time out, or be cancelled.
///
/// - Spawn failure -> `Rejected`.
/// - Non-zero exit -> `Crashed`.
/// - Timeout -> the child is killed, `TimedOut`.
/// - Cancellation -> the child is killed (best-effort), `Abandoned`.
pub async fn run_process(
    mut cmd: Command,
    task_id: &str,
    timeout: Option<Duration>,
    cancel: CancellationToken,
) -> RunResult {
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(task = %task_id, error = %e, "failed to spawn job process");
            return RunResult::Failure(JobFailure::Rejected(format!("spawn failed: {e}")));
        }
    };

    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, task_id.to_string(), "stdout");
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(stderr, task_id.to_string(), "stderr");
    }

    let deadline = async {
        match timeout {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        status_res = child.wait() => {
            match status_res {
                Ok(status) => {
                    let code = status.code();
                    info!(
                        task = %task_id,
                        exit_code = code.unwrap_or(-1),
                        success = status.success(),
                        "job process exited"
                    );
                    if status.success() {
                        RunResult::Success
                    } else {
                        RunResult::Failure(JobFailure::Crashed { exit_code: code })
                    }
                }
                Err(e) => {
                    warn!(task = %task_id, error = %e, "failed waiting for job process");
                    RunResult::Failure(JobFailure::Crashed { exit_code: None })
                }
            }
        }

        _ = deadline => {
            let limit = timeout.unwrap_or_default();
            warn!(task = %task_id, timeout_ms = limit.as_millis() as u64, "job timed out; killing process");
            if let Err(e) = child.kill().await {
                warn!(task = %task_id, error = %e, "failed to kill timed-out job process");
            }
            RunResult::Failure(JobFailure::TimedOut(limit))
        }

        _ = cancel.cancelled() => {
            info!(task = %task_id, "cancellation requested; killing job process");
            if let Err(e) = child.kill().await {
                // Detach rather than hang; kill_on_drop covers the rest.
                warn!(task = %task_id, error = %e, "failed to kill job process on cancellation");
            }
            RunResult::Failure(JobFailure::Abandoned)
        }
    }
}

/// Always consume output so pipe buffers don't fill; log at debug.
fn forward_lines<R>(reader: R, task_id: String, stream: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(task = %task_id, stream, "{}", line);
        }
    });
}
