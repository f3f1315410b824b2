// src/exec/command.rs

//! Shell command job runner.

use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::process::{apply_request_env, run_process};
use super::runner::{JobFailure, JobRequest, JobRunner, RunFuture, RunResult};
use crate::params::{interpolate, placeholders};

/// Runs a shell command per job.
///
/// `{KEY}` placeholders in the command are filled from the job parameters;
/// every placeholder is therefore a required parameter. A runner built with
/// [`CommandJobRunner::bound`] carries a finished command line and runs it
/// verbatim. Parameters are also exported as environment variables.
#[derive(Debug, Clone)]
pub struct CommandJobRunner {
    template: String,
    bound: bool,
    timeout: Option<Duration>,
    workdir: Option<PathBuf>,
    extra_required: Vec<String>,
}

impl CommandJobRunner {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            bound: false,
            timeout: None,
            workdir: None,
            extra_required: Vec::new(),
        }
    }

    /// A command line whose placeholders were already resolved. It is passed
    /// to the shell as is, so braces in substituted values stay literal.
    pub fn bound(command_line: impl Into<String>) -> Self {
        Self {
            bound: true,
            ..Self::new(command_line)
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Declare additional parameter keys the command relies on (e.g. ones it
    /// only reads from the environment).
    pub fn with_required(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.extra_required.extend(keys);
        self
    }

    fn command_line(&self, request: &JobRequest) -> Result<String, String> {
        if self.bound {
            return Ok(self.template.clone());
        }
        interpolate(&self.template, &request.parameters)
    }
}

/// `sh -c <line>` (or `cmd /C` on Windows).
pub(crate) fn shell_command(command_line: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command_line);
        c
    }
}

impl JobRunner for CommandJobRunner {
    fn describe(&self) -> String {
        format!("command `{}`", self.template)
    }

    fn required_parameters(&self) -> Vec<String> {
        let mut keys = if self.bound {
            Vec::new()
        } else {
            placeholders(&self.template)
        };
        keys.extend(self.extra_required.iter().cloned());
        keys.sort();
        keys.dedup();
        keys
    }

    fn run<'a>(&'a self, request: &'a JobRequest, cancel: CancellationToken) -> RunFuture<'a> {
        Box::pin(async move {
            let command_line = match self.command_line(request) {
                Ok(line) => line,
                Err(missing) => {
                    return RunResult::Failure(JobFailure::Rejected(format!(
                        "command references unknown parameter '{missing}'"
                    )));
                }
            };

            info!(task = %request.task_id, cmd = %command_line, "starting job command");

            let mut cmd = shell_command(&command_line);
            apply_request_env(&mut cmd, request);
            if let Some(dir) = &self.workdir {
                cmd.current_dir(dir);
            }

            run_process(cmd, &request.task_id, self.timeout, cancel).await
        })
    }
}
