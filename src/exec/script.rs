// src/exec/script.rs

//! Transformation-engine script runner.

use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::process::{apply_request_env, run_process};
use super::runner::{JobRequest, JobRunner, RunFuture};

/// Engine binary used when none is configured.
pub const DEFAULT_ENGINE: &str = "pig";

/// Parameter naming where a script job writes its output.
pub const OUTPUT_PATH_PARAM: &str = "OUTPUT_PATH";

/// Runs `<engine> -param K=V ... -f <script>`.
///
/// Every parameter is bound with `-param`; the engine treats them as opaque
/// strings. `OUTPUT_PATH` is always required.
#[derive(Debug, Clone)]
pub struct ScriptJobRunner {
    engine: String,
    script: PathBuf,
    timeout: Option<Duration>,
    workdir: Option<PathBuf>,
    extra_required: Vec<String>,
}

impl ScriptJobRunner {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            engine: DEFAULT_ENGINE.to_string(),
            script: script.into(),
            timeout: None,
            workdir: None,
            extra_required: Vec::new(),
        }
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn with_required(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.extra_required.extend(keys);
        self
    }

    /// Arguments passed to the engine for `request`.
    pub fn engine_args(&self, request: &JobRequest) -> Vec<String> {
        let mut args = Vec::with_capacity(request.parameters.len() * 2 + 2);
        for (k, v) in &request.parameters {
            args.push("-param".to_string());
            args.push(format!("{k}={v}"));
        }
        args.push("-f".to_string());
        args.push(self.script.display().to_string());
        args
    }
}

impl JobRunner for ScriptJobRunner {
    fn describe(&self) -> String {
        format!("{} script {}", self.engine, self.script.display())
    }

    fn required_parameters(&self) -> Vec<String> {
        let mut keys = vec![OUTPUT_PATH_PARAM.to_string()];
        keys.extend(self.extra_required.iter().cloned());
        keys.sort();
        keys.dedup();
        keys
    }

    fn run<'a>(&'a self, request: &'a JobRequest, cancel: CancellationToken) -> RunFuture<'a> {
        Box::pin(async move {
            info!(
                task = %request.task_id,
                engine = %self.engine,
                script = %self.script.display(),
                cluster = ?request.cluster.as_ref().map(|c| c.cluster.as_str()),
                "submitting script job"
            );

            let mut cmd = Command::new(&self.engine);
            cmd.args(self.engine_args(request));
            apply_request_env(&mut cmd, request);
            if let Some(dir) = &self.workdir {
                cmd.current_dir(dir);
            }

            run_process(cmd, &request.task_id, self.timeout, cancel).await
        })
    }
}
