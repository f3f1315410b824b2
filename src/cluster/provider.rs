// src/cluster/provider.rs

//! Boundary to the service that actually stops clusters.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::ClusterSpec;
use crate::exec::command::shell_command;
use crate::exec::process::run_process;
use crate::exec::RunResult;
use crate::params::{interpolate, Parameters};

pub type TeardownFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Trait abstracting how a cluster is shut down.
pub trait ClusterProvider: Send + Sync + Debug {
    fn teardown<'a>(&'a self, cluster: &'a ClusterSpec) -> TeardownFuture<'a>;
}

/// Provider that only logs. Used when no teardown command is configured.
#[derive(Debug, Clone, Default)]
pub struct NoopClusterProvider;

impl ClusterProvider for NoopClusterProvider {
    fn teardown<'a>(&'a self, cluster: &'a ClusterSpec) -> TeardownFuture<'a> {
        Box::pin(async move {
            info!(cluster = %cluster.id, "no teardown command configured; nothing to stop");
            Ok(())
        })
    }
}

/// Runs a shell command to stop a cluster.
///
/// The command may use `{cluster}`, `{size}` and `{kind}` placeholders.
#[derive(Debug, Clone)]
pub struct CommandClusterProvider {
    template: String,
    timeout: Option<Duration>,
}

impl CommandClusterProvider {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            timeout: Some(Duration::from_secs(10 * 60)),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command_for(&self, cluster: &ClusterSpec) -> Result<String> {
        let mut vars = Parameters::new();
        vars.insert("cluster".to_string(), cluster.id.clone());
        vars.insert("size".to_string(), cluster.size.to_string());
        vars.insert("kind".to_string(), format!("{:?}", cluster.kind).to_lowercase());
        interpolate(&self.template, &vars)
            .map_err(|missing| anyhow!("teardown command references unknown placeholder '{missing}'"))
    }
}

impl ClusterProvider for CommandClusterProvider {
    fn teardown<'a>(&'a self, cluster: &'a ClusterSpec) -> TeardownFuture<'a> {
        Box::pin(async move {
            let line = self.command_for(cluster)?;
            info!(cluster = %cluster.id, cmd = %line, "running cluster teardown command");

            let mut cmd = shell_command(&line);
            cmd.env("BATCHDAG_CLUSTER_ID", &cluster.id);

            let label = format!("teardown:{}", cluster.id);
            match run_process(cmd, &label, self.timeout, CancellationToken::new()).await {
                RunResult::Success => Ok(()),
                RunResult::Failure(failure) => Err(anyhow!("teardown command {failure}")),
            }
        })
    }
}
