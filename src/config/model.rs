// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::marker::RetryPolicy;
use crate::params::Parameters;
use crate::types::{parse_duration, ClusterKind, TaskKind};

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [pipeline]
/// root = "ShutdownClusters"
///
/// [cluster.main]
/// size = 3
///
/// [task.Characterize]
/// kind = "script"
/// script = "pigscripts/characterize.pig"
/// cluster = "main"
/// parameters = { OUTPUT_PATH = "{output_base_path}/characterize" }
///
/// [task.ShutdownClusters]
/// kind = "barrier"
/// after = ["Characterize"]
/// ```
///
/// All sections except `[task.*]` are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub pipeline: PipelineSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub default: DefaultSection,

    /// Clusters from `[cluster.<id>]`.
    #[serde(default)]
    pub cluster: BTreeMap<String, ClusterConfig>,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// A validated configuration. Only obtainable through `TryFrom<RawConfigFile>`
/// (see `config::validate`) or [`ConfigFile::new_unchecked`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub pipeline: PipelineSection,
    pub storage: StorageSection,
    pub default: DefaultSection,
    pub cluster: BTreeMap<String, ClusterConfig>,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    /// Build without validation. Callers must uphold the invariants that
    /// `config::validate` checks.
    pub fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            pipeline: raw.pipeline,
            storage: raw.storage,
            default: raw.default,
            cluster: raw.cluster,
            task: raw.task,
        }
    }

    /// The task a run starts from when none is given on the command line.
    pub fn root_task(&self) -> Option<&str> {
        self.pipeline.root.as_deref()
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSection {
    #[serde(default)]
    pub name: Option<String>,

    /// Terminal task requested by default, e.g. `"ShutdownClusters"`.
    #[serde(default)]
    pub root: Option<String>,

    /// Evaluate independent prerequisites concurrently.
    #[serde(default)]
    pub parallel: bool,

    /// Variables that must be supplied (by config, param file or `-p`).
    #[serde(default = "default_required")]
    pub required: Vec<String>,

    /// Shell command used to stop a cluster; `{cluster}`, `{size}` and
    /// `{kind}` are substituted. Without it teardown only logs.
    #[serde(default)]
    pub teardown_cmd: Option<String>,

    /// Lowest-priority pipeline variables.
    #[serde(default)]
    pub variables: Parameters,
}

fn default_required() -> Vec<String> {
    vec!["output_base_path".to_string()]
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            name: None,
            root: None,
            parallel: false,
            required: default_required(),
            teardown_cmd: None,
            variables: Parameters::new(),
        }
    }
}

/// `[storage]` section: where markers and outputs live, and how hard to
/// retry when the store misbehaves.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    /// Local directory standing in for the bucket root. Relative paths are
    /// resolved against the config file's directory.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: String,

    #[serde(default = "default_max_backoff")]
    pub max_backoff: String,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from(".batchdag/store")
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> String {
    "200ms".to_string()
}

fn default_max_backoff() -> String {
    "5s".to_string()
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            retry_attempts: default_retry_attempts(),
            retry_backoff: default_retry_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

impl StorageSection {
    pub fn retry_policy(&self) -> Result<RetryPolicy, String> {
        Ok(RetryPolicy {
            max_attempts: self.retry_attempts,
            initial_backoff: parse_duration(&self.retry_backoff)?,
            max_backoff: parse_duration(&self.max_backoff)?,
        })
    }
}

/// `[default]` section: values tasks inherit unless they override them.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultSection {
    /// Marker template; `{task}` is the task name.
    #[serde(default = "default_marker")]
    pub marker: String,

    /// Default job timeout, e.g. `"2h"`. No timeout when unset.
    #[serde(default)]
    pub timeout: Option<String>,

    /// Engine binary for script tasks.
    #[serde(default)]
    pub engine: Option<String>,

    /// Parameters merged under every task's own `parameters`.
    #[serde(default)]
    pub parameters: Parameters,
}

fn default_marker() -> String {
    "{output_base_path}/{task}".to_string()
}

impl Default for DefaultSection {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            timeout: None,
            engine: None,
            parameters: Parameters::new(),
        }
    }
}

/// `[cluster.<id>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterConfig {
    /// Node count; `0` runs tasks locally without a cluster.
    #[serde(default)]
    pub size: u32,

    #[serde(default)]
    pub kind: ClusterKind,
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    #[serde(default)]
    pub kind: TaskKind,

    /// Shell command, for `kind = "command"`.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Script path, for `kind = "script"`.
    #[serde(default)]
    pub script: Option<String>,

    /// Engine override for this script task.
    #[serde(default)]
    pub engine: Option<String>,

    /// Prerequisites, in the order they are evaluated.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub parameters: Parameters,

    /// Extra parameter keys the job needs beyond those its runner declares.
    #[serde(default)]
    pub required: Vec<String>,

    /// Marker template override.
    #[serde(default)]
    pub marker: Option<String>,

    #[serde(default)]
    pub cluster: Option<String>,

    /// Name of the parameter holding this task's output location. Enables
    /// the collision check before the job runs.
    #[serde(default)]
    pub output: Option<String>,

    /// Duplicate each output file with this extension after success.
    #[serde(default)]
    pub copy_extension: Option<String>,

    #[serde(default)]
    pub timeout: Option<String>,
}
