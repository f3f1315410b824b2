// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Two families live here:
//! - [`BatchdagError`]: fatal errors returned *before* or *instead of* a
//!   pipeline run (bad config, cycles, missing parameters, IO).
//! - [`FailureReason`]: why a task (and therefore a pipeline run) failed while
//!   executing. These travel inside `PipelineResult::Failed`.

use thiserror::Error;

use crate::exec::JobFailure;

#[derive(Error, Debug)]
pub enum BatchdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("Missing required parameter '{parameter}' for task '{task}'")]
    MissingParameter { task: String, parameter: String },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BatchdagError {
    /// Whether this error belongs to the configuration class (exit status 2).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BatchdagError::ConfigError(_)
                | BatchdagError::TaskNotFound(_)
                | BatchdagError::DagCycle(_)
                | BatchdagError::MissingParameter { .. }
                | BatchdagError::TomlError(_)
        )
    }
}

/// Why a task failed during execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Detected at task start, e.g. the output location already exists.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The marker store could not be reached after all retries.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("job failed: {0}")]
    Job(JobFailure),

    #[error("pipeline run cancelled")]
    Cancelled,
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BatchdagError>;
