// src/cluster/mod.rs

//! Remote compute cluster lifecycle.
//!
//! - [`coordinator`] tracks leases and the per-run phase, and decides when a
//!   cluster may be torn down.
//! - [`provider`] is the boundary to whatever actually stops clusters.

use std::fmt;

use thiserror::Error;

use crate::types::{ClusterId, ClusterKind};

pub mod coordinator;
pub mod provider;

pub use coordinator::{ClusterCoordinator, TeardownReport};
pub use provider::{ClusterProvider, CommandClusterProvider, NoopClusterProvider};

/// A cluster the pipeline may run jobs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSpec {
    pub id: ClusterId,
    /// Number of nodes. `0` means local mode: no remote cluster at all.
    pub size: u32,
    pub kind: ClusterKind,
}

impl ClusterSpec {
    pub fn new(id: impl Into<ClusterId>, size: u32, kind: ClusterKind) -> Self {
        Self {
            id: id.into(),
            size,
            kind,
        }
    }

    pub fn is_local(&self) -> bool {
        self.size == 0
    }
}

/// One task's claim on one cluster for the duration of its job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterLease {
    pub cluster: ClusterId,
    pub task_id: String,
    pub active: bool,
}

/// Lifecycle of one pipeline run, as seen by the coordinator.
///
/// `NotStarted -> Resolving -> Executing -> {Completed | Failed}`.
/// Teardown is only reachable from `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    NotStarted,
    Resolving,
    Executing,
    Completed,
    Failed,
}

impl PipelinePhase {
    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Terminal phases may restart at `Resolving` when the same coordinator
    /// drives another run.
    pub fn can_transition_to(self, next: PipelinePhase) -> bool {
        use PipelinePhase::*;
        matches!(
            (self, next),
            (NotStarted, Resolving)
                | (Resolving, Executing)
                | (Resolving, Failed)
                | (Executing, Completed)
                | (Executing, Failed)
                | (Completed, Resolving)
                | (Failed, Resolving)
        )
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A cluster shutdown call failed. Logged and reported, never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("teardown of cluster '{cluster}' failed: {message}")]
pub struct TeardownError {
    pub cluster: ClusterId,
    pub message: String,
}
