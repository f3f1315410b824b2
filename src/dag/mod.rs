// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`task`] defines the unit of work and `ensure_complete`.
//! - [`registry`] holds all tasks by name and binds them from config.
//! - [`graph`] resolves the part of the DAG reachable from a root.
//! - [`context`] holds run-scoped state (memo, run states, stores).
//! - [`scheduler`] drives one run and reports a [`PipelineResult`].

pub mod context;
pub mod graph;
pub mod registry;
pub mod scheduler;
pub mod task;

pub use context::PipelineRunContext;
pub use graph::DagGraph;
pub use registry::TaskRegistry;
pub use scheduler::{PipelineResult, PlanEntry, Scheduler};
pub use task::{OutputSpec, RunState, Task, TaskAction, TaskFailure, TaskId, TaskOutcome};
