// src/exec/mod.rs

//! Job execution layer.
//!
//! This module is responsible for actually running the work behind a task,
//! using `tokio::process::Command`, and reporting a classified [`RunResult`].
//!
//! - [`runner`] defines the [`JobRunner`] trait and request/result types.
//! - [`process`] supervises a child process (timeout, cancellation, output).
//! - [`command`] runs shell commands.
//! - [`script`] runs transformation-engine scripts.

pub mod command;
pub mod process;
pub mod runner;
pub mod script;

pub use command::CommandJobRunner;
pub use runner::{ClusterHint, JobFailure, JobRequest, JobRunner, RunFuture, RunResult};
pub use script::ScriptJobRunner;
