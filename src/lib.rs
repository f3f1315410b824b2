// src/lib.rs

pub mod cli;
pub mod cluster;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod marker;
pub mod output;
pub mod params;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::cluster::{
    ClusterCoordinator, ClusterProvider, ClusterSpec, CommandClusterProvider, NoopClusterProvider,
};
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::{PlanEntry, Scheduler, TaskRegistry};
use crate::engine::{PipelineRuntime, EXIT_SUCCESS};
use crate::errors::{BatchdagError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::marker::FsMarkerStore;
use crate::output::FsOutputGuard;
use crate::params::{load_param_file, merge, parse_assignment, Parameters};

/// Variable set by `--output-base-path`.
pub const OUTPUT_BASE_PATH_VAR: &str = "output_base_path";
/// Variable set by `--cluster-size`.
pub const CLUSTER_SIZE_VAR: &str = "cluster_size";

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - config loading and variable binding
/// - marker store, output guard and cluster coordinator
/// - scheduler and runtime (with Ctrl-C handling)
pub async fn run(args: CliArgs) -> Result<i32> {
    let cfg = load_and_validate(&args.config).map_err(|e| match e {
        BatchdagError::IoError(io) => BatchdagError::ConfigError(format!(
            "cannot read config file {}: {io}",
            args.config.display()
        )),
        other => other,
    })?;

    let vars = build_variables(&cfg, &args)?;
    debug!(?vars, "pipeline variables bound");

    let base_dir = config_root_dir(&args.config);
    let scheduler = build_scheduler(&cfg, &vars, &base_dir, args.cluster_size)?;

    let root = args
        .task
        .clone()
        .or_else(|| cfg.root_task().map(str::to_string))
        .ok_or_else(|| {
            BatchdagError::ConfigError(
                "no root task: set [pipeline].root or pass --task".to_string(),
            )
        })?;

    if args.dry_run {
        let plan = scheduler.plan(&root).await?;
        print_dry_run(&cfg, &root, &plan);
        return Ok(EXIT_SUCCESS);
    }

    let runtime = PipelineRuntime::new(scheduler);
    let ctrl_c = runtime.spawn_ctrl_c_handler();
    let outcome = runtime.run(&root).await;
    ctrl_c.abort();

    let outcome = outcome?;
    print_summary(&outcome);
    Ok(outcome.exit_code())
}

/// Merge variables from every source, lowest priority first:
/// `[pipeline].variables`, param files, `-p`, then `--output-base-path` and
/// `--cluster-size`.
pub fn build_variables(cfg: &ConfigFile, args: &CliArgs) -> Result<Parameters> {
    let mut vars = cfg.pipeline.variables.clone();

    for path in &args.param_files {
        let from_file = load_param_file(path).map_err(|e| match e {
            BatchdagError::IoError(io) => BatchdagError::ConfigError(format!(
                "cannot read parameter file {}: {io}",
                path.display()
            )),
            other => other,
        })?;
        vars = merge(&vars, &from_file);
    }

    for assignment in &args.parameters {
        let (name, value) = parse_assignment(assignment)?;
        vars.insert(name, value);
    }

    if let Some(base) = &args.output_base_path {
        vars.insert(OUTPUT_BASE_PATH_VAR.to_string(), base.clone());
    }
    if let Some(size) = args.cluster_size {
        vars.insert(CLUSTER_SIZE_VAR.to_string(), size.to_string());
    }

    let pipeline = cfg.pipeline.name.as_deref().unwrap_or("pipeline");
    if let Some(missing) = cfg.pipeline.required.iter().find(|r| !vars.contains_key(*r)) {
        return Err(BatchdagError::MissingParameter {
            task: pipeline.to_string(),
            parameter: missing.clone(),
        });
    }

    Ok(vars)
}

/// Build the scheduler for a validated config and bound variables.
pub fn build_scheduler(
    cfg: &ConfigFile,
    vars: &Parameters,
    base_dir: &Path,
    cluster_size: Option<u32>,
) -> Result<Scheduler> {
    let storage_root = base_dir.join(&cfg.storage.root);
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let markers = Arc::new(FsMarkerStore::new(Arc::clone(&fs), storage_root.clone()));
    let guard = Arc::new(FsOutputGuard::new(fs, storage_root.clone()));
    info!(store = %storage_root.display(), "using marker store");

    let registry = TaskRegistry::from_config(cfg, vars, guard, base_dir)?;

    let provider: Arc<dyn ClusterProvider> = match &cfg.pipeline.teardown_cmd {
        Some(cmd) => Arc::new(CommandClusterProvider::new(cmd.clone())),
        None => Arc::new(NoopClusterProvider),
    };
    let coordinator = ClusterCoordinator::new(provider);
    for (id, cc) in cfg.cluster.iter() {
        let size = cluster_size.unwrap_or(cc.size);
        coordinator.register_cluster(ClusterSpec::new(id.clone(), size, cc.kind));
    }

    let retry = cfg
        .storage
        .retry_policy()
        .map_err(|e| BatchdagError::ConfigError(format!("[storage]: {e}")))?;

    Ok(Scheduler::new(Arc::new(registry), markers, Arc::new(coordinator))
        .with_retry_policy(retry)
        .with_parallel(cfg.pipeline.parallel))
}

/// Directory that relative paths in the config are resolved against.
///
/// - If the config path has a non-empty parent (e.g. "pipelines/Batchdag.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Batchdag.toml" (parent = ""),
///   we fall back to the current working directory "."
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Dry-run output: the resolved plan, in execution order.
fn print_dry_run(cfg: &ConfigFile, root: &str, plan: &[PlanEntry]) {
    println!("batchdag dry-run");
    if let Some(name) = &cfg.pipeline.name {
        println!("  pipeline = {name}");
    }
    println!("  root = {root}");
    println!("  parallel = {}", cfg.pipeline.parallel);
    println!();

    let pending = plan.iter().filter(|e| !e.complete).count();
    println!("tasks ({}, {} to run):", plan.len(), pending);
    for entry in plan {
        let status = if entry.complete { "complete" } else { "would run" };
        println!("  - {} [{status}]", entry.task_id);
        println!("      job: {}", entry.description);
        println!("      marker: {}", entry.marker);
    }

    debug!("dry-run complete (no execution)");
}

fn print_summary(outcome: &engine::RunOutcome) {
    match &outcome.result {
        dag::PipelineResult::AllComplete => println!("batchdag: all tasks complete"),
        dag::PipelineResult::Failed { task_id, reason } => {
            println!("batchdag: task {task_id} failed: {reason}")
        }
    }
    for cluster in &outcome.teardown.torn_down {
        println!("batchdag: cluster {cluster} torn down");
    }
    for failure in &outcome.teardown.failed {
        println!("batchdag: {failure}");
    }
}
