// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `batchdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "batchdag",
    version,
    about = "Run a DAG of batch jobs, resuming from completion markers.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Batchdag.toml")]
    pub config: PathBuf,

    /// Base location for outputs and completion markers.
    ///
    /// Sets the `output_base_path` variable; overrides every other source.
    #[arg(long, value_name = "PATH")]
    pub output_base_path: Option<String>,

    /// Node count for every configured cluster. `0` runs locally.
    #[arg(long, value_name = "N")]
    pub cluster_size: Option<u32>,

    /// Pipeline variable, `NAME=VALUE`. May be repeated.
    #[arg(short = 'p', long = "parameter", value_name = "NAME=VALUE")]
    pub parameters: Vec<String>,

    /// File of `NAME=VALUE` lines. May be repeated; later files win.
    #[arg(short = 'f', long = "param-file", value_name = "PATH")]
    pub param_files: Vec<PathBuf>,

    /// Task to complete instead of `[pipeline].root`.
    #[arg(long, value_name = "NAME")]
    pub task: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BATCHDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Resolve the DAG and show which tasks would run, without running jobs.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
