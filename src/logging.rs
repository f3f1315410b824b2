// src/logging.rs

//! Logging setup for `batchdag` using `tracing` + `tracing-subscriber`.
//!
//! The filter comes from, in order:
//! 1. `--log-level` on the command line;
//! 2. `BATCHDAG_LOG`, either a bare level (`debug`) or a full filter
//!    directive (`batchdag::dag=trace,info`);
//! 3. `info`.
//!
//! Logs go to STDERR; job output forwarded at debug level ends up there too,
//! so stdout only carries the run summary.

use anyhow::Result;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

/// Environment variable consulted when `--log-level` is not given.
pub const LOG_ENV: &str = "BATCHDAG_LOG";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => level_filter(level_from_log_level(lvl)),
        None => filter_from_env(std::env::var(LOG_ENV).ok().as_deref()),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    Ok(())
}

fn level_filter(level: Level) -> EnvFilter {
    EnvFilter::default().add_directive(LevelFilter::from_level(level).into())
}

fn filter_from_env(value: Option<&str>) -> EnvFilter {
    let raw = value.map(str::trim).filter(|v| !v.is_empty());
    let Some(directives) = raw.filter(|v| parse_level_str(v).is_none()) else {
        return level_filter(level_from_env(raw));
    };
    match EnvFilter::try_new(directives) {
        Ok(filter) => filter,
        Err(e) => {
            // No subscriber yet; stderr is all we have.
            eprintln!("batchdag: ignoring invalid {LOG_ENV}={directives:?}: {e}");
            level_filter(Level::INFO)
        }
    }
}

fn level_from_log_level(lvl: LogLevel) -> Level {
    match lvl {
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    }
}

/// Level named by a `BATCHDAG_LOG` value, `info` when unset or not a bare
/// level name. Anything else is treated as a filter directive.
pub fn level_from_env(value: Option<&str>) -> Level {
    value.and_then(parse_level_str).unwrap_or(Level::INFO)
}

fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
