use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Canonical task name type used throughout the crate.
pub type TaskName = String;

/// Identifier of a remote compute cluster.
pub type ClusterId = String;

/// How long a cluster is expected to live once the pipeline no longer needs it.
///
/// - `Persistent` (default): torn down by the coordinator once the pipeline
///   completes and no lease is active.
/// - `Permanent`: shared with other consumers; the coordinator never tears it
///   down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterKind {
    #[default]
    Persistent,
    Permanent,
}

impl FromStr for ClusterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "persistent" => Ok(ClusterKind::Persistent),
            "permanent" => Ok(ClusterKind::Permanent),
            other => Err(format!(
                "invalid cluster kind: {other} (expected \"persistent\" or \"permanent\")"
            )),
        }
    }
}

/// What a configured task does when its prerequisites are complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Run `cmd` through the shell.
    #[default]
    Command,
    /// Run `script` through the transformation engine.
    Script,
    /// No job; completes once its prerequisites do.
    Barrier,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::Command => "command",
            TaskKind::Script => "script",
            TaskKind::Barrier => "barrier",
        };
        f.write_str(s)
    }
}

/// Parse a duration string such as `"250ms"`, `"3s"`, `"5m"` or `"2h"`.
pub fn parse_duration(s: &str) -> Result<std::time::Duration, String> {
    use std::time::Duration;

    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => scaled_secs(value, 60),
        "h" => scaled_secs(value, 60 * 60),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

fn scaled_secs(value: u64, unit_secs: u64) -> Result<std::time::Duration, String> {
    value
        .checked_mul(unit_secs)
        .map(std::time::Duration::from_secs)
        .ok_or_else(|| "duration too large".to_string())
}
