// src/params.rs

//! Parameter maps passed to jobs, and the `{name}` template language used to
//! bind them.
//!
//! Parameters are plain string maps at the job boundary. Values are opaque to
//! the orchestrator; the only structure we look at is `{name}` placeholders,
//! which are resolved against pipeline variables (or, for commands, against
//! the task's own parameters). Shell expansions such as `${HOME}` are not
//! placeholders and pass through untouched. Substitution is a single pass, so
//! braces inside a substituted value are never expanded again.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::errors::{BatchdagError, Result};

/// Ordered `NAME -> VALUE` map. Ordering keeps ids and logs deterministic.
pub type Parameters = BTreeMap<String, String>;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\$?)\{([A-Za-z_][A-Za-z0-9_.-]*)\}").expect("placeholder regex is valid")
});

/// `${name}` belongs to the shell.
fn is_shell_expansion(caps: &Captures) -> bool {
    !caps[1].is_empty()
}

/// Parse a single `NAME=VALUE` assignment (as given to `-p`).
///
/// Only the first `=` splits; the value may itself contain `=`.
pub fn parse_assignment(s: &str) -> Result<(String, String)> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(BatchdagError::ConfigError(format!(
            "malformed parameter '{s}' (expected NAME=VALUE)"
        ))),
    }
}

/// Parse the contents of a parameter file.
///
/// One `NAME=VALUE` per line. Blank lines and lines starting with `#` or `;`
/// are ignored. Later lines override earlier ones.
pub fn parse_param_file(contents: &str) -> Result<Parameters> {
    let mut params = Parameters::new();

    for (idx, raw) in contents.lines().enumerate() {
        let line = raw.trim_end();
        if line.trim().is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        let (name, value) = parse_assignment(line).map_err(|_| {
            BatchdagError::ConfigError(format!(
                "parameter file is malformed at line {}: '{}'",
                idx + 1,
                line
            ))
        })?;
        params.insert(name, value);
    }

    Ok(params)
}

/// Read and parse a parameter file from disk.
pub fn load_param_file(path: impl AsRef<Path>) -> Result<Parameters> {
    let contents = fs::read_to_string(path.as_ref())?;
    parse_param_file(&contents)
}

/// Merge two parameter maps; entries in `overrides` win.
pub fn merge(base: &Parameters, overrides: &Parameters) -> Parameters {
    let mut merged = base.clone();
    for (k, v) in overrides {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

/// Names of all `{placeholders}` in `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(template)
        .filter(|c| !is_shell_expansion(c))
        .map(|c| c[2].to_string())
        .collect()
}

/// Substitute every `{name}` in `template` with `vars[name]`.
///
/// Returns the name of the first unknown placeholder as the error.
pub fn interpolate(template: &str, vars: &Parameters) -> std::result::Result<String, String> {
    if let Some(missing) = placeholders(template)
        .into_iter()
        .find(|name| !vars.contains_key(name))
    {
        return Err(missing);
    }

    let out = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        if is_shell_expansion(caps) {
            return caps[0].to_string();
        }
        vars.get(&caps[2]).cloned().unwrap_or_default()
    });
    Ok(out.into_owned())
}

/// Canonical `NAME=VALUE` lines, used for hashing and marker metadata.
pub fn canonical_lines(params: &Parameters) -> String {
    let mut out = String::new();
    for (k, v) in params {
        out.push_str(k);
        out.push('=');
        out.push_str(v);
        out.push('\n');
    }
    out
}
