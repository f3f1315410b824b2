// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{BatchdagError, Result};
use crate::types::{parse_duration, TaskKind};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::BatchdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

/// Run every check on an already-deserialized config.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_raw_config(cfg)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_pipeline(cfg)?;
    validate_storage(cfg)?;
    validate_tasks(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(BatchdagError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_pipeline(cfg: &RawConfigFile) -> Result<()> {
    if let Some(root) = &cfg.pipeline.root {
        if !cfg.task.contains_key(root) {
            return Err(BatchdagError::ConfigError(format!(
                "[pipeline].root refers to unknown task '{root}'"
            )));
        }
    }
    if let Some(t) = &cfg.default.timeout {
        parse_duration(t)
            .map_err(|e| BatchdagError::ConfigError(format!("[default].timeout: {e}")))?;
    }
    Ok(())
}

fn validate_storage(cfg: &RawConfigFile) -> Result<()> {
    if cfg.storage.retry_attempts == 0 {
        return Err(BatchdagError::ConfigError(
            "[storage].retry_attempts must be >= 1 (got 0)".to_string(),
        ));
    }
    cfg.storage
        .retry_policy()
        .map_err(|e| BatchdagError::ConfigError(format!("[storage]: {e}")))?;
    Ok(())
}

fn validate_tasks(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        match task.kind {
            TaskKind::Command => {
                if task.cmd.is_none() {
                    return Err(BatchdagError::ConfigError(format!(
                        "task '{name}' of kind command needs `cmd`"
                    )));
                }
                if task.script.is_some() {
                    return Err(BatchdagError::ConfigError(format!(
                        "task '{name}' of kind command cannot set `script`"
                    )));
                }
            }
            TaskKind::Script => {
                if task.script.is_none() {
                    return Err(BatchdagError::ConfigError(format!(
                        "task '{name}' of kind script needs `script`"
                    )));
                }
                if task.cmd.is_some() {
                    return Err(BatchdagError::ConfigError(format!(
                        "task '{name}' of kind script cannot set `cmd`"
                    )));
                }
            }
            TaskKind::Barrier => {
                if task.cmd.is_some() || task.script.is_some() || task.output.is_some() {
                    return Err(BatchdagError::ConfigError(format!(
                        "barrier task '{name}' cannot set `cmd`, `script` or `output`"
                    )));
                }
            }
        }

        if let Some(cluster) = &task.cluster {
            if !cfg.cluster.contains_key(cluster) {
                return Err(BatchdagError::ConfigError(format!(
                    "task '{name}' references unknown cluster '{cluster}'"
                )));
            }
        }

        if task.copy_extension.is_some() && task.output.is_none() {
            return Err(BatchdagError::ConfigError(format!(
                "task '{name}' sets `copy_extension` without `output`"
            )));
        }

        if let Some(t) = &task.timeout {
            parse_duration(t)
                .map_err(|e| BatchdagError::ConfigError(format!("task '{name}' timeout: {e}")))?;
        }
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if !cfg.task.contains_key(dep) {
                return Err(BatchdagError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(BatchdagError::DagCycle(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> task. For `[task.B] after = ["A"]` we add A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(BatchdagError::DagCycle(format!(
            "cycle detected in task DAG involving task '{}'",
            cycle.node_id()
        ))),
    }
}
