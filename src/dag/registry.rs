// src/dag/registry.rs

//! Named task lookup, and building tasks from a pipeline config.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::config::model::{ConfigFile, TaskConfig};
use crate::dag::task::{OutputSpec, Task};
use crate::errors::{BatchdagError, Result};
use crate::exec::{CommandJobRunner, ScriptJobRunner};
use crate::marker::MarkerPath;
use crate::output::OutputGuard;
use crate::params::{interpolate, merge, Parameters};
use crate::types::{parse_duration, TaskKind, TaskName};

/// All tasks of a pipeline, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<TaskName, Arc<Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task. Names must be unique.
    pub fn insert(&mut self, task: Task) -> Result<()> {
        if self.tasks.contains_key(task.name()) {
            return Err(BatchdagError::ConfigError(format!(
                "task '{}' is defined more than once",
                task.name()
            )));
        }
        self.tasks.insert(task.name().to_string(), Arc::new(task));
        Ok(())
    }

    /// Builder-style [`TaskRegistry::insert`].
    pub fn with(mut self, task: Task) -> Result<Self> {
        self.insert(task)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Task>> {
        self.tasks.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Bind every configured task against the pipeline `vars`.
    ///
    /// - parameter values, markers and commands are interpolated; an unknown
    ///   `{name}` is a [`BatchdagError::MissingParameter`];
    /// - script paths and working directories are relative to `base_dir`;
    /// - tasks with an `output` parameter get an [`OutputSpec`] over `guard`.
    pub fn from_config(
        cfg: &ConfigFile,
        vars: &Parameters,
        guard: Arc<dyn OutputGuard>,
        base_dir: &Path,
    ) -> Result<Self> {
        let mut registry = Self::new();
        for (name, tc) in cfg.task.iter() {
            let task = build_task(cfg, name, tc, vars, &guard, base_dir)?;
            debug!(task = %task.id(), name = %name, marker = %task.marker_path(), "task bound");
            registry.insert(task)?;
        }
        Ok(registry)
    }
}

fn build_task(
    cfg: &ConfigFile,
    name: &str,
    tc: &TaskConfig,
    vars: &Parameters,
    guard: &Arc<dyn OutputGuard>,
    base_dir: &Path,
) -> Result<Task> {
    let bind = |template: &str, scope: &Parameters| {
        interpolate(template, scope).map_err(|parameter| BatchdagError::MissingParameter {
            task: name.to_string(),
            parameter,
        })
    };

    let mut parameters = Parameters::new();
    for (key, value) in merge(&cfg.default.parameters, &tc.parameters) {
        parameters.insert(key, bind(&value, vars)?);
    }

    let mut scope = merge(vars, &parameters);
    scope.insert("task".to_string(), name.to_string());

    let marker_template = tc.marker.as_deref().unwrap_or(&cfg.default.marker);
    let marker = MarkerPath::new(bind(marker_template, &scope)?);

    let timeout = tc
        .timeout
        .as_deref()
        .or(cfg.default.timeout.as_deref())
        .map(parse_duration)
        .transpose()
        .map_err(|e| BatchdagError::ConfigError(format!("task '{name}': {e}")))?;

    let mut task = match tc.kind {
        TaskKind::Barrier => Task::barrier(name),
        TaskKind::Command => {
            let cmd = tc.cmd.as_deref().ok_or_else(|| {
                BatchdagError::ConfigError(format!("task '{name}' of kind command has no `cmd`"))
            })?;
            let runner = CommandJobRunner::bound(bind(cmd, &scope)?)
                .with_timeout(timeout)
                .with_workdir(base_dir)
                .with_required(tc.required.iter().cloned());
            Task::job(name, Arc::new(runner))
        }
        TaskKind::Script => {
            let script = tc.script.as_deref().ok_or_else(|| {
                BatchdagError::ConfigError(format!("task '{name}' of kind script has no `script`"))
            })?;
            let mut runner = ScriptJobRunner::new(base_dir.join(bind(script, &scope)?))
                .with_timeout(timeout)
                .with_workdir(base_dir)
                .with_required(tc.required.iter().cloned());
            if let Some(engine) = tc.engine.as_deref().or(cfg.default.engine.as_deref()) {
                runner = runner.with_engine(engine);
            }
            Task::job(name, Arc::new(runner))
        }
    };

    task = task.with_parameters(parameters).marker(marker);
    for prerequisite in &tc.after {
        task = task.after(prerequisite.clone());
    }
    if let Some(cluster) = &tc.cluster {
        task = task.on_cluster(cluster.clone());
    }

    if let Some(param) = &tc.output {
        let location = task.parameters().get(param).cloned().ok_or_else(|| {
            BatchdagError::MissingParameter {
                task: name.to_string(),
                parameter: param.clone(),
            }
        })?;
        task = task.with_output(OutputSpec {
            guard: Arc::clone(guard),
            location,
            copy_extension: tc.copy_extension.clone(),
        });
    }

    Ok(task)
}
