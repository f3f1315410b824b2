#![allow(dead_code)]

use std::collections::BTreeMap;

use batchdag::config::{
    ClusterConfig, ConfigFile, DefaultSection, PipelineSection, RawConfigFile, StorageSection,
    TaskConfig,
};
use batchdag::types::{ClusterKind, TaskKind};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                pipeline: PipelineSection::default(),
                storage: StorageSection::default(),
                default: DefaultSection::default(),
                cluster: BTreeMap::new(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_root(mut self, root: &str) -> Self {
        self.config.pipeline.root = Some(root.to_string());
        self
    }

    pub fn with_cluster(mut self, id: &str, size: u32, kind: ClusterKind) -> Self {
        self.config
            .cluster
            .insert(id.to_string(), ClusterConfig { size, kind });
        self
    }

    pub fn with_variable(mut self, name: &str, value: &str) -> Self {
        self.config
            .pipeline
            .variables
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_default_parameter(mut self, name: &str, value: &str) -> Self {
        self.config
            .default
            .parameters
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_default_marker(mut self, template: &str) -> Self {
        self.config.default.marker = template.to_string();
        self
    }

    pub fn with_required(mut self, names: &[&str]) -> Self {
        self.config.pipeline.required = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn parallel(mut self, val: bool) -> Self {
        self.config.pipeline.parallel = val;
        self
    }

    pub fn with_teardown_cmd(mut self, cmd: &str) -> Self {
        self.config.pipeline.teardown_cmd = Some(cmd.to_string());
        self
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.config.storage.retry_attempts = attempts;
        self
    }

    /// The unvalidated config, for exercising validation errors.
    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn command(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                kind: TaskKind::Command,
                cmd: Some(cmd.to_string()),
                ..TaskConfig::default()
            },
        }
    }

    pub fn script(path: &str) -> Self {
        Self {
            task: TaskConfig {
                kind: TaskKind::Script,
                script: Some(path.to_string()),
                ..TaskConfig::default()
            },
        }
    }

    pub fn barrier() -> Self {
        Self {
            task: TaskConfig {
                kind: TaskKind::Barrier,
                ..TaskConfig::default()
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.task
            .parameters
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn required(mut self, key: &str) -> Self {
        self.task.required.push(key.to_string());
        self
    }

    pub fn cluster(mut self, id: &str) -> Self {
        self.task.cluster = Some(id.to_string());
        self
    }

    pub fn marker(mut self, template: &str) -> Self {
        self.task.marker = Some(template.to_string());
        self
    }

    pub fn output(mut self, param: &str) -> Self {
        self.task.output = Some(param.to_string());
        self
    }

    pub fn copy_extension(mut self, ext: &str) -> Self {
        self.task.copy_extension = Some(ext.to_string());
        self
    }

    pub fn timeout(mut self, duration: &str) -> Self {
        self.task.timeout = Some(duration.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
