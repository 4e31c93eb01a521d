//! Pipeline domain model

use crate::core::{
    condition::should_run,
    config::PipelineConfig,
    error::DefinitionError,
    job::{JobInstance, JobTemplate},
    matrix::MatrixExpander,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A validated pipeline definition
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Job templates in declaration order
    pub templates: Vec<Arc<JobTemplate>>,

    /// Environment shared by every job
    pub env: BTreeMap<String, String>,

    /// Default directory commands run in
    pub working_directory: PathBuf,

    /// Shell invocation prefix (None = `sh -c`)
    pub shell: Option<Vec<String>>,

    /// Concurrency limit declared by the definition
    pub max_parallel: Option<usize>,
}

/// Whether a planned instance will run
#[derive(Debug, Clone)]
pub struct PlannedJob {
    pub instance: JobInstance,
    pub will_run: bool,
}

impl Pipeline {
    /// Load a pipeline from a YAML file, resolving paths against its directory
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DefinitionError> {
        let path = path.as_ref();
        let config = PipelineConfig::from_file(path)?;
        let base_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        config.to_pipeline_in(base_dir)
    }

    /// Get a template by name
    pub fn template(&self, name: &str) -> Option<&Arc<JobTemplate>> {
        self.templates.iter().find(|t| t.name == name)
    }

    /// Keep only the named templates
    pub fn retain_jobs(&mut self, names: &[String]) -> Result<(), DefinitionError> {
        for name in names {
            if self.template(name).is_none() {
                return Err(DefinitionError::invalid(format!("no job named '{}'", name)));
            }
        }
        self.templates.retain(|t| names.contains(&t.name));
        Ok(())
    }

    /// Every job instance, template order first, then expansion order
    pub fn instances(&self) -> Vec<JobInstance> {
        self.templates.iter().flat_map(MatrixExpander::expand).collect()
    }

    /// Instances annotated with whether their condition holds
    pub fn plan(&self) -> Vec<PlannedJob> {
        self.instances()
            .into_iter()
            .map(|instance| {
                let will_run = should_run(instance.template.condition.as_ref(), &instance.binding);
                PlannedJob { instance, will_run }
            })
            .collect()
    }

}
