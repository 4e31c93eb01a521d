//! Pipeline configuration from YAML

use crate::core::{
    condition::Condition,
    error::DefinitionError,
    job::{placeholder_axes, JobTemplate, Step},
    matrix::MatrixExpander,
    Pipeline,
};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Directory commands run in, relative to the pipeline file
    #[serde(default)]
    pub working_directory: Option<PathBuf>,

    /// Shell invocation prefix, the command is appended as the last argument
    #[serde(default)]
    pub shell: Option<Vec<String>>,

    /// Maximum number of jobs running at once (unbounded if absent)
    #[serde(default)]
    pub max_parallel: Option<usize>,

    /// Default timeout for steps (in seconds)
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,

    /// Environment shared by every job
    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    /// Job templates, in declaration order
    pub jobs: Vec<JobConfig>,
}

/// Job configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Unique job name
    pub name: String,

    /// Matrix axes: axis name to list of values, in declaration order
    #[serde(default, alias = "matrix")]
    pub axes: Mapping,

    /// Run condition over the axis values
    #[serde(default, rename = "if")]
    pub condition: Option<String>,

    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    #[serde(default)]
    pub working_directory: Option<PathBuf>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    pub steps: Vec<StepConfig>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step label (defaults to the command)
    #[serde(default, alias = "name")]
    pub label: Option<String>,

    /// Command line to run
    #[serde(alias = "command")]
    pub run: String,

    /// Keep going if this step fails
    #[serde(default)]
    pub continue_on_error: bool,

    /// Run condition over the axis values
    #[serde(default, rename = "if")]
    pub condition: Option<String>,

    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DefinitionError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, DefinitionError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<(), DefinitionError> {
        self.to_pipeline().map(|_| ())
    }

    /// Convert config to a Pipeline resolving paths against the current directory
    pub fn to_pipeline(&self) -> Result<Pipeline, DefinitionError> {
        self.to_pipeline_in(Path::new("."))
    }

    /// Convert config to a Pipeline resolving relative paths against `base_dir`
    pub fn to_pipeline_in(&self, base_dir: &Path) -> Result<Pipeline, DefinitionError> {
        if self.name.trim().is_empty() {
            return Err(DefinitionError::invalid("pipeline name is empty"));
        }
        if self.max_parallel == Some(0) {
            return Err(DefinitionError::invalid("max_parallel must be at least 1"));
        }
        if let Some(shell) = &self.shell {
            if shell.is_empty() || shell[0].trim().is_empty() {
                return Err(DefinitionError::invalid("shell must name a program"));
            }
        }

        let mut seen_names = HashSet::new();
        for job in &self.jobs {
            if !seen_names.insert(job.name.as_str()) {
                return Err(DefinitionError::invalid(format!("duplicate job name: {}", job.name)));
            }
        }

        let templates = self
            .jobs
            .iter()
            .map(|job| job.to_template(self.default_timeout_secs, base_dir).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen_ids = HashSet::new();
        for template in &templates {
            for instance in MatrixExpander::expand(template) {
                if !seen_ids.insert(instance.id.clone()) {
                    return Err(DefinitionError::invalid(format!(
                        "job instance id '{}' is not unique",
                        instance.id
                    )));
                }
            }
        }

        Ok(Pipeline {
            name: self.name.clone(),
            templates,
            env: string_map(&self.env, "pipeline")?,
            working_directory: base_dir.join(self.working_directory.as_deref().unwrap_or(Path::new("."))),
            shell: self.shell.clone(),
            max_parallel: self.max_parallel,
        })
    }
}

impl JobConfig {
    fn to_template(&self, default_timeout: Option<u64>, base_dir: &Path) -> Result<JobTemplate, DefinitionError> {
        if self.name.trim().is_empty() {
            return Err(DefinitionError::invalid("job name is empty"));
        }
        if self.steps.is_empty() {
            return Err(DefinitionError::invalid(format!("job '{}' has no steps", self.name)));
        }

        let axes = self.parse_axes()?;
        let declared: HashSet<&str> = axes.iter().map(|(name, _)| name.as_str()).collect();

        let condition = self
            .condition
            .as_deref()
            .map(|source| parse_condition(&self.name, source, &declared))
            .transpose()?;

        let steps = self
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| step.to_step(&self.name, index, &declared))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(JobTemplate {
            name: self.name.clone(),
            steps,
            axes,
            condition,
            env: string_map(&self.env, &self.name)?,
            working_directory: self.working_directory.as_ref().map(|dir| base_dir.join(dir)),
            timeout_secs: self.timeout_secs.or(default_timeout),
        })
    }

    fn parse_axes(&self) -> Result<Vec<(String, Vec<String>)>, DefinitionError> {
        let mut axes = Vec::with_capacity(self.axes.len());

        for (key, values) in &self.axes {
            let axis = scalar_to_string(key)
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| {
                    DefinitionError::invalid(format!("job '{}' has an axis with an invalid name", self.name))
                })?;

            let sequence = values.as_sequence().ok_or_else(|| {
                DefinitionError::invalid(format!(
                    "axis '{}' of job '{}' must be a list of values",
                    axis, self.name
                ))
            })?;

            if sequence.is_empty() {
                return Err(DefinitionError::invalid(format!(
                    "axis '{}' of job '{}' has no values",
                    axis, self.name
                )));
            }

            let mut seen = HashSet::new();
            let mut axis_values = Vec::with_capacity(sequence.len());
            for value in sequence {
                let value = scalar_to_string(value).ok_or_else(|| {
                    DefinitionError::invalid(format!(
                        "axis '{}' of job '{}' contains a non-scalar value",
                        axis, self.name
                    ))
                })?;
                if !seen.insert(value.clone()) {
                    return Err(DefinitionError::invalid(format!(
                        "axis '{}' of job '{}' repeats value '{}'",
                        axis, self.name, value
                    )));
                }
                axis_values.push(value);
            }

            axes.push((axis, axis_values));
        }

        Ok(axes)
    }
}

impl StepConfig {
    fn to_step(&self, job: &str, index: usize, declared: &HashSet<&str>) -> Result<Step, DefinitionError> {
        let label = self
            .label
            .clone()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| format!("step {}", index + 1));

        if self.run.trim().is_empty() {
            return Err(DefinitionError::invalid(format!(
                "step '{}' of job '{}' has an empty command",
                label, job
            )));
        }

        for axis in placeholder_axes(&self.run) {
            if !declared.contains(axis.as_str()) {
                return Err(DefinitionError::invalid(format!(
                    "step '{}' of job '{}' references undeclared axis '{}'",
                    label, job, axis
                )));
            }
        }

        let condition = self
            .condition
            .as_deref()
            .map(|source| parse_condition(job, source, declared))
            .transpose()?;

        Ok(Step {
            label,
            command: self.run.clone(),
            continue_on_error: self.continue_on_error,
            condition,
            env: string_map(&self.env, job)?,
            timeout_secs: self.timeout_secs,
        })
    }
}

fn parse_condition(job: &str, source: &str, declared: &HashSet<&str>) -> Result<Condition, DefinitionError> {
    let condition = Condition::parse(source)?;
    for axis in condition.referenced_axes() {
        if !declared.contains(axis) {
            return Err(DefinitionError::invalid(format!(
                "condition '{}' in job '{}' references undeclared axis '{}'",
                source, job, axis
            )));
        }
    }
    Ok(condition)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_map(values: &BTreeMap<String, Value>, owner: &str) -> Result<BTreeMap<String, String>, DefinitionError> {
    values
        .iter()
        .map(|(key, value)| {
            scalar_to_string(value)
                .map(|v| (key.clone(), v))
                .ok_or_else(|| {
                    DefinitionError::invalid(format!(
                        "environment variable '{}' in '{}' must be a scalar",
                        key, owner
                    ))
                })
        })
        .collect()
}
