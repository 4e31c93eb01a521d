//! Job domain model

use crate::core::condition::Condition;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::error;

/// A single command within a job
#[derive(Debug, Clone)]
pub struct Step {
    /// Human-readable label
    pub label: String,

    /// Command line, possibly containing `${{ matrix.<axis> }}` placeholders
    pub command: String,

    /// Record a non-zero exit and keep going instead of failing the job
    pub continue_on_error: bool,

    /// Step-level run condition
    pub condition: Option<Condition>,

    /// Extra environment for this step only
    pub env: BTreeMap<String, String>,

    /// Timeout in seconds (falls back to the job's)
    pub timeout_secs: Option<u64>,
}

/// An immutable, validated job description that may expand into several instances
#[derive(Debug, Clone)]
pub struct JobTemplate {
    pub name: String,

    pub steps: Vec<Step>,

    /// Axes in declaration order, each with its ordered values
    pub axes: Vec<(String, Vec<String>)>,

    /// Job-level run condition
    pub condition: Option<Condition>,

    pub env: BTreeMap<String, String>,

    /// Directory commands run in (None = pipeline default)
    pub working_directory: Option<PathBuf>,

    pub timeout_secs: Option<u64>,
}

impl JobTemplate {
    /// Names of all declared axes
    pub fn axis_names(&self) -> impl Iterator<Item = &str> {
        self.axes.iter().map(|(name, _)| name.as_str())
    }

    /// Number of instances this template expands into
    pub fn combinations(&self) -> usize {
        self.axes.iter().map(|(_, values)| values.len()).product()
    }
}

/// One concrete value per axis, in the template's declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AxisBinding {
    entries: Vec<(String, String)>,
}

impl AxisBinding {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            entries: pairs.into_iter().collect(),
        }
    }

    /// Value bound to an axis
    pub fn get(&self, axis: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == axis)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn push(&mut self, axis: String, value: String) {
        self.entries.push((axis, value));
    }

    /// Environment variables exposing the binding to commands (`MATRIX_RUST=stable`)
    pub fn env_vars(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.entries.iter().map(|(axis, value)| {
            let key: String = axis
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
                .collect();
            (format!("MATRIX_{}", key), value.clone())
        })
    }
}

/// A template bound to one combination of axis values
#[derive(Debug, Clone)]
pub struct JobInstance {
    pub template: Arc<JobTemplate>,
    pub binding: AxisBinding,
    pub id: String,
}

impl JobInstance {
    pub fn new(template: Arc<JobTemplate>, binding: AxisBinding) -> Self {
        let id = instance_id(&template.name, &binding);
        Self {
            template,
            binding,
            id,
        }
    }

    /// Render a step's command with this instance's axis values
    pub fn render_command(&self, step: &Step) -> String {
        render_placeholders(&step.command, &self.binding)
    }
}

/// Derive an instance id from the template name and its binding
pub fn instance_id(name: &str, binding: &AxisBinding) -> String {
    if binding.is_empty() {
        return name.to_string();
    }

    let parts: Vec<String> = binding
        .iter()
        .map(|(axis, value)| format!("{}={}", axis, value))
        .collect();
    format!("{} ({})", name, parts.join(", "))
}

const PLACEHOLDER_PATTERN: &str = r"\$\{\{\s*matrix\.([A-Za-z0-9_-]+)\s*\}\}";

/// `None` if the pattern failed to compile; commands then pass through untouched
fn placeholder_regex() -> Option<&'static Regex> {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| match Regex::new(PLACEHOLDER_PATTERN) {
            Ok(regex) => Some(regex),
            Err(e) => {
                error!(error = %e, "Invalid placeholder pattern, matrix placeholders disabled");
                None
            }
        })
        .as_ref()
}

/// Axis names referenced by `${{ matrix.<axis> }}` placeholders in a command
pub fn placeholder_axes(command: &str) -> Vec<String> {
    let Some(regex) = placeholder_regex() else {
        return Vec::new();
    };
    regex
        .captures_iter(command)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Replace `${{ matrix.<axis> }}` placeholders with bound values
pub fn render_placeholders(command: &str, binding: &AxisBinding) -> String {
    let Some(regex) = placeholder_regex() else {
        return command.to_string();
    };
    regex
        .replace_all(command, |caps: &regex::Captures<'_>| {
            binding.get(&caps[1]).unwrap_or_default().to_string()
        })
        .into_owned()
}
