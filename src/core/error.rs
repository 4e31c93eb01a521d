//! Error types for loading and executing pipelines

use thiserror::Error;

/// A pipeline definition that cannot be run.
///
/// Raised while loading, never while executing: once a pipeline has been
/// built from its configuration every condition, axis and placeholder in it
/// is known to be well-formed.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to read pipeline file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse pipeline YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid definition: {0}")]
    Invalid(String),
}

impl DefinitionError {
    pub fn invalid(message: impl Into<String>) -> Self {
        DefinitionError::Invalid(message.into())
    }
}

/// Infrastructure failure at the command boundary.
///
/// Distinct from a command that ran and exited non-zero: these mean the
/// command never produced an exit status of its own.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for command: {0}")]
    Wait(#[source] std::io::Error),

    #[error("failed to prepare job workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("no shell configured")]
    EmptyShell,
}
