//! matrix-ci - runs verification pipelines across a matrix of configurations

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod report;

// Re-export commonly used types
pub use core::{
    AxisBinding, Condition, DefinitionError, ExecutionError, JobInstance, JobResult, JobStatus,
    JobTemplate, MatrixExpander, Pipeline, PipelineResult, Step, StepResult, StepStatus, Verdict,
};
pub use execution::{CommandRunner, ExecutionEngine, ExecutionEvent, SchedulingStrategy, ShellRunner};
pub use report::ResultReporter;
