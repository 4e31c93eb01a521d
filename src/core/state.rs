//! Execution result models

use crate::core::job::AxisBinding;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Outcome of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// Exited with code 0
    Passed,
    /// Failed and stopped the job
    Failed,
    /// Failed, but the step allows errors so the job carried on
    Tolerated,
    /// Not run because its condition was false
    Skipped,
}

/// Result of running (or skipping) one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Position of the step in its job
    pub index: usize,

    pub label: String,

    /// Command as executed, after placeholder substitution
    pub command: String,

    pub status: StepStatus,

    /// Exit code (None if skipped, killed by a signal, timed out or never launched)
    pub exit_code: Option<i32>,

    pub duration: Duration,

    pub stdout: String,

    pub stderr: String,

    /// Infrastructure error or timeout description
    pub error: Option<String>,
}

impl StepResult {
    pub fn skipped(index: usize, label: &str, command: String) -> Self {
        Self {
            index,
            label: label.to_string(),
            command,
            status: StepStatus::Skipped,
            exit_code: None,
            duration: Duration::ZERO,
            stdout: String::new(),
            stderr: String::new(),
            error: None,
        }
    }
}

/// Overall status of a job instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Passed,
    Failed,
    Skipped,
}

/// Why a job was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// The job's condition is false for its binding
    ConditionFalse,
    /// The pipeline was cancelled before the job started
    Cancelled,
}

/// Why a job failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobFailure {
    /// A step exited non-zero
    StepFailed { step: String, exit_code: Option<i32> },
    /// A step exceeded its timeout
    TimedOut { step: String, secs: u64 },
    /// A command could not be launched
    Execution { step: String, message: String },
    /// The pipeline was cancelled while the job was running
    Cancelled,
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobFailure::StepFailed {
                step,
                exit_code: Some(code),
            } => write!(f, "step '{}' exited with code {}", step, code),
            JobFailure::StepFailed { step, exit_code: None } => {
                write!(f, "step '{}' was terminated by a signal", step)
            }
            JobFailure::TimedOut { step, secs } => {
                write!(f, "step '{}' timed out after {}s", step, secs)
            }
            JobFailure::Execution { step, message } => {
                write!(f, "step '{}' could not be executed: {}", step, message)
            }
            JobFailure::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Result of one job instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    /// Instance id
    pub id: String,

    /// Name of the template the instance came from
    pub job: String,

    pub binding: AxisBinding,

    pub status: JobStatus,

    /// Results for the steps that were reached, in order
    pub step_results: Vec<StepResult>,

    pub failure: Option<JobFailure>,

    pub skip_reason: Option<SkipReason>,

    pub started_at: Option<DateTime<Utc>>,

    pub finished_at: Option<DateTime<Utc>>,

    pub duration: Duration,
}

impl JobResult {
    /// A job that never ran
    pub fn skipped(id: String, job: String, binding: AxisBinding, reason: SkipReason) -> Self {
        Self {
            id,
            job,
            binding,
            status: JobStatus::Skipped,
            step_results: Vec::new(),
            failure: None,
            skip_reason: Some(reason),
            started_at: None,
            finished_at: None,
            duration: Duration::ZERO,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }
}

/// Pass/fail verdict of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Passed,
    Failed,
}

/// Aggregated result of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: Uuid,

    pub pipeline: String,

    /// One entry per job instance, in expansion order
    pub job_results: Vec<JobResult>,

    /// Whether the run was cancelled before it finished
    pub cancelled: bool,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,
}

impl PipelineResult {
    /// Passed iff no job failed and the run was not cancelled.
    ///
    /// Skipped jobs never fail a pipeline on their own.
    pub fn overall(&self) -> Verdict {
        if self.cancelled || self.job_results.iter().any(JobResult::is_failed) {
            Verdict::Failed
        } else {
            Verdict::Passed
        }
    }

    pub fn job(&self, id: &str) -> Option<&JobResult> {
        self.job_results.iter().find(|r| r.id == id)
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.job_results.iter().filter(|r| r.status == status).count()
    }

    pub fn duration(&self) -> Duration {
        self.finished_at
            .signed_duration_since(self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}
