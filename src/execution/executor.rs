//! Job executor - runs one job instance's steps in order

use crate::{
    core::{
        condition::should_run, JobFailure, JobInstance, JobResult, JobStatus, StepResult, StepStatus,
    },
    execution::{
        engine::{EventSender, ExecutionEvent},
        runner::{CommandOutput, CommandRequest, CommandRunner, Termination},
    },
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Settings a job inherits from its pipeline
#[derive(Debug, Clone, Default)]
pub struct JobEnvironment {
    /// Environment shared by every job
    pub env: BTreeMap<String, String>,

    /// Directory commands run in unless the template overrides it
    pub working_directory: PathBuf,
}

/// Executes the steps of a single job instance
pub struct JobExecutor<R> {
    runner: Arc<R>,
}

impl<R: CommandRunner> JobExecutor<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self { runner }
    }

    /// Run every step of `instance` in order and report the outcome.
    ///
    /// Each job gets a private scratch directory, exported as
    /// `PIPELINE_JOB_DIR` and `TMPDIR`, that is removed when the job ends.
    /// Steps stop at the first failure that is not tolerated.
    pub async fn execute(
        &self,
        instance: &JobInstance,
        environment: &JobEnvironment,
        cancel: &CancellationToken,
        events: &EventSender,
    ) -> JobResult {
        let template = &instance.template;
        let started_at = Utc::now();
        let start = Instant::now();

        info!(job = %instance.id, steps = template.steps.len(), "Starting job");
        let _ = events.send(ExecutionEvent::JobStarted {
            job_id: instance.id.clone(),
        });

        let mut step_results = Vec::with_capacity(template.steps.len());

        let failure = match tempfile::Builder::new().prefix("matrix-ci-job-").tempdir() {
            Ok(scratch) => {
                let env = self.job_env(instance, environment, scratch.path().display().to_string());
                let working_directory = template
                    .working_directory
                    .clone()
                    .unwrap_or_else(|| environment.working_directory.clone());

                let failure = self
                    .run_steps(instance, &env, &working_directory, cancel, events, &mut step_results)
                    .await;

                if let Err(e) = scratch.close() {
                    warn!(job = %instance.id, error = %e, "Failed to remove job scratch directory");
                }
                failure
            }
            Err(e) => {
                warn!(job = %instance.id, error = %e, "Failed to create job scratch directory");
                Some(JobFailure::Execution {
                    step: "workspace".to_string(),
                    message: e.to_string(),
                })
            }
        };

        let status = if failure.is_some() {
            JobStatus::Failed
        } else {
            JobStatus::Passed
        };

        info!(job = %instance.id, ?status, "Job finished");

        JobResult {
            id: instance.id.clone(),
            job: template.name.clone(),
            binding: instance.binding.clone(),
            status,
            step_results,
            failure,
            skip_reason: None,
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
            duration: start.elapsed(),
        }
    }

    async fn run_steps(
        &self,
        instance: &JobInstance,
        env: &BTreeMap<String, String>,
        working_directory: &Path,
        cancel: &CancellationToken,
        events: &EventSender,
        step_results: &mut Vec<StepResult>,
    ) -> Option<JobFailure> {
        let template = &instance.template;

        for (index, step) in template.steps.iter().enumerate() {
            let command = instance.render_command(step);

            if cancel.is_cancelled() {
                return Some(JobFailure::Cancelled);
            }

            if !should_run(step.condition.as_ref(), &instance.binding) {
                debug!(job = %instance.id, step = %step.label, "Step condition is false, skipping");
                let result = StepResult::skipped(index, &step.label, command);
                self.finish_step(instance, result, events, step_results);
                continue;
            }

            let _ = events.send(ExecutionEvent::StepStarted {
                job_id: instance.id.clone(),
                index,
                label: step.label.clone(),
            });

            let mut step_env = env.clone();
            step_env.extend(step.env.iter().map(|(k, v)| (k.clone(), v.clone())));

            let timeout_secs = step.timeout_secs.or(template.timeout_secs);
            let request = CommandRequest {
                command: command.clone(),
                working_directory: working_directory.to_path_buf(),
                env: step_env,
                timeout: timeout_secs.map(Duration::from_secs),
            };

            let (result, step_failure) = match self.runner.run(request, cancel.clone()).await {
                Ok(output) => classify(index, &step.label, command, step.continue_on_error, timeout_secs, output),
                Err(e) => {
                    warn!(job = %instance.id, step = %step.label, error = %e, "Step could not be executed");
                    let result = StepResult {
                        index,
                        label: step.label.clone(),
                        command,
                        status: StepStatus::Failed,
                        exit_code: None,
                        duration: Duration::ZERO,
                        stdout: String::new(),
                        stderr: String::new(),
                        error: Some(e.to_string()),
                    };
                    let failure = JobFailure::Execution {
                        step: step.label.clone(),
                        message: e.to_string(),
                    };
                    (result, Some(failure))
                }
            };

            self.finish_step(instance, result, events, step_results);

            if step_failure.is_some() {
                return step_failure;
            }
        }

        None
    }

    fn finish_step(
        &self,
        instance: &JobInstance,
        result: StepResult,
        events: &EventSender,
        step_results: &mut Vec<StepResult>,
    ) {
        let _ = events.send(ExecutionEvent::StepFinished {
            job_id: instance.id.clone(),
            result: result.clone(),
        });
        step_results.push(result);
    }

    fn job_env(
        &self,
        instance: &JobInstance,
        environment: &JobEnvironment,
        scratch: String,
    ) -> BTreeMap<String, String> {
        let mut env = environment.env.clone();
        env.extend(instance.template.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env.extend(instance.binding.env_vars());
        env.insert("PIPELINE_JOB_ID".to_string(), instance.id.clone());
        env.insert("PIPELINE_JOB_DIR".to_string(), scratch.clone());
        env.insert("TMPDIR".to_string(), scratch);
        env
    }
}

/// Turn a command's termination into a step result and, for hard failures, a job failure
fn classify(
    index: usize,
    label: &str,
    command: String,
    continue_on_error: bool,
    timeout_secs: Option<u64>,
    output: CommandOutput,
) -> (StepResult, Option<JobFailure>) {
    let failed_status = if continue_on_error {
        StepStatus::Tolerated
    } else {
        StepStatus::Failed
    };

    let (status, error, failure) = match output.termination {
        Termination::Exited(Some(0)) => (StepStatus::Passed, None, None),
        Termination::Exited(exit_code) => {
            let failure = JobFailure::StepFailed {
                step: label.to_string(),
                exit_code,
            };
            (failed_status, None, Some(failure))
        }
        Termination::TimedOut => {
            let secs = timeout_secs.unwrap_or_default();
            let failure = JobFailure::TimedOut {
                step: label.to_string(),
                secs,
            };
            (failed_status, Some(format!("timed out after {}s", secs)), Some(failure))
        }
        Termination::Cancelled => (
            StepStatus::Failed,
            Some("cancelled".to_string()),
            Some(JobFailure::Cancelled),
        ),
    };

    // Tolerated failures are recorded but do not stop the job.
    let failure = match (status, failure) {
        (StepStatus::Tolerated, _) => None,
        (_, failure) => failure,
    };

    let result = StepResult {
        index,
        label: label.to_string(),
        command,
        status,
        exit_code: output.exit_code(),
        duration: output.duration,
        stdout: output.stdout,
        stderr: output.stderr,
        error,
    };

    (result, failure)
}
