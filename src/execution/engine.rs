//! Main execution engine - orchestrates the entire pipeline run

use crate::{
    core::{
        condition::should_run, AxisBinding, JobFailure, JobResult, JobStatus, Pipeline, PipelineResult,
        SkipReason, StepResult, Verdict,
    },
    execution::{
        executor::{JobEnvironment, JobExecutor},
        runner::CommandRunner,
        scheduler::SchedulingStrategy,
    },
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        run_id: Uuid,
        pipeline_name: String,
        total_jobs: usize,
    },
    JobStarted {
        job_id: String,
    },
    StepStarted {
        job_id: String,
        index: usize,
        label: String,
    },
    StepFinished {
        job_id: String,
        result: StepResult,
    },
    /// A job instance that never started, because its condition was false
    /// or the run was cancelled first
    JobSkipped {
        result: JobResult,
    },
    /// A started job instance reached its final status
    JobFinished {
        result: JobResult,
    },
    PipelineCompleted {
        run_id: Uuid,
        verdict: Verdict,
    },
}

/// Channel jobs publish their events on
pub type EventSender = mpsc::UnboundedSender<ExecutionEvent>;

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(&ExecutionEvent) + Send + Sync>;

/// Main pipeline execution engine
pub struct ExecutionEngine<R> {
    runner: Arc<R>,
    strategy: SchedulingStrategy,
    event_handlers: Vec<EventHandler>,
    cancel: CancellationToken,
}

impl<R: CommandRunner + 'static> ExecutionEngine<R> {
    pub fn new(runner: R, strategy: SchedulingStrategy) -> Self {
        Self {
            runner: Arc::new(runner),
            strategy,
            event_handlers: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Add an event handler
    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
        self
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: &ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event);
        }
    }

    /// Execute the entire pipeline.
    ///
    /// Every job instance ends up in the result exactly once. A failing job
    /// never stops the others; only cancellation stops new jobs from
    /// starting.
    pub async fn execute(&self, pipeline: &Pipeline) -> PipelineResult {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let instances = pipeline.instances();

        info!(pipeline = %pipeline.name, %run_id, jobs = instances.len(), "Starting pipeline execution");
        self.emit_event(&ExecutionEvent::PipelineStarted {
            run_id,
            pipeline_name: pipeline.name.clone(),
            total_jobs: instances.len(),
        });

        let slots: Vec<(String, String, AxisBinding)> = instances
            .iter()
            .map(|i| (i.id.clone(), i.template.name.clone(), i.binding.clone()))
            .collect();
        let positions: HashMap<String, usize> = slots
            .iter()
            .enumerate()
            .map(|(index, (id, _, _))| (id.clone(), index))
            .collect();

        let limit = self.strategy.concurrency_limit(pipeline.max_parallel);
        let semaphore = Arc::new(Semaphore::new(limit.unwrap_or(Semaphore::MAX_PERMITS)));
        let executor = Arc::new(JobExecutor::new(Arc::clone(&self.runner)));
        let environment = Arc::new(JobEnvironment {
            env: pipeline.env.clone(),
            working_directory: pipeline.working_directory.clone(),
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = self.cancel.clone();

        let dispatch = async move {
            let mut tasks = JoinSet::new();

            for instance in instances {
                if !should_run(instance.template.condition.as_ref(), &instance.binding) {
                    let result = JobResult::skipped(
                        instance.id.clone(),
                        instance.template.name.clone(),
                        instance.binding.clone(),
                        SkipReason::ConditionFalse,
                    );
                    let _ = tx.send(ExecutionEvent::JobSkipped { result });
                    continue;
                }

                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
                };

                let Some(permit) = permit else {
                    let result = JobResult::skipped(
                        instance.id.clone(),
                        instance.template.name.clone(),
                        instance.binding.clone(),
                        SkipReason::Cancelled,
                    );
                    let _ = tx.send(ExecutionEvent::JobSkipped { result });
                    continue;
                };

                let executor = Arc::clone(&executor);
                let environment = Arc::clone(&environment);
                let cancel = cancel.clone();
                let tx = tx.clone();

                tasks.spawn(async move {
                    let result = executor.execute(&instance, &environment, &cancel, &tx).await;
                    drop(permit);
                    let _ = tx.send(ExecutionEvent::JobFinished { result });
                });
            }

            drop(tx);

            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Job task aborted");
                }
            }
        };

        let collect = async {
            let mut results: Vec<Option<JobResult>> = vec![None; slots.len()];
            while let Some(event) = rx.recv().await {
                if let ExecutionEvent::JobSkipped { result } | ExecutionEvent::JobFinished { result } =
                    &event
                {
                    if let Some(&index) = positions.get(&result.id) {
                        results[index] = Some(result.clone());
                    }
                }
                self.emit_event(&event);
            }
            results
        };

        let ((), results) = tokio::join!(dispatch, collect);

        let job_results: Vec<JobResult> = results
            .into_iter()
            .zip(slots)
            .map(|(result, (id, job, binding))| {
                result.unwrap_or_else(|| {
                    warn!(job = %id, "Job produced no result");
                    JobResult {
                        id,
                        job,
                        binding,
                        status: JobStatus::Failed,
                        step_results: Vec::new(),
                        failure: Some(JobFailure::Execution {
                            step: "job".to_string(),
                            message: "job task aborted before reporting a result".to_string(),
                        }),
                        skip_reason: None,
                        started_at: None,
                        finished_at: None,
                        duration: Duration::ZERO,
                    }
                })
            })
            .collect();

        let result = PipelineResult {
            run_id,
            pipeline: pipeline.name.clone(),
            job_results,
            cancelled: self.cancel.is_cancelled(),
            started_at,
            finished_at: Utc::now(),
        };

        let verdict = result.overall();
        info!(
            pipeline = %pipeline.name,
            ?verdict,
            passed = result.count(JobStatus::Passed),
            failed = result.count(JobStatus::Failed),
            skipped = result.count(JobStatus::Skipped),
            "Pipeline execution finished"
        );
        self.emit_event(&ExecutionEvent::PipelineCompleted { run_id, verdict });

        result
    }
}
