//! Test utility functions for matrix-ci scenarios

use async_trait::async_trait;
use matrix_ci::core::config::PipelineConfig;
use matrix_ci::core::{ExecutionError, JobResult, JobStatus, Pipeline, PipelineResult, StepStatus};
use matrix_ci::execution::{
    CommandOutput, CommandRequest, CommandRunner, ExecutionEngine, SchedulingStrategy, Termination,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How the mock runner answers each command line
#[derive(Default)]
pub struct Script {
    exit_codes: HashMap<String, i32>,
    errors: HashSet<String>,
    hangs: HashSet<String>,
    cancel_when_hanging: Option<(usize, CancellationToken)>,
    delay: Duration,
}

impl Script {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(5),
            ..Self::default()
        }
    }

    /// Command exits with `code`
    pub fn exit(mut self, command: &str, code: i32) -> Self {
        self.exit_codes.insert(command.to_string(), code);
        self
    }

    /// Command cannot be launched
    pub fn unlaunchable(mut self, command: &str) -> Self {
        self.errors.insert(command.to_string());
        self
    }

    /// Command runs until the run is cancelled
    pub fn hang(mut self, command: &str) -> Self {
        self.hangs.insert(command.to_string());
        self
    }

    /// Cancel `token` once `count` hanging commands are in flight
    pub fn cancel_when_hanging(mut self, count: usize, token: CancellationToken) -> Self {
        self.cancel_when_hanging = Some((count, token));
        self
    }

    pub fn runner(self) -> ScriptedRunner {
        ScriptedRunner {
            inner: Arc::new(Inner {
                script: self,
                requests: Mutex::new(Vec::new()),
                hanging: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }
}

struct Inner {
    script: Script,
    requests: Mutex<Vec<CommandRequest>>,
    hanging: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
}

/// Mock runner that answers from a script and records every request
#[derive(Clone)]
pub struct ScriptedRunner {
    inner: Arc<Inner>,
}

impl ScriptedRunner {
    /// Every request received, in arrival order
    pub fn requests(&self) -> Vec<CommandRequest> {
        self.inner.requests.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.command).collect()
    }

    /// Highest number of commands seen running at once
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    fn output(termination: Termination, duration: Duration) -> CommandOutput {
        CommandOutput {
            termination,
            stdout: String::new(),
            stderr: String::new(),
            duration,
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, request: CommandRequest, cancel: CancellationToken) -> Result<CommandOutput, ExecutionError> {
        let inner = &self.inner;
        inner.requests.lock().unwrap().push(request.clone());

        if inner.script.errors.contains(&request.command) {
            return Err(ExecutionError::Spawn {
                program: request.command,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such program"),
            });
        }

        let now = inner.running.fetch_add(1, Ordering::SeqCst) + 1;
        inner.peak.fetch_max(now, Ordering::SeqCst);

        let output = if inner.script.hangs.contains(&request.command) {
            let hanging = inner.hanging.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((count, token)) = &inner.script.cancel_when_hanging {
                if hanging >= *count {
                    token.cancel();
                }
            }
            cancel.cancelled().await;
            Self::output(Termination::Cancelled, Duration::ZERO)
        } else {
            tokio::time::sleep(inner.script.delay).await;
            let code = inner.script.exit_codes.get(&request.command).copied().unwrap_or(0);
            Self::output(Termination::Exited(Some(code)), inner.script.delay)
        };

        inner.running.fetch_sub(1, Ordering::SeqCst);
        Ok(output)
    }
}

/// Build a pipeline from YAML, panicking on invalid definitions
pub fn pipeline_from_yaml(yaml: &str) -> Pipeline {
    PipelineConfig::from_yaml(yaml)
        .expect("pipeline YAML should parse")
        .to_pipeline()
        .expect("pipeline should be valid")
}

/// Run a pipeline with the given runner and strategy
pub async fn run_with(yaml: &str, runner: &ScriptedRunner, strategy: SchedulingStrategy) -> PipelineResult {
    let pipeline = pipeline_from_yaml(yaml);
    ExecutionEngine::new(runner.clone(), strategy).execute(&pipeline).await
}

/// Look up a job result by instance id
pub fn job<'a>(result: &'a PipelineResult, id: &str) -> &'a JobResult {
    result
        .job(id)
        .unwrap_or_else(|| panic!("no job '{}' in {:?}", id, ids(result)))
}

/// Instance ids in result order
pub fn ids(result: &PipelineResult) -> Vec<&str> {
    result.job_results.iter().map(|j| j.id.as_str()).collect()
}

pub fn assert_job_status(result: &PipelineResult, id: &str, expected: JobStatus) {
    let actual = job(result, id).status;
    assert_eq!(actual, expected, "job '{}' should be {:?}, was {:?}", id, expected, actual);
}

/// Assert the recorded steps of a job, label and status in order
pub fn assert_steps(result: &PipelineResult, id: &str, expected: &[(&str, StepStatus)]) {
    let actual: Vec<(&str, StepStatus)> = job(result, id)
        .step_results
        .iter()
        .map(|s| (s.label.as_str(), s.status))
        .collect();
    assert_eq!(actual, expected, "steps of job '{}'", id);
}
