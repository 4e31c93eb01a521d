//! Test: Cancellation - operator abort during a run

use crate::helpers::*;
use matrix_ci::core::{JobFailure, JobStatus, SkipReason, Verdict};
use matrix_ci::execution::{ExecutionEngine, SchedulingStrategy};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SIX_JOBS: &str = r#"
name: "Test: Cancellation"
jobs:
  - name: test
    axes:
      n: ["1", "2", "3", "4", "5", "6"]
    steps:
      - label: work
        run: work ${{ matrix.n }}
      - label: report
        run: report ${{ matrix.n }}
"#;

/// Cancel once two jobs have finished and two more are in flight
#[tokio::test]
async fn test_cancel_after_two_jobs_complete() {
    let cancel = CancellationToken::new();
    let runner = Script::new()
        .hang("work 3")
        .hang("work 4")
        .cancel_when_hanging(2, cancel.clone())
        .runner();

    let pipeline = pipeline_from_yaml(SIX_JOBS);
    let engine = ExecutionEngine::new(runner.clone(), SchedulingStrategy::LimitedParallel(2))
        .with_cancellation(cancel.clone());

    let result = tokio::time::timeout(Duration::from_secs(10), engine.execute(&pipeline))
        .await
        .expect("cancelled run should finish promptly");

    assert!(result.cancelled);
    assert_eq!(result.job_results.len(), 6);

    assert_job_status(&result, "test (n=1)", JobStatus::Passed);
    assert_job_status(&result, "test (n=2)", JobStatus::Passed);

    for id in ["test (n=3)", "test (n=4)"] {
        assert_job_status(&result, id, JobStatus::Failed);
        assert_eq!(job(&result, id).failure, Some(JobFailure::Cancelled));
    }

    for id in ["test (n=5)", "test (n=6)"] {
        assert_job_status(&result, id, JobStatus::Skipped);
        assert_eq!(job(&result, id).skip_reason, Some(SkipReason::Cancelled));
    }

    assert_eq!(result.overall(), Verdict::Failed);

    let commands = runner.commands();
    assert!(!commands.iter().any(|c| c == "work 5" || c == "work 6"));
    assert!(!commands.iter().any(|c| c == "report 3" || c == "report 4"));
}

/// A run cancelled before it starts skips every job and fails
#[tokio::test]
async fn test_cancel_before_start() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let runner = Script::new().runner();
    let pipeline = pipeline_from_yaml(SIX_JOBS);
    let engine = ExecutionEngine::new(runner.clone(), SchedulingStrategy::Parallel).with_cancellation(cancel);

    let result = engine.execute(&pipeline).await;

    assert_eq!(result.count(JobStatus::Skipped), 6);
    assert!(result
        .job_results
        .iter()
        .all(|j| j.skip_reason == Some(SkipReason::Cancelled)));
    assert!(runner.commands().is_empty());
    assert_eq!(result.overall(), Verdict::Failed);
}
