//! Test: Failure Handling - short-circuiting, tolerated failures and isolation

use crate::helpers::*;
use matrix_ci::core::{JobFailure, JobStatus, StepStatus, Verdict};
use matrix_ci::execution::SchedulingStrategy;

/// A failing first step stops the job: exactly one step recorded
#[tokio::test]
async fn test_first_step_failure_short_circuits() {
    let yaml = r#"
name: "Test: Short Circuit"
jobs:
  - name: test
    steps:
      - label: build
        run: cargo build
      - label: test
        run: cargo test
"#;

    let runner = Script::new().exit("cargo build", 101).runner();
    let result = run_with(yaml, &runner, SchedulingStrategy::Parallel).await;

    assert_job_status(&result, "test", JobStatus::Failed);
    assert_steps(&result, "test", &[("build", StepStatus::Failed)]);
    assert_eq!(
        job(&result, "test").failure,
        Some(JobFailure::StepFailed {
            step: "build".to_string(),
            exit_code: Some(101),
        })
    );
    assert_eq!(runner.commands(), vec!["cargo build"]);
    assert_eq!(result.overall(), Verdict::Failed);
}

/// A tolerated failure is recorded, later steps still run and decide the outcome
#[tokio::test]
async fn test_continue_on_error_records_every_step() {
    let yaml = r#"
name: "Test: Tolerated"
jobs:
  - name: passes
    steps:
      - label: audit
        run: cargo audit
        continue_on_error: true
      - label: test
        run: cargo test
  - name: fails
    steps:
      - label: audit
        run: cargo audit
        continue_on_error: true
      - label: doc
        run: cargo doc
"#;

    let runner = Script::new()
        .exit("cargo audit", 1)
        .exit("cargo doc", 2)
        .runner();
    let result = run_with(yaml, &runner, SchedulingStrategy::Sequential).await;

    assert_job_status(&result, "passes", JobStatus::Passed);
    assert_steps(
        &result,
        "passes",
        &[("audit", StepStatus::Tolerated), ("test", StepStatus::Passed)],
    );
    assert_eq!(job(&result, "passes").step_results[0].exit_code, Some(1));

    assert_job_status(&result, "fails", JobStatus::Failed);
    assert_steps(
        &result,
        "fails",
        &[("audit", StepStatus::Tolerated), ("doc", StepStatus::Failed)],
    );
}

/// One failing instance leaves its siblings running to completion
#[tokio::test]
async fn test_failure_is_isolated_to_its_instance() {
    let yaml = r#"
name: "Test: Isolation"
jobs:
  - name: test
    axes:
      rust: [stable, beta, nightly]
    steps:
      - label: test
        run: cargo +${{ matrix.rust }} test
      - label: doc
        run: cargo +${{ matrix.rust }} doc
"#;

    let runner = Script::new().exit("cargo +beta test", 1).runner();
    let result = run_with(yaml, &runner, SchedulingStrategy::Parallel).await;

    assert_job_status(&result, "test (rust=stable)", JobStatus::Passed);
    assert_job_status(&result, "test (rust=beta)", JobStatus::Failed);
    assert_job_status(&result, "test (rust=nightly)", JobStatus::Passed);
    assert_eq!(result.count(JobStatus::Failed), 1);
    assert_eq!(result.overall(), Verdict::Failed);

    let commands = runner.commands();
    assert!(commands.contains(&"cargo +nightly doc".to_string()));
    assert!(!commands.contains(&"cargo +beta doc".to_string()));
}

/// A command that cannot be launched fails the job even when tolerated
#[tokio::test]
async fn test_launch_failure_is_never_tolerated() {
    let yaml = r#"
name: "Test: Launch Failure"
jobs:
  - name: broken
    steps:
      - label: missing
        run: no-such-tool
        continue_on_error: true
      - label: after
        run: echo after
  - name: healthy
    steps:
      - label: ok
        run: echo ok
"#;

    let runner = Script::new().unlaunchable("no-such-tool").runner();
    let result = run_with(yaml, &runner, SchedulingStrategy::Parallel).await;

    assert_job_status(&result, "broken", JobStatus::Failed);
    assert_steps(&result, "broken", &[("missing", StepStatus::Failed)]);

    let broken = job(&result, "broken");
    assert!(matches!(broken.failure, Some(JobFailure::Execution { .. })));
    assert!(broken.step_results[0].error.is_some());

    assert_job_status(&result, "healthy", JobStatus::Passed);
    assert!(!runner.commands().contains(&"echo after".to_string()));
}

/// Overall verdict ignores skipped jobs and fails on any failed one
#[tokio::test]
async fn test_verdict_counts_only_failures() {
    let yaml = r#"
name: "Test: Verdict"
jobs:
  - name: test
    axes:
      rust: [stable, nightly]
    steps:
      - run: cargo test
  - name: nightly-only
    axes:
      rust: [stable, nightly]
    if: rust == nightly
    steps:
      - run: cargo miri test
"#;

    let passing = Script::new().runner();
    let result = run_with(yaml, &passing, SchedulingStrategy::Parallel).await;
    assert_eq!(result.count(JobStatus::Skipped), 1);
    assert_eq!(result.overall(), Verdict::Passed);

    let failing = Script::new().exit("cargo miri test", 1).runner();
    let result = run_with(yaml, &failing, SchedulingStrategy::Parallel).await;
    assert_eq!(result.count(JobStatus::Failed), 1);
    assert_eq!(result.overall(), Verdict::Failed);
}
