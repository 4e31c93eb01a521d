//! Test: Conditional Jobs - job and step conditions over axis values

use crate::helpers::*;
use matrix_ci::core::{JobStatus, SkipReason, StepStatus, Verdict};
use matrix_ci::execution::SchedulingStrategy;

const TOOLCHAINS: &str = r#"
name: "Test: Toolchains"
jobs:
  - name: test
    axes:
      rust: [stable, beta, nightly]
    steps:
      - label: build
        run: cargo +${{ matrix.rust }} build
      - label: test
        run: cargo +${{ matrix.rust }} test
  - name: bench
    axes:
      rust: [stable, beta, nightly]
    if: matrix.rust == 'nightly'
    steps:
      - label: bench
        run: cargo +${{ matrix.rust }} bench
"#;

/// Two templates over three toolchains: six instances, four run, two skipped
#[tokio::test]
async fn test_condition_skips_instances() {
    let runner = Script::new().runner();
    let result = run_with(TOOLCHAINS, &runner, SchedulingStrategy::Parallel).await;

    assert_eq!(result.job_results.len(), 6);
    assert_eq!(result.count(JobStatus::Passed), 4);
    assert_eq!(result.count(JobStatus::Skipped), 2);
    assert_eq!(result.overall(), Verdict::Passed);

    assert_job_status(&result, "bench (rust=nightly)", JobStatus::Passed);
    for id in ["bench (rust=stable)", "bench (rust=beta)"] {
        let skipped = job(&result, id);
        assert_eq!(skipped.status, JobStatus::Skipped);
        assert_eq!(skipped.skip_reason, Some(SkipReason::ConditionFalse));
        assert!(skipped.step_results.is_empty());
    }

    let benches: Vec<String> = runner
        .commands()
        .into_iter()
        .filter(|c| c.ends_with("bench"))
        .collect();
    assert_eq!(benches, vec!["cargo +nightly bench"]);
}

/// Skipped jobs never fail a pipeline, even when every job is skipped
#[tokio::test]
async fn test_all_skipped_pipeline_passes() {
    let yaml = r#"
name: "Test: Nothing To Do"
jobs:
  - name: release
    axes:
      channel: [beta, nightly]
    if: channel == stable
    steps:
      - run: publish
"#;

    let runner = Script::new().runner();
    let result = run_with(yaml, &runner, SchedulingStrategy::Parallel).await;

    assert_eq!(result.count(JobStatus::Skipped), 2);
    assert_eq!(result.overall(), Verdict::Passed);
    assert!(runner.commands().is_empty());
}

/// Boolean combinations select the expected instances
#[tokio::test]
async fn test_compound_condition() {
    let yaml = r#"
name: "Test: Compound"
jobs:
  - name: test
    axes:
      os: [linux, windows]
      rust: [stable, nightly]
    if: "os == linux && (rust == nightly || rust == stable) && !(rust == nightly)"
    steps:
      - run: cargo test
"#;

    let runner = Script::new().runner();
    let result = run_with(yaml, &runner, SchedulingStrategy::Parallel).await;

    let ran: Vec<&str> = result
        .job_results
        .iter()
        .filter(|j| j.status == JobStatus::Passed)
        .map(|j| j.id.as_str())
        .collect();
    assert_eq!(ran, vec!["test (os=linux, rust=stable)"]);
    assert_eq!(result.count(JobStatus::Skipped), 3);
}

/// A false step condition records the step as skipped and keeps going
#[tokio::test]
async fn test_step_condition_skips_step() {
    let yaml = r#"
name: "Test: Step Conditions"
jobs:
  - name: test
    axes:
      rust: [stable, nightly]
    steps:
      - label: build
        run: cargo build
      - label: minimal-versions
        run: cargo update -Z minimal-versions
        if: rust == nightly
      - label: test
        run: cargo test
"#;

    let runner = Script::new().runner();
    let result = run_with(yaml, &runner, SchedulingStrategy::Parallel).await;

    assert_steps(
        &result,
        "test (rust=stable)",
        &[
            ("build", StepStatus::Passed),
            ("minimal-versions", StepStatus::Skipped),
            ("test", StepStatus::Passed),
        ],
    );
    assert_steps(
        &result,
        "test (rust=nightly)",
        &[
            ("build", StepStatus::Passed),
            ("minimal-versions", StepStatus::Passed),
            ("test", StepStatus::Passed),
        ],
    );

    let updates = runner
        .commands()
        .into_iter()
        .filter(|c| c.starts_with("cargo update"))
        .count();
    assert_eq!(updates, 1);
}
