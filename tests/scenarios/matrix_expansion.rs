//! Test: Matrix Expansion - one job instance per axis combination

use crate::helpers::*;
use matrix_ci::core::{JobStatus, MatrixExpander, Verdict};
use matrix_ci::execution::SchedulingStrategy;
use std::collections::HashSet;

const TWO_AXES: &str = r#"
name: "Test: Matrix"
jobs:
  - name: test
    axes:
      os: [linux, macos]
      rust: [stable, beta, nightly]
    steps:
      - label: build
        run: build --os ${{ matrix.os }} --toolchain ${{ matrix.rust }}
"#;

/// Every combination runs exactly once with its own values
#[tokio::test]
async fn test_every_combination_runs_once() {
    let runner = Script::new().runner();
    let result = run_with(TWO_AXES, &runner, SchedulingStrategy::Parallel).await;

    assert_eq!(result.job_results.len(), 6);
    assert_eq!(result.count(JobStatus::Passed), 6);
    assert_eq!(result.overall(), Verdict::Passed);

    let commands: HashSet<String> = runner.commands().into_iter().collect();
    assert_eq!(commands.len(), 6);
    assert!(commands.contains("build --os macos --toolchain nightly"));
    assert!(commands.contains("build --os linux --toolchain stable"));
}

/// Results come back in expansion order regardless of completion order
#[tokio::test]
async fn test_results_follow_expansion_order() {
    let runner = Script::new().runner();
    let result = run_with(TWO_AXES, &runner, SchedulingStrategy::Parallel).await;

    assert_eq!(
        ids(&result),
        vec![
            "test (os=linux, rust=stable)",
            "test (os=linux, rust=beta)",
            "test (os=linux, rust=nightly)",
            "test (os=macos, rust=stable)",
            "test (os=macos, rust=beta)",
            "test (os=macos, rust=nightly)",
        ]
    );
}

/// Bindings are distinct and cover the full cross product
#[test]
fn test_bindings_are_distinct() {
    let pipeline = pipeline_from_yaml(TWO_AXES);
    let instances = MatrixExpander::expand(&pipeline.templates[0]);

    let bindings: HashSet<_> = instances.iter().map(|i| i.binding.clone()).collect();
    assert_eq!(bindings.len(), 6);
    assert!(instances.iter().all(|i| i.binding.len() == 2));
}

/// A job without axes expands to a single instance named after the job
#[tokio::test]
async fn test_job_without_axes() {
    let yaml = r#"
name: "Test: No Matrix"
jobs:
  - name: lint
    steps:
      - label: clippy
        run: cargo clippy
"#;

    let runner = Script::new().runner();
    let result = run_with(yaml, &runner, SchedulingStrategy::Parallel).await;

    assert_eq!(ids(&result), vec!["lint"]);
    assert_job_status(&result, "lint", JobStatus::Passed);
    assert_eq!(runner.commands(), vec!["cargo clippy"]);
}

/// Sequential scheduling never overlaps jobs
#[tokio::test]
async fn test_sequential_runs_one_at_a_time() {
    let runner = Script::new().runner();
    let result = run_with(TWO_AXES, &runner, SchedulingStrategy::Sequential).await;

    assert_eq!(result.count(JobStatus::Passed), 6);
    assert_eq!(runner.peak(), 1);
}

/// The pipeline's own max_parallel bounds the default strategy
#[tokio::test]
async fn test_declared_max_parallel_is_respected() {
    let yaml = r#"
name: "Test: Declared Limit"
max_parallel: 2
jobs:
  - name: test
    axes:
      n: [a, b, c, d, e]
    steps:
      - run: work ${{ matrix.n }}
"#;

    let runner = Script::new().runner();
    let result = run_with(yaml, &runner, SchedulingStrategy::Parallel).await;

    assert_eq!(result.count(JobStatus::Passed), 5);
    assert!(runner.peak() <= 2, "peak concurrency was {}", runner.peak());
}
