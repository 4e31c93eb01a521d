//! Test: Job Environment - per-instance variables and isolation

use crate::helpers::*;
use matrix_ci::core::JobStatus;
use matrix_ci::execution::SchedulingStrategy;
use std::collections::HashSet;

const WITH_ENV: &str = r#"
name: "Test: Environment"
env:
  CARGO_TERM_COLOR: always
  LEVEL: pipeline
jobs:
  - name: test
    axes:
      rust: [stable, nightly]
      target-os: [linux]
    env:
      LEVEL: job
      RUST_BACKTRACE: 1
    steps:
      - label: build
        run: cargo build
      - label: test
        run: cargo test
        env:
          LEVEL: step
"#;

/// Axis values, instance id and inherited variables reach every command
#[tokio::test]
async fn test_commands_receive_job_variables() {
    let runner = Script::new().runner();
    let result = run_with(WITH_ENV, &runner, SchedulingStrategy::Sequential).await;
    assert_eq!(result.count(JobStatus::Passed), 2);

    let requests = runner.requests();
    assert_eq!(requests.len(), 4);

    let build = &requests[0];
    assert_eq!(build.command, "cargo build");
    assert_eq!(build.env.get("MATRIX_RUST").map(String::as_str), Some("stable"));
    assert_eq!(build.env.get("MATRIX_TARGET_OS").map(String::as_str), Some("linux"));
    assert_eq!(
        build.env.get("PIPELINE_JOB_ID").map(String::as_str),
        Some("test (rust=stable, target-os=linux)")
    );
    assert_eq!(build.env.get("CARGO_TERM_COLOR").map(String::as_str), Some("always"));
    assert_eq!(build.env.get("RUST_BACKTRACE").map(String::as_str), Some("1"));
    assert_eq!(build.env.get("LEVEL").map(String::as_str), Some("job"));

    let test = &requests[1];
    assert_eq!(test.env.get("LEVEL").map(String::as_str), Some("step"));
}

/// Every instance gets its own scratch directory, shared by its steps
#[tokio::test]
async fn test_instances_have_private_scratch_dirs() {
    let runner = Script::new().runner();
    run_with(WITH_ENV, &runner, SchedulingStrategy::Parallel).await;

    let requests = runner.requests();
    let mut per_job: Vec<(String, String)> = requests
        .iter()
        .map(|r| (r.env["PIPELINE_JOB_ID"].clone(), r.env["PIPELINE_JOB_DIR"].clone()))
        .collect();
    per_job.sort();
    per_job.dedup();

    assert_eq!(per_job.len(), 2, "one scratch dir per instance: {:?}", per_job);
    let dirs: HashSet<&String> = per_job.iter().map(|(_, dir)| dir).collect();
    assert_eq!(dirs.len(), 2);

    for request in &requests {
        assert_eq!(request.env["TMPDIR"], request.env["PIPELINE_JOB_DIR"]);
    }
}

/// Step timeouts fall back to the job's, then the pipeline default
#[tokio::test]
async fn test_timeouts_are_inherited() {
    let yaml = r#"
name: "Test: Timeouts"
default_timeout_secs: 600
jobs:
  - name: quick
    timeout_secs: 30
    steps:
      - label: inherit
        run: one
      - label: override
        run: two
        timeout_secs: 5
  - name: default
    steps:
      - run: three
"#;

    let runner = Script::new().runner();
    run_with(yaml, &runner, SchedulingStrategy::Sequential).await;

    let timeouts: Vec<(String, Option<u64>)> = runner
        .requests()
        .into_iter()
        .map(|r| (r.command, r.timeout.map(|t| t.as_secs())))
        .collect();
    assert_eq!(
        timeouts,
        vec![
            ("one".to_string(), Some(30)),
            ("two".to_string(), Some(5)),
            ("three".to_string(), Some(600)),
        ]
    );
}
