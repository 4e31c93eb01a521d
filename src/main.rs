use anyhow::{Context, Result};
use indicatif::ProgressBar;
use matrix_ci::cli::commands::{HistoryCommand, PlanCommand, RunCommand, ValidateCommand};
use matrix_ci::cli::output::*;
use matrix_ci::cli::{Cli, Command};
use matrix_ci::core::{DefinitionError, Pipeline, PipelineResult};
use matrix_ci::execution::{ExecutionEngine, ExecutionEvent, ShellRunner};
use matrix_ci::persistence::{HistoryReporter, InMemoryPersistence, PersistenceBackend, RunSummary};
use matrix_ci::report::{exit_code, ResultReporter, INVALID_DEFINITION_EXIT_CODE};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Lines of step output shown with `--stream`
const STREAM_OUTPUT_LINES: usize = 50;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    let code = match &cli.command {
        Command::Run(cmd) => run_pipelines(cmd, cli.stream).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::Plan(cmd) => plan_pipeline(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    };

    if code != 0 {
        std::process::exit(code);
    }

    Ok(())
}

fn load_pipeline(file: &str, jobs: &[String]) -> Result<Pipeline, DefinitionError> {
    let mut pipeline = Pipeline::load(file)?;
    if !jobs.is_empty() {
        pipeline.retain_jobs(jobs)?;
    }
    Ok(pipeline)
}

fn print_definition_error(file: &str, err: &DefinitionError) {
    println!("{} Invalid pipeline definition {}:", CROSS, style(file).bold());
    println!("  {}", style(err).red());
}

#[cfg(feature = "sqlite")]
async fn open_history() -> Result<Arc<dyn PersistenceBackend>> {
    let store = matrix_ci::persistence::SqliteRunStore::with_default_path().await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_history() -> Result<Arc<dyn PersistenceBackend>> {
    warn!("Built without sqlite support, run history is not kept between invocations");
    Ok(Arc::new(InMemoryPersistence::new()))
}

async fn run_pipelines(cmd: &RunCommand, stream: bool) -> Result<i32> {
    // Every definition must load before anything runs
    let mut pipelines = Vec::with_capacity(cmd.files.len());
    for file in &cmd.files {
        match load_pipeline(file, &cmd.job) {
            Ok(pipeline) => {
                if !cmd.json {
                    println!("{} Loaded pipeline: {}", INFO, style(&pipeline.name).bold());
                }
                pipelines.push(pipeline);
            }
            Err(err) => {
                print_definition_error(file, &err);
                return Ok(INVALID_DEFINITION_EXIT_CODE);
            }
        }
    }

    // Set up reporters
    let mut reporters: Vec<Box<dyn ResultReporter>> = Vec::new();
    if cmd.json {
        reporters.push(Box::new(JsonReporter));
    } else {
        reporters.push(Box::new(ConsoleReporter::new(true)));
    }

    let history: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        match open_history().await {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, "Run history unavailable, continuing without it");
                Arc::new(InMemoryPersistence::new())
            }
        }
    };
    reporters.push(Box::new(HistoryReporter::new(history)));

    // Ctrl-C cancels the whole invocation
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        });
    }

    let strategy = cmd.scheduling_strategy();
    debug!(?strategy, pipelines = pipelines.len(), "Running pipelines");

    let mut results: Vec<PipelineResult> = Vec::with_capacity(pipelines.len());
    for pipeline in &pipelines {
        let runner = match &pipeline.shell {
            Some(shell) => ShellRunner::new(shell.clone()),
            None => ShellRunner::default(),
        };

        let progress = if cmd.json {
            ProgressBar::hidden()
        } else {
            create_progress_bar(pipeline.instances().len())
        };

        let handler_progress = progress.clone();
        let quiet = cmd.json;
        let engine = ExecutionEngine::new(runner, strategy)
            .with_cancellation(cancel.clone())
            .with_event_handler(move |event| {
                handle_event(&handler_progress, event, stream, quiet);
            });

        if !cmd.json {
            println!();
        }
        let result = engine.execute(pipeline).await;
        progress.finish_and_clear();

        for reporter in &reporters {
            if let Err(err) = reporter.report(&result).await {
                warn!(error = %err, "Failed to report run");
            }
        }

        if !cmd.json && !cmd.no_history {
            println!(
                "{} Run saved to history (ID: {})",
                INFO,
                style(&result.run_id.to_string()[..8]).dim()
            );
        }

        results.push(result);
    }

    Ok(exit_code(&results))
}

fn handle_event(progress: &ProgressBar, event: &ExecutionEvent, stream: bool, quiet: bool) {
    if let ExecutionEvent::JobSkipped { result } | ExecutionEvent::JobFinished { result } = event {
        progress.inc(1);
        progress.set_message(result.id.clone());
    }

    if quiet {
        return;
    }

    match event {
        ExecutionEvent::StepStarted { .. } if !stream => {}
        ExecutionEvent::StepFinished { result, .. } if stream => {
            let output = format_step_output(result, STREAM_OUTPUT_LINES);
            progress.suspend(|| {
                println!("{}", format_execution_event(event));
                for line in output.lines() {
                    println!("      {}", line);
                }
            });
        }
        _ => progress.suspend(|| println!("{}", format_execution_event(event))),
    }
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<i32> {
    if !cmd.json {
        println!("{} Validating pipeline...", INFO);
    }

    let pipeline = match Pipeline::load(&cmd.file) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            if cmd.json {
                let data = json!({ "valid": false, "error": err.to_string() });
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                print_definition_error(&cmd.file, &err);
            }
            return Ok(INVALID_DEFINITION_EXIT_CODE);
        }
    };

    let instances = pipeline.instances().len();

    if cmd.json {
        let jobs: Vec<_> = pipeline
            .templates
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "steps": t.steps.len(),
                    "axes": t.axes.iter().map(|(name, values)| json!({ "name": name, "values": values })).collect::<Vec<_>>(),
                    "condition": t.condition.as_ref().map(|c| c.to_string()),
                    "instances": t.combinations(),
                })
            })
            .collect();
        let data = json!({
            "valid": true,
            "name": pipeline.name,
            "jobs": jobs,
            "instances": instances,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Pipeline definition is valid!", CHECK);
        println!("  Name: {}", style(&pipeline.name).bold());
        println!("  Jobs: {}", style(pipeline.templates.len()).cyan());
        println!("  Instances: {}", style(instances).cyan());
    }

    Ok(0)
}

fn plan_pipeline(cmd: &PlanCommand) -> Result<i32> {
    let pipeline = match Pipeline::load(&cmd.file) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            print_definition_error(&cmd.file, &err);
            return Ok(INVALID_DEFINITION_EXIT_CODE);
        }
    };

    let plan = pipeline.plan();

    if cmd.json {
        let entries: Vec<_> = plan
            .iter()
            .map(|planned| {
                let binding: serde_json::Map<String, serde_json::Value> = planned
                    .instance
                    .binding
                    .iter()
                    .map(|(axis, value)| (axis.to_string(), json!(value)))
                    .collect();
                json!({
                    "id": planned.instance.id,
                    "job": planned.instance.template.name,
                    "binding": binding,
                    "will_run": planned.will_run,
                })
            })
            .collect();
        let data = json!({ "pipeline": pipeline.name, "jobs": entries });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(0);
    }

    let runnable = plan.iter().filter(|p| p.will_run).count();
    println!(
        "{} Plan for {}: {} instance(s), {} to run, {} skipped",
        INFO,
        style(&pipeline.name).bold(),
        style(plan.len()).cyan(),
        style(runnable).green(),
        style(plan.len() - runnable).dim()
    );

    for planned in &plan {
        if planned.will_run {
            println!("  {} {}", ROCKET, style(&planned.instance.id).cyan());
        } else {
            let condition = planned
                .instance
                .template
                .condition
                .as_ref()
                .map(|c| c.to_string())
                .unwrap_or_default();
            println!(
                "  {} {} {}",
                SKIP,
                style(&planned.instance.id).dim(),
                style(format!("(if: {})", condition)).dim()
            );
        }
    }

    Ok(0)
}

async fn show_history(cmd: &HistoryCommand) -> Result<i32> {
    let store = open_history().await?;

    // If a specific run is requested
    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;

        match store.load_run(run_id).await? {
            Some(summary) if cmd.json => {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            Some(summary) => print_run_details(&summary, cmd.details),
            None => println!("{} Run not found", WARN),
        }
        return Ok(0);
    }

    let mut runs = match &cmd.pipeline {
        Some(pipeline_name) => store.list_runs(pipeline_name).await?,
        None => {
            let mut all_runs = Vec::new();
            for pipeline in store.list_pipelines().await? {
                all_runs.extend(store.list_runs(&pipeline).await?);
            }
            all_runs
        }
    };
    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    runs.truncate(cmd.limit);

    if cmd.json {
        let data = json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(0);
    }

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(0);
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);
    for summary in &runs {
        println!("  {}", format_run_summary(summary));
        if cmd.details {
            for job in &summary.jobs {
                println!("      {}", format_job_line(job));
            }
        }
    }

    Ok(0)
}

fn print_run_details(summary: &RunSummary, details: bool) {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Verdict: {}", format_verdict(summary.verdict));
    if summary.cancelled {
        println!("  {} Cancelled", WARN);
    }
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    println!("  Finished: {}", style(summary.finished_at.to_rfc3339()).dim());
    if let Ok(duration) = summary
        .finished_at
        .signed_duration_since(summary.started_at)
        .to_std()
    {
        println!("  Duration: {}", style(format_duration(duration)).dim());
    }
    println!(
        "  Jobs: {} total, {} passed, {} failed, {} skipped",
        style(summary.total_jobs).cyan(),
        style(summary.passed_jobs).green(),
        style(summary.failed_jobs).red(),
        style(summary.skipped_jobs).dim()
    );

    println!();
    for job in &summary.jobs {
        println!("  {}", format_job_line(job));
        if details {
            for step in &job.step_results {
                println!(
                    "      {}. {} {}",
                    step.index + 1,
                    step.label,
                    format_step_status(step.status)
                );
            }
        }
    }
}
