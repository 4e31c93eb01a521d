//! CLI output formatting

use crate::{
    core::{JobResult, JobStatus, PipelineResult, SkipReason, StepResult, StepStatus, Verdict},
    execution::ExecutionEvent,
    persistence::RunSummary,
    report::ResultReporter,
};
use anyhow::Result;
use async_trait::async_trait;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Lines of captured output shown for a failed step
const FAILURE_OUTPUT_LINES: usize = 20;

/// Create a progress bar over job instances
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a job status for display
pub fn format_job_status(status: JobStatus) -> String {
    match status {
        JobStatus::Passed => style("PASSED").green().to_string(),
        JobStatus::Failed => style("FAILED").red().to_string(),
        JobStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

/// Format a step status for display
pub fn format_step_status(status: StepStatus) -> String {
    match status {
        StepStatus::Passed => style("passed").green().to_string(),
        StepStatus::Failed => style("failed").red().to_string(),
        StepStatus::Tolerated => style("failed (tolerated)").yellow().to_string(),
        StepStatus::Skipped => style("skipped").dim().to_string(),
    }
}

/// Format a verdict for display
pub fn format_verdict(verdict: Verdict) -> String {
    match verdict {
        Verdict::Passed => style("PASSED").green().bold().to_string(),
        Verdict::Failed => style("FAILED").red().bold().to_string(),
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            run_id,
            pipeline_name,
            total_jobs,
        } => format!(
            "{} Starting pipeline {} with {} job(s) ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(total_jobs).cyan(),
            style(short_id(run_id)).dim()
        ),
        ExecutionEvent::JobStarted { job_id } => {
            format!("{} {}", SPINNER, style(job_id).cyan())
        }
        ExecutionEvent::StepStarted { job_id, index, label } => format!(
            "   {} step {}: {}",
            style(job_id).dim(),
            index + 1,
            style(label).cyan()
        ),
        ExecutionEvent::StepFinished { job_id, result } => format!(
            "   {} step {}: {} {} ({})",
            style(job_id).dim(),
            result.index + 1,
            result.label,
            format_step_status(result.status),
            style(format_duration(result.duration)).dim()
        ),
        ExecutionEvent::JobSkipped { result } | ExecutionEvent::JobFinished { result } => {
            format_job_line(result)
        }
        ExecutionEvent::PipelineCompleted { run_id, verdict } => format!(
            "{} Pipeline ({}) {}",
            INFO,
            style(short_id(run_id)).dim(),
            format_verdict(*verdict)
        ),
    }
}

/// One line describing a finished job
pub fn format_job_line(result: &JobResult) -> String {
    match result.status {
        JobStatus::Passed => format!(
            "{} {} {} ({})",
            CHECK,
            style(&result.id).green(),
            format_job_status(result.status),
            style(format_duration(result.duration)).dim()
        ),
        JobStatus::Failed => {
            let reason = result
                .failure
                .as_ref()
                .map(|f| f.to_string())
                .unwrap_or_default();
            format!(
                "{} {} {} ({}): {}",
                CROSS,
                style(&result.id).red(),
                format_job_status(result.status),
                style(format_duration(result.duration)).dim(),
                style(reason).dim()
            )
        }
        JobStatus::Skipped => {
            let reason = match result.skip_reason {
                Some(SkipReason::Cancelled) => "cancelled before start",
                _ => "condition not met",
            };
            format!(
                "{} {} {} ({})",
                SKIP,
                style(&result.id).dim(),
                format_job_status(result.status),
                style(reason).dim()
            )
        }
    }
}

/// Captured output of a step, stdout first
pub fn format_step_output(step: &StepResult, max_lines: usize) -> String {
    let mut sections = Vec::new();
    if !step.stdout.trim().is_empty() {
        sections.push(format_output(step.stdout.trim_end(), max_lines));
    }
    if !step.stderr.trim().is_empty() {
        sections.push(format_output(step.stderr.trim_end(), max_lines));
    }
    if let Some(error) = &step.error {
        sections.push(style(error).red().to_string());
    }
    sections.join("\n")
}

/// Format step output with truncation, keeping the last lines
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let tail = lines[lines.len() - max_lines..].join("\n");
        format!(
            "{}... ({} earlier lines)\n{}",
            style("[truncated]").dim(),
            lines.len() - max_lines,
            tail
        )
    }
}

/// One line describing a stored run
pub fn format_run_summary(summary: &RunSummary) -> String {
    let icon = match summary.verdict {
        Verdict::Passed => CHECK,
        Verdict::Failed => CROSS,
    };

    format!(
        "{} {} - {} - {} ({} passed, {} failed, {} skipped) - {}",
        icon,
        style(short_id(&summary.run_id)).dim(),
        style(&summary.pipeline_name).bold(),
        format_verdict(summary.verdict),
        style(summary.passed_jobs).green(),
        style(summary.failed_jobs).red(),
        style(summary.skipped_jobs).dim(),
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim()
    )
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{:.1}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Human readable report on stdout
pub struct ConsoleReporter {
    /// Show captured output of failed steps
    pub show_failures: bool,
}

impl ConsoleReporter {
    pub fn new(show_failures: bool) -> Self {
        Self { show_failures }
    }

    fn render(&self, result: &PipelineResult) -> String {
        let mut lines = vec![format!("\n{} Results for {}", INFO, style(&result.pipeline).bold())];

        for job in &result.job_results {
            lines.push(format!("  {}", format_job_line(job)));

            if self.show_failures && job.is_failed() {
                let failed_step = job
                    .step_results
                    .iter()
                    .rev()
                    .find(|s| s.status == StepStatus::Failed);
                if let Some(step) = failed_step {
                    let output = format_step_output(step, FAILURE_OUTPUT_LINES);
                    for line in output.lines() {
                        lines.push(format!("      {}", line));
                    }
                }
            }
        }

        if result.cancelled {
            lines.push(format!("\n{} Run was cancelled", WARN));
        }

        lines.push(format!(
            "\n{} {}: {} passed, {} failed, {} skipped in {}",
            match result.overall() {
                Verdict::Passed => CHECK,
                Verdict::Failed => CROSS,
            },
            format_verdict(result.overall()),
            style(result.count(JobStatus::Passed)).green(),
            style(result.count(JobStatus::Failed)).red(),
            style(result.count(JobStatus::Skipped)).dim(),
            style(format_duration(result.duration())).dim()
        ));

        lines.join("\n")
    }
}

#[async_trait]
impl ResultReporter for ConsoleReporter {
    async fn report(&self, result: &PipelineResult) -> Result<()> {
        println!("{}", self.render(result));
        Ok(())
    }
}

/// Machine readable report: the full result as pretty JSON on stdout
pub struct JsonReporter;

#[async_trait]
impl ResultReporter for JsonReporter {
    async fn report(&self, result: &PipelineResult) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(result)?);
        Ok(())
    }
}
