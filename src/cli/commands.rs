//! CLI command definitions

use crate::execution::SchedulingStrategy;
use clap::Args;
use std::num::NonZeroUsize;

/// Run one or more pipelines
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to a pipeline YAML file (repeatable, each runs independently)
    #[arg(short = 'f', long = "file", required = true)]
    pub files: Vec<String>,

    /// Scheduling strategy
    #[arg(long, value_enum, default_value_t = SchedulingStrategyArg::Parallel)]
    pub strategy: SchedulingStrategyArg,

    /// Maximum number of jobs running at once
    #[arg(long)]
    pub max_parallel: Option<NonZeroUsize>,

    /// Only run the named job templates (repeatable)
    #[arg(long)]
    pub job: Vec<String>,

    /// Don't save runs to history
    #[arg(long)]
    pub no_history: bool,

    /// Print the aggregated result as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunCommand {
    /// Strategy after applying `--max-parallel`
    pub fn scheduling_strategy(&self) -> SchedulingStrategy {
        match (self.strategy, self.max_parallel) {
            (SchedulingStrategyArg::Sequential, _) => SchedulingStrategy::Sequential,
            (_, Some(max)) => SchedulingStrategy::LimitedParallel(max.get()),
            (arg, None) => arg.into(),
        }
    }
}

/// Validate a pipeline definition
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show the expanded job instances of a pipeline
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show per-job details
    #[arg(long)]
    pub details: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single run
    #[arg(long)]
    pub run_id: Option<String>,
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

/// Concurrency used by `parallel-limited` without `--max-parallel`
pub const DEFAULT_PARALLEL_LIMIT: usize = 4;

impl From<SchedulingStrategyArg> for SchedulingStrategy {
    fn from(arg: SchedulingStrategyArg) -> Self {
        match arg {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
            SchedulingStrategyArg::ParallelLimited => {
                SchedulingStrategy::LimitedParallel(DEFAULT_PARALLEL_LIMIT)
            }
        }
    }
}
