//! Scheduling strategy - how many jobs may run at once

/// Strategy for scheduling job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingStrategy {
    /// Execute jobs one at a time, in expansion order
    Sequential,

    /// Execute every job at once (bounded only by the pipeline's `max_parallel`)
    Parallel,

    /// Limited parallelism (max N concurrent jobs)
    LimitedParallel(usize),
}

impl Default for SchedulingStrategy {
    fn default() -> Self {
        SchedulingStrategy::Parallel
    }
}

impl SchedulingStrategy {
    /// Effective number of concurrent jobs, `None` meaning unbounded.
    ///
    /// An explicit strategy wins over the limit declared by the pipeline.
    pub fn concurrency_limit(&self, declared: Option<usize>) -> Option<usize> {
        match self {
            SchedulingStrategy::Sequential => Some(1),
            SchedulingStrategy::LimitedParallel(max) => Some((*max).max(1)),
            SchedulingStrategy::Parallel => declared.map(|max| max.max(1)),
        }
    }
}
