//! Result reporting - consumers of a finished pipeline run

use crate::core::{PipelineResult, Verdict};
use anyhow::Result;
use async_trait::async_trait;

/// Consumes the aggregated result of a pipeline run
#[async_trait]
pub trait ResultReporter: Send + Sync {
    async fn report(&self, result: &PipelineResult) -> Result<()>;
}

/// Process exit code for a set of pipeline runs: 0 if all passed, 1 otherwise
pub fn exit_code<'a>(results: impl IntoIterator<Item = &'a PipelineResult>) -> i32 {
    let all_passed = results.into_iter().all(|r| r.overall() == Verdict::Passed);
    if all_passed {
        0
    } else {
        1
    }
}

/// Exit code used when a pipeline definition is invalid
pub const INVALID_DEFINITION_EXIT_CODE: i32 = 2;
