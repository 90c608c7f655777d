// Executor module for job runs
// Provides the runner trait and the paginated executor behind it

pub mod job;
pub mod writer;

use crate::errors::ExecutionError;
use crate::models::JobDefinition;
use async_trait::async_trait;

pub use job::{sink_name, ExecutorConfig, JobExecutor, JobRun};
pub use writer::{BatchWriter, PendingWrites, WriteReport};

/// JobRunner runs one job definition end to end
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Run the job; returns once every page has been read and dispatched
    async fn run(&self, definition: &JobDefinition) -> Result<JobRun, ExecutionError>;
}
