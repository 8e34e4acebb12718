//! Durable job pipeline: queue, registry and runner.

pub mod job;
pub mod queue;
pub mod registry;
pub mod runner;
pub mod testing;

pub use job::{
    backoff_delay, retry_decision, ErrorKind, Job, JobStatus, QueueName, RetryDecision,
    MAX_BACKOFF_MS,
};
pub use queue::{ClaimedJob, CommandMeta, JobQueue, JobQueueExt, PostgresJobQueue, QueueStats};
pub use registry::{JobContext, JobError, JobRegistry, SharedJobRegistry};
pub use runner::{JobRunner, JobRunnerConfig};
