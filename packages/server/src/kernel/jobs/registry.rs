//! Job type registry.
//!
//! Maps a job type name to a boxed async handler. The set of handlers is
//! closed: a job whose type has no registered handler is a permanent failure,
//! not a retry candidate.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use super::job::ErrorKind;
use super::queue::ClaimedJob;
use crate::kernel::deps::ServerDeps;

/// Delivery metadata handed to every handler alongside its payload.
///
/// `attempt` is 1-based; a value above 1 means this is a redelivery and the
/// handler may find side effects of an earlier attempt already in place.
#[derive(Debug, Clone, Copy)]
pub struct JobContext {
    pub job_id: Uuid,
    pub attempt: i32,
}

/// A handler failure, tagged with whether it is worth retrying.
///
/// The tag is chosen by the handler at the point where the error is raised;
/// the runner and queue treat it as opaque policy input and never inspect
/// the message text.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct JobError {
    pub kind: ErrorKind,
    #[source]
    pub source: anyhow::Error,
}

impl JobError {
    pub fn retryable(source: impl Into<anyhow::Error>) -> Self {
        Self {
            kind: ErrorKind::Retryable,
            source: source.into(),
        }
    }

    pub fn non_retryable(source: impl Into<anyhow::Error>) -> Self {
        Self {
            kind: ErrorKind::NonRetryable,
            source: source.into(),
        }
    }
}

impl From<anyhow::Error> for JobError {
    fn from(source: anyhow::Error) -> Self {
        // Untagged failures default to retryable; handlers tag the
        // permanent ones explicitly.
        Self::retryable(source)
    }
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), JobError>> + Send>>;

type BoxedHandler =
    Box<dyn Fn(serde_json::Value, JobContext, Arc<ServerDeps>) -> HandlerFuture + Send + Sync>;

/// Registry of job handlers keyed by job type.
#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<&'static str, BoxedHandler>,
}

pub type SharedJobRegistry = Arc<JobRegistry>;

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a job type.
    pub fn register<J, F, Fut>(&mut self, job_type: &'static str, handler: F)
    where
        J: DeserializeOwned + Send + 'static,
        F: Fn(J, JobContext, Arc<ServerDeps>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.handlers.insert(
            job_type,
            Box::new(move |args, ctx, deps| {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let command: J = serde_json::from_value(args).map_err(|e| {
                        JobError::non_retryable(anyhow::anyhow!("invalid payload: {}", e))
                    })?;
                    handler(command, ctx, deps).await
                })
            }),
        );
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    pub fn job_types(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    /// Execute the handler registered for this job's type.
    pub async fn execute(&self, claimed: &ClaimedJob, deps: Arc<ServerDeps>) -> Result<(), JobError> {
        let job_type = claimed.command_type();
        let handler = self.handlers.get(job_type).ok_or_else(|| {
            JobError::non_retryable(anyhow::anyhow!("unknown job type: {}", job_type))
        })?;

        let ctx = JobContext {
            job_id: claimed.id,
            attempt: claimed.job.attempt,
        };
        debug!(job_id = %claimed.id, job_type, attempt = ctx.attempt, "executing job handler");
        handler(claimed.job.args.clone(), ctx, deps).await
    }
}
