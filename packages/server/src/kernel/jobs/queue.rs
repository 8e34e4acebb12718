//! Job queue abstraction and its PostgreSQL implementation.
//!
//! Enqueue stores a serialized command as a pending row; workers claim rows
//! with `FOR UPDATE SKIP LOCKED` (exclusive lease), and terminal reporting
//! goes through `mark_succeeded` / `mark_failed`. Retry scheduling and
//! dead-lettering live entirely in `mark_failed`, driven by the pure
//! [`retry_decision`] policy.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use super::job::{retry_decision, ErrorKind, Job, QueueName, RetryDecision};

/// Metadata a command provides so the queue can route and retry it.
pub trait CommandMeta {
    /// Which queue this command belongs to.
    fn queue(&self) -> QueueName;

    /// The command type name (used as job_type).
    fn command_type(&self) -> &'static str;

    /// Maximum delivery attempts before dead-lettering.
    fn max_attempts(&self) -> i32 {
        3
    }

    /// Base delay for the backoff schedule.
    fn base_delay_ms(&self) -> i64 {
        2000
    }

    /// Optional delay before the first delivery.
    fn initial_delay(&self) -> Option<Duration> {
        None
    }
}

/// A claimed job ready for execution.
#[derive(Debug)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub job: Job,
}

impl ClaimedJob {
    /// Deserialize the command payload.
    pub fn deserialize<C: DeserializeOwned>(&self) -> Result<C> {
        serde_json::from_value(self.job.args.clone())
            .map_err(|e| anyhow!("failed to deserialize command: {}", e))
    }

    pub fn command_type(&self) -> &str {
        &self.job.job_type
    }
}

/// Per-queue counts by state. Eventually consistent, read-only.
#[derive(Debug, Clone, Copy, Default, FromRow, Serialize)]
pub struct QueueStats {
    pub waiting: i64,
    pub delayed: i64,
    pub active: i64,
    pub succeeded: i64,
    pub dead_letter: i64,
}

/// Trait for job queue operations.
///
/// Object-safe on purpose: workers, the HTTP surface and tests all hold an
/// `Arc<dyn JobQueue>`. The typed enqueue lives on [`JobQueueExt`].
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a serialized payload. Fails (never silently drops) when the
    /// backing store is unavailable.
    async fn enqueue_raw(
        &self,
        queue: QueueName,
        job_type: &str,
        args: serde_json::Value,
        max_attempts: i32,
        base_delay_ms: i64,
        initial_delay: Option<Duration>,
    ) -> Result<Uuid>;

    /// Claim up to `limit` ready jobs, granting this worker an exclusive
    /// time-bounded lease on each.
    async fn claim(
        &self,
        queue: QueueName,
        worker_id: &str,
        limit: i64,
    ) -> Result<Vec<ClaimedJob>>;

    /// Look up a job by id (for status introspection).
    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Mark a job as successfully completed. Idempotent: a second ack
    /// for the same job is a no-op.
    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()>;

    /// Mark a job as failed. Retryable errors with attempts remaining are
    /// rescheduled with backoff; everything else dead-letters.
    async fn mark_failed(&self, job_id: Uuid, error: &str, kind: ErrorKind) -> Result<()>;

    /// Extend the lease for a running job (heartbeat).
    async fn heartbeat(&self, job_id: Uuid) -> Result<()>;

    /// Counts by state for one queue.
    async fn stats(&self, queue: QueueName) -> Result<QueueStats>;
}

/// Typed enqueue for any [`CommandMeta`] command.
#[async_trait]
pub trait JobQueueExt: JobQueue {
    async fn enqueue<C>(&self, command: C) -> Result<Uuid>
    where
        C: CommandMeta + Serialize + Send + Sync,
    {
        let args = serde_json::to_value(&command).context("failed to serialize command")?;
        self.enqueue_raw(
            command.queue(),
            command.command_type(),
            args,
            command.max_attempts(),
            command.base_delay_ms(),
            command.initial_delay(),
        )
        .await
    }
}

impl<Q: JobQueue + ?Sized> JobQueueExt for Q {}

/// PostgreSQL-backed job queue implementation.
pub struct PostgresJobQueue {
    pool: PgPool,
    default_lease_ms: i64,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            default_lease_ms: 60_000, // 1 minute
        }
    }

    pub fn with_lease_duration(pool: PgPool, lease_ms: i64) -> Self {
        Self {
            pool,
            default_lease_ms: lease_ms,
        }
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue_raw(
        &self,
        queue: QueueName,
        job_type: &str,
        args: serde_json::Value,
        max_attempts: i32,
        base_delay_ms: i64,
        initial_delay: Option<Duration>,
    ) -> Result<Uuid> {
        let run_at = initial_delay.map(|d| Utc::now() + d);
        let job = Job::new(queue, job_type, args, max_attempts, base_delay_ms, run_at);
        let inserted = job
            .insert(&self.pool)
            .await
            .context("job queue unavailable")?;

        info!(job_id = %inserted.id, queue = %queue, job_type, "job enqueued");
        Ok(inserted.id)
    }

    async fn claim(
        &self,
        queue: QueueName,
        worker_id: &str,
        limit: i64,
    ) -> Result<Vec<ClaimedJob>> {
        let jobs = Job::claim(queue, limit, worker_id, self.default_lease_ms, &self.pool).await?;
        Ok(jobs
            .into_iter()
            .map(|job| ClaimedJob { id: job.id, job })
            .collect())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        Job::find_by_id(job_id, &self.pool).await
    }

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'succeeded',
                error_message = NULL,
                error_kind = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error: &str, kind: ErrorKind) -> Result<()> {
        let job = Job::find_by_id(job_id, &self.pool)
            .await?
            .ok_or_else(|| anyhow!("job {} not found", job_id))?;

        match retry_decision(
            job.attempt,
            job.max_attempts,
            job.base_delay_ms,
            kind,
            Utc::now(),
        ) {
            RetryDecision::Retry { next_run_at } => {
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET status = 'pending',
                        next_run_at = $1,
                        error_message = $2,
                        error_kind = $3,
                        lease_expires_at = NULL,
                        worker_id = NULL,
                        updated_at = NOW()
                    WHERE id = $4
                    "#,
                )
                .bind(next_run_at)
                .bind(error)
                .bind(kind)
                .bind(job_id)
                .execute(&self.pool)
                .await?;
            }
            RetryDecision::DeadLetter => {
                let reason = if kind.should_retry() {
                    "max attempts exceeded"
                } else {
                    "non-retryable error"
                };
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET status = 'dead_letter',
                        error_message = $1,
                        error_kind = $2,
                        dead_lettered_at = NOW(),
                        dead_letter_reason = $3,
                        lease_expires_at = NULL,
                        worker_id = NULL,
                        updated_at = NOW()
                    WHERE id = $4
                    "#,
                )
                .bind(error)
                .bind(kind)
                .bind(reason)
                .bind(job_id)
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }

    async fn heartbeat(&self, job_id: Uuid) -> Result<()> {
        Job::extend_lease(job_id, self.default_lease_ms, &self.pool).await
    }

    async fn stats(&self, queue: QueueName) -> Result<QueueStats> {
        let stats = sqlx::query_as::<_, QueueStats>(
            r#"
            SELECT
                COUNT(*) FILTER (
                    WHERE status = 'pending' AND (next_run_at IS NULL OR next_run_at <= NOW())
                ) AS waiting,
                COUNT(*) FILTER (
                    WHERE status = 'pending' AND next_run_at > NOW()
                ) AS delayed,
                COUNT(*) FILTER (WHERE status = 'running') AS active,
                COUNT(*) FILTER (WHERE status = 'succeeded') AS succeeded,
                COUNT(*) FILTER (WHERE status = 'dead_letter') AS dead_letter
            FROM jobs
            WHERE queue = $1
            "#,
        )
        .bind(queue)
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestCommand {
        repo: String,
    }

    impl CommandMeta for TestCommand {
        fn queue(&self) -> QueueName {
            QueueName::RepoOps
        }

        fn command_type(&self) -> &'static str {
            "test_command"
        }
    }

    #[test]
    fn claimed_job_deserializes_payload() {
        let job = Job::new(
            QueueName::RepoOps,
            "test_command",
            serde_json::json!({"repo": "demo"}),
            3,
            2000,
            None,
        );
        let claimed = ClaimedJob { id: job.id, job };
        let cmd: TestCommand = claimed.deserialize().unwrap();
        assert_eq!(
            cmd,
            TestCommand {
                repo: "demo".into()
            }
        );
    }

    #[test]
    fn claimed_job_rejects_mismatched_payload() {
        let job = Job::new(
            QueueName::RepoOps,
            "test_command",
            serde_json::json!({"unexpected": true}),
            3,
            2000,
            None,
        );
        let claimed = ClaimedJob { id: job.id, job };
        assert!(claimed.deserialize::<TestCommand>().is_err());
    }

    #[test]
    fn command_meta_defaults() {
        let cmd = TestCommand {
            repo: "demo".into(),
        };
        assert_eq!(cmd.max_attempts(), 3);
        assert_eq!(cmd.base_delay_ms(), 2000);
        assert!(cmd.initial_delay().is_none());
    }
}
