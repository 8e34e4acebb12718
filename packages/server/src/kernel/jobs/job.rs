//! Job model for background command execution.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    DeadLetter,
}

/// The queues the pipeline runs, one per operation family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "queue_name")]
pub enum QueueName {
    /// Single-call repository mutations (delete, download).
    #[sqlx(rename = "repo-operations")]
    #[serde(rename = "repo-operations")]
    RepoOps,
    /// Archive upload / provisioning jobs.
    #[sqlx(rename = "file-uploads")]
    #[serde(rename = "file-uploads")]
    Uploads,
    /// Outbound terminal messages.
    #[sqlx(rename = "notifications")]
    #[serde(rename = "notifications")]
    Notifications,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [
        QueueName::RepoOps,
        QueueName::Uploads,
        QueueName::Notifications,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::RepoOps => "repo-operations",
            QueueName::Uploads => "file-uploads",
            QueueName::Notifications => "notifications",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.as_str() == s)
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "error_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient error - will retry if attempts remain
    #[default]
    Retryable,
    /// Permanent error - will not retry
    NonRetryable,
}

impl ErrorKind {
    /// Whether this error kind should trigger a retry
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorKind::Retryable)
    }
}

// ============================================================================
// Backoff / retry policy
// ============================================================================

/// Backoff delays never exceed one hour.
pub const MAX_BACKOFF_MS: i64 = 3_600_000;

/// Delay before redelivery after the given attempt number (1-based):
/// `min(attempt * base_delay, cap)`. With the default 2000ms base this
/// yields 2s, 4s, 6s, ...
pub fn backoff_delay(attempt: i32, base_delay_ms: i64) -> Duration {
    let ms = (base_delay_ms.saturating_mul(attempt.max(1) as i64)).min(MAX_BACKOFF_MS);
    Duration::milliseconds(ms)
}

/// What the queue should do with a job whose handler just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { next_run_at: DateTime<Utc> },
    DeadLetter,
}

/// Pure retry policy: the decision depends only on the error tag and the
/// attempt counters, never on the error text.
pub fn retry_decision(
    attempt: i32,
    max_attempts: i32,
    base_delay_ms: i64,
    kind: ErrorKind,
    now: DateTime<Utc>,
) -> RetryDecision {
    if kind.should_retry() && attempt < max_attempts {
        RetryDecision::Retry {
            next_run_at: now + backoff_delay(attempt, base_delay_ms),
        }
    } else {
        RetryDecision::DeadLetter
    }
}

// ============================================================================
// Job Model
// ============================================================================

#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,

    // Identity
    pub queue: QueueName,
    pub job_type: String,

    // Payload: immutable after enqueue
    pub args: serde_json::Value,

    // Retry policy
    pub attempt: i32,
    pub max_attempts: i32,
    pub base_delay_ms: i64,

    // Scheduling / lease
    pub next_run_at: Option<DateTime<Utc>>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,

    // State
    pub status: JobStatus,

    // Error tracking
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,

    // Dead letter bookkeeping
    pub dead_lettered_at: Option<DateTime<Utc>>,
    pub dead_letter_reason: Option<String>,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build a new pending job for a serialized command payload.
    pub fn new(
        queue: QueueName,
        job_type: &str,
        args: serde_json::Value,
        max_attempts: i32,
        base_delay_ms: i64,
        run_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            queue,
            job_type: job_type.to_string(),
            args,
            attempt: 0,
            max_attempts,
            base_delay_ms,
            next_run_at: run_at,
            lease_expires_at: None,
            worker_id: None,
            status: JobStatus::Pending,
            error_message: None,
            error_kind: None,
            dead_lettered_at: None,
            dead_letter_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Check if the job is ready to be claimed.
    pub fn is_ready(&self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        match self.next_run_at {
            None => true,
            Some(next_run) => next_run <= Utc::now(),
        }
    }

    pub async fn find_by_id(id: Uuid, pool: &sqlx::PgPool) -> Result<Option<Self>> {
        let job = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, queue, job_type, args, attempt, max_attempts, base_delay_ms,
                   next_run_at, lease_expires_at, worker_id, status,
                   error_message, error_kind, dead_lettered_at, dead_letter_reason,
                   created_at, updated_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(job)
    }

    pub async fn insert(&self, pool: &sqlx::PgPool) -> Result<Self> {
        let job = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO jobs (
                id, queue, job_type, args, attempt, max_attempts, base_delay_ms,
                next_run_at, lease_expires_at, worker_id, status,
                error_message, error_kind, dead_lettered_at, dead_letter_reason,
                created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7,
                $8, $9, $10, $11,
                $12, $13, $14, $15,
                $16, $17
            )
            RETURNING id, queue, job_type, args, attempt, max_attempts, base_delay_ms,
                      next_run_at, lease_expires_at, worker_id, status,
                      error_message, error_kind, dead_lettered_at, dead_letter_reason,
                      created_at, updated_at
            "#,
        )
        .bind(self.id)
        .bind(self.queue)
        .bind(&self.job_type)
        .bind(&self.args)
        .bind(self.attempt)
        .bind(self.max_attempts)
        .bind(self.base_delay_ms)
        .bind(self.next_run_at)
        .bind(self.lease_expires_at)
        .bind(&self.worker_id)
        .bind(self.status)
        .bind(&self.error_message)
        .bind(self.error_kind)
        .bind(self.dead_lettered_at)
        .bind(&self.dead_letter_reason)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(pool)
        .await?;

        Ok(job)
    }

    /// Claim ready jobs atomically using FOR UPDATE SKIP LOCKED.
    ///
    /// Also recovers running jobs whose lease has expired, which gives the
    /// queue its at-least-once redelivery behavior. The attempt counter
    /// increments on every claim.
    pub async fn claim(
        queue: QueueName,
        limit: i64,
        worker_id: &str,
        lease_duration_ms: i64,
        pool: &sqlx::PgPool,
    ) -> Result<Vec<Self>> {
        let jobs = sqlx::query_as::<_, Self>(
            r#"
            WITH next_jobs AS (
                SELECT id
                FROM jobs
                WHERE queue = $1
                  AND (
                    (status = 'pending' AND (next_run_at IS NULL OR next_run_at <= NOW()))
                    OR (status = 'running' AND lease_expires_at < NOW())
                  )
                ORDER BY COALESCE(next_run_at, created_at)
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET
                status = 'running',
                attempt = jobs.attempt + 1,
                lease_expires_at = NOW() + ($3 || ' milliseconds')::INTERVAL,
                worker_id = $4,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM next_jobs)
            RETURNING id, queue, job_type, args, attempt, max_attempts, base_delay_ms,
                      next_run_at, lease_expires_at, worker_id, status,
                      error_message, error_kind, dead_lettered_at, dead_letter_reason,
                      created_at, updated_at
            "#,
        )
        .bind(queue)
        .bind(limit)
        .bind(lease_duration_ms.to_string())
        .bind(worker_id)
        .fetch_all(pool)
        .await?;

        Ok(jobs)
    }

    /// Extend the lease for a running job (heartbeat).
    pub async fn extend_lease(
        id: Uuid,
        lease_duration_ms: i64,
        pool: &sqlx::PgPool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET lease_expires_at = NOW() + ($1 || ' milliseconds')::INTERVAL,
                updated_at = NOW()
            WHERE id = $2 AND status = 'running'
            "#,
        )
        .bind(lease_duration_ms.to_string())
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> Job {
        Job::new(
            QueueName::RepoOps,
            "delete_repo",
            serde_json::json!({"repo": "demo"}),
            3,
            2000,
            None,
        )
    }

    #[test]
    fn new_job_starts_pending_with_zero_attempts() {
        let job = sample_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempt, 0);
        assert_eq!(job.max_attempts, 3);
    }

    #[test]
    fn new_job_without_schedule_is_ready() {
        assert!(sample_job().is_ready());
    }

    #[test]
    fn delayed_job_is_not_ready() {
        let mut job = sample_job();
        job.next_run_at = Some(Utc::now() + Duration::seconds(60));
        assert!(!job.is_ready());
    }

    #[test]
    fn backoff_grows_linearly_with_attempt() {
        assert_eq!(backoff_delay(1, 2000).num_milliseconds(), 2000);
        assert_eq!(backoff_delay(2, 2000).num_milliseconds(), 4000);
        assert_eq!(backoff_delay(3, 2000).num_milliseconds(), 6000);
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(
            backoff_delay(10_000, 2000).num_milliseconds(),
            MAX_BACKOFF_MS
        );
    }

    #[test]
    fn retry_decision_retries_while_attempts_remain() {
        let now = Utc::now();
        match retry_decision(1, 3, 2000, ErrorKind::Retryable, now) {
            RetryDecision::Retry { next_run_at } => {
                assert_eq!((next_run_at - now).num_milliseconds(), 2000);
            }
            RetryDecision::DeadLetter => panic!("expected retry"),
        }
        match retry_decision(2, 3, 2000, ErrorKind::Retryable, now) {
            RetryDecision::Retry { next_run_at } => {
                assert_eq!((next_run_at - now).num_milliseconds(), 4000);
            }
            RetryDecision::DeadLetter => panic!("expected retry"),
        }
    }

    #[test]
    fn retry_decision_dead_letters_on_exhausted_attempts() {
        let now = Utc::now();
        assert_eq!(
            retry_decision(3, 3, 2000, ErrorKind::Retryable, now),
            RetryDecision::DeadLetter
        );
    }

    #[test]
    fn retry_decision_dead_letters_non_retryable_immediately() {
        let now = Utc::now();
        assert_eq!(
            retry_decision(1, 3, 2000, ErrorKind::NonRetryable, now),
            RetryDecision::DeadLetter
        );
    }

    #[test]
    fn queue_name_round_trips_through_parse() {
        for queue in QueueName::ALL {
            assert_eq!(QueueName::parse(queue.as_str()), Some(queue));
        }
        assert_eq!(QueueName::parse("bogus"), None);
    }
}
