//! In-memory [`JobQueue`] used by unit and integration tests.
//!
//! Applies the same retry policy as the Postgres implementation so runner
//! behavior can be verified without a database.

use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use super::job::{retry_decision, ErrorKind, Job, JobStatus, QueueName, RetryDecision};
use super::queue::{ClaimedJob, JobQueue, QueueStats};

#[derive(Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<Vec<Job>>,
    lease_ms: i64,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            lease_ms: 60_000,
        }
    }

    /// Snapshot of every job, in enqueue order.
    pub fn all_jobs(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn job(&self, id: Uuid) -> Option<Job> {
        self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned()
    }

    /// Clear scheduling delays so retried jobs become claimable immediately.
    pub fn make_all_ready(&self) {
        let mut jobs = self.jobs.lock().unwrap();
        for job in jobs.iter_mut() {
            if job.status == JobStatus::Pending {
                job.next_run_at = None;
            }
        }
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
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
        let id = job.id;
        self.jobs.lock().unwrap().push(job);
        Ok(id)
    }

    async fn claim(
        &self,
        queue: QueueName,
        worker_id: &str,
        limit: i64,
    ) -> Result<Vec<ClaimedJob>> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().unwrap();
        let mut claimed = Vec::new();

        for job in jobs.iter_mut() {
            if claimed.len() as i64 >= limit || job.queue != queue {
                continue;
            }
            let expired_lease = job.status == JobStatus::Running
                && job.lease_expires_at.map_or(false, |t| t <= now);
            if !job.is_ready() && !expired_lease {
                continue;
            }
            job.status = JobStatus::Running;
            job.attempt += 1;
            job.worker_id = Some(worker_id.to_string());
            job.lease_expires_at = Some(now + Duration::milliseconds(self.lease_ms));
            job.updated_at = now;
            claimed.push(ClaimedJob {
                id: job.id,
                job: job.clone(),
            });
        }

        Ok(claimed)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.job(job_id))
    }

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.status == JobStatus::Running)
        {
            job.status = JobStatus::Succeeded;
            job.error_message = None;
            job.error_kind = None;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error: &str, kind: ErrorKind) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| anyhow!("job {} not found", job_id))?;

        let now = Utc::now();
        match retry_decision(job.attempt, job.max_attempts, job.base_delay_ms, kind, now) {
            RetryDecision::Retry { next_run_at } => {
                job.status = JobStatus::Pending;
                job.next_run_at = Some(next_run_at);
                job.lease_expires_at = None;
                job.worker_id = None;
            }
            RetryDecision::DeadLetter => {
                job.status = JobStatus::DeadLetter;
                job.dead_lettered_at = Some(now);
                job.dead_letter_reason = Some(if kind.should_retry() {
                    "max attempts exceeded".to_string()
                } else {
                    "non-retryable error".to_string()
                });
                job.lease_expires_at = None;
                job.worker_id = None;
            }
        }
        job.error_message = Some(error.to_string());
        job.error_kind = Some(kind);
        job.updated_at = now;

        Ok(())
    }

    async fn heartbeat(&self, job_id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.status == JobStatus::Running)
        {
            job.lease_expires_at = Some(Utc::now() + Duration::milliseconds(self.lease_ms));
        }
        Ok(())
    }

    async fn stats(&self, queue: QueueName) -> Result<QueueStats> {
        let now = Utc::now();
        let jobs = self.jobs.lock().unwrap();
        let mut stats = QueueStats::default();
        for job in jobs.iter().filter(|j| j.queue == queue) {
            match job.status {
                JobStatus::Pending => {
                    if job.next_run_at.map_or(false, |t| t > now) {
                        stats.delayed += 1;
                    } else {
                        stats.waiting += 1;
                    }
                }
                JobStatus::Running => stats.active += 1,
                JobStatus::Succeeded => stats.succeeded += 1,
                JobStatus::DeadLetter => stats.dead_letter += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::jobs::queue::{CommandMeta, JobQueueExt};
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct TestCmd {
        n: i32,
    }

    impl CommandMeta for TestCmd {
        fn queue(&self) -> QueueName {
            QueueName::Uploads
        }

        fn command_type(&self) -> &'static str {
            "test_cmd"
        }
    }

    #[tokio::test]
    async fn claims_in_fifo_order() {
        let queue = MemoryJobQueue::new();
        let first = queue.enqueue(TestCmd { n: 1 }).await.unwrap();
        let second = queue.enqueue(TestCmd { n: 2 }).await.unwrap();

        let claimed = queue.claim(QueueName::Uploads, "w1", 10).await.unwrap();
        assert_eq!(
            claimed.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![first, second]
        );
    }

    #[tokio::test]
    async fn claim_respects_limit_and_queue() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(TestCmd { n: 1 }).await.unwrap();
        queue.enqueue(TestCmd { n: 2 }).await.unwrap();

        let claimed = queue.claim(QueueName::Uploads, "w1", 1).await.unwrap();
        assert_eq!(claimed.len(), 1);

        let other = queue.claim(QueueName::RepoOps, "w1", 10).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn mark_succeeded_is_idempotent() {
        let queue = MemoryJobQueue::new();
        let id = queue.enqueue(TestCmd { n: 1 }).await.unwrap();
        queue.claim(QueueName::Uploads, "w1", 1).await.unwrap();

        queue.mark_succeeded(id).await.unwrap();
        queue.mark_succeeded(id).await.unwrap();

        let job = queue.job(id).unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.attempt, 1);
    }

    #[tokio::test]
    async fn retry_backoff_grows_linearly_then_dead_letters() {
        let queue = MemoryJobQueue::new();
        let id = queue.enqueue(TestCmd { n: 1 }).await.unwrap();

        // attempt 1 fails: retry after ~2000ms
        queue.claim(QueueName::Uploads, "w1", 1).await.unwrap();
        queue
            .mark_failed(id, "boom", ErrorKind::Retryable)
            .await
            .unwrap();
        let job = queue.job(id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        let delay = (job.next_run_at.unwrap() - Utc::now()).num_milliseconds();
        assert!((1800..=2000).contains(&delay), "delay was {delay}");

        // attempt 2 fails: retry after ~4000ms
        queue.make_all_ready();
        queue.claim(QueueName::Uploads, "w1", 1).await.unwrap();
        queue
            .mark_failed(id, "boom", ErrorKind::Retryable)
            .await
            .unwrap();
        let job = queue.job(id).unwrap();
        let delay = (job.next_run_at.unwrap() - Utc::now()).num_milliseconds();
        assert!((3800..=4000).contains(&delay), "delay was {delay}");

        // attempt 3 fails: out of attempts
        queue.make_all_ready();
        queue.claim(QueueName::Uploads, "w1", 1).await.unwrap();
        queue
            .mark_failed(id, "boom", ErrorKind::Retryable)
            .await
            .unwrap();
        let job = queue.job(id).unwrap();
        assert_eq!(job.status, JobStatus::DeadLetter);
        assert_eq!(job.dead_letter_reason.as_deref(), Some("max attempts exceeded"));
    }

    #[tokio::test]
    async fn stats_counts_by_state() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(TestCmd { n: 1 }).await.unwrap();
        queue.enqueue(TestCmd { n: 2 }).await.unwrap();
        queue
            .enqueue_raw(
                QueueName::Uploads,
                "test_cmd",
                serde_json::json!({"n": 3}),
                3,
                2000,
                Some(Duration::minutes(5)),
            )
            .await
            .unwrap();

        // claim picks jobs in order, so give the first one a terminal state
        let claimed = queue.claim(QueueName::Uploads, "w1", 1).await.unwrap();
        queue.mark_succeeded(claimed[0].id).await.unwrap();
        queue.claim(QueueName::Uploads, "w1", 1).await.unwrap();

        let stats = queue.stats(QueueName::Uploads).await.unwrap();
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.delayed, 1);
        assert_eq!(stats.waiting, 0);
    }
}
