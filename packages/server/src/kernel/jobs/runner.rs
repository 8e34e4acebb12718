//! Job runner: polls one queue, executes claimed jobs concurrently, and
//! reports outcomes back to the queue.
//!
//! A crashed worker simply stops heartbeating; once the lease expires the
//! job becomes claimable again, so delivery is at least once and handlers
//! are written to be idempotent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::queue::{ClaimedJob, JobQueue};
use super::registry::SharedJobRegistry;
use crate::kernel::deps::ServerDeps;

/// Configuration for a job runner.
#[derive(Debug, Clone)]
pub struct JobRunnerConfig {
    pub queue: crate::kernel::jobs::QueueName,
    /// Jobs claimed and executed per poll cycle.
    pub concurrency: i64,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub worker_id: String,
}

impl JobRunnerConfig {
    pub fn for_queue(queue: crate::kernel::jobs::QueueName) -> Self {
        Self {
            queue,
            concurrency: 3,
            poll_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            worker_id: format!("runner-{}", Uuid::new_v4()),
        }
    }
}

pub struct JobRunner {
    job_queue: Arc<dyn JobQueue>,
    registry: SharedJobRegistry,
    deps: Arc<ServerDeps>,
    config: JobRunnerConfig,
    shutdown: Arc<AtomicBool>,
}

impl JobRunner {
    pub fn new(
        job_queue: Arc<dyn JobQueue>,
        registry: SharedJobRegistry,
        deps: Arc<ServerDeps>,
        config: JobRunnerConfig,
    ) -> Self {
        Self {
            job_queue,
            registry,
            deps,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for signalling this runner to stop after its current cycle.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Claim and process one batch. Returns the number of jobs processed.
    pub async fn run_once(&self) -> Result<usize> {
        let claimed = self
            .job_queue
            .claim(
                self.config.queue,
                &self.config.worker_id,
                self.config.concurrency,
            )
            .await?;

        if claimed.is_empty() {
            return Ok(0);
        }

        let count = claimed.len();
        let futures = claimed.into_iter().map(|job| self.process_job(job));
        futures::future::join_all(futures).await;

        Ok(count)
    }

    async fn process_job(&self, claimed: ClaimedJob) {
        let job_id = claimed.id;
        let job_type = claimed.command_type().to_string();
        info!(job_id = %job_id, job_type = %job_type, attempt = claimed.job.attempt, "processing job");

        let heartbeat = self.spawn_heartbeat(job_id);
        let result = self.registry.execute(&claimed, Arc::clone(&self.deps)).await;
        heartbeat.abort();

        match result {
            Ok(()) => {
                if let Err(e) = self.job_queue.mark_succeeded(job_id).await {
                    error!(job_id = %job_id, error = %e, "failed to ack job");
                } else {
                    info!(job_id = %job_id, job_type = %job_type, "job succeeded");
                }
            }
            Err(e) => {
                warn!(job_id = %job_id, job_type = %job_type, kind = ?e.kind, error = %e, "job failed");
                if let Err(report_err) = self
                    .job_queue
                    .mark_failed(job_id, &e.to_string(), e.kind)
                    .await
                {
                    error!(job_id = %job_id, error = %report_err, "failed to report job failure");
                }
            }
        }
    }

    fn spawn_heartbeat(&self, job_id: Uuid) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.job_queue);
        let interval = self.config.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick is immediate
            loop {
                ticker.tick().await;
                if let Err(e) = queue.heartbeat(job_id).await {
                    warn!(job_id = %job_id, error = %e, "heartbeat failed");
                }
            }
        })
    }

    /// Poll loop: run until a shutdown is requested.
    pub async fn run(&self) {
        info!(
            queue = %self.config.queue,
            worker_id = %self.config.worker_id,
            job_types = ?self.registry.job_types(),
            "job runner started"
        );

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.run_once().await {
                Ok(0) => tokio::time::sleep(self.config.poll_interval).await,
                Ok(_) => {} // more work may be waiting, poll again immediately
                Err(e) => {
                    error!(queue = %self.config.queue, error = %e, "poll cycle failed");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }

        info!(queue = %self.config.queue, "job runner stopped");
    }
}
