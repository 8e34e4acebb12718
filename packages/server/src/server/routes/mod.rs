pub mod health;
pub mod jobs;

pub use health::health_handler;
pub use jobs::{
    enqueue_repo_job_handler, job_status_handler, queue_stats_handler, recent_activity_handler,
};
