//! Application setup and router wiring.

use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::kernel::jobs::JobQueue;
use crate::kernel::ServerDeps;
use crate::server::routes::{
    enqueue_repo_job_handler, health_handler, job_status_handler, queue_stats_handler,
    recent_activity_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub server_deps: Arc<ServerDeps>,
    pub queue: Arc<dyn JobQueue>,
}

/// Build the axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/jobs", post(enqueue_repo_job_handler))
        .route("/jobs/:id", get(job_status_handler))
        .route("/queues/:queue/stats", get(queue_stats_handler))
        .route("/users/:id/activity", get(recent_activity_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(Extension(state))
}
