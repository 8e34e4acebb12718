// Worker process: runs one job runner per queue.

use std::sync::Arc;

use anyhow::{Context, Result};
use server_core::domains::accounts::PostgresUserStore;
use server_core::domains::repos::build_job_registry;
use server_core::kernel::jobs::{JobRunner, JobRunnerConfig, PostgresJobQueue, QueueName};
use server_core::kernel::{GithubAdapter, ServerDeps, TelegramAdapter};
use server_core::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting repository pipeline worker");

    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let github = Arc::new(github_client::GithubClient::new(
        github_client::GithubOptions {
            token: config.github_token.clone(),
            api_base: None,
        },
    )?);
    let telegram = Arc::new(telegram::TelegramService::new(telegram::TelegramOptions {
        bot_token: config.telegram_bot_token.clone(),
        api_base: None,
    }));

    let deps = Arc::new(ServerDeps::new(
        Arc::new(PostgresUserStore::new(pool.clone())),
        Arc::new(GithubAdapter::new(github)),
        Arc::new(TelegramAdapter::new(telegram)),
        config.temp_dir.clone(),
    ));
    let queue: Arc<dyn server_core::kernel::jobs::JobQueue> =
        Arc::new(PostgresJobQueue::new(pool.clone()));
    let registry = Arc::new(build_job_registry());

    let mut runners = Vec::new();
    let mut handles = Vec::new();
    for queue_name in QueueName::ALL {
        let runner = Arc::new(JobRunner::new(
            Arc::clone(&queue),
            Arc::clone(&registry),
            Arc::clone(&deps),
            JobRunnerConfig::for_queue(queue_name),
        ));
        runners.push(Arc::clone(&runner));
        handles.push(tokio::spawn(async move { runner.run().await }));
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested, draining runners");
    for runner in &runners {
        runner.request_shutdown();
    }
    for handle in handles {
        let _ = handle.await;
    }

    tracing::info!("Worker stopped");
    Ok(())
}
