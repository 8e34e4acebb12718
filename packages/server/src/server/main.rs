// Main entry point for the API server

use std::sync::Arc;

use anyhow::{Context, Result};
use server_core::kernel::jobs::PostgresJobQueue;
use server_core::kernel::{GithubAdapter, ServerDeps, TelegramAdapter};
use server_core::domains::accounts::PostgresUserStore;
use server_core::server::{build_app, AppState};
use server_core::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting repository pipeline API");

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Running database migrations...");
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
    let queue = Arc::new(PostgresJobQueue::new(pool.clone()));

    let app = build_app(AppState {
        db_pool: pool,
        server_deps: deps,
        queue,
    });

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
