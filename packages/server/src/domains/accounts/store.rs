//! Postgres-backed account store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::kernel::traits::BaseUserStore;

use super::models::{ActivityLog, NewActivity, UsageCounter, User};

const USER_COLUMNS: &str = "id, telegram_id, username, api_key, plan, \
     repos_created, repos_deleted, files_uploaded, api_calls, \
     created_at, updated_at";

pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

}

#[async_trait]
impl BaseUserStore for PostgresUserStore {
    async fn find_or_create_by_telegram(
        &self,
        telegram_id: i64,
        username: Option<&str>,
    ) -> Result<User> {
        // Upsert so concurrent first messages from the same chat cannot
        // create two accounts.
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (telegram_id, username)
            VALUES ($1, $2)
            ON CONFLICT (telegram_id)
            DO UPDATE SET username = COALESCE(EXCLUDED.username, users.username),
                          updated_at = NOW()
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(telegram_id)
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .context("failed to upsert telegram user")?;

        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn increment_usage(&self, user_id: Uuid, counter: UsageCounter) -> Result<()> {
        // Column name comes from a closed enum, not user input.
        let column = counter.column();
        sqlx::query(&format!(
            "UPDATE users SET {column} = {column} + 1, updated_at = NOW() WHERE id = $1"
        ))
        .bind(user_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to increment {column}"))?;

        Ok(())
    }

    async fn append_activity(&self, activity: NewActivity) -> Result<ActivityLog> {
        let log = sqlx::query_as::<_, ActivityLog>(
            r#"
            INSERT INTO activity_logs (user_id, action, resource_type, resource_id, status, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, action, resource_type, resource_id, status, metadata, created_at
            "#,
        )
        .bind(activity.user_id)
        .bind(&activity.action)
        .bind(&activity.resource_type)
        .bind(&activity.resource_id)
        .bind(activity.status)
        .bind(&activity.metadata)
        .fetch_one(&self.pool)
        .await
        .context("failed to append activity log")?;

        Ok(log)
    }

    async fn recent_activity(&self, user_id: Uuid, limit: i64) -> Result<Vec<ActivityLog>> {
        let logs = sqlx::query_as::<_, ActivityLog>(
            r#"
            SELECT id, user_id, action, resource_type, resource_id, status, metadata, created_at
            FROM activity_logs
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }
}
