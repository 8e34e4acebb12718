use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An account, keyed either by Telegram identity or by API key.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub telegram_id: Option<i64>,
    pub username: Option<String>,
    pub api_key: Uuid,
    pub plan: String,

    // Monotonic usage counters
    pub repos_created: i64,
    pub repos_deleted: i64,
    pub files_uploaded: i64,
    pub api_calls: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The usage counters tracked per account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageCounter {
    ReposCreated,
    ReposDeleted,
    FilesUploaded,
    ApiCalls,
}

impl UsageCounter {
    /// Column the counter lives in. Used to build single-statement
    /// `SET col = col + 1` updates, so increments never lose concurrent
    /// writes.
    pub fn column(&self) -> &'static str {
        match self {
            UsageCounter::ReposCreated => "repos_created",
            UsageCounter::ReposDeleted => "repos_deleted",
            UsageCounter::FilesUploaded => "files_uploaded",
            UsageCounter::ApiCalls => "api_calls",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_columns_are_distinct() {
        let columns = [
            UsageCounter::ReposCreated.column(),
            UsageCounter::ReposDeleted.column(),
            UsageCounter::FilesUploaded.column(),
            UsageCounter::ApiCalls.column(),
        ];
        let unique: std::collections::HashSet<_> = columns.iter().collect();
        assert_eq!(unique.len(), columns.len());
    }
}
