//! Seams between the pipeline and the outside world.
//!
//! Handlers depend on these traits, never on concrete clients, so every
//! external effect can be swapped for an in-memory double in tests.

use anyhow::Result;
use async_trait::async_trait;
use github_client::{CommitFile, GithubError, GithubUser, Repository};
use telegram::TelegramError;
use uuid::Uuid;

use crate::domains::accounts::models::{ActivityLog, NewActivity, UsageCounter, User};

/// Source-control provider operations the pipeline needs.
#[async_trait]
pub trait BaseSourceControl: Send + Sync {
    async fn get_user(&self) -> Result<GithubUser, GithubError>;

    /// Provision a repository initialized with a default branch.
    async fn create_repository(&self, name: &str, private: bool)
        -> Result<Repository, GithubError>;

    async fn get_repository(&self, owner: &str, repo: &str) -> Result<Repository, GithubError>;

    async fn delete_repository(&self, owner: &str, repo: &str) -> Result<(), GithubError>;

    /// Commit a set of files to the default branch in one atomic commit.
    /// Returns the new commit sha.
    async fn upload_files(
        &self,
        owner: &str,
        repo: &str,
        files: &[CommitFile],
        message: &str,
    ) -> Result<String, GithubError>;

    /// Fetch a zip snapshot of the repository's default branch.
    async fn download_repository(&self, owner: &str, repo: &str) -> Result<Vec<u8>, GithubError>;
}

/// Outbound messaging channel (chat messages, documents, inbound files).
#[async_trait]
pub trait BaseNotifier: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError>;

    async fn send_document(
        &self,
        chat_id: i64,
        bytes: Vec<u8>,
        filename: &str,
        caption: &str,
    ) -> Result<(), TelegramError>;

    /// Download the bytes of a file a user previously sent to the bot.
    async fn fetch_file(&self, file_id: &str) -> Result<Vec<u8>, TelegramError>;
}

/// Account persistence: users, usage counters and the audit trail.
#[async_trait]
pub trait BaseUserStore: Send + Sync {
    async fn find_or_create_by_telegram(
        &self,
        telegram_id: i64,
        username: Option<&str>,
    ) -> Result<User>;

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Atomically bump one usage counter.
    async fn increment_usage(&self, user_id: Uuid, counter: UsageCounter) -> Result<()>;

    /// Append one audit record. The log is append-only.
    async fn append_activity(&self, activity: NewActivity) -> Result<ActivityLog>;

    async fn recent_activity(&self, user_id: Uuid, limit: i64) -> Result<Vec<ActivityLog>>;
}
