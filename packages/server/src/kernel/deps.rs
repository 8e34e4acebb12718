//! Shared dependency container handed to every job handler and route.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use github_client::{CommitFile, GithubClient, GithubError, GithubUser, Repository};
use telegram::{TelegramError, TelegramService};

use super::traits::{BaseNotifier, BaseSourceControl, BaseUserStore};

/// Every external capability the handlers need, behind trait objects.
pub struct ServerDeps {
    pub users: Arc<dyn BaseUserStore>,
    pub github: Arc<dyn BaseSourceControl>,
    pub notifier: Arc<dyn BaseNotifier>,
    /// Root directory for per-job scratch space.
    pub temp_root: PathBuf,
}

impl ServerDeps {
    pub fn new(
        users: Arc<dyn BaseUserStore>,
        github: Arc<dyn BaseSourceControl>,
        notifier: Arc<dyn BaseNotifier>,
        temp_root: PathBuf,
    ) -> Self {
        Self {
            users,
            github,
            notifier,
            temp_root,
        }
    }
}

/// Adapts the GitHub REST client to [`BaseSourceControl`].
pub struct GithubAdapter {
    client: Arc<GithubClient>,
}

impl GithubAdapter {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BaseSourceControl for GithubAdapter {
    async fn get_user(&self) -> Result<GithubUser, GithubError> {
        self.client.get_user().await
    }

    async fn create_repository(
        &self,
        name: &str,
        private: bool,
    ) -> Result<Repository, GithubError> {
        self.client.create_repository(name, private).await
    }

    async fn get_repository(&self, owner: &str, repo: &str) -> Result<Repository, GithubError> {
        self.client.get_repository(owner, repo).await
    }

    async fn delete_repository(&self, owner: &str, repo: &str) -> Result<(), GithubError> {
        self.client.delete_repository(owner, repo).await
    }

    async fn upload_files(
        &self,
        owner: &str,
        repo: &str,
        files: &[CommitFile],
        message: &str,
    ) -> Result<String, GithubError> {
        self.client.upload_files(owner, repo, files, message).await
    }

    async fn download_repository(&self, owner: &str, repo: &str) -> Result<Vec<u8>, GithubError> {
        self.client.download_repository(owner, repo).await
    }
}

/// Adapts the Telegram bot API client to [`BaseNotifier`].
pub struct TelegramAdapter {
    service: Arc<TelegramService>,
    http: reqwest::Client,
}

impl TelegramAdapter {
    pub fn new(service: Arc<TelegramService>) -> Self {
        Self {
            service,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl BaseNotifier for TelegramAdapter {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        self.service.send_message(chat_id, text).await.map(|_| ())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        bytes: Vec<u8>,
        filename: &str,
        caption: &str,
    ) -> Result<(), TelegramError> {
        self.service
            .send_document(chat_id, bytes, filename, caption)
            .await
            .map(|_| ())
    }

    async fn fetch_file(&self, file_id: &str) -> Result<Vec<u8>, TelegramError> {
        let url = self.service.get_file_link(file_id).await?;
        let response = self.http.get(&url).send().await?;
        let bytes = response.error_for_status()?.bytes().await?;
        Ok(bytes.to_vec())
    }
}
