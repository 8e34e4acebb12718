//! In-memory doubles for the [`crate::kernel::traits`] seams.
//!
//! Shipped in the library (not behind `cfg(test)`) so integration tests in
//! `tests/` can wire them into a [`ServerDeps`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use github_client::{CommitFile, GithubError, GithubUser, Repository};
use telegram::TelegramError;
use uuid::Uuid;

use super::deps::ServerDeps;
use super::traits::{BaseNotifier, BaseSourceControl, BaseUserStore};
use crate::domains::accounts::models::{ActivityLog, NewActivity, UsageCounter, User};

// ============================================================================
// Source control
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct MockRepo {
    pub private: bool,
    pub files: HashMap<String, Vec<u8>>,
    pub commits: usize,
}

#[derive(Default)]
struct MockSourceControlState {
    repos: HashMap<String, MockRepo>,
    fail_next_upload: VecDeque<GithubError>,
    fail_next_delete: VecDeque<GithubError>,
    archives: HashMap<String, Vec<u8>>,
}

/// Scriptable in-memory GitHub.
#[derive(Default)]
pub struct MockSourceControl {
    login: String,
    state: Mutex<MockSourceControlState>,
}

impl MockSourceControl {
    pub fn new() -> Self {
        Self {
            login: "octo-test".to_string(),
            state: Mutex::new(MockSourceControlState::default()),
        }
    }

    /// Queue an error for the next `upload_files` call.
    pub fn fail_next_upload(&self, error: GithubError) {
        self.state.lock().unwrap().fail_next_upload.push_back(error);
    }

    pub fn fail_next_delete(&self, error: GithubError) {
        self.state.lock().unwrap().fail_next_delete.push_back(error);
    }

    /// Canned zip bytes served by `download_repository`.
    pub fn set_archive(&self, repo: &str, bytes: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .archives
            .insert(repo.to_string(), bytes);
    }

    pub fn repo_files(&self, repo: &str) -> Option<HashMap<String, Vec<u8>>> {
        self.state
            .lock()
            .unwrap()
            .repos
            .get(repo)
            .map(|r| r.files.clone())
    }

    pub fn commit_count(&self, repo: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .repos
            .get(repo)
            .map(|r| r.commits)
            .unwrap_or(0)
    }

    pub fn has_repo(&self, repo: &str) -> bool {
        self.state.lock().unwrap().repos.contains_key(repo)
    }

    fn repository(&self, name: &str, private: bool) -> Repository {
        Repository {
            name: name.to_string(),
            full_name: format!("{}/{}", self.login, name),
            html_url: format!("https://github.com/{}/{}", self.login, name),
            private,
            default_branch: Some("main".to_string()),
            language: None,
            stargazers_count: 0,
        }
    }
}

#[async_trait]
impl BaseSourceControl for MockSourceControl {
    async fn get_user(&self) -> Result<GithubUser, GithubError> {
        Ok(GithubUser {
            login: self.login.clone(),
            public_repos: 1,
            followers: 0,
            following: 0,
        })
    }

    async fn create_repository(
        &self,
        name: &str,
        private: bool,
    ) -> Result<Repository, GithubError> {
        let mut state = self.state.lock().unwrap();
        if state.repos.contains_key(name) {
            return Err(GithubError::AlreadyExists(name.to_string()));
        }
        state.repos.insert(
            name.to_string(),
            MockRepo {
                private,
                ..MockRepo::default()
            },
        );
        Ok(self.repository(name, private))
    }

    async fn get_repository(&self, _owner: &str, repo: &str) -> Result<Repository, GithubError> {
        let state = self.state.lock().unwrap();
        let entry = state
            .repos
            .get(repo)
            .ok_or_else(|| GithubError::NotFound(repo.to_string()))?;
        Ok(self.repository(repo, entry.private))
    }

    async fn delete_repository(&self, _owner: &str, repo: &str) -> Result<(), GithubError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.fail_next_delete.pop_front() {
            return Err(error);
        }
        if state.repos.remove(repo).is_none() {
            return Err(GithubError::NotFound(repo.to_string()));
        }
        Ok(())
    }

    async fn upload_files(
        &self,
        _owner: &str,
        repo: &str,
        files: &[CommitFile],
        _message: &str,
    ) -> Result<String, GithubError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.fail_next_upload.pop_front() {
            return Err(error);
        }
        let entry = state
            .repos
            .get_mut(repo)
            .ok_or_else(|| GithubError::NotFound(repo.to_string()))?;
        for file in files {
            entry.files.insert(file.path.clone(), file.content.clone());
        }
        entry.commits += 1;
        Ok(format!("commit-{}", entry.commits))
    }

    async fn download_repository(&self, _owner: &str, repo: &str) -> Result<Vec<u8>, GithubError> {
        let state = self.state.lock().unwrap();
        if !state.repos.contains_key(repo) {
            return Err(GithubError::NotFound(repo.to_string()));
        }
        state
            .archives
            .get(repo)
            .cloned()
            .ok_or_else(|| GithubError::NotFound(repo.to_string()))
    }
}

// ============================================================================
// Notifier
// ============================================================================

#[derive(Default)]
struct MockNotifierState {
    sent: Vec<(i64, String)>,
    documents: Vec<(i64, String, Vec<u8>)>,
    files: HashMap<String, Vec<u8>>,
    fail_next_send: VecDeque<TelegramError>,
}

/// Records outbound messages; serves pre-registered inbound files.
#[derive(Default)]
pub struct MockNotifier {
    state: Mutex<MockNotifierState>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes retrievable through `fetch_file`.
    pub fn with_file(self, file_id: &str, bytes: Vec<u8>) -> Self {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(file_id.to_string(), bytes);
        self
    }

    pub fn add_file(&self, file_id: &str, bytes: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(file_id.to_string(), bytes);
    }

    /// Script a failure for the next `send_message` call.
    pub fn fail_next_send(&self, error: TelegramError) {
        self.state.lock().unwrap().fail_next_send.push_back(error);
    }

    pub fn sent_messages(&self) -> Vec<(i64, String)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_documents(&self) -> Vec<(i64, String, Vec<u8>)> {
        self.state.lock().unwrap().documents.clone()
    }
}

#[async_trait]
impl BaseNotifier for MockNotifier {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.fail_next_send.pop_front() {
            return Err(error);
        }
        state.sent.push((chat_id, text.to_string()));
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        bytes: Vec<u8>,
        filename: &str,
        _caption: &str,
    ) -> Result<(), TelegramError> {
        self.state
            .lock()
            .unwrap()
            .documents
            .push((chat_id, filename.to_string(), bytes));
        Ok(())
    }

    async fn fetch_file(&self, file_id: &str) -> Result<Vec<u8>, TelegramError> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(file_id)
            .cloned()
            .ok_or(TelegramError::Api {
                error_code: Some(404),
                description: format!("file not found: {}", file_id),
            })
    }
}

// ============================================================================
// User store
// ============================================================================

#[derive(Default)]
struct MemoryUserStoreState {
    users: HashMap<Uuid, User>,
    activity: Vec<ActivityLog>,
}

/// HashMap-backed account store.
#[derive(Default)]
pub struct MemoryUserStore {
    state: Mutex<MemoryUserStoreState>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user directly (bypassing the telegram upsert).
    pub fn seed_user(&self, plan: &str) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            telegram_id: Some(1000),
            username: Some("tester".to_string()),
            api_key: Uuid::new_v4(),
            plan: plan.to_string(),
            repos_created: 0,
            repos_deleted: 0,
            files_uploaded: 0,
            api_calls: 0,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().unwrap().users.insert(user.id, user.clone());
        user
    }

    pub fn user(&self, user_id: Uuid) -> Option<User> {
        self.state.lock().unwrap().users.get(&user_id).cloned()
    }

    pub fn activities(&self) -> Vec<ActivityLog> {
        self.state.lock().unwrap().activity.clone()
    }
}

#[async_trait]
impl BaseUserStore for MemoryUserStore {
    async fn find_or_create_by_telegram(
        &self,
        telegram_id: i64,
        username: Option<&str>,
    ) -> Result<User> {
        let mut state = self.state.lock().unwrap();
        if let Some(user) = state
            .users
            .values()
            .find(|u| u.telegram_id == Some(telegram_id))
        {
            return Ok(user.clone());
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            telegram_id: Some(telegram_id),
            username: username.map(str::to_string),
            api_key: Uuid::new_v4(),
            plan: "free".to_string(),
            repos_created: 0,
            repos_deleted: 0,
            files_uploaded: 0,
            api_calls: 0,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.user(user_id))
    }

    async fn increment_usage(&self, user_id: Uuid, counter: UsageCounter) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| anyhow::anyhow!("user {} not found", user_id))?;
        match counter {
            UsageCounter::ReposCreated => user.repos_created += 1,
            UsageCounter::ReposDeleted => user.repos_deleted += 1,
            UsageCounter::FilesUploaded => user.files_uploaded += 1,
            UsageCounter::ApiCalls => user.api_calls += 1,
        }
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn append_activity(&self, activity: NewActivity) -> Result<ActivityLog> {
        let log = ActivityLog {
            id: Uuid::new_v4(),
            user_id: activity.user_id,
            action: activity.action,
            resource_type: activity.resource_type,
            resource_id: activity.resource_id,
            status: activity.status,
            metadata: activity.metadata,
            created_at: Utc::now(),
        };
        self.state.lock().unwrap().activity.push(log.clone());
        Ok(log)
    }

    async fn recent_activity(&self, user_id: Uuid, limit: i64) -> Result<Vec<ActivityLog>> {
        let state = self.state.lock().unwrap();
        let mut logs: Vec<_> = state
            .activity
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        logs.reverse();
        logs.truncate(limit as usize);
        Ok(logs)
    }
}

// ============================================================================
// Assembly
// ============================================================================

/// A [`ServerDeps`] wired entirely with in-memory doubles.
pub fn test_deps() -> ServerDeps {
    ServerDeps::new(
        Arc::new(MemoryUserStore::new()),
        Arc::new(MockSourceControl::new()),
        Arc::new(MockNotifier::new()),
        std::env::temp_dir(),
    )
}
