//! Minimal GitHub REST client covering the operations the job pipeline needs:
//! repository CRUD, the git data API (blobs/trees/commits/refs) for atomic
//! multi-file commits, and zipball downloads.

use std::time::Duration;

use base64::Engine as _;
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

pub mod error;
pub mod models;

pub use error::GithubError;
pub use models::{
    BranchHead, CommitFile, GithubUser, RateLimit, Repository, RepositoryUpdate,
};

use models::{ApiErrorBody, GitCommit, GitRef, RateLimitEnvelope, ShaRef};

const API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "repo-ops-service";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default branch names to probe, newest convention first. Repositories
/// created before the `main` rename still use `master`.
pub const BRANCH_CANDIDATES: [&str; 2] = ["main", "master"];

#[derive(Debug, Clone)]
pub struct GithubOptions {
    pub token: String,
    /// Override for tests against a stub server.
    pub api_base: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GithubClient {
    http: Client,
    api_base: String,
}

impl GithubClient {
    pub fn new(options: GithubOptions) -> Result<Self, GithubError> {
        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", options.token))
            .map_err(|_| GithubError::Unauthorized("token contains invalid characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            api_base: options.api_base.unwrap_or_else(|| API_BASE.to_string()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Map a response to a deserialized body or a classified error.
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GithubError> {
        let response = Self::check_status(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: Response) -> Result<Response, GithubError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let remaining = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let message = response
            .json::<ApiErrorBody>()
            .await
            .map(|b| b.message)
            .unwrap_or_default();

        Err(match status {
            StatusCode::NOT_FOUND => GithubError::NotFound(message),
            StatusCode::UNAUTHORIZED => GithubError::Unauthorized(message),
            StatusCode::FORBIDDEN => {
                if remaining.as_deref() == Some("0") || message.to_lowercase().contains("rate limit")
                {
                    GithubError::RateLimited(message)
                } else {
                    GithubError::Unauthorized(message)
                }
            }
            StatusCode::TOO_MANY_REQUESTS => GithubError::RateLimited(message),
            StatusCode::UNPROCESSABLE_ENTITY if message.contains("already exists") => {
                GithubError::AlreadyExists(message)
            }
            _ => GithubError::Api {
                status: status.as_u16(),
                message,
            },
        })
    }

    /// `GET /user` — the identity the token authenticates as.
    pub async fn get_user(&self) -> Result<GithubUser, GithubError> {
        let response = self.http.get(self.url("/user")).send().await?;
        Self::decode(response).await
    }

    /// `GET /user/repos`, most recently updated first.
    pub async fn list_repositories(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Repository>, GithubError> {
        let response = self
            .http
            .get(self.url("/user/repos"))
            .query(&[
                ("sort", "updated".to_string()),
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
            ])
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn get_repository(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Repository, GithubError> {
        let response = self
            .http
            .get(self.url(&format!("/repos/{owner}/{repo}")))
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Create a repository for the authenticated user. `auto_init` so the
    /// default branch exists and the tree-commit protocol has a base.
    pub async fn create_repository(
        &self,
        name: &str,
        private: bool,
    ) -> Result<Repository, GithubError> {
        let response = self
            .http
            .post(self.url("/user/repos"))
            .json(&json!({ "name": name, "private": private, "auto_init": true }))
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn update_repository(
        &self,
        owner: &str,
        repo: &str,
        updates: &RepositoryUpdate,
    ) -> Result<Repository, GithubError> {
        let response = self
            .http
            .patch(self.url(&format!("/repos/{owner}/{repo}")))
            .json(updates)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn delete_repository(&self, owner: &str, repo: &str) -> Result<(), GithubError> {
        let response = self
            .http
            .delete(self.url(&format!("/repos/{owner}/{repo}")))
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    /// Resolve the head commit and tree of the default branch, probing
    /// [`BRANCH_CANDIDATES`] in order. Only a not-found moves on to the
    /// next candidate; other errors surface immediately.
    pub async fn get_branch_head(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<BranchHead, GithubError> {
        let mut last_missing = GithubError::NotFound("no default branch".into());
        for branch in BRANCH_CANDIDATES {
            let response = self
                .http
                .get(self.url(&format!("/repos/{owner}/{repo}/git/ref/heads/{branch}")))
                .send()
                .await?;
            match Self::decode::<GitRef>(response).await {
                Ok(git_ref) => {
                    let commit = self.get_commit(owner, repo, &git_ref.object.sha).await?;
                    return Ok(BranchHead {
                        branch: branch.to_string(),
                        commit_sha: commit.sha,
                        tree_sha: commit.tree.sha,
                    });
                }
                Err(e @ GithubError::NotFound(_)) => last_missing = e,
                Err(e) => return Err(e),
            }
        }
        Err(last_missing)
    }

    async fn get_commit(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<GitCommit, GithubError> {
        let response = self
            .http
            .get(self.url(&format!("/repos/{owner}/{repo}/git/commits/{sha}")))
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Create a blob from raw bytes, returning its sha.
    pub async fn create_blob(
        &self,
        owner: &str,
        repo: &str,
        content: &[u8],
    ) -> Result<String, GithubError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(content);
        let response = self
            .http
            .post(self.url(&format!("/repos/{owner}/{repo}/git/blobs")))
            .json(&json!({ "content": encoded, "encoding": "base64" }))
            .send()
            .await?;
        let blob: ShaRef = Self::decode(response).await?;
        Ok(blob.sha)
    }

    /// Create a tree layering `entries` (path, blob sha) onto `base_tree`.
    pub async fn create_tree(
        &self,
        owner: &str,
        repo: &str,
        base_tree: &str,
        entries: &[(String, String)],
    ) -> Result<String, GithubError> {
        let tree: Vec<_> = entries
            .iter()
            .map(|(path, sha)| {
                json!({ "path": path, "mode": "100644", "type": "blob", "sha": sha })
            })
            .collect();
        let response = self
            .http
            .post(self.url(&format!("/repos/{owner}/{repo}/git/trees")))
            .json(&json!({ "base_tree": base_tree, "tree": tree }))
            .send()
            .await?;
        let created: ShaRef = Self::decode(response).await?;
        Ok(created.sha)
    }

    pub async fn create_commit(
        &self,
        owner: &str,
        repo: &str,
        message: &str,
        tree_sha: &str,
        parent_sha: &str,
    ) -> Result<String, GithubError> {
        let response = self
            .http
            .post(self.url(&format!("/repos/{owner}/{repo}/git/commits")))
            .json(&json!({ "message": message, "tree": tree_sha, "parents": [parent_sha] }))
            .send()
            .await?;
        let commit: ShaRef = Self::decode(response).await?;
        Ok(commit.sha)
    }

    /// Advance a branch ref to `sha`. This is the single step that makes a
    /// tree-based commit visible; everything created before it is orphaned
    /// (and provider-garbage-collected) if this never runs.
    pub async fn update_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        sha: &str,
    ) -> Result<(), GithubError> {
        let response = self
            .http
            .patch(self.url(&format!("/repos/{owner}/{repo}/git/refs/heads/{branch}")))
            .json(&json!({ "sha": sha }))
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    /// Upload a batch of files as one commit using the git data API:
    /// blobs → tree (delta against the current head tree) → commit →
    /// ref update. Either the whole batch lands or the branch is unchanged.
    pub async fn upload_files(
        &self,
        owner: &str,
        repo: &str,
        files: &[CommitFile],
        message: &str,
    ) -> Result<String, GithubError> {
        let head = self.get_branch_head(owner, repo).await?;
        debug!(owner, repo, branch = %head.branch, files = files.len(), "starting tree commit");

        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            let sha = self.create_blob(owner, repo, &file.content).await?;
            entries.push((file.path.clone(), sha));
        }

        let tree_sha = self
            .create_tree(owner, repo, &head.tree_sha, &entries)
            .await?;
        let commit_sha = self
            .create_commit(owner, repo, message, &tree_sha, &head.commit_sha)
            .await?;
        self.update_ref(owner, repo, &head.branch, &commit_sha)
            .await?;

        Ok(commit_sha)
    }

    /// Download a repository as a zipball, probing the branch candidates.
    pub async fn download_repository(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<u8>, GithubError> {
        let mut last_missing = GithubError::NotFound(format!("{owner}/{repo}"));
        for branch in BRANCH_CANDIDATES {
            let response = self
                .http
                .get(self.url(&format!("/repos/{owner}/{repo}/zipball/{branch}")))
                .send()
                .await?;
            match Self::check_status(response).await {
                Ok(ok) => return Ok(ok.bytes().await?.to_vec()),
                Err(e @ GithubError::NotFound(_)) => last_missing = e,
                Err(e) => return Err(e),
            }
        }
        Err(last_missing)
    }

    /// `GET /rate_limit` — remaining core API quota.
    pub async fn check_rate_limit(&self) -> Result<RateLimit, GithubError> {
        let response = self.http.get(self.url("/rate_limit")).send().await?;
        let envelope: RateLimitEnvelope = Self::decode(response).await?;
        Ok(envelope.rate)
    }
}
