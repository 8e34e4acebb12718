//! Response models for the subset of the GitHub REST API we consume.

use serde::{Deserialize, Serialize};

/// The authenticated user (`GET /user`).
#[derive(Debug, Clone, Deserialize)]
pub struct GithubUser {
    pub login: String,
    #[serde(default)]
    pub public_repos: i64,
    #[serde(default)]
    pub followers: i64,
    #[serde(default)]
    pub following: i64,
}

/// A repository as returned by the repos endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub html_url: String,
    pub private: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub stargazers_count: i64,
}

/// Fields accepted by `PATCH /repos/{owner}/{repo}`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepositoryUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private: Option<bool>,
}

/// A git reference (`GET /repos/{owner}/{repo}/git/ref/{ref}`).
#[derive(Debug, Clone, Deserialize)]
pub struct GitRef {
    pub object: GitObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitObject {
    pub sha: String,
}

/// A commit object from the git data API.
#[derive(Debug, Clone, Deserialize)]
pub struct GitCommit {
    pub sha: String,
    pub tree: GitObject,
}

/// A created blob or tree.
#[derive(Debug, Clone, Deserialize)]
pub struct ShaRef {
    pub sha: String,
}

/// The resolved head of a branch: the commit the ref points at, its tree,
/// and which branch name actually matched during probing.
#[derive(Debug, Clone)]
pub struct BranchHead {
    pub branch: String,
    pub commit_sha: String,
    pub tree_sha: String,
}

/// One file to include in a tree-based commit.
#[derive(Debug, Clone)]
pub struct CommitFile {
    /// Path relative to the repository root.
    pub path: String,
    /// Raw file content; base64-encoded on the wire.
    pub content: Vec<u8>,
}

/// Rate limit snapshot (`GET /rate_limit`).
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimit {
    pub limit: i64,
    pub remaining: i64,
    pub reset: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RateLimitEnvelope {
    pub rate: RateLimit,
}

/// Error body GitHub returns on non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
}
