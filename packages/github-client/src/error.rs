use thiserror::Error;

/// Errors returned by the GitHub API client.
///
/// The taxonomy matters to callers: job handlers use [`GithubError::is_retryable`]
/// to decide whether a failed operation should be redelivered or dead-lettered.
#[derive(Debug, Error)]
pub enum GithubError {
    /// The requested resource does not exist (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// A resource with the same name already exists (422 name conflict).
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Token is missing, expired, or lacks the required scope (401/403).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Primary or secondary rate limit hit (403/429 with rate headers).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Any other API-level error.
    #[error("github api error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure (DNS, TLS, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl GithubError {
    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Not-found, conflicts and auth failures are permanent: retrying
    /// would fail identically and burn queue attempts.
    pub fn is_retryable(&self) -> bool {
        match self {
            GithubError::NotFound(_)
            | GithubError::AlreadyExists(_)
            | GithubError::Unauthorized(_) => false,
            GithubError::RateLimited(_) | GithubError::Network(_) => true,
            GithubError::Api { status, .. } => *status >= 500,
        }
    }
}
