//! Failure modes of the repository pipeline, each mapped to a retry tag.

use github_client::GithubError;
use telegram::TelegramError;
use thiserror::Error;

use crate::kernel::jobs::{ErrorKind, JobError};

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The uploaded file could not be fetched from the messaging platform.
    #[error("source file unavailable: {0}")]
    SourceUnavailable(String),

    /// The archive contains an entry that would escape the extraction root.
    #[error("unsafe archive entry: {0}")]
    UnsafeArchive(String),

    #[error("repository already exists: {0}")]
    RepositoryExists(String),

    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    #[error(transparent)]
    Provider(#[from] GithubError),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] TelegramError),

    /// Counter or audit write failed after the operation itself landed.
    #[error("store error: {0}")]
    Store(#[source] anyhow::Error),
}

impl PipelineError {
    /// Retry tag: purely a function of the variant, never of message text.
    pub fn kind(&self) -> ErrorKind {
        match self {
            // A file id the platform cannot resolve will not start resolving
            // on a later attempt.
            PipelineError::SourceUnavailable(_)
            | PipelineError::UnsafeArchive(_)
            | PipelineError::RepositoryExists(_)
            | PipelineError::RepositoryNotFound(_)
            | PipelineError::Archive(_) => ErrorKind::NonRetryable,
            PipelineError::Provider(e) => {
                if e.is_retryable() {
                    ErrorKind::Retryable
                } else {
                    ErrorKind::NonRetryable
                }
            }
            PipelineError::Io(_) | PipelineError::Notify(_) | PipelineError::Store(_) => {
                ErrorKind::Retryable
            }
        }
    }
}

impl From<PipelineError> for JobError {
    fn from(error: PipelineError) -> Self {
        JobError {
            kind: error.kind(),
            source: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_variants_do_not_retry() {
        assert_eq!(
            PipelineError::UnsafeArchive("../etc/passwd".into()).kind(),
            ErrorKind::NonRetryable
        );
        assert_eq!(
            PipelineError::RepositoryExists("demo".into()).kind(),
            ErrorKind::NonRetryable
        );
        assert_eq!(
            PipelineError::RepositoryNotFound("demo".into()).kind(),
            ErrorKind::NonRetryable
        );
    }

    #[test]
    fn provider_errors_follow_their_own_classification() {
        let transient = PipelineError::Provider(GithubError::Api {
            status: 502,
            message: "bad gateway".into(),
        });
        assert_eq!(transient.kind(), ErrorKind::Retryable);

        let permanent = PipelineError::Provider(GithubError::Unauthorized("bad token".into()));
        assert_eq!(permanent.kind(), ErrorKind::NonRetryable);
    }

    #[test]
    fn job_error_carries_the_kind() {
        let err: JobError =
            PipelineError::Io(std::io::Error::other("disk full")).into();
        assert_eq!(err.kind, ErrorKind::Retryable);

        let err: JobError = PipelineError::SourceUnavailable("gone".into()).into();
        assert_eq!(err.kind, ErrorKind::NonRetryable);

        let err: JobError = PipelineError::Store(anyhow::anyhow!("pool timed out")).into();
        assert_eq!(err.kind, ErrorKind::Retryable);
    }
}
