//! The upload pipeline: archive in, repository out.
//!
//! Stages: fetch the uploaded archive, materialize it into per-job scratch
//! space, extract with containment checks, provision the repository, then
//! land every file in a single commit on the default branch. Scratch space
//! is removed on every exit path.

use std::fs;
use std::io;
use std::sync::Arc;

use github_client::{CommitFile, GithubError};
use tracing::info;

use crate::kernel::deps::ServerDeps;

use super::archive::{collect_files, extract_archive, UploadSession};
use super::error::PipelineError;
use super::jobs::UploadRepoJob;

/// What a successful upload produced.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub repo_url: String,
    pub files_count: usize,
    pub commit_sha: String,
}

pub async fn run_upload(
    deps: &Arc<ServerDeps>,
    job: &UploadRepoJob,
    attempt: i32,
) -> Result<UploadOutcome, PipelineError> {
    // Stage 1: pull the archive bytes from the messaging platform.
    let bytes = deps
        .notifier
        .fetch_file(&job.file_id)
        .await
        .map_err(|e| PipelineError::SourceUnavailable(e.to_string()))?;

    // Stage 2: materialize into namespaced scratch space. The session
    // cleans up after itself on every exit path.
    let session = UploadSession::create(&deps.temp_root, &job.repo_name)?;
    fs::write(&session.archive_path, &bytes)?;

    // Stage 3: extract and collect off the async runtime.
    let archive_path = session.archive_path.clone();
    let extract_dir = session.extract_dir.clone();
    let files: Vec<CommitFile> = tokio::task::spawn_blocking(move || {
        extract_archive(&archive_path, &extract_dir)?;
        collect_files(&extract_dir)
    })
    .await
    .map_err(|e| PipelineError::Io(io::Error::other(e)))??;

    info!(
        repo = %job.repo_name,
        files = files.len(),
        bytes = bytes.len(),
        "archive extracted"
    );

    // Stage 4: provision the repository. A name collision on the first
    // delivery is permanent. On a redelivery the collision is usually our
    // own repository from an attempt that died before the commit landed,
    // so resume with it instead of dead-lettering.
    let owner = deps.github.get_user().await?;
    let repository = match deps.github.create_repository(&job.repo_name, true).await {
        Ok(repository) => repository,
        Err(GithubError::AlreadyExists(name)) => {
            if attempt > 1 {
                info!(repo = %name, attempt, "resuming with repository from earlier attempt");
                deps.github.get_repository(&owner.login, &name).await?
            } else {
                return Err(PipelineError::RepositoryExists(name));
            }
        }
        Err(other) => return Err(other.into()),
    };

    // Stage 5: one atomic commit with every extracted file.
    let message = format!("Initial upload: {} files", files.len());
    let commit_sha = deps
        .github
        .upload_files(&owner.login, &job.repo_name, &files, &message)
        .await?;

    session.cleanup();

    Ok(UploadOutcome {
        repo_url: repository.html_url,
        files_count: files.len(),
        commit_sha,
    })
}
