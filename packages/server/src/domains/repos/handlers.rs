//! Job handlers for the repository pipeline.
//!
//! Each handler does the side effects for one job type and reports the
//! outcome twice: an audit record for the account and a chat message for
//! the user. Every failure, including one in the post-operation
//! bookkeeping, is routed through [`report_failure`] so the account always
//! gets a failure audit and the user a best-effort notice.

use std::sync::Arc;

use github_client::GithubError;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::kernel::deps::ServerDeps;
use crate::kernel::jobs::{JobContext, JobError, JobRegistry};

use super::archive::ScopedFile;
use super::error::PipelineError;
use super::jobs::{DeleteRepoJob, DownloadRepoJob, SendNotificationJob, UploadRepoJob};
use super::upload::run_upload;
use crate::domains::accounts::models::{NewActivity, UsageCounter};

/// Wire every pipeline job type into a registry.
pub fn build_job_registry() -> JobRegistry {
    let mut registry = JobRegistry::new();
    registry.register(UploadRepoJob::JOB_TYPE, handle_upload);
    registry.register(DeleteRepoJob::JOB_TYPE, handle_delete);
    registry.register(DownloadRepoJob::JOB_TYPE, handle_download);
    registry.register(SendNotificationJob::JOB_TYPE, handle_notification);
    registry
}

async fn handle_upload(
    job: UploadRepoJob,
    ctx: JobContext,
    deps: Arc<ServerDeps>,
) -> Result<(), JobError> {
    let outcome = match run_upload(&deps, &job, ctx.attempt).await {
        Ok(outcome) => outcome,
        Err(e) => {
            return Err(report_failure(
                &deps,
                job.user_id,
                job.chat_id,
                "repo_created",
                &job.repo_name,
                e,
            )
            .await);
        }
    };

    let bookkeeping = async {
        deps.users
            .increment_usage(job.user_id, UsageCounter::ReposCreated)
            .await
            .map_err(PipelineError::Store)?;
        deps.users
            .increment_usage(job.user_id, UsageCounter::FilesUploaded)
            .await
            .map_err(PipelineError::Store)?;
        deps.users
            .append_activity(
                NewActivity::success(job.user_id, "repo_created")
                    .with_resource("repository", &job.repo_name)
                    .with_metadata(json!({
                        "filesCount": outcome.files_count,
                        "repoUrl": outcome.repo_url,
                    })),
            )
            .await
            .map_err(PipelineError::Store)?;

        let message = format!(
            "✅ Repository created: {}\n{} files uploaded.",
            outcome.repo_url, outcome.files_count
        );
        deps.notifier.send_message(job.chat_id, &message).await?;
        Ok::<_, PipelineError>(())
    }
    .await;

    if let Err(e) = bookkeeping {
        return Err(report_failure(
            &deps,
            job.user_id,
            job.chat_id,
            "repo_created",
            &job.repo_name,
            e,
        )
        .await);
    }

    info!(repo_url = %outcome.repo_url, files = outcome.files_count, "upload pipeline complete");
    Ok(())
}

async fn handle_delete(
    job: DeleteRepoJob,
    _ctx: JobContext,
    deps: Arc<ServerDeps>,
) -> Result<(), JobError> {
    let result = async {
        let owner = deps.github.get_user().await?;
        deps.github
            .delete_repository(&owner.login, &job.repo_name)
            .await
            .map_err(|e| match e {
                GithubError::NotFound(name) => PipelineError::RepositoryNotFound(name),
                other => PipelineError::Provider(other),
            })?;

        deps.users
            .increment_usage(job.user_id, UsageCounter::ReposDeleted)
            .await
            .map_err(PipelineError::Store)?;
        deps.users
            .append_activity(
                NewActivity::success(job.user_id, "repo_deleted")
                    .with_resource("repository", &job.repo_name),
            )
            .await
            .map_err(PipelineError::Store)?;

        let message = format!("✅ Repository deleted: {}", job.repo_name);
        deps.notifier.send_message(job.chat_id, &message).await?;
        Ok::<_, PipelineError>(())
    }
    .await;

    if let Err(e) = result {
        return Err(report_failure(
            &deps,
            job.user_id,
            job.chat_id,
            "repo_deleted",
            &job.repo_name,
            e,
        )
        .await);
    }

    Ok(())
}

async fn handle_download(
    job: DownloadRepoJob,
    _ctx: JobContext,
    deps: Arc<ServerDeps>,
) -> Result<(), JobError> {
    let result = async {
        let owner = deps.github.get_user().await?;
        let bytes = deps
            .github
            .download_repository(&owner.login, &job.repo_name)
            .await
            .map_err(|e| match e {
                GithubError::NotFound(name) => PipelineError::RepositoryNotFound(name),
                other => PipelineError::Provider(other),
            })?;

        // Stage through a scoped temp file so the snapshot is removed no
        // matter how delivery ends.
        let filename = format!("{}.zip", job.repo_name);
        let staged = ScopedFile::write(&deps.temp_root, &filename, &bytes)?;
        let payload = std::fs::read(&staged.path).map_err(PipelineError::Io)?;
        deps.notifier
            .send_document(job.chat_id, payload, &filename, &job.repo_name)
            .await?;
        drop(staged);

        deps.users
            .increment_usage(job.user_id, UsageCounter::ApiCalls)
            .await
            .map_err(PipelineError::Store)?;
        deps.users
            .append_activity(
                NewActivity::success(job.user_id, "repo_downloaded")
                    .with_resource("repository", &job.repo_name),
            )
            .await
            .map_err(PipelineError::Store)?;
        Ok::<_, PipelineError>(())
    }
    .await;

    if let Err(e) = result {
        return Err(report_failure(
            &deps,
            job.user_id,
            job.chat_id,
            "repo_downloaded",
            &job.repo_name,
            e,
        )
        .await);
    }

    Ok(())
}

async fn handle_notification(
    job: SendNotificationJob,
    _ctx: JobContext,
    deps: Arc<ServerDeps>,
) -> Result<(), JobError> {
    deps.notifier
        .send_message(job.chat_id, &job.message)
        .await
        .map_err(PipelineError::from)?;
    Ok(())
}

/// Record a pipeline failure (audit + best-effort user notice), then hand
/// the original error back to the runner with its retry tag intact. Audit
/// and notification failures here are logged and swallowed so they never
/// mask the original failure.
async fn report_failure(
    deps: &Arc<ServerDeps>,
    user_id: Uuid,
    chat_id: i64,
    action: &str,
    resource_id: &str,
    error: PipelineError,
) -> JobError {
    let audit = NewActivity::failed(user_id, action)
        .with_resource("repository", resource_id)
        .with_metadata(json!({ "error": error.to_string() }));
    if let Err(audit_err) = deps.users.append_activity(audit).await {
        warn!(action, error = %audit_err, "failed to record failure audit");
    }

    let notice = format!("❌ Operation failed: {}", error);
    if let Err(notify_err) = deps.notifier.send_message(chat_id, &notice).await {
        warn!(action, error = %notify_err, "failed to notify user of failure");
    }

    error.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::accounts::models::ActivityStatus;
    use crate::kernel::jobs::ErrorKind;
    use crate::kernel::test_dependencies::{MemoryUserStore, MockNotifier, MockSourceControl};
    use crate::kernel::traits::BaseSourceControl;
    use telegram::TelegramError;

    struct Harness {
        users: Arc<MemoryUserStore>,
        github: Arc<MockSourceControl>,
        notifier: Arc<MockNotifier>,
        deps: Arc<ServerDeps>,
        _temp: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let temp = tempfile::tempdir().unwrap();
        let users = Arc::new(MemoryUserStore::new());
        let github = Arc::new(MockSourceControl::new());
        let notifier = Arc::new(MockNotifier::new());
        let deps = Arc::new(ServerDeps::new(
            users.clone(),
            github.clone(),
            notifier.clone(),
            temp.path().to_path_buf(),
        ));
        Harness {
            users,
            github,
            notifier,
            deps,
            _temp: temp,
        }
    }

    fn first_delivery() -> JobContext {
        JobContext {
            job_id: Uuid::new_v4(),
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn delete_bumps_counter_and_audits() {
        let h = harness();
        let user = h.users.seed_user("free");
        h.github.create_repository("demo", true).await.unwrap();

        let job = DeleteRepoJob {
            user_id: user.id,
            repo_name: "demo".into(),
            chat_id: 42,
        };
        handle_delete(job, first_delivery(), Arc::clone(&h.deps))
            .await
            .unwrap();

        assert!(!h.github.has_repo("demo"));
        assert_eq!(h.users.user(user.id).unwrap().repos_deleted, 1);

        let activities = h.users.activities();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].action, "repo_deleted");
        assert_eq!(activities[0].status, ActivityStatus::Success);
        assert_eq!(activities[0].resource_type.as_deref(), Some("repository"));
        assert_eq!(activities[0].resource_id.as_deref(), Some("demo"));

        let sent = h.notifier.sent_messages();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.starts_with('✅'));
    }

    #[tokio::test]
    async fn delete_of_missing_repo_is_non_retryable_and_audited() {
        let h = harness();
        let user = h.users.seed_user("free");

        let job = DeleteRepoJob {
            user_id: user.id,
            repo_name: "ghost".into(),
            chat_id: 42,
        };
        let err = handle_delete(job, first_delivery(), Arc::clone(&h.deps))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NonRetryable);

        // counter untouched, failure audited, user told
        assert_eq!(h.users.user(user.id).unwrap().repos_deleted, 0);
        let activities = h.users.activities();
        assert_eq!(activities[0].status, ActivityStatus::Failed);
        assert_eq!(activities[0].resource_id.as_deref(), Some("ghost"));
        assert!(activities[0].metadata["error"]
            .as_str()
            .unwrap()
            .contains("not found"));
        assert!(h.notifier.sent_messages()[0].1.starts_with('❌'));
    }

    #[tokio::test]
    async fn failed_success_notice_is_audited_and_retryable() {
        let h = harness();
        let user = h.users.seed_user("free");
        h.github.create_repository("demo", true).await.unwrap();
        h.notifier.fail_next_send(TelegramError::Api {
            error_code: Some(420),
            description: "flood control".into(),
        });

        let job = DeleteRepoJob {
            user_id: user.id,
            repo_name: "demo".into(),
            chat_id: 42,
        };
        let err = handle_delete(job, first_delivery(), Arc::clone(&h.deps))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Retryable);

        // The deletion itself landed before the notice failed.
        assert!(!h.github.has_repo("demo"));
        assert_eq!(h.users.user(user.id).unwrap().repos_deleted, 1);

        // The late failure still produces a failure audit and a notice.
        let activities = h.users.activities();
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[1].status, ActivityStatus::Failed);
        assert_eq!(activities[1].resource_id.as_deref(), Some("demo"));
        assert!(h.notifier.sent_messages()[0].1.starts_with('❌'));
    }

    #[tokio::test]
    async fn download_sends_document_and_audits() {
        let h = harness();
        let user = h.users.seed_user("pro");
        h.github.create_repository("demo", true).await.unwrap();
        h.github.set_archive("demo", vec![1, 2, 3]);

        let job = DownloadRepoJob {
            user_id: user.id,
            repo_name: "demo".into(),
            chat_id: 42,
        };
        handle_download(job, first_delivery(), Arc::clone(&h.deps))
            .await
            .unwrap();

        let docs = h.notifier.sent_documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].1, "demo.zip");
        assert_eq!(docs[0].2, vec![1, 2, 3]);
        assert_eq!(h.users.user(user.id).unwrap().api_calls, 1);
    }

    #[tokio::test]
    async fn notification_handler_delivers_message() {
        let h = harness();
        let job = SendNotificationJob {
            chat_id: 42,
            message: "hello".into(),
        };
        handle_notification(job, first_delivery(), Arc::clone(&h.deps))
            .await
            .unwrap();
        assert_eq!(h.notifier.sent_messages(), vec![(42, "hello".to_string())]);
    }

    #[test]
    fn registry_covers_every_job_type() {
        let registry = build_job_registry();
        for job_type in [
            UploadRepoJob::JOB_TYPE,
            DeleteRepoJob::JOB_TYPE,
            DownloadRepoJob::JOB_TYPE,
            SendNotificationJob::JOB_TYPE,
        ] {
            assert!(registry.contains(job_type), "missing handler: {job_type}");
        }
    }
}
