//! Queue semantics observable from outside: ordering, isolation, stats.

mod common;

use std::sync::Arc;

use common::{build_zip, TestHarness};
use server_core::domains::repos::jobs::{SendNotificationJob, UploadRepoJob};
use server_core::kernel::jobs::{JobQueue, JobQueueExt, JobStatus, QueueName};

#[tokio::test]
async fn queues_are_isolated_per_operation_family() {
    let harness = TestHarness::new();
    harness
        .notifier
        .add_file("file-1", build_zip(&[("a.txt", b"a".as_slice())]));
    let user = harness.users.seed_user("free");

    harness
        .queue
        .enqueue(UploadRepoJob {
            user_id: user.id,
            repo_name: "demo".into(),
            file_id: "file-1".into(),
            chat_id: 1,
        })
        .await
        .unwrap();
    harness
        .queue
        .enqueue(SendNotificationJob {
            chat_id: 1,
            message: "hi".into(),
        })
        .await
        .unwrap();

    // draining one family never touches the other
    assert_eq!(harness.drain_once(QueueName::Notifications).await, 1);
    let stats = harness.queue.stats(QueueName::Uploads).await.unwrap();
    assert_eq!(stats.waiting, 1);
    assert_eq!(stats.succeeded, 0);

    assert_eq!(harness.drain_once(QueueName::Uploads).await, 1);
    let stats = harness.queue.stats(QueueName::Uploads).await.unwrap();
    assert_eq!(stats.succeeded, 1);
}

#[tokio::test]
async fn same_queue_jobs_complete_in_arrival_order() {
    let harness = TestHarness::new();
    for i in 0..3 {
        harness
            .queue
            .enqueue(SendNotificationJob {
                chat_id: 1,
                message: format!("msg-{i}"),
            })
            .await
            .unwrap();
    }

    // concurrency default is 3: one cycle claims all, in arrival order
    assert_eq!(harness.drain_once(QueueName::Notifications).await, 3);
    let sent: Vec<String> = harness
        .notifier
        .sent_messages()
        .into_iter()
        .map(|(_, m)| m)
        .collect();
    assert_eq!(sent, vec!["msg-0", "msg-1", "msg-2"]);
}

#[tokio::test]
async fn delayed_job_is_not_claimable_until_due() {
    let harness = TestHarness::new();
    let job_id = harness
        .queue
        .enqueue_raw(
            QueueName::Notifications,
            SendNotificationJob::JOB_TYPE,
            serde_json::json!({"chat_id": 1, "message": "later"}),
            2,
            2000,
            Some(chrono::Duration::minutes(5)),
        )
        .await
        .unwrap();

    assert_eq!(harness.drain_once(QueueName::Notifications).await, 0);
    let stats = harness.queue.stats(QueueName::Notifications).await.unwrap();
    assert_eq!(stats.delayed, 1);

    harness.queue.make_all_ready();
    assert_eq!(harness.drain_once(QueueName::Notifications).await, 1);
    assert_eq!(
        harness.queue.job(job_id).unwrap().status,
        JobStatus::Succeeded
    );
}

#[tokio::test]
async fn payload_is_immutable_across_retries() {
    let harness = TestHarness::new();
    harness
        .notifier
        .add_file("file-1", build_zip(&[("a.txt", b"a".as_slice())]));
    // transient commit failure forces a second delivery of the same args
    harness
        .github
        .fail_next_upload(github_client::GithubError::Api {
            status: 503,
            message: "unavailable".into(),
        });
    let user = harness.users.seed_user("free");
    let job_id = harness
        .queue
        .enqueue(UploadRepoJob {
            user_id: user.id,
            repo_name: "demo".into(),
            file_id: "file-1".into(),
            chat_id: 1,
        })
        .await
        .unwrap();

    let original_args = harness.queue.job(job_id).unwrap().args;
    harness.drain_once(QueueName::Uploads).await;
    harness.queue.make_all_ready();
    harness.drain_once(QueueName::Uploads).await;

    let job = harness.queue.job(job_id).unwrap();
    assert_eq!(job.args, original_args);
    assert_eq!(job.attempt, 2);
}

#[tokio::test]
async fn queue_handle_is_object_safe() {
    let harness = TestHarness::new();
    let queue: Arc<dyn JobQueue> = harness.queue.clone();
    let job_id = queue
        .enqueue(SendNotificationJob {
            chat_id: 1,
            message: "via dyn".into(),
        })
        .await
        .unwrap();
    assert!(queue.get_job(job_id).await.unwrap().is_some());
}
