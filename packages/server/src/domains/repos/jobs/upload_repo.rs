use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::kernel::jobs::{CommandMeta, QueueName};

/// Process an uploaded archive: fetch it, extract it, provision the
/// repository and commit the contents in one commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRepoJob {
    pub user_id: Uuid,
    pub repo_name: String,
    /// Platform file id of the uploaded archive.
    pub file_id: String,
    pub chat_id: i64,
}

impl UploadRepoJob {
    pub const JOB_TYPE: &'static str = "process_upload";
}

impl CommandMeta for UploadRepoJob {
    fn queue(&self) -> QueueName {
        QueueName::Uploads
    }

    fn command_type(&self) -> &'static str {
        Self::JOB_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_to_uploads_queue_with_default_retry_policy() {
        let job = UploadRepoJob {
            user_id: Uuid::new_v4(),
            repo_name: "demo".into(),
            file_id: "file-123".into(),
            chat_id: 42,
        };
        assert_eq!(job.queue(), QueueName::Uploads);
        assert_eq!(job.command_type(), "process_upload");
        assert_eq!(job.max_attempts(), 3);
        assert_eq!(job.base_delay_ms(), 2000);
    }

    #[test]
    fn payload_round_trips_through_json() {
        let job = UploadRepoJob {
            user_id: Uuid::new_v4(),
            repo_name: "demo".into(),
            file_id: "file-123".into(),
            chat_id: 42,
        };
        let value = serde_json::to_value(&job).unwrap();
        let back: UploadRepoJob = serde_json::from_value(value).unwrap();
        assert_eq!(back.repo_name, job.repo_name);
        assert_eq!(back.file_id, job.file_id);
    }
}
