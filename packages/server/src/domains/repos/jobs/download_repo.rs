use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::kernel::jobs::{CommandMeta, QueueName};

/// Fetch a zip snapshot of a repository and deliver it back to the chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRepoJob {
    pub user_id: Uuid,
    pub repo_name: String,
    pub chat_id: i64,
}

impl DownloadRepoJob {
    pub const JOB_TYPE: &'static str = "download_repo";
}

impl CommandMeta for DownloadRepoJob {
    fn queue(&self) -> QueueName {
        QueueName::RepoOps
    }

    fn command_type(&self) -> &'static str {
        Self::JOB_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_to_repo_ops_queue() {
        let job = DownloadRepoJob {
            user_id: Uuid::new_v4(),
            repo_name: "demo".into(),
            chat_id: 42,
        };
        assert_eq!(job.queue(), QueueName::RepoOps);
        assert_eq!(job.command_type(), "download_repo");
    }
}
