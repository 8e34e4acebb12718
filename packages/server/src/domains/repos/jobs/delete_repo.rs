use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::kernel::jobs::{CommandMeta, QueueName};

/// Delete a repository from the provider and record the outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRepoJob {
    pub user_id: Uuid,
    pub repo_name: String,
    pub chat_id: i64,
}

impl DeleteRepoJob {
    pub const JOB_TYPE: &'static str = "delete_repo";
}

impl CommandMeta for DeleteRepoJob {
    fn queue(&self) -> QueueName {
        QueueName::RepoOps
    }

    fn command_type(&self) -> &'static str {
        Self::JOB_TYPE
    }
}
