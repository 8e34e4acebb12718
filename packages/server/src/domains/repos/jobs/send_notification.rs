use serde::{Deserialize, Serialize};

use crate::kernel::jobs::{CommandMeta, QueueName};

/// Deliver one chat message. Kept on its own queue so a messaging outage
/// never backs up repository work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendNotificationJob {
    pub chat_id: i64,
    pub message: String,
}

impl SendNotificationJob {
    pub const JOB_TYPE: &'static str = "send_notification";
}

impl CommandMeta for SendNotificationJob {
    fn queue(&self) -> QueueName {
        QueueName::Notifications
    }

    fn command_type(&self) -> &'static str {
        Self::JOB_TYPE
    }

    fn max_attempts(&self) -> i32 {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifications_get_fewer_attempts() {
        let job = SendNotificationJob {
            chat_id: 42,
            message: "done".into(),
        };
        assert_eq!(job.queue(), QueueName::Notifications);
        assert_eq!(job.command_type(), "send_notification");
        assert_eq!(job.max_attempts(), 2);
    }
}
