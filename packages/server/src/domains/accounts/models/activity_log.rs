use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "activity_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Success,
    Failed,
}

/// One append-only audit record. Rows are never updated or deleted.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub status: ActivityStatus,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Builder for a record about to be appended.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub user_id: Uuid,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub status: ActivityStatus,
    pub metadata: serde_json::Value,
}

impl NewActivity {
    pub fn success(user_id: Uuid, action: &str) -> Self {
        Self {
            user_id,
            action: action.to_string(),
            resource_type: None,
            resource_id: None,
            status: ActivityStatus::Success,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn failed(user_id: Uuid, action: &str) -> Self {
        Self {
            user_id,
            action: action.to_string(),
            resource_type: None,
            resource_id: None,
            status: ActivityStatus::Failed,
            metadata: serde_json::Value::Null,
        }
    }

    /// Name the entity the action touched, e.g. `("repository", "demo")`.
    pub fn with_resource(mut self, resource_type: &str, resource_id: &str) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_set_status_and_metadata() {
        let user_id = Uuid::new_v4();
        let ok = NewActivity::success(user_id, "repo_created")
            .with_resource("repository", "demo")
            .with_metadata(serde_json::json!({"repoUrl": "https://github.com/a/b"}));
        assert_eq!(ok.status, ActivityStatus::Success);
        assert_eq!(ok.resource_type.as_deref(), Some("repository"));
        assert_eq!(ok.resource_id.as_deref(), Some("demo"));
        assert_eq!(ok.metadata["repoUrl"], "https://github.com/a/b");

        let bad = NewActivity::failed(user_id, "repo_created");
        assert_eq!(bad.status, ActivityStatus::Failed);
        assert!(bad.resource_type.is_none());
        assert!(bad.metadata.is_null());
    }
}
