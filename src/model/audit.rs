use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChatId, UserId};

/// 审计日志（对应 cg_activity_logs 表）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub user_id: UserId,
    pub action: String,
    pub group_id: Option<ChatId>,
    pub username: Option<String>,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(user_id: UserId, action: impl Into<String>) -> Self {
        Self {
            user_id,
            action: action.into(),
            group_id: None,
            username: None,
            details: Value::Object(serde_json::Map::new()),
            created_at: Utc::now(),
        }
    }

    pub fn with_group(mut self, group_id: ChatId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn with_username(mut self, username: Option<&str>) -> Self {
        self.username = username.map(str::to_string);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}
