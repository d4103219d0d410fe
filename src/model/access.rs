use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{from_millis, UserId, UserRole};

/// 付费等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessTier {
    Vip,
    Vvip,
}

impl AccessTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessTier::Vip => "vip",
            AccessTier::Vvip => "vvip",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "vip" => Some(AccessTier::Vip),
            "vvip" => Some(AccessTier::Vvip),
            _ => None,
        }
    }

    /// 授予后对应的用户角色
    pub fn role(&self) -> UserRole {
        match self {
            AccessTier::Vip => UserRole::Vip,
            AccessTier::Vvip => UserRole::Vvip,
        }
    }

    pub fn default_features(&self) -> Vec<String> {
        match self {
            AccessTier::Vip => vec!["all".to_string()],
            AccessTier::Vvip => vec!["all".to_string(), "priority".to_string()],
        }
    }
}

/// 授权状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantStatus {
    Active,
    Expired,
    Revoked,
}

impl GrantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantStatus::Active => "active",
            GrantStatus::Expired => "expired",
            GrantStatus::Revoked => "revoked",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "active" => GrantStatus::Active,
            "revoked" => GrantStatus::Revoked,
            _ => GrantStatus::Expired,
        }
    }
}

/// VIP / VVIP 授权记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub user_id: UserId,
    pub tier: AccessTier,
    pub status: GrantStatus,
    pub expired_at: DateTime<Utc>,
    pub daily_limit: i32,
    pub features: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccessGrant {
    /// 状态为 active 且未过期
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == GrantStatus::Active && self.expired_at > now
    }

    /// 状态为 active 但已过期（等待 expire 处理）
    pub fn is_due_at(&self, now: DateTime<Utc>) -> bool {
        self.status == GrantStatus::Active && self.expired_at <= now
    }

    #[allow(clippy::too_many_arguments)]
    pub fn from_db_row(
        user_id: i64,
        tier: AccessTier,
        status: String,
        expired_at: i64,
        daily_limit: i32,
        features: serde_json::Value,
        created_at: i64,
        updated_at: i64,
    ) -> Self {
        let features = serde_json::from_value(features).unwrap_or_default();
        Self {
            user_id,
            tier,
            status: GrantStatus::parse(&status),
            expired_at: from_millis(expired_at),
            daily_limit,
            features,
            created_at: from_millis(created_at),
            updated_at: from_millis(updated_at),
        }
    }
}
