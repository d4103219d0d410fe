use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{from_millis, UserId};

/// 用户角色（权限层级：reguler < vip < vvip < owner）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// 基础等级
    #[default]
    Reguler,
    Vip,
    Vvip,
    Owner,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Reguler => "reguler",
            UserRole::Vip => "vip",
            UserRole::Vvip => "vvip",
            UserRole::Owner => "owner",
        }
    }

    /// 从字符串解析，未知值按基础等级处理
    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "vip" => UserRole::Vip,
            "vvip" => UserRole::Vvip,
            "owner" => UserRole::Owner,
            _ => UserRole::Reguler,
        }
    }

    /// 层级值
    pub fn rank(&self) -> u8 {
        match self {
            UserRole::Reguler => 0,
            UserRole::Vip => 1,
            UserRole::Vvip => 2,
            UserRole::Owner => 3,
        }
    }
}

/// 用户记录（对应 cg_users 表）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub role: UserRole,
    /// 每日请求额度（0 表示无额度）
    pub daily_limit: i32,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// 默认免费额度
    pub const FREE_DAILY_LIMIT: i32 = 10;

    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            username: None,
            first_name: None,
            role: UserRole::Reguler,
            daily_limit: Self::FREE_DAILY_LIMIT,
            is_banned: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// 展示名称：first_name > username > "User"
    pub fn display_name(&self) -> &str {
        self.first_name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or("User")
    }

    /// 从数据库行创建（处理时间戳和类型转换）
    #[allow(clippy::too_many_arguments)]
    pub fn from_db_row(
        user_id: i64,
        username: Option<String>,
        first_name: Option<String>,
        role: String,
        daily_limit: i32,
        is_banned: bool,
        created_at: i64,
        updated_at: i64,
    ) -> Self {
        Self {
            user_id,
            username,
            first_name,
            role: UserRole::parse(&role),
            daily_limit,
            is_banned,
            created_at: from_millis(created_at),
            updated_at: from_millis(updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_and_rank() {
        assert_eq!(UserRole::parse("VIP"), UserRole::Vip);
        assert_eq!(UserRole::parse("unknown"), UserRole::Reguler);
        assert!(UserRole::Vvip.rank() > UserRole::Vip.rank());
        assert_eq!(UserRole::Owner.as_str(), "owner");
    }

    #[test]
    fn test_display_name_fallback() {
        let mut user = User::new(42);
        assert_eq!(user.display_name(), "User");
        user.username = Some("kifzl".into());
        assert_eq!(user.display_name(), "kifzl");
        user.first_name = Some("Budi".into());
        assert_eq!(user.display_name(), "Budi");
    }
}
