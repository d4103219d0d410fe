//! 群组模型：群管理配置与成员记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{from_millis, ChatId, UserId};

/// 默认欢迎语
pub const DEFAULT_WELCOME_MESSAGE: &str = "Welcome to {group}, {name}!";

/// 群管理配置（对应 cg_group_settings 表）
///
/// 守卫引擎只读取此配置，修改由外部管理界面完成。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSettings {
    pub group_id: ChatId,
    pub group_title: Option<String>,
    pub anti_link: bool,
    pub anti_spam: bool,
    pub anti_virtex: bool,
    pub auto_welcome: bool,
    pub welcome_message: String,
    /// 违禁词（按配置顺序匹配）
    pub banned_words: Vec<String>,
    /// 链接白名单
    pub link_whitelist: Vec<String>,
    pub slowmode_seconds: u32,
    pub updated_at: DateTime<Utc>,
}

impl GroupSettings {
    /// 新群默认配置：所有防护关闭
    pub fn new(group_id: ChatId) -> Self {
        Self {
            group_id,
            group_title: None,
            anti_link: false,
            anti_spam: false,
            anti_virtex: false,
            auto_welcome: false,
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_string(),
            banned_words: Vec::new(),
            link_whitelist: Vec::new(),
            slowmode_seconds: 0,
            updated_at: Utc::now(),
        }
    }
}

/// 群成员记录（对应 cg_group_members 表）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub group_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub warnings: i32,
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GroupMember {
    pub fn new(group_id: ChatId, user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            group_id,
            user_id,
            username: None,
            first_name: None,
            warnings: 0,
            is_active: true,
            joined_at: now,
            updated_at: now,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn from_db_row(
        group_id: i64,
        user_id: i64,
        username: Option<String>,
        first_name: Option<String>,
        warnings: i32,
        is_active: bool,
        joined_at: i64,
        updated_at: i64,
    ) -> Self {
        Self {
            group_id,
            user_id,
            username,
            first_name,
            warnings,
            is_active,
            joined_at: from_millis(joined_at),
            updated_at: from_millis(updated_at),
        }
    }
}
