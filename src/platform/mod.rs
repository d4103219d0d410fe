//! 聊天平台抽象
//!
//! 守卫引擎只通过 `ChatPlatformClient` 访问平台。所有调用都可能失败或超时，
//! 调用方负责把失败降级为安全默认值，从不重试。

pub mod mock;
pub mod timeout;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{ChatId, UserId};

pub use mock::MockPlatformClient;
pub use timeout::TimeoutPlatform;

/// 群成员身份
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
}

impl MemberRole {
    /// 成员/管理员/群主视为已加入
    pub fn is_member(&self) -> bool {
        matches!(
            self,
            MemberRole::Owner | MemberRole::Administrator | MemberRole::Member
        )
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, MemberRole::Owner | MemberRole::Administrator)
    }
}

/// 会话引用：数字 ID 或公开用户名
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatRef {
    Id(ChatId),
    Username(String),
}

impl ChatRef {
    /// 用户名统一去掉前缀 `@`
    pub fn username(name: &str) -> Self {
        ChatRef::Username(name.trim_start_matches('@').to_string())
    }
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRef::Id(id) => write!(f, "{}", id),
            ChatRef::Username(name) => write!(f, "@{}", name),
        }
    }
}

/// 内联按钮
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InlineButton {
    Url { text: String, url: String },
    Callback { text: String, data: String },
}

/// 文本格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParseMode {
    #[default]
    Plain,
    Markdown,
}

/// 发送选项
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    pub parse_mode: ParseMode,
    /// 每个元素为一行按钮
    pub buttons: Vec<Vec<InlineButton>>,
}

impl SendOptions {
    pub fn markdown() -> Self {
        Self {
            parse_mode: ParseMode::Markdown,
            buttons: Vec::new(),
        }
    }

    pub fn with_buttons(mut self, buttons: Vec<Vec<InlineButton>>) -> Self {
        self.buttons = buttons;
        self
    }
}

/// 聊天平台客户端
#[async_trait]
pub trait ChatPlatformClient: Send + Sync {
    /// 查询用户在会话中的身份，`None` 表示从未加入
    async fn get_membership(&self, chat: &ChatRef, user_id: UserId) -> Result<Option<MemberRole>>;

    async fn delete_message(&self, chat_id: ChatId, message_id: i64) -> Result<()>;

    async fn send_message(&self, chat_id: ChatId, text: &str, options: &SendOptions) -> Result<()>;

    /// 机器人自身在会话中的身份
    async fn get_bot_role(&self, chat_id: ChatId) -> Result<Option<MemberRole>>;
}
