//! 数据模型模块

pub mod access;
pub mod audit;
pub mod group;
pub mod user;
pub mod verification;

pub use access::*;
pub use audit::*;
pub use group::*;
pub use user::*;
pub use verification::*;

/// 用户 ID（平台用户 ID，正数）
pub type UserId = i64;

/// 会话 ID（群组为负数，私聊等于用户 ID）
pub type ChatId = i64;

/// 毫秒时间戳转换为 UTC 时间（数据库存储为 BIGINT 毫秒时间戳）
pub(crate) fn from_millis(millis: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp_millis(millis).unwrap_or_else(chrono::Utc::now)
}
