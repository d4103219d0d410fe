//! 统一的安全决策类型
//!
//! 封禁、隔离、限流、刷屏、重复内容、virtex 的结果都归一为 `Decision`，
//! 所有调用方按同一种方式消费。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 拒绝类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyKind {
    /// 永久封禁
    Banned,
    /// 临时隔离
    Quarantined,
    /// 限流软拒绝（未进入封锁）
    RateLimited,
    /// 限流升级后的封锁
    Blocked,
    /// 短窗口刷屏
    Flood,
    /// 相同内容重复发送
    DuplicateContent,
    /// virtex 攻击载荷
    Virtex,
    /// 尚未完成入群验证
    Unverified,
}

impl DenyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyKind::Banned => "banned",
            DenyKind::Quarantined => "quarantined",
            DenyKind::RateLimited => "rate_limit",
            DenyKind::Blocked => "blocked",
            DenyKind::Flood => "flood",
            DenyKind::DuplicateContent => "duplicate_content",
            DenyKind::Virtex => "virtex",
            DenyKind::Unverified => "unverified",
        }
    }
}

impl fmt::Display for DenyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 拒绝原因（类别 + 面向用户的提示文本）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyReason {
    pub kind: DenyKind,
    pub message: String,
}

impl DenyReason {
    pub fn new(kind: DenyKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// 安全检查结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Allowed,
    Denied(DenyReason),
}

impl Decision {
    pub fn deny(kind: DenyKind, message: impl Into<String>) -> Self {
        Decision::Denied(DenyReason::new(kind, message))
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    pub fn reason(&self) -> Option<&DenyReason> {
        match self {
            Decision::Allowed => None,
            Decision::Denied(reason) => Some(reason),
        }
    }

    /// 拆分为 `(allowed, reason?)`
    pub fn into_parts(self) -> (bool, Option<String>) {
        match self {
            Decision::Allowed => (true, None),
            Decision::Denied(reason) => (false, Some(reason.message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_parts() {
        assert_eq!(Decision::Allowed.into_parts(), (true, None));

        let (allowed, reason) = Decision::deny(DenyKind::Flood, "slow down").into_parts();
        assert!(!allowed);
        assert_eq!(reason.as_deref(), Some("slow down"));
    }
}
