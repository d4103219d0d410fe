/// 可疑行为累计与封禁名单
///
/// 每次限流或刷屏违规追加一条原因，累计达到阈值（默认 10）后进入永久封禁。
/// 封禁只能通过显式解封清除。

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::UserId;

/// 单用户可疑记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspicionRecord {
    pub first_detected: DateTime<Utc>,
    /// 按发生顺序排列
    pub reasons: Vec<String>,
    pub count: u32,
}

pub struct SuspicionTracker {
    ban_threshold: u32,
    records: DashMap<UserId, SuspicionRecord>,
    banned: DashSet<UserId>,
}

impl SuspicionTracker {
    pub const DEFAULT_BAN_THRESHOLD: u32 = 10;

    pub fn new(ban_threshold: u32) -> Self {
        Self {
            ban_threshold,
            records: DashMap::new(),
            banned: DashSet::new(),
        }
    }

    /// 记录一次可疑行为，返回本次是否触发自动封禁
    pub fn mark(&self, user_id: UserId, reason: &str) -> bool {
        let count = {
            let mut record = self
                .records
                .entry(user_id)
                .or_insert_with(|| SuspicionRecord {
                    first_detected: Utc::now(),
                    reasons: Vec::new(),
                    count: 0,
                });
            record.reasons.push(reason.to_string());
            record.count += 1;
            record.count
        };

        if count >= self.ban_threshold && self.banned.insert(user_id) {
            warn!(
                "🚫 用户 {} 可疑行为累计 {} 次，自动封禁",
                user_id, count
            );
            return true;
        }
        false
    }

    pub fn record(&self, user_id: UserId) -> Option<SuspicionRecord> {
        self.records.get(&user_id).map(|r| r.clone())
    }

    pub fn is_banned(&self, user_id: UserId) -> bool {
        self.banned.contains(&user_id)
    }

    pub fn ban(&self, user_id: UserId) {
        self.banned.insert(user_id);
        info!("🚫 用户 {} 被封禁", user_id);
    }

    /// 解封并清除可疑记录
    pub fn unban(&self, user_id: UserId) -> bool {
        let was_banned = self.banned.remove(&user_id).is_some();
        self.records.remove(&user_id);
        info!("✅ 用户 {} 已解封", user_id);
        was_banned
    }

    pub fn banned_count(&self) -> usize {
        self.banned.len()
    }

    pub fn suspicious_count(&self) -> usize {
        self.records.len()
    }
}

impl Default for SuspicionTracker {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BAN_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenth_flag_bans() {
        let tracker = SuspicionTracker::default();
        for i in 1..10 {
            assert!(!tracker.mark(5, &format!("rate_limit#{}", i)));
        }
        assert!(!tracker.is_banned(5));
        assert!(tracker.mark(5, "flood"));
        assert!(tracker.is_banned(5));

        let record = tracker.record(5).unwrap();
        assert_eq!(record.count, 10);
        assert_eq!(record.reasons.first().map(String::as_str), Some("rate_limit#1"));
        assert_eq!(record.reasons.last().map(String::as_str), Some("flood"));

        // 已封禁后不再重复触发
        assert!(!tracker.mark(5, "flood"));
    }

    #[test]
    fn test_unban_clears_record() {
        let tracker = SuspicionTracker::new(2);
        tracker.mark(8, "flood");
        tracker.mark(8, "flood");
        assert!(tracker.is_banned(8));

        assert!(tracker.unban(8));
        assert!(!tracker.is_banned(8));
        assert!(tracker.record(8).is_none());
        assert_eq!(tracker.suspicious_count(), 0);
    }
}
