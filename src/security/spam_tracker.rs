/// 消息计数防刷
///
/// - `SpamDedupTracker`：按 (用户, 群) 计数，窗口锚定在窗口内第一条消息，
///   超过 10 秒才重开窗口；第 6 条删除并警告一次，之后同窗口内静默删除
/// - `DuplicateContentTracker`：按用户统计 60 秒内相同内容的次数

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::model::{ChatId, UserId};

/// 群内计数策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpamPolicy {
    /// 窗口内允许的消息数
    pub max_messages: u32,
    /// 窗口长度（秒）
    pub window_seconds: u64,
}

impl Default for SpamPolicy {
    fn default() -> Self {
        Self {
            max_messages: 5,
            window_seconds: 10,
        }
    }
}

/// 群消息处理结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpamVerdict {
    Allow,
    /// 窗口内首次超限：删除并警告
    DeleteAndWarn { count: u32 },
    /// 已警告过：静默删除
    DeleteSilently { count: u32 },
}

impl SpamVerdict {
    pub fn should_delete(&self) -> bool {
        !matches!(self, SpamVerdict::Allow)
    }
}

#[derive(Debug, Clone, Copy)]
struct SpamWindow {
    count: u32,
    first_message: Instant,
    warned: bool,
}

impl SpamWindow {
    fn start(now: Instant) -> Self {
        Self {
            count: 1,
            first_message: now,
            warned: false,
        }
    }
}

pub struct SpamDedupTracker {
    policy: SpamPolicy,
    windows: DashMap<(UserId, ChatId), SpamWindow>,
}

impl SpamDedupTracker {
    pub fn new(policy: SpamPolicy) -> Self {
        Self {
            policy,
            windows: DashMap::new(),
        }
    }

    pub fn record(&self, user_id: UserId, group_id: ChatId) -> SpamVerdict {
        self.record_at(user_id, group_id, Instant::now())
    }

    pub fn record_at(&self, user_id: UserId, group_id: ChatId, now: Instant) -> SpamVerdict {
        let window_len = Duration::from_secs(self.policy.window_seconds);
        let mut entry = self
            .windows
            .entry((user_id, group_id))
            .or_insert_with(|| SpamWindow {
                count: 0,
                first_message: now,
                warned: false,
            });

        if entry.count == 0 || now.saturating_duration_since(entry.first_message) > window_len {
            *entry = SpamWindow::start(now);
            return SpamVerdict::Allow;
        }

        entry.count += 1;
        if entry.count <= self.policy.max_messages {
            return SpamVerdict::Allow;
        }

        if entry.warned {
            SpamVerdict::DeleteSilently { count: entry.count }
        } else {
            entry.warned = true;
            SpamVerdict::DeleteAndWarn { count: entry.count }
        }
    }

    /// 清除用户在所有群的计数
    pub fn reset_user(&self, user_id: UserId) {
        self.windows.retain(|(uid, _), _| *uid != user_id);
    }

    pub fn active_trackers(&self) -> usize {
        self.windows.len()
    }

    pub fn cleanup_at(&self, now: Instant) -> usize {
        let window_len = Duration::from_secs(self.policy.window_seconds);
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.first_message) <= window_len);
        before.saturating_sub(self.windows.len())
    }
}

impl Default for SpamDedupTracker {
    fn default() -> Self {
        Self::new(SpamPolicy::default())
    }
}

/// 重复内容策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicatePolicy {
    /// 相同内容达到此次数后拒绝
    pub max_repeats: usize,
    pub window_seconds: u64,
}

impl Default for DuplicatePolicy {
    fn default() -> Self {
        Self {
            max_repeats: 5,
            window_seconds: 60,
        }
    }
}

/// 相同内容重复检测
pub struct DuplicateContentTracker {
    policy: DuplicatePolicy,
    history: DashMap<UserId, VecDeque<(Instant, String)>>,
}

impl DuplicateContentTracker {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            history: DashMap::new(),
        }
    }

    /// 返回 true 表示内容被判定为重复刷屏（被拒绝的消息不计入历史）
    pub fn is_duplicate_at(&self, user_id: UserId, message: &str, now: Instant) -> bool {
        let window = Duration::from_secs(self.policy.window_seconds);
        let mut history = self.history.entry(user_id).or_default();
        history.retain(|(t, _)| now.saturating_duration_since(*t) < window);

        let same = history.iter().filter(|(_, m)| m == message).count();
        if same >= self.policy.max_repeats {
            return true;
        }

        history.push_back((now, message.to_string()));
        false
    }

    pub fn reset_user(&self, user_id: UserId) {
        self.history.remove(&user_id);
    }

    pub fn active_trackers(&self) -> usize {
        self.history.len()
    }

    pub fn cleanup_at(&self, now: Instant) -> usize {
        let window = Duration::from_secs(self.policy.window_seconds);
        let before = self.history.len();
        self.history.retain(|_, history| {
            history.retain(|(t, _)| now.saturating_duration_since(*t) < window);
            !history.is_empty()
        });
        before.saturating_sub(self.history.len())
    }
}

impl Default for DuplicateContentTracker {
    fn default() -> Self {
        Self::new(DuplicatePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sixth_message_warns_once() {
        let tracker = SpamDedupTracker::default();
        let start = Instant::now();

        for i in 0..5 {
            let verdict = tracker.record_at(1, -100, start + Duration::from_secs(i));
            assert_eq!(verdict, SpamVerdict::Allow);
        }
        assert_eq!(
            tracker.record_at(1, -100, start + Duration::from_secs(6)),
            SpamVerdict::DeleteAndWarn { count: 6 }
        );
        for i in 7..10 {
            assert_eq!(
                tracker.record_at(1, -100, start + Duration::from_secs(i)),
                SpamVerdict::DeleteSilently { count: i as u32 }
            );
        }
    }

    #[test]
    fn test_window_anchored_at_first_message() {
        let tracker = SpamDedupTracker::default();
        let start = Instant::now();

        // 每 2 秒一条：窗口不随消息滑动，第 6 条落在第 10 秒仍在窗口内
        for i in 0..5 {
            tracker.record_at(1, -100, start + Duration::from_secs(i * 2));
        }
        assert!(tracker
            .record_at(1, -100, start + Duration::from_secs(10))
            .should_delete());

        // 超过 10 秒后重开窗口，警告状态一并清除
        assert_eq!(
            tracker.record_at(1, -100, start + Duration::from_millis(10_001)),
            SpamVerdict::Allow
        );
    }

    #[test]
    fn test_groups_tracked_separately() {
        let tracker = SpamDedupTracker::default();
        let now = Instant::now();
        for _ in 0..5 {
            tracker.record_at(1, -100, now);
        }
        assert_eq!(tracker.record_at(1, -200, now), SpamVerdict::Allow);
        assert!(tracker.record_at(1, -100, now).should_delete());

        tracker.reset_user(1);
        assert_eq!(tracker.active_trackers(), 0);
    }

    #[test]
    fn test_duplicate_content() {
        let tracker = DuplicateContentTracker::default();
        let now = Instant::now();
        for _ in 0..5 {
            assert!(!tracker.is_duplicate_at(1, "promo", now));
        }
        assert!(tracker.is_duplicate_at(1, "promo", now));
        assert!(!tracker.is_duplicate_at(1, "hello", now));
        assert!(!tracker.is_duplicate_at(1, "promo", now + Duration::from_secs(60)));
    }
}
