/// 短窗口刷屏检测
///
/// 两套独立策略：
/// - 私聊交互：3 秒内最多 5 条
/// - 消息扫描：5 秒内最多 10 条
///
/// 每次超限累计一次刷屏警告，累计 3 次进入 30 分钟隔离。
/// 隔离名单由多个检测器共享。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::UserId;

/// 刷屏策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloodPolicy {
    /// 窗口内允许的最大消息数
    pub max_messages: usize,
    /// 窗口长度（秒）
    pub window_seconds: u64,
    /// 累计超限次数达到此值后隔离
    pub quarantine_after: u32,
    /// 隔离时长（分钟）
    pub quarantine_minutes: u64,
}

impl FloodPolicy {
    /// 私聊交互策略（5 条 / 3 秒）
    pub fn private_chat() -> Self {
        Self {
            max_messages: 5,
            window_seconds: 3,
            quarantine_after: 3,
            quarantine_minutes: 30,
        }
    }

    /// 消息扫描策略（10 条 / 5 秒）
    pub fn message_scan() -> Self {
        Self {
            max_messages: 10,
            window_seconds: 5,
            quarantine_after: 3,
            quarantine_minutes: 30,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    pub fn quarantine_duration(&self) -> Duration {
        Duration::from_secs(self.quarantine_minutes * 60)
    }
}

/// 隔离名单（用户 → 到期时间），检查时惰性清除过期项
#[derive(Debug, Default)]
pub struct QuarantineRegistry {
    entries: DashMap<UserId, Instant>,
}

impl QuarantineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quarantine_at(&self, user_id: UserId, duration: Duration, now: Instant) {
        self.entries.insert(user_id, now + duration);
        warn!(
            "🔒 用户 {} 被隔离 {} 分钟",
            user_id,
            duration.as_secs() / 60
        );
    }

    pub fn is_quarantined_at(&self, user_id: UserId, now: Instant) -> bool {
        self.remaining_at(user_id, now).is_some()
    }

    /// 剩余隔离时长；已过期则移除
    pub fn remaining_at(&self, user_id: UserId, now: Instant) -> Option<Duration> {
        let until = *self.entries.get(&user_id)?;
        if now < until {
            Some(until - now)
        } else {
            self.entries.remove_if(&user_id, |_, u| now >= *u);
            None
        }
    }

    pub fn release(&self, user_id: UserId) -> bool {
        self.entries.remove(&user_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cleanup_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, until| now < *until);
        before.saturating_sub(self.entries.len())
    }
}

/// 单次刷屏检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloodOutcome {
    Clear,
    /// 超限；`quarantined` 表示本次触发了隔离
    Tripped { warnings: u32, quarantined: bool },
}

impl FloodOutcome {
    pub fn is_flood(&self) -> bool {
        matches!(self, FloodOutcome::Tripped { .. })
    }
}

#[derive(Debug, Default)]
struct FloodState {
    messages: VecDeque<Instant>,
    warnings: u32,
}

/// 刷屏检测器
pub struct FloodDetector {
    name: &'static str,
    policy: FloodPolicy,
    states: DashMap<UserId, FloodState>,
    quarantine: Arc<QuarantineRegistry>,
}

impl FloodDetector {
    pub fn new(name: &'static str, policy: FloodPolicy, quarantine: Arc<QuarantineRegistry>) -> Self {
        Self {
            name,
            policy,
            states: DashMap::new(),
            quarantine,
        }
    }

    pub fn policy(&self) -> &FloodPolicy {
        &self.policy
    }

    pub fn check(&self, user_id: UserId) -> FloodOutcome {
        self.check_at(user_id, Instant::now())
    }

    /// 记录一条消息并判断是否刷屏（先追加再计数）
    pub fn check_at(&self, user_id: UserId, now: Instant) -> FloodOutcome {
        let window = self.policy.window();
        let mut state = self.states.entry(user_id).or_default();

        while let Some(oldest) = state.messages.front() {
            if now.saturating_duration_since(*oldest) >= window {
                state.messages.pop_front();
            } else {
                break;
            }
        }
        state.messages.push_back(now);

        if state.messages.len() <= self.policy.max_messages {
            return FloodOutcome::Clear;
        }

        state.warnings += 1;
        let warnings = state.warnings;
        drop(state);

        let quarantined = warnings >= self.policy.quarantine_after;
        if quarantined {
            self.quarantine
                .quarantine_at(user_id, self.policy.quarantine_duration(), now);
        }
        debug!(
            "🌊 [{}] 用户 {} 刷屏（累计 {} 次）",
            self.name, user_id, warnings
        );

        FloodOutcome::Tripped {
            warnings,
            quarantined,
        }
    }

    pub fn warnings(&self, user_id: UserId) -> u32 {
        self.states.get(&user_id).map(|s| s.warnings).unwrap_or(0)
    }

    pub fn reset_user(&self, user_id: UserId) {
        self.states.remove(&user_id);
    }

    pub fn active_trackers(&self) -> usize {
        self.states.len()
    }

    /// 清理窗口为空且无警告记录的用户
    pub fn cleanup_at(&self, now: Instant) -> usize {
        let window = self.policy.window();
        let before = self.states.len();
        self.states.retain(|_, state| {
            state
                .messages
                .retain(|t| now.saturating_duration_since(*t) < window);
            !state.messages.is_empty() || state.warnings > 0
        });
        before.saturating_sub(self.states.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(policy: FloodPolicy) -> (FloodDetector, Arc<QuarantineRegistry>) {
        let registry = Arc::new(QuarantineRegistry::new());
        (FloodDetector::new("test", policy, registry.clone()), registry)
    }

    #[test]
    fn test_private_policy_trips_on_sixth_message() {
        let (detector, _) = detector(FloodPolicy::private_chat());
        let now = Instant::now();

        for _ in 0..5 {
            assert_eq!(detector.check_at(1, now), FloodOutcome::Clear);
        }
        assert_eq!(
            detector.check_at(1, now),
            FloodOutcome::Tripped {
                warnings: 1,
                quarantined: false
            }
        );

        // 窗口滑过后恢复
        assert_eq!(
            detector.check_at(1, now + Duration::from_secs(3)),
            FloodOutcome::Clear
        );
    }

    #[test]
    fn test_policies_are_distinct() {
        let (scan, _) = detector(FloodPolicy::message_scan());
        let now = Instant::now();
        for _ in 0..10 {
            assert!(!scan.check_at(1, now).is_flood());
        }
        assert!(scan.check_at(1, now).is_flood());
    }

    #[test]
    fn test_third_trip_quarantines() {
        let (detector, registry) = detector(FloodPolicy::private_chat());
        let now = Instant::now();
        for _ in 0..5 {
            detector.check_at(3, now);
        }
        detector.check_at(3, now);
        detector.check_at(3, now);
        assert!(!registry.is_quarantined_at(3, now));

        assert_eq!(
            detector.check_at(3, now),
            FloodOutcome::Tripped {
                warnings: 3,
                quarantined: true
            }
        );
        assert!(registry.is_quarantined_at(3, now + Duration::from_secs(29 * 60)));
        assert!(!registry.is_quarantined_at(3, now + Duration::from_secs(30 * 60)));
        assert!(registry.is_empty());
    }
}
