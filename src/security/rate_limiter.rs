/// 滑动窗口限流器
///
/// 核心特性：
/// 1. 每用户 60 秒滑动窗口，最多 30 次请求
/// 2. 超限时累加升级计数，达到 3 次后进入封锁，时长 `min(300, 60 × n)` 秒
/// 3. 封锁到期后升级计数清零（唯一的降级途径）
/// 4. DashMap entry 锁保证同一用户的 读-裁剪-追加 串行执行

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::decision::{Decision, DenyKind};
use crate::model::UserId;

/// 限流策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitPolicy {
    /// 窗口内最大请求数
    pub max_requests: usize,
    /// 窗口长度（秒）
    pub window_seconds: u64,
    /// 升级计数达到此值后开始封锁
    pub escalate_after: u32,
    /// 每级封锁时长（秒）
    pub block_step_seconds: u64,
    /// 封锁时长上限（秒）
    pub max_block_seconds: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window_seconds: 60,
            escalate_after: 3,
            block_step_seconds: 60,
            max_block_seconds: 300,
        }
    }
}

impl RateLimitPolicy {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    /// 升级计数为 n 时的封锁时长
    pub fn block_duration(&self, escalation: u32) -> Duration {
        let seconds = self
            .block_step_seconds
            .saturating_mul(u64::from(escalation))
            .min(self.max_block_seconds);
        Duration::from_secs(seconds)
    }
}

/// 单次限流检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitOutcome {
    Allowed,
    /// 超限但未进入封锁
    Throttled { escalation: u32 },
    /// 本次超限触发封锁
    BlockStarted { duration: Duration, escalation: u32 },
    /// 仍处于封锁中
    StillBlocked { remaining: Duration },
}

impl RateLimitOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitOutcome::Allowed)
    }

    /// 本次请求是否构成新的超限（封锁期间的重试不算）
    pub fn is_violation(&self) -> bool {
        matches!(
            self,
            RateLimitOutcome::Throttled { .. } | RateLimitOutcome::BlockStarted { .. }
        )
    }

    pub fn into_decision(self) -> Decision {
        match self {
            RateLimitOutcome::Allowed => Decision::Allowed,
            RateLimitOutcome::Throttled { .. } => Decision::deny(
                DenyKind::RateLimited,
                "Terlalu banyak request. Mohon tunggu sebentar.",
            ),
            RateLimitOutcome::BlockStarted { duration, .. } => Decision::deny(
                DenyKind::Blocked,
                format!(
                    "Terlalu banyak request. Anda diblokir selama {} detik.",
                    duration.as_secs()
                ),
            ),
            RateLimitOutcome::StillBlocked { remaining } => Decision::deny(
                DenyKind::Blocked,
                format!(
                    "Anda diblokir sementara. Coba lagi dalam {} detik.",
                    remaining.as_secs()
                ),
            ),
        }
    }
}

/// 单用户窗口状态
#[derive(Debug, Default)]
struct UserWindow {
    /// 按时间顺序排列的请求时间戳
    requests: VecDeque<Instant>,
    blocked_until: Option<Instant>,
    escalation: u32,
}

impl UserWindow {
    /// 丢弃窗口外的时间戳（保留 age < window）
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.requests.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.requests.pop_front();
            } else {
                break;
            }
        }
    }

    /// 封锁到期则解除并清零升级计数
    fn release_expired_block(&mut self, now: Instant) -> bool {
        match self.blocked_until {
            Some(until) if now >= until => {
                self.blocked_until = None;
                self.escalation = 0;
                true
            }
            _ => false,
        }
    }

    fn is_idle(&self) -> bool {
        self.requests.is_empty() && self.blocked_until.is_none() && self.escalation == 0
    }
}

/// 滑动窗口限流器
pub struct SlidingWindowRateLimiter {
    policy: RateLimitPolicy,
    windows: DashMap<UserId, UserWindow>,
}

impl SlidingWindowRateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            windows: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    pub fn check(&self, user_id: UserId) -> RateLimitOutcome {
        self.check_at(user_id, Instant::now())
    }

    /// 检查并记录一次请求
    pub fn check_at(&self, user_id: UserId, now: Instant) -> RateLimitOutcome {
        let mut window = self.windows.entry(user_id).or_default();

        // 1. 封锁检查
        if let Some(until) = window.blocked_until {
            if now < until {
                return RateLimitOutcome::StillBlocked {
                    remaining: until - now,
                };
            }
        }
        if window.release_expired_block(now) {
            info!("🔓 用户 {} 限流封锁到期，升级计数清零", user_id);
        }

        // 2. 裁剪窗口
        window.prune(now, self.policy.window());

        // 3. 超限处理
        if window.requests.len() >= self.policy.max_requests {
            window.escalation += 1;
            let escalation = window.escalation;

            if escalation >= self.policy.escalate_after {
                let duration = self.policy.block_duration(escalation);
                window.blocked_until = Some(now + duration);
                warn!(
                    "🚫 用户 {} 限流升级 {} 次，封锁 {} 秒",
                    user_id,
                    escalation,
                    duration.as_secs()
                );
                return RateLimitOutcome::BlockStarted {
                    duration,
                    escalation,
                };
            }

            debug!("⚠️ 用户 {} 请求超限（升级计数 {}）", user_id, escalation);
            return RateLimitOutcome::Throttled { escalation };
        }

        // 4. 放行
        window.requests.push_back(now);
        RateLimitOutcome::Allowed
    }

    /// `(allowed, reason?)` 形式
    pub fn is_allowed(&self, user_id: UserId) -> (bool, Option<String>) {
        self.check(user_id).into_decision().into_parts()
    }

    pub fn remaining(&self, user_id: UserId) -> usize {
        self.remaining_at(user_id, Instant::now())
    }

    /// 当前窗口剩余可用次数
    pub fn remaining_at(&self, user_id: UserId, now: Instant) -> usize {
        match self.windows.get_mut(&user_id) {
            Some(mut window) => {
                window.prune(now, self.policy.window());
                self.policy.max_requests.saturating_sub(window.requests.len())
            }
            None => self.policy.max_requests,
        }
    }

    /// 当前升级计数
    pub fn escalation(&self, user_id: UserId) -> u32 {
        self.windows.get(&user_id).map(|w| w.escalation).unwrap_or(0)
    }

    pub fn is_blocked_at(&self, user_id: UserId, now: Instant) -> bool {
        self.windows
            .get(&user_id)
            .and_then(|w| w.blocked_until)
            .map(|until| now < until)
            .unwrap_or(false)
    }

    /// 清空用户的全部限流状态
    pub fn reset_user(&self, user_id: UserId) {
        self.windows.remove(&user_id);
    }

    pub fn active_trackers(&self) -> usize {
        self.windows.len()
    }

    /// 清理过期数据，返回移除的用户数
    pub fn cleanup_at(&self, now: Instant) -> usize {
        let window = self.policy.window();
        let before = self.windows.len();
        self.windows.retain(|_, state| {
            state.prune(now, window);
            state.release_expired_block(now);
            !state.is_idle()
        });
        before.saturating_sub(self.windows.len())
    }
}

impl Default for SlidingWindowRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exhaust(limiter: &SlidingWindowRateLimiter, user: UserId, now: Instant) {
        for _ in 0..limiter.policy().max_requests {
            assert!(limiter.check_at(user, now).is_allowed());
        }
    }

    #[test]
    fn test_thirty_first_request_denied() {
        let limiter = SlidingWindowRateLimiter::default();
        let start = Instant::now();

        for i in 0..30 {
            let outcome = limiter.check_at(1, start + Duration::from_secs(i));
            assert!(outcome.is_allowed(), "request {} should pass", i + 1);
        }
        let outcome = limiter.check_at(1, start + Duration::from_secs(30));
        assert_eq!(outcome, RateLimitOutcome::Throttled { escalation: 1 });

        // 第一个请求滑出窗口后再次放行
        assert!(limiter
            .check_at(1, start + Duration::from_secs(60))
            .is_allowed());
        assert_eq!(limiter.remaining_at(1, start + Duration::from_secs(60)), 0);
    }

    #[test]
    fn test_escalation_blocks_after_three_violations() {
        let limiter = SlidingWindowRateLimiter::default();
        let now = Instant::now();
        exhaust(&limiter, 7, now);

        assert!(matches!(
            limiter.check_at(7, now),
            RateLimitOutcome::Throttled { escalation: 1 }
        ));
        assert!(matches!(
            limiter.check_at(7, now),
            RateLimitOutcome::Throttled { escalation: 2 }
        ));
        assert_eq!(
            limiter.check_at(7, now),
            RateLimitOutcome::BlockStarted {
                duration: Duration::from_secs(180),
                escalation: 3
            }
        );

        let later = now + Duration::from_secs(100);
        match limiter.check_at(7, later) {
            RateLimitOutcome::StillBlocked { remaining } => {
                assert_eq!(remaining, Duration::from_secs(80))
            }
            other => panic!("expected block, got {:?}", other),
        }
    }

    #[test]
    fn test_block_expiry_resets_escalation() {
        let limiter = SlidingWindowRateLimiter::default();
        let now = Instant::now();
        exhaust(&limiter, 9, now);
        for _ in 0..3 {
            limiter.check_at(9, now);
        }
        assert_eq!(limiter.escalation(9), 3);

        let after = now + Duration::from_secs(180);
        assert!(limiter.check_at(9, after).is_allowed());
        assert_eq!(limiter.escalation(9), 0);
    }

    #[test]
    fn test_block_duration_caps_at_five_minutes() {
        let policy = RateLimitPolicy::default();
        let durations: Vec<u64> = (3..=8).map(|n| policy.block_duration(n).as_secs()).collect();
        assert_eq!(durations, vec![180, 240, 300, 300, 300, 300]);
        assert!(durations.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_deny_messages() {
        let (allowed, reason) = RateLimitOutcome::StillBlocked {
            remaining: Duration::from_millis(42_900),
        }
        .into_decision()
        .into_parts();
        assert!(!allowed);
        assert_eq!(
            reason.as_deref(),
            Some("Anda diblokir sementara. Coba lagi dalam 42 detik.")
        );
    }

    #[test]
    fn test_cleanup_keeps_pending_escalation() {
        let limiter = SlidingWindowRateLimiter::default();
        let now = Instant::now();
        exhaust(&limiter, 1, now);
        limiter.check_at(1, now);
        limiter.check_at(2, now);

        let removed = limiter.cleanup_at(now + Duration::from_secs(61));
        assert_eq!(removed, 1);
        assert_eq!(limiter.escalation(1), 1);
        assert_eq!(limiter.remaining_at(1, now + Duration::from_secs(61)), 30);
    }
}
