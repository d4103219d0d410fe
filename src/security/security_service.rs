/// 中央安全闸门
///
/// 整合所有安全组件，对每个事件给出一次 allow/deny 决策：
/// - 封禁名单（最先检查，快速失败）
/// - 隔离名单
/// - 滑动窗口限流
/// - 短窗口刷屏（按入口区分两套策略）
/// - 重复内容（仅携带消息时）
/// - virtex（仅携带消息时）
///
/// 任何一步失败立即返回。每次拒绝都异步写入审计日志，写入失败不影响决策。
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::content_classifier::{classify_virtex_with, VirtexThresholds};
use super::decision::{Decision, DenyKind, DenyReason};
use super::flood_detector::{FloodDetector, FloodPolicy, QuarantineRegistry};
use super::rate_limiter::{RateLimitPolicy, SlidingWindowRateLimiter};
use super::spam_tracker::{DuplicateContentTracker, DuplicatePolicy, SpamPolicy};
use super::suspicion::SuspicionTracker;
use crate::model::{AuditLogEntry, UserId};
use crate::service::AuditLogger;

/// 安全配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// 滑动窗口限流
    pub rate_limit: RateLimitPolicy,
    /// 私聊交互刷屏策略
    pub private_flood: FloodPolicy,
    /// 消息扫描刷屏策略
    pub scan_flood: FloodPolicy,
    /// 可疑次数达到此值自动封禁
    pub suspicion_ban_threshold: u32,
    /// 群内消息计数
    pub group_spam: SpamPolicy,
    /// 相同内容重复
    pub duplicate: DuplicatePolicy,
    /// virtex 阈值
    pub virtex: VirtexThresholds,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitPolicy::default(),
            private_flood: FloodPolicy::private_chat(),
            scan_flood: FloodPolicy::message_scan(),
            suspicion_ban_threshold: SuspicionTracker::DEFAULT_BAN_THRESHOLD,
            group_spam: SpamPolicy::default(),
            duplicate: DuplicatePolicy::default(),
            virtex: VirtexThresholds::default(),
        }
    }
}

/// 请求入口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    /// 通用请求/消息扫描（10 条 / 5 秒）
    MessageScan,
    /// 私聊交互（5 条 / 3 秒）
    PrivateChat,
}

impl Surface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Surface::MessageScan => "message_scan",
            Surface::PrivateChat => "private_chat",
        }
    }
}

/// 统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateStats {
    pub banned: usize,
    pub suspicious: usize,
    pub quarantined: usize,
    pub active_trackers: usize,
}

/// 安全闸门
pub struct SecurityGate {
    config: SecurityConfig,
    rate_limiter: SlidingWindowRateLimiter,
    scan_flood: FloodDetector,
    private_flood: FloodDetector,
    quarantine: Arc<QuarantineRegistry>,
    duplicates: DuplicateContentTracker,
    suspicion: SuspicionTracker,
    audit: Option<AuditLogger>,
}

impl SecurityGate {
    pub fn new(config: SecurityConfig) -> Self {
        let quarantine = Arc::new(QuarantineRegistry::new());
        Self {
            rate_limiter: SlidingWindowRateLimiter::new(config.rate_limit),
            scan_flood: FloodDetector::new("scan", config.scan_flood, quarantine.clone()),
            private_flood: FloodDetector::new("private", config.private_flood, quarantine.clone()),
            quarantine,
            duplicates: DuplicateContentTracker::new(config.duplicate),
            suspicion: SuspicionTracker::new(config.suspicion_ban_threshold),
            audit: None,
            config,
        }
    }

    /// 挂载审计日志
    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// 通用请求检查：ban → quarantine → rate limit → flood(10/5s) → duplicate → virtex
    pub fn check_request(&self, user_id: UserId, message: Option<&str>) -> Decision {
        self.evaluate_at(user_id, Surface::MessageScan, message, Instant::now())
    }

    /// 私聊交互检查，刷屏策略为 5 条 / 3 秒
    pub fn check_private_request(&self, user_id: UserId, message: Option<&str>) -> Decision {
        self.evaluate_at(user_id, Surface::PrivateChat, message, Instant::now())
    }

    /// 按给定时刻执行完整检查
    pub fn evaluate_at(
        &self,
        user_id: UserId,
        surface: Surface,
        message: Option<&str>,
        now: Instant,
    ) -> Decision {
        let decision = self.run_checks(user_id, surface, message, now);

        match &decision {
            Decision::Allowed => {
                debug!("✅ 安全检查通过: user={} surface={}", user_id, surface.as_str());
            }
            Decision::Denied(reason) => {
                warn!(
                    "❌ 安全检查拒绝: user={} surface={} reason={}",
                    user_id,
                    surface.as_str(),
                    reason
                );
                self.audit_denial(user_id, surface, reason);
            }
        }

        decision
    }

    fn run_checks(
        &self,
        user_id: UserId,
        surface: Surface,
        message: Option<&str>,
        now: Instant,
    ) -> Decision {
        // 1. 封禁
        if self.suspicion.is_banned(user_id) {
            return Decision::deny(
                DenyKind::Banned,
                "Akun Anda telah dibanned dari menggunakan bot ini.",
            );
        }

        // 2. 隔离
        if self.quarantine.is_quarantined_at(user_id, now) {
            return Decision::deny(
                DenyKind::Quarantined,
                "Anda sedang dalam masa karantina. Silakan tunggu beberapa saat.",
            );
        }

        // 3. 限流
        let rate = self.rate_limiter.check_at(user_id, now);
        if !rate.is_allowed() {
            if rate.is_violation() {
                self.suspicion.mark(user_id, DenyKind::RateLimited.as_str());
            }
            return rate.into_decision();
        }

        // 4. 刷屏
        let flood = match surface {
            Surface::MessageScan => self.scan_flood.check_at(user_id, now),
            Surface::PrivateChat => self.private_flood.check_at(user_id, now),
        };
        if flood.is_flood() {
            self.suspicion.mark(user_id, DenyKind::Flood.as_str());
            let message = match surface {
                Surface::MessageScan => "Terdeteksi flood. Silakan tunggu beberapa saat.",
                Surface::PrivateChat => "Mohon tunggu sebentar sebelum mengirim pesan lagi.",
            };
            return Decision::deny(DenyKind::Flood, message);
        }

        if let Some(text) = message {
            // 5. 重复内容
            if self.duplicates.is_duplicate_at(user_id, text, now) {
                return Decision::deny(DenyKind::DuplicateContent, "Pesan spam terdeteksi.");
            }

            // 6. virtex
            if classify_virtex_with(text, &self.config.virtex).is_some() {
                return Decision::deny(DenyKind::Virtex, "Pesan virtex terdeteksi.");
            }
        }

        Decision::Allowed
    }

    fn audit_denial(&self, user_id: UserId, surface: Surface, reason: &DenyReason) {
        let Some(audit) = &self.audit else {
            return;
        };
        let entry = AuditLogEntry::new(user_id, format!("security:{}", reason.kind.as_str()))
            .with_details(json!({
                "surface": surface.as_str(),
                "message": reason.message,
            }));
        audit.record_detached(entry);
    }

    pub fn is_banned(&self, user_id: UserId) -> bool {
        self.suspicion.is_banned(user_id)
    }

    pub fn is_quarantined(&self, user_id: UserId) -> bool {
        self.quarantine.is_quarantined_at(user_id, Instant::now())
    }

    /// 手动封禁（管理员操作）
    pub fn ban_user(&self, user_id: UserId) {
        self.suspicion.ban(user_id);
    }

    /// 手动解封，同时清除该用户的全部追踪状态
    pub fn unban_user(&self, user_id: UserId) {
        self.suspicion.unban(user_id);
        self.quarantine.release(user_id);
        self.rate_limiter.reset_user(user_id);
        self.scan_flood.reset_user(user_id);
        self.private_flood.reset_user(user_id);
        self.duplicates.reset_user(user_id);
    }

    /// 限流窗口剩余次数
    pub fn remaining(&self, user_id: UserId) -> usize {
        self.rate_limiter.remaining(user_id)
    }

    pub fn suspicion(&self) -> &SuspicionTracker {
        &self.suspicion
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            banned: self.suspicion.banned_count(),
            suspicious: self.suspicion.suspicious_count(),
            quarantined: self.quarantine.len(),
            active_trackers: self.rate_limiter.active_trackers(),
        }
    }

    /// 定期清理过期数据（后台任务）
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Instant::now())
    }

    pub fn cleanup_expired_at(&self, now: Instant) -> usize {
        let removed = self.rate_limiter.cleanup_at(now)
            + self.scan_flood.cleanup_at(now)
            + self.private_flood.cleanup_at(now)
            + self.quarantine.cleanup_at(now)
            + self.duplicates.cleanup_at(now);

        let stats = self.stats();
        info!(
            "🧹 安全闸门清理完成：移除 {} 条，剩余 {} 个限流窗口，{} 个隔离",
            removed, stats.active_trackers, stats.quarantined
        );
        removed
    }
}

impl Default for SecurityGate {
    fn default() -> Self {
        Self::new(SecurityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_ban_short_circuits() {
        let gate = SecurityGate::default();
        let now = Instant::now();
        gate.ban_user(1);

        let decision = gate.evaluate_at(1, Surface::MessageScan, None, now);
        assert_eq!(decision.reason().map(|r| r.kind), Some(DenyKind::Banned));
        // 被封禁时不消耗限流额度
        assert_eq!(gate.remaining(1), 30);
    }

    #[test]
    fn test_flood_surfaces_differ() {
        let gate = SecurityGate::default();
        let now = Instant::now();

        for _ in 0..5 {
            assert!(gate.evaluate_at(1, Surface::PrivateChat, None, now).is_allowed());
        }
        let decision = gate.evaluate_at(1, Surface::PrivateChat, None, now);
        assert_eq!(decision.reason().map(|r| r.kind), Some(DenyKind::Flood));

        for _ in 0..10 {
            assert!(gate.evaluate_at(2, Surface::MessageScan, None, now).is_allowed());
        }
        let decision = gate.evaluate_at(2, Surface::MessageScan, None, now);
        assert_eq!(decision.reason().map(|r| r.kind), Some(DenyKind::Flood));
    }

    #[test]
    fn test_message_checks_run_last() {
        let gate = SecurityGate::default();
        let start = Instant::now();

        let virtex = "x".repeat(60);
        let decision = gate.evaluate_at(3, Surface::MessageScan, Some(&virtex), start);
        assert_eq!(decision.reason().map(|r| r.kind), Some(DenyKind::Virtex));

        for i in 0..5 {
            let at = start + Duration::from_secs(1 + i);
            assert!(gate
                .evaluate_at(3, Surface::MessageScan, Some("promo"), at)
                .is_allowed());
        }
        let decision =
            gate.evaluate_at(3, Surface::MessageScan, Some("promo"), start + Duration::from_secs(7));
        assert_eq!(
            decision.reason().map(|r| r.kind),
            Some(DenyKind::DuplicateContent)
        );
    }

    #[test]
    fn test_violations_accumulate_suspicion() {
        let gate = SecurityGate::default();
        let now = Instant::now();
        for _ in 0..5 {
            gate.evaluate_at(4, Surface::PrivateChat, None, now);
        }
        gate.evaluate_at(4, Surface::PrivateChat, None, now);
        gate.evaluate_at(4, Surface::PrivateChat, None, now);

        let record = gate.suspicion().record(4).unwrap();
        assert_eq!(record.count, 2);
        assert_eq!(record.reasons, vec!["flood", "flood"]);
    }

    #[test]
    fn test_only_new_rate_violations_mark_suspicion() {
        let gate = SecurityGate::default();
        let start = Instant::now();
        for i in 0..30 {
            gate.evaluate_at(6, Surface::MessageScan, None, start + Duration::from_secs(2 * i));
        }

        let at = start + Duration::from_secs(59);
        for _ in 0..3 {
            gate.evaluate_at(6, Surface::MessageScan, None, at);
        }
        for i in 1..10 {
            let decision = gate.evaluate_at(6, Surface::MessageScan, None, at + Duration::from_secs(i));
            assert_eq!(decision.reason().map(|r| r.kind), Some(DenyKind::Blocked));
        }

        let record = gate.suspicion().record(6).unwrap();
        assert_eq!(record.count, 3);
        assert_eq!(record.reasons, vec!["rate_limit"; 3]);
    }

    #[test]
    fn test_unban_clears_all_state() {
        let gate = SecurityGate::default();
        let now = Instant::now();
        for _ in 0..8 {
            gate.evaluate_at(5, Surface::PrivateChat, None, now);
        }
        assert!(gate.is_quarantined(5));

        gate.unban_user(5);
        let stats = gate.stats();
        assert_eq!(stats.quarantined, 0);
        assert_eq!(stats.suspicious, 0);
        assert_eq!(stats.active_trackers, 0);
        assert!(gate.evaluate_at(5, Surface::PrivateChat, None, now).is_allowed());
    }
}
