/// 安全模块
///
/// 提供守卫引擎的核心防护能力：
/// - 内容识别（链接、virtex、违禁词）
/// - 60 秒滑动窗口限流 + 升级封锁
/// - 短窗口刷屏检测 + 隔离
/// - 群内消息计数与重复内容检测
/// - 可疑行为累计与永久封禁
/// - `SecurityGate` 统一编排，输出 `Decision`
pub mod content_classifier;
pub mod decision;
pub mod flood_detector;
pub mod rate_limiter;
pub mod security_service;
pub mod spam_tracker;
pub mod suspicion;

pub use content_classifier::{
    classify_virtex, classify_virtex_with, detect_links, find_link_violations, is_virtex,
    match_banned_word, VirtexKind, VirtexThresholds,
};
pub use decision::{Decision, DenyKind, DenyReason};
pub use flood_detector::{FloodDetector, FloodOutcome, FloodPolicy, QuarantineRegistry};
pub use rate_limiter::{RateLimitOutcome, RateLimitPolicy, SlidingWindowRateLimiter};
pub use security_service::{GateStats, SecurityConfig, SecurityGate, Surface};
pub use spam_tracker::{
    DuplicateContentTracker, DuplicatePolicy, SpamDedupTracker, SpamPolicy, SpamVerdict,
};
pub use suspicion::{SuspicionRecord, SuspicionTracker};
