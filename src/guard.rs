//! 守卫引擎组装
//!
//! `ChatGuard` 持有所有组件，宿主机器人把平台事件转交给这里。
//! 平台客户端统一包一层超时。

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{GuardConfig, Operators, RequiredGroups};
use crate::error::Result;
use crate::model::UserId;
use crate::platform::{ChatPlatformClient, TimeoutPlatform};
use crate::repository::{GuardStore, MemoryGuardStore, PgGuardStore};
use crate::security::{Decision, DenyKind, SecurityGate};
use crate::service::{
    AccessService, AuditLogger, GroupMessage, GroupModerator, LeaveOutcome, MemberEvent,
    ModerationOutcome, RecheckOutcome, Requester, RevocationCascade, RevocationReason,
    RevocationReport, VerificationService,
};

pub struct ChatGuard {
    config: GuardConfig,
    store: Arc<dyn GuardStore>,
    operators: Operators,
    required_groups: RequiredGroups,
    gate: Arc<SecurityGate>,
    moderator: Arc<GroupModerator>,
    verification: VerificationService,
    cascade: Arc<RevocationCascade>,
    access: AccessService,
    audit: AuditLogger,
}

impl ChatGuard {
    pub fn new(
        config: GuardConfig,
        store: Arc<dyn GuardStore>,
        platform: Arc<dyn ChatPlatformClient>,
    ) -> Self {
        info!("🔧 初始化守卫引擎组件...");
        let platform: Arc<dyn ChatPlatformClient> =
            Arc::new(TimeoutPlatform::new(platform, config.bot.request_timeout()));

        let operators = config.operators();
        let required_groups = config.required_groups();
        let audit = AuditLogger::new(store.clone());

        let gate = Arc::new(SecurityGate::new(config.security.clone()).with_audit(audit.clone()));
        info!("✅ 安全闸门初始化完成");

        let cascade = Arc::new(RevocationCascade::new(
            store.clone(),
            platform.clone(),
            audit.clone(),
            required_groups.clone(),
        ));

        let moderator = Arc::new(
            GroupModerator::new(
                store.clone(),
                platform.clone(),
                audit.clone(),
                cascade.clone(),
                required_groups.clone(),
                operators.clone(),
            )
            .with_policies(config.security.group_spam, config.security.virtex),
        );

        let verification = VerificationService::new(
            store.clone(),
            platform,
            audit.clone(),
            required_groups.clone(),
            operators.clone(),
        )
        .with_free_daily_limit(config.access.free_daily_limit);

        let access = AccessService::new(store.clone(), audit.clone(), config.access);

        info!(
            "✅ 守卫引擎初始化完成（必须群组 {} 个，特权操作员 {} 个）",
            required_groups.len(),
            operators.len()
        );

        Self {
            config,
            store,
            operators,
            required_groups,
            gate,
            moderator,
            verification,
            cascade,
            access,
            audit,
        }
    }

    /// 配置了数据库时使用 Postgres，否则使用内存存储
    pub async fn connect(config: GuardConfig, platform: Arc<dyn ChatPlatformClient>) -> Result<Self> {
        let store: Arc<dyn GuardStore> = match &config.database_url {
            Some(url) => {
                info!("🔌 初始化数据库连接...");
                Arc::new(PgGuardStore::connect(url).await?)
            }
            None => {
                info!("💾 未配置数据库，使用内存存储");
                Arc::new(MemoryGuardStore::new())
            }
        };
        Ok(Self::new(config, store, platform))
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn GuardStore> {
        &self.store
    }

    pub fn gate(&self) -> &Arc<SecurityGate> {
        &self.gate
    }

    pub fn moderator(&self) -> &GroupModerator {
        &self.moderator
    }

    pub fn verification(&self) -> &VerificationService {
        &self.verification
    }

    pub fn access(&self) -> &AccessService {
        &self.access
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub fn required_groups(&self) -> &RequiredGroups {
        &self.required_groups
    }

    pub fn is_privileged(&self, user_id: UserId) -> bool {
        self.operators.is_privileged(user_id)
    }

    pub fn check_request(&self, user_id: UserId, message: Option<&str>) -> Decision {
        self.gate.check_request(user_id, message)
    }

    /// 私聊消息：先过安全闸门，再过验证
    pub async fn on_private_message(&self, requester: &Requester, text: Option<&str>) -> Decision {
        let decision = self.gate.check_private_request(requester.user_id, text);
        if !decision.is_allowed() {
            return decision;
        }
        if self.verification.gate_private_interaction(requester, text).await {
            Decision::Allowed
        } else {
            Decision::deny(DenyKind::Unverified, "Verifikasi grup wajib belum selesai.")
        }
    }

    pub async fn on_group_message(&self, message: &GroupMessage) -> ModerationOutcome {
        let privileged = self.is_privileged(message.sender_id);
        self.moderator.on_message(message, privileged).await
    }

    pub async fn on_member_joined(&self, event: &MemberEvent) -> bool {
        self.moderator.on_member_joined(event).await
    }

    pub async fn on_member_left(&self, event: &MemberEvent) -> LeaveOutcome {
        self.moderator.on_member_left(event).await
    }

    pub async fn ensure_verified(&self, requester: &Requester) -> bool {
        self.verification.ensure_verified(requester).await
    }

    pub async fn recheck(&self, requester: &Requester) -> RecheckOutcome {
        self.verification.recheck(requester).await
    }

    pub async fn revoke(&self, user_id: UserId, reason: RevocationReason) -> RevocationReport {
        self.cascade.revoke(user_id, reason).await
    }

    /// 手动封禁（管理员操作）
    pub fn ban_user(&self, user_id: UserId) {
        self.gate.ban_user(user_id);
    }

    /// 手动解封，清除闸门与群计数中该用户的全部状态
    pub fn unban_user(&self, user_id: UserId) {
        self.gate.unban_user(user_id);
        self.moderator.reset_user(user_id);
        info!("🔓 用户 {} 已解封", user_id);
    }

    /// 清理闸门与群计数中已过期的状态
    pub fn cleanup_expired_at(&self, now: Instant) -> usize {
        self.gate.cleanup_expired_at(now) + self.moderator.cleanup_expired_at(now)
    }

    /// 启动后台维护任务（清理过期的限流、刷屏、隔离与群计数状态）
    pub fn start_maintenance(&self) -> JoinHandle<()> {
        let every = self.config.bot.cleanup_interval();
        info!("🧹 启动清理任务，间隔 {:?}", every);

        let gate = Arc::clone(&self.gate);
        let moderator = Arc::clone(&self.moderator);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                gate.cleanup_expired();
                moderator.cleanup_expired();
            }
        })
    }
}
