//! 权限撤销级联
//!
//! 按固定顺序执行，每一步独立、幂等、失败只记录不回滚：
//! 1. 验证记录清零
//! 2. 角色降为基础等级，每日额度置 0
//! 3. 撤销 active 的 VIP 授权
//! 4. 撤销 active 的 VVIP 授权
//! 5. 写审计日志
//! 6. 私信通知（用户屏蔽机器人时失败，不影响前面的步骤）

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use super::audit_service::AuditLogger;
use super::notice;
use crate::config::RequiredGroups;
use crate::error::Result;
use crate::model::{AccessTier, AuditLogEntry, ChatId, UserId, UserRole, VerificationRecord};
use crate::platform::{ChatPlatformClient, SendOptions};
use crate::repository::GuardStore;

/// 撤销原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RevocationReason {
    /// 离开了必须群组
    LeftRequiredGroup {
        group_id: Option<ChatId>,
        group_name: Option<String>,
    },
    /// 管理员手动撤销
    Manual { note: Option<String> },
}

impl RevocationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevocationReason::LeftRequiredGroup { .. } => "left_required_group",
            RevocationReason::Manual { .. } => "manual",
        }
    }

    fn group_id(&self) -> Option<ChatId> {
        match self {
            RevocationReason::LeftRequiredGroup { group_id, .. } => *group_id,
            RevocationReason::Manual { .. } => None,
        }
    }
}

/// 单步执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// 已写入
    Applied,
    /// 无需修改（例如没有 active 授权）
    Unchanged,
    Failed,
}

impl StepStatus {
    fn from_result<T>(step: &str, user_id: UserId, result: Result<T>, applied: impl FnOnce(T) -> bool) -> Self {
        match result {
            Ok(value) => {
                if applied(value) {
                    StepStatus::Applied
                } else {
                    StepStatus::Unchanged
                }
            }
            Err(e) => {
                error!("❌ 撤销步骤失败: user={} step={} error={}", user_id, step, e);
                StepStatus::Failed
            }
        }
    }
}

/// 撤销报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationReport {
    pub user_id: UserId,
    pub verification: StepStatus,
    pub entitlement: StepStatus,
    pub vip: StepStatus,
    pub vvip: StepStatus,
    pub audit: StepStatus,
    pub notification: StepStatus,
}

impl RevocationReport {
    /// 所有存储步骤均未失败（通知失败不计）
    pub fn is_consistent(&self) -> bool {
        [self.verification, self.entitlement, self.vip, self.vvip]
            .iter()
            .all(|s| *s != StepStatus::Failed)
    }
}

pub struct RevocationCascade {
    store: Arc<dyn GuardStore>,
    platform: Arc<dyn ChatPlatformClient>,
    audit: AuditLogger,
    required_groups: RequiredGroups,
}

impl RevocationCascade {
    pub fn new(
        store: Arc<dyn GuardStore>,
        platform: Arc<dyn ChatPlatformClient>,
        audit: AuditLogger,
        required_groups: RequiredGroups,
    ) -> Self {
        Self {
            store,
            platform,
            audit,
            required_groups,
        }
    }

    /// 执行撤销级联
    pub async fn revoke(&self, user_id: UserId, reason: RevocationReason) -> RevocationReport {
        let verification = self.reset_verification(user_id).await;

        let entitlement = StepStatus::from_result(
            "entitlement",
            user_id,
            self.store.set_entitlement(user_id, UserRole::Reguler, 0).await,
            |_| true,
        );

        let now = Utc::now();
        let vip = StepStatus::from_result(
            "vip",
            user_id,
            self.store.revoke_active_grant(user_id, AccessTier::Vip, now).await,
            |changed| changed,
        );
        let vvip = StepStatus::from_result(
            "vvip",
            user_id,
            self.store.revoke_active_grant(user_id, AccessTier::Vvip, now).await,
            |changed| changed,
        );

        let audit = self.record_audit(user_id, &reason).await;
        let notification = self.notify(user_id).await;

        let report = RevocationReport {
            user_id,
            verification,
            entitlement,
            vip,
            vvip,
            audit,
            notification,
        };

        if report.is_consistent() {
            info!(
                "🔻 用户 {} 权限已撤销 (reason={}, vip={:?}, vvip={:?})",
                user_id,
                reason.as_str(),
                vip,
                vvip
            );
        } else {
            warn!("⚠️ 用户 {} 权限撤销部分完成: {:?}", user_id, report);
        }
        report
    }

    async fn reset_verification(&self, user_id: UserId) -> StepStatus {
        let existing = match self.store.get_verification(user_id).await {
            Ok(existing) => existing,
            Err(e) => {
                error!("❌ 撤销步骤失败: user={} step=verification error={}", user_id, e);
                return StepStatus::Failed;
            }
        };

        let mut record = existing.unwrap_or_else(|| VerificationRecord::new(user_id));
        record.revoke(Utc::now());
        StepStatus::from_result(
            "verification",
            user_id,
            self.store.save_verification(&record).await,
            |_| true,
        )
    }

    async fn record_audit(&self, user_id: UserId, reason: &RevocationReason) -> StepStatus {
        let mut details = json!({ "reason": reason.as_str() });
        match reason {
            RevocationReason::LeftRequiredGroup { group_name, .. } => {
                details["group_name"] = json!(group_name);
            }
            RevocationReason::Manual { note } => {
                details["note"] = json!(note);
            }
        }

        let mut entry = AuditLogEntry::new(user_id, "access_revoked").with_details(details);
        if let Some(group_id) = reason.group_id() {
            entry = entry.with_group(group_id);
        }

        if self.audit.record(entry).await {
            StepStatus::Applied
        } else {
            StepStatus::Failed
        }
    }

    async fn notify(&self, user_id: UserId) -> StepStatus {
        let options = SendOptions::markdown()
            .with_buttons(notice::verification_buttons(&self.required_groups));
        match self
            .platform
            .send_message(user_id, &notice::access_revoked(), &options)
            .await
        {
            Ok(()) => StepStatus::Applied,
            Err(e) => {
                warn!("⚠️ 无法向用户 {} 发送撤销通知: {}", user_id, e);
                StepStatus::Failed
            }
        }
    }
}
