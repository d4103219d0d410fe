//! 入群验证状态机
//!
//! `NOT_VERIFIED → VERIFIED`：所有必须群组同时检查为成员/管理员/群主。
//! `VERIFIED → NOT_VERIFIED`：离开事件（由撤销级联处理）或重新检查失败。
//!
//! 成员查询失败按“未加入”处理；存储不可用时只放行特权用户。

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::audit_service::AuditLogger;
use super::notice;
use crate::config::{Operators, RequiredGroup, RequiredGroups};
use crate::error::Result;
use crate::model::{AuditLogEntry, User, UserId, VerificationRecord, VerificationStatus};
use crate::platform::{ChatPlatformClient, SendOptions};
use crate::repository::GuardStore;

/// 单个群组的检查结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub name: String,
    pub joined: bool,
}

/// 一次完整的成员检查
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipCheck {
    pub groups: Vec<GroupMembership>,
}

impl MembershipCheck {
    /// 第一个必须群组（未配置时视为满足）
    pub fn joined_group_1(&self) -> bool {
        self.groups.first().map(|g| g.joined).unwrap_or(true)
    }

    /// 其余所有必须群组（未配置时视为满足）
    pub fn joined_group_2(&self) -> bool {
        self.groups.iter().skip(1).all(|g| g.joined)
    }

    pub fn all_joined(&self) -> bool {
        self.joined_group_1() && self.joined_group_2()
    }

    fn statuses(&self) -> Vec<(String, bool)> {
        self.groups
            .iter()
            .map(|g| (g.name.clone(), g.joined))
            .collect()
    }
}

/// 发起交互的用户
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requester {
    pub user_id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

impl Requester {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    /// first_name > username > "User"
    pub fn display_name(&self) -> &str {
        self.first_name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or("User")
    }
}

/// 重新检查结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecheckOutcome {
    /// 特权用户无需验证
    Privileged,
    Verified {
        check: MembershipCheck,
        /// 每日额度是否从 0 恢复为免费额度
        limit_restored: bool,
    },
    Incomplete {
        check: MembershipCheck,
    },
}

impl RecheckOutcome {
    pub fn is_verified(&self) -> bool {
        !matches!(self, RecheckOutcome::Incomplete { .. })
    }
}

pub struct VerificationService {
    store: Arc<dyn GuardStore>,
    platform: Arc<dyn ChatPlatformClient>,
    audit: AuditLogger,
    required_groups: RequiredGroups,
    operators: Operators,
    free_daily_limit: i32,
}

impl VerificationService {
    pub fn new(
        store: Arc<dyn GuardStore>,
        platform: Arc<dyn ChatPlatformClient>,
        audit: AuditLogger,
        required_groups: RequiredGroups,
        operators: Operators,
    ) -> Self {
        Self {
            store,
            platform,
            audit,
            required_groups,
            operators,
            free_daily_limit: User::FREE_DAILY_LIMIT,
        }
    }

    pub fn with_free_daily_limit(mut self, limit: i32) -> Self {
        self.free_daily_limit = limit;
        self
    }

    /// 实时查询所有必须群组
    pub async fn check_membership(&self, user_id: UserId) -> MembershipCheck {
        let mut groups = Vec::with_capacity(self.required_groups.len());
        for group in self.required_groups.iter() {
            let joined = self.is_member_of(group, user_id).await;
            groups.push(GroupMembership {
                name: group.name.clone(),
                joined,
            });
        }
        MembershipCheck { groups }
    }

    /// 依次尝试 chat_id、username，任一确认成员即可
    async fn is_member_of(&self, group: &RequiredGroup, user_id: UserId) -> bool {
        for chat in group.lookup_refs() {
            match self.platform.get_membership(&chat, user_id).await {
                Ok(Some(role)) if role.is_member() => return true,
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        "⚠️ 无法查询用户 {} 在 {} 的成员身份: {}",
                        user_id, chat, e
                    );
                }
            }
        }
        false
    }

    /// 写入检查结果，状态由两个布尔值推导
    async fn persist(&self, user_id: UserId, check: &MembershipCheck) -> Result<VerificationRecord> {
        let mut record = self
            .store
            .get_verification(user_id)
            .await?
            .unwrap_or_else(|| VerificationRecord::new(user_id));
        record.set_membership(check.joined_group_1(), check.joined_group_2(), Utc::now());
        self.store.save_verification(&record).await?;
        Ok(record)
    }

    /// 确认用户已通过验证；未通过时私信发送验证提示
    pub async fn ensure_verified(&self, requester: &Requester) -> bool {
        let user_id = requester.user_id;
        if self.operators.is_privileged(user_id) {
            return true;
        }

        let check = self.check_membership(user_id).await;
        let record = match self.persist(user_id, &check).await {
            Ok(record) => record,
            Err(e) => {
                error!("❌ 验证记录写入失败，拒绝用户 {}: {}", user_id, e);
                return false;
            }
        };

        if record.is_verified() {
            debug!("✅ 用户 {} 已通过验证", user_id);
            return true;
        }

        self.send_prompt(requester).await;
        false
    }

    /// 私聊交互入口：`/start` 直接放行，特权用户放行，其余需要验证
    pub async fn gate_private_interaction(&self, requester: &Requester, text: Option<&str>) -> bool {
        if self.operators.is_privileged(requester.user_id) {
            return true;
        }
        if let Some(text) = text {
            if text == "/start" || text.starts_with("/start ") {
                return true;
            }
        }
        self.ensure_verified(requester).await
    }

    /// 用户主动重新检查
    pub async fn recheck(&self, requester: &Requester) -> RecheckOutcome {
        let user_id = requester.user_id;
        if self.operators.is_privileged(user_id) {
            return RecheckOutcome::Privileged;
        }

        let check = self.check_membership(user_id).await;
        let verified = check.all_joined();

        if let Err(e) = self.persist(user_id, &check).await {
            error!("❌ 验证记录写入失败: user={} error={}", user_id, e);
        }

        self.audit
            .record(
                AuditLogEntry::new(user_id, "verification_check")
                    .with_username(requester.username.as_deref())
                    .with_details(json!({
                        "joined_group1": check.joined_group_1(),
                        "joined_group2": check.joined_group_2(),
                        "result": if verified { "success" } else { "failed" },
                    })),
            )
            .await;

        if verified {
            let limit_restored = self.restore_free_limit(user_id).await;
            info!("✅ 用户 {} 重新验证通过", user_id);
            self.send(
                user_id,
                &notice::verification_success(requester.display_name()),
                SendOptions::markdown(),
            )
            .await;
            RecheckOutcome::Verified {
                check,
                limit_restored,
            }
        } else {
            self.send(
                user_id,
                &notice::verification_incomplete(requester.display_name(), &check.statuses()),
                SendOptions::markdown()
                    .with_buttons(notice::verification_buttons(&self.required_groups)),
            )
            .await;
            RecheckOutcome::Incomplete { check }
        }
    }

    /// 存储中的当前状态（无记录视为未验证）
    pub async fn current_status(&self, user_id: UserId) -> Result<VerificationStatus> {
        Ok(self
            .store
            .get_verification(user_id)
            .await?
            .map(|r| r.status())
            .unwrap_or_default())
    }

    /// 每日额度为 0 时恢复免费额度
    async fn restore_free_limit(&self, user_id: UserId) -> bool {
        match self.store.get_user(user_id).await {
            Ok(Some(user)) if user.daily_limit == 0 => {
                match self.store.set_daily_limit(user_id, self.free_daily_limit).await {
                    Ok(()) => {
                        info!("🔄 用户 {} 每日额度恢复为 {}", user_id, self.free_daily_limit);
                        true
                    }
                    Err(e) => {
                        error!("❌ 恢复每日额度失败: user={} error={}", user_id, e);
                        false
                    }
                }
            }
            Ok(_) => false,
            Err(e) => {
                error!("❌ 读取用户失败: user={} error={}", user_id, e);
                false
            }
        }
    }

    async fn send_prompt(&self, requester: &Requester) {
        self.send(
            requester.user_id,
            &notice::verification_prompt(requester.display_name()),
            SendOptions::markdown().with_buttons(notice::verification_buttons(&self.required_groups)),
        )
        .await;
    }

    async fn send(&self, user_id: UserId, text: &str, options: SendOptions) {
        if let Err(e) = self.platform.send_message(user_id, text, &options).await {
            warn!("⚠️ 无法向用户 {} 发送消息: {}", user_id, e);
        }
    }
}
