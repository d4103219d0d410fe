//! 群管理
//!
//! 仅当机器人在群内是管理员、发送者不是特权操作员时生效。
//! 规则按固定顺序匹配：anti-link → anti-virtex → anti-spam → 违禁词，
//! 命中第一条后执行 {删除, 警告, 审计} 并停止。

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{debug, error, info, warn};

use super::audit_service::AuditLogger;
use super::notice;
use super::revocation_service::{RevocationCascade, RevocationReason, RevocationReport};
use crate::config::{Operators, RequiredGroups};
use crate::model::{AuditLogEntry, ChatId, GroupMember, GroupSettings, UserId};
use crate::platform::{ChatPlatformClient, SendOptions};
use crate::repository::GuardStore;
use crate::security::{
    classify_virtex_with, find_link_violations, match_banned_word, SpamDedupTracker, SpamPolicy,
    SpamVerdict, VirtexKind, VirtexThresholds,
};

/// 群内收到的一条消息
#[derive(Debug, Clone, Default)]
pub struct GroupMessage {
    pub group_id: ChatId,
    pub group_title: Option<String>,
    pub message_id: i64,
    pub sender_id: UserId,
    pub sender_name: Option<String>,
    pub sender_username: Option<String>,
    pub text: String,
}

impl GroupMessage {
    fn sender_display(&self) -> &str {
        self.sender_name
            .as_deref()
            .or(self.sender_username.as_deref())
            .unwrap_or("User")
    }
}

/// 成员进出群事件
#[derive(Debug, Clone, Default)]
pub struct MemberEvent {
    pub group_id: ChatId,
    pub group_title: Option<String>,
    pub group_username: Option<String>,
    pub user_id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub is_bot: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    PrivilegedSender,
    EmptyText,
    /// 群配置读取失败
    SettingsUnavailable,
    /// 机器人不是管理员或身份查询失败
    BotNotAdmin,
}

/// 执行的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationAction {
    LinkRemoved { links: Vec<String> },
    OversizedRemoved,
    VirtexRemoved,
    SpamRemoved { warned: bool, count: u32 },
    BannedWordRemoved { word: String },
}

impl ModerationAction {
    pub fn audit_action(&self) -> &'static str {
        match self {
            ModerationAction::LinkRemoved { .. } => "anti_link_triggered",
            ModerationAction::OversizedRemoved | ModerationAction::VirtexRemoved => {
                "anti_virtex_triggered"
            }
            ModerationAction::SpamRemoved { .. } => "anti_spam_triggered",
            ModerationAction::BannedWordRemoved { .. } => "banned_word_triggered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationOutcome {
    Skipped(SkipReason),
    Clean,
    Actioned(ModerationAction),
}

impl ModerationOutcome {
    /// 消息是否已被处理（删除）
    pub fn handled(&self) -> bool {
        matches!(self, ModerationOutcome::Actioned(_))
    }
}

/// 离群事件处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    Skipped,
    Recorded,
    Revoked(RevocationReport),
}

pub struct GroupModerator {
    store: Arc<dyn GuardStore>,
    platform: Arc<dyn ChatPlatformClient>,
    audit: AuditLogger,
    cascade: Arc<RevocationCascade>,
    required_groups: RequiredGroups,
    operators: Operators,
    spam: SpamDedupTracker,
    virtex: VirtexThresholds,
}

impl GroupModerator {
    pub fn new(
        store: Arc<dyn GuardStore>,
        platform: Arc<dyn ChatPlatformClient>,
        audit: AuditLogger,
        cascade: Arc<RevocationCascade>,
        required_groups: RequiredGroups,
        operators: Operators,
    ) -> Self {
        Self {
            store,
            platform,
            audit,
            cascade,
            required_groups,
            operators,
            spam: SpamDedupTracker::default(),
            virtex: VirtexThresholds::default(),
        }
    }

    pub fn with_policies(mut self, spam: SpamPolicy, virtex: VirtexThresholds) -> Self {
        self.spam = SpamDedupTracker::new(spam);
        self.virtex = virtex;
        self
    }

    pub fn spam_tracker(&self) -> &SpamDedupTracker {
        &self.spam
    }

    /// 清理已过期的计数窗口
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Instant::now())
    }

    pub fn cleanup_expired_at(&self, now: Instant) -> usize {
        let removed = self.spam.cleanup_at(now);
        debug!(
            "🧹 群计数清理完成：移除 {} 条，剩余 {} 条",
            removed,
            self.spam.active_trackers()
        );
        removed
    }

    /// 清除用户在所有群的计数
    pub fn reset_user(&self, user_id: UserId) {
        self.spam.reset_user(user_id);
    }

    /// 处理群消息
    pub async fn on_message(&self, message: &GroupMessage, is_privileged: bool) -> ModerationOutcome {
        self.on_message_at(message, is_privileged, Instant::now()).await
    }

    pub async fn on_message_at(
        &self,
        message: &GroupMessage,
        is_privileged: bool,
        now: Instant,
    ) -> ModerationOutcome {
        if is_privileged || self.operators.is_privileged(message.sender_id) {
            return ModerationOutcome::Skipped(SkipReason::PrivilegedSender);
        }
        if message.text.is_empty() {
            return ModerationOutcome::Skipped(SkipReason::EmptyText);
        }

        let settings = match self.store.get_group_settings(message.group_id).await {
            Ok(settings) => settings.unwrap_or_else(|| GroupSettings::new(message.group_id)),
            Err(e) => {
                error!("❌ 读取群配置失败: group={} error={}", message.group_id, e);
                return ModerationOutcome::Skipped(SkipReason::SettingsUnavailable);
            }
        };

        if !self.bot_is_admin(message.group_id).await {
            return ModerationOutcome::Skipped(SkipReason::BotNotAdmin);
        }

        let Some(action) = self.evaluate(&settings, message, now) else {
            return ModerationOutcome::Clean;
        };

        self.apply(message, &action).await;
        ModerationOutcome::Actioned(action)
    }

    /// 按顺序匹配规则，返回第一条命中的动作
    fn evaluate(
        &self,
        settings: &GroupSettings,
        message: &GroupMessage,
        now: Instant,
    ) -> Option<ModerationAction> {
        let text = message.text.as_str();

        if settings.anti_link {
            let links = find_link_violations(text, &settings.link_whitelist);
            if !links.is_empty() {
                return Some(ModerationAction::LinkRemoved { links });
            }
        }

        if settings.anti_virtex {
            match classify_virtex_with(text, &self.virtex) {
                Some(VirtexKind::Oversized) => return Some(ModerationAction::OversizedRemoved),
                Some(_) => return Some(ModerationAction::VirtexRemoved),
                None => {}
            }
        }

        if settings.anti_spam {
            match self.spam.record_at(message.sender_id, message.group_id, now) {
                SpamVerdict::Allow => {}
                SpamVerdict::DeleteAndWarn { count } => {
                    return Some(ModerationAction::SpamRemoved {
                        warned: true,
                        count,
                    })
                }
                SpamVerdict::DeleteSilently { count } => {
                    return Some(ModerationAction::SpamRemoved {
                        warned: false,
                        count,
                    })
                }
            }
        }

        match_banned_word(text, &settings.banned_words).map(|word| {
            ModerationAction::BannedWordRemoved {
                word: word.to_string(),
            }
        })
    }

    /// 删除、警告、审计三步各自独立，任一失败不影响其他
    async fn apply(&self, message: &GroupMessage, action: &ModerationAction) {
        if let Err(e) = self
            .platform
            .delete_message(message.group_id, message.message_id)
            .await
        {
            warn!(
                "⚠️ 删除消息失败: group={} message={} error={}",
                message.group_id, message.message_id, e
            );
        }

        let name = message.sender_display();
        let warning = match action {
            ModerationAction::LinkRemoved { .. } => Some(notice::link_warning(name)),
            ModerationAction::OversizedRemoved => Some(notice::oversized_warning()),
            ModerationAction::VirtexRemoved => Some(notice::virtex_warning(name)),
            ModerationAction::SpamRemoved { warned: true, .. } => Some(notice::spam_warning(name)),
            ModerationAction::SpamRemoved { warned: false, .. } => None,
            ModerationAction::BannedWordRemoved { .. } => Some(notice::banned_word_warning(name)),
        };
        if let Some(warning) = warning {
            let options = SendOptions::markdown();
            if let Err(e) = self
                .platform
                .send_message(message.group_id, &warning, &options)
                .await
            {
                warn!("⚠️ 发送群警告失败: group={} error={}", message.group_id, e);
            }
        }

        let details = match action {
            ModerationAction::LinkRemoved { links } => json!({ "links": links }),
            ModerationAction::OversizedRemoved => {
                json!({ "kind": VirtexKind::Oversized.as_str(), "length": message.text.chars().count() })
            }
            ModerationAction::VirtexRemoved => json!({ "kind": "virtex" }),
            ModerationAction::SpamRemoved { warned, count } => {
                json!({ "count": count, "warned": warned })
            }
            ModerationAction::BannedWordRemoved { word } => json!({ "word": word }),
        };
        self.audit
            .record(
                AuditLogEntry::new(message.sender_id, action.audit_action())
                    .with_group(message.group_id)
                    .with_username(message.sender_username.as_deref())
                    .with_details(details),
            )
            .await;

        info!(
            "🛡️ 群 {} 用户 {} 消息已处理: {}",
            message.group_id,
            message.sender_id,
            action.audit_action()
        );
    }

    async fn bot_is_admin(&self, group_id: ChatId) -> bool {
        match self.platform.get_bot_role(group_id).await {
            Ok(Some(role)) if role.is_admin() => true,
            Ok(_) => {
                debug!("⏭️ 机器人不是群 {} 的管理员", group_id);
                false
            }
            Err(e) => {
                warn!("⚠️ 查询机器人身份失败: group={} error={}", group_id, e);
                false
            }
        }
    }

    /// 新成员入群
    ///
    /// 仅在群开启欢迎语时处理：发送欢迎语、写入成员记录并审计。
    pub async fn on_member_joined(&self, event: &MemberEvent) -> bool {
        if event.is_bot {
            return false;
        }

        let settings = match self.store.get_group_settings(event.group_id).await {
            Ok(settings) => settings.unwrap_or_else(|| GroupSettings::new(event.group_id)),
            Err(e) => {
                error!("❌ 读取群配置失败: group={} error={}", event.group_id, e);
                GroupSettings::new(event.group_id)
            }
        };

        if !settings.auto_welcome {
            debug!("⏭️ 群 {} 未开启欢迎语，忽略入群事件", event.group_id);
            return false;
        }

        let rendered = notice::render_welcome(
            &settings.welcome_message,
            event.first_name.as_deref(),
            event.group_title.as_deref(),
        );
        let welcomed = match self
            .platform
            .send_message(event.group_id, &notice::welcome(&rendered), &SendOptions::markdown())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!("⚠️ 发送欢迎语失败: group={} error={}", event.group_id, e);
                false
            }
        };

        let mut member = GroupMember::new(event.group_id, event.user_id);
        member.username = event.username.clone();
        member.first_name = event.first_name.clone();
        if let Err(e) = self.store.upsert_member(&member).await {
            error!(
                "❌ 写入群成员失败: group={} user={} error={}",
                event.group_id, event.user_id, e
            );
        }

        self.audit
            .record(
                AuditLogEntry::new(event.user_id, "member_joined")
                    .with_group(event.group_id)
                    .with_username(event.username.as_deref())
                    .with_details(json!({ "group_title": event.group_title })),
            )
            .await;

        welcomed
    }

    /// 成员离群；必须群组触发权限撤销
    pub async fn on_member_left(&self, event: &MemberEvent) -> LeaveOutcome {
        if self.operators.is_privileged(event.user_id) {
            return LeaveOutcome::Skipped;
        }

        if let Err(e) = self.store.deactivate_member(event.group_id, event.user_id).await {
            error!(
                "❌ 标记成员离开失败: group={} user={} error={}",
                event.group_id, event.user_id, e
            );
        }

        self.audit
            .record(
                AuditLogEntry::new(event.user_id, "member_left")
                    .with_group(event.group_id)
                    .with_username(event.username.as_deref())
                    .with_details(json!({ "group_title": event.group_title })),
            )
            .await;

        let Some(group) = self
            .required_groups
            .find_matching(event.group_id, event.group_username.as_deref())
        else {
            return LeaveOutcome::Recorded;
        };

        info!(
            "🚪 用户 {} 离开必须群组 {}，开始撤销权限",
            event.user_id, group.name
        );
        let report = self
            .cascade
            .revoke(
                event.user_id,
                RevocationReason::LeftRequiredGroup {
                    group_id: Some(event.group_id),
                    group_name: Some(group.name.clone()),
                },
            )
            .await;
        LeaveOutcome::Revoked(report)
    }
}
