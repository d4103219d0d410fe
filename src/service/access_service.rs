//! 付费等级授权
//!
//! 授予：已有 active 且未过期的授权在原到期时间上延长，否则从现在开始计算。
//! 过期：active 但已过期的授权置为 expired，用户角色回到基础等级。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::info;

use super::audit_service::AuditLogger;
use crate::config::AccessConfig;
use crate::error::{GuardError, Result};
use crate::model::{AccessGrant, AccessTier, AuditLogEntry, GrantStatus, User, UserId, UserRole};
use crate::repository::GuardStore;

pub struct AccessService {
    store: Arc<dyn GuardStore>,
    audit: AuditLogger,
    config: AccessConfig,
}

impl AccessService {
    pub fn new(store: Arc<dyn GuardStore>, audit: AuditLogger, config: AccessConfig) -> Self {
        Self {
            store,
            audit,
            config,
        }
    }

    fn daily_limit(&self, tier: AccessTier) -> i32 {
        match tier {
            AccessTier::Vip => self.config.vip_daily_limit,
            AccessTier::Vvip => self.config.vvip_daily_limit,
        }
    }

    /// 默认授权天数
    pub fn default_days(&self, tier: AccessTier) -> i64 {
        match tier {
            AccessTier::Vip => self.config.vip_default_days,
            AccessTier::Vvip => self.config.vvip_default_days,
        }
    }

    pub async fn grant_vip(&self, user_id: UserId, days: i64) -> Result<AccessGrant> {
        self.grant(user_id, AccessTier::Vip, days).await
    }

    pub async fn grant_vvip(&self, user_id: UserId, days: i64) -> Result<AccessGrant> {
        self.grant(user_id, AccessTier::Vvip, days).await
    }

    pub async fn grant(&self, user_id: UserId, tier: AccessTier, days: i64) -> Result<AccessGrant> {
        self.grant_at(user_id, tier, days, Utc::now()).await
    }

    pub async fn grant_at(
        &self,
        user_id: UserId,
        tier: AccessTier,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<AccessGrant> {
        if days <= 0 {
            return Err(GuardError::InvalidInput(format!(
                "grant days must be positive, got {}",
                days
            )));
        }

        let existing = self.store.get_grant(user_id, tier).await?;
        let base = match &existing {
            Some(grant) if grant.is_active_at(now) => grant.expired_at,
            _ => now,
        };
        let daily_limit = self.daily_limit(tier);

        let grant = AccessGrant {
            user_id,
            tier,
            status: GrantStatus::Active,
            expired_at: base + Duration::days(days),
            daily_limit,
            features: tier.default_features(),
            created_at: existing.as_ref().map(|g| g.created_at).unwrap_or(now),
            updated_at: now,
        };
        self.store.save_grant(&grant).await?;

        if self.store.get_user(user_id).await?.is_none() {
            self.store.upsert_user(&User::new(user_id)).await?;
        }
        self.store
            .set_entitlement(user_id, tier.role(), daily_limit)
            .await?;

        self.audit
            .record(
                AuditLogEntry::new(user_id, format!("{}_granted", tier.as_str())).with_details(
                    json!({
                        "days": days,
                        "expired_at": grant.expired_at.to_rfc3339(),
                        "daily_limit": daily_limit,
                    }),
                ),
            )
            .await;

        info!(
            "⭐ 用户 {} 获得 {} 至 {}",
            user_id,
            tier.as_str(),
            grant.expired_at
        );
        Ok(grant)
    }

    /// 处理到期授权，返回是否有授权被置为 expired
    pub async fn expire_if_due(&self, user_id: UserId, tier: AccessTier) -> Result<bool> {
        self.expire_if_due_at(user_id, tier, Utc::now()).await
    }

    pub async fn expire_if_due_at(
        &self,
        user_id: UserId,
        tier: AccessTier,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(mut grant) = self.store.get_grant(user_id, tier).await? else {
            return Ok(false);
        };
        if !grant.is_due_at(now) {
            return Ok(false);
        }

        grant.status = GrantStatus::Expired;
        grant.updated_at = now;
        self.store.save_grant(&grant).await?;
        self.store.set_role(user_id, UserRole::Reguler).await?;

        self.audit
            .record(
                AuditLogEntry::new(user_id, format!("{}_expired", tier.as_str()))
                    .with_details(json!({ "expired_at": grant.expired_at.to_rfc3339() })),
            )
            .await;

        info!("⌛ 用户 {} 的 {} 已过期", user_id, tier.as_str());
        Ok(true)
    }

    /// 同时处理 VIP 与 VVIP
    pub async fn expire_all_due(&self, user_id: UserId) -> Result<bool> {
        let vip = self.expire_if_due(user_id, AccessTier::Vip).await?;
        let vvip = self.expire_if_due(user_id, AccessTier::Vvip).await?;
        Ok(vip || vvip)
    }
}
