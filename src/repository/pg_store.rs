//! PostgreSQL 存储实现

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::GuardStore;
use crate::error::Result;
use crate::model::{
    AccessGrant, AccessTier, AuditLogEntry, ChatId, GroupMember, GroupSettings, User, UserId,
    UserRole, VerificationRecord,
};

#[derive(Clone)]
pub struct PgGuardStore {
    pool: Arc<PgPool>,
}

impl PgGuardStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// 连接数据库
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    pub fn pool(&self) -> &PgPool {
        self.pool.as_ref()
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: i64,
    username: Option<String>,
    first_name: Option<String>,
    role: String,
    daily_limit: i32,
    is_banned: bool,
    created_at: i64,
    updated_at: i64,
}

#[derive(sqlx::FromRow)]
struct VerificationRow {
    user_id: i64,
    joined_group_1: bool,
    joined_group_2: bool,
    last_verified: Option<i64>,
    updated_at: i64,
}

#[derive(sqlx::FromRow)]
struct GrantRow {
    user_id: i64,
    status: String,
    expired_at: i64,
    daily_limit: i32,
    features: serde_json::Value,
    created_at: i64,
    updated_at: i64,
}

#[derive(sqlx::FromRow)]
struct GroupSettingsRow {
    group_id: i64,
    group_title: Option<String>,
    anti_link: bool,
    anti_spam: bool,
    anti_virtex: bool,
    auto_welcome: bool,
    welcome_message: String,
    banned_words: serde_json::Value,
    link_whitelist: serde_json::Value,
    slowmode_seconds: i32,
    updated_at: i64,
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    group_id: i64,
    user_id: i64,
    username: Option<String>,
    first_name: Option<String>,
    warnings: i32,
    is_active: bool,
    joined_at: i64,
    updated_at: i64,
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    user_id: i64,
    username: Option<String>,
    group_id: Option<i64>,
    action: String,
    details: serde_json::Value,
    created_at: i64,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[async_trait]
impl GuardStore for PgGuardStore {
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, username, first_name, role, daily_limit, is_banned, created_at, updated_at
            FROM cg_users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|r| {
            User::from_db_row(
                r.user_id,
                r.username,
                r.first_name,
                r.role,
                r.daily_limit,
                r.is_banned,
                r.created_at,
                r.updated_at,
            )
        }))
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cg_users (user_id, username, first_name, role, daily_limit, is_banned, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE SET
                username = COALESCE(EXCLUDED.username, cg_users.username),
                first_name = COALESCE(EXCLUDED.first_name, cg_users.first_name),
                role = EXCLUDED.role,
                daily_limit = EXCLUDED.daily_limit,
                is_banned = EXCLUDED.is_banned,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user.user_id)
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(user.role.as_str())
        .bind(user.daily_limit)
        .bind(user.is_banned)
        .bind(user.created_at.timestamp_millis())
        .bind(user.updated_at.timestamp_millis())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn set_role(&self, user_id: UserId, role: UserRole) -> Result<()> {
        sqlx::query("UPDATE cg_users SET role = $2, updated_at = $3 WHERE user_id = $1")
            .bind(user_id)
            .bind(role.as_str())
            .bind(now_millis())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn set_daily_limit(&self, user_id: UserId, daily_limit: i32) -> Result<()> {
        sqlx::query("UPDATE cg_users SET daily_limit = $2, updated_at = $3 WHERE user_id = $1")
            .bind(user_id)
            .bind(daily_limit)
            .bind(now_millis())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn set_entitlement(&self, user_id: UserId, role: UserRole, daily_limit: i32) -> Result<()> {
        sqlx::query(
            "UPDATE cg_users SET role = $2, daily_limit = $3, updated_at = $4 WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(role.as_str())
        .bind(daily_limit)
        .bind(now_millis())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_verification(&self, user_id: UserId) -> Result<Option<VerificationRecord>> {
        let row = sqlx::query_as::<_, VerificationRow>(
            r#"
            SELECT user_id, joined_group_1, joined_group_2, last_verified, updated_at
            FROM cg_user_verification
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|r| {
            VerificationRecord::from_db_row(
                r.user_id,
                r.joined_group_1,
                r.joined_group_2,
                r.last_verified,
                r.updated_at,
            )
        }))
    }

    async fn save_verification(&self, record: &VerificationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cg_user_verification (user_id, joined_group_1, joined_group_2, status, last_verified, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE SET
                joined_group_1 = EXCLUDED.joined_group_1,
                joined_group_2 = EXCLUDED.joined_group_2,
                status = EXCLUDED.status,
                last_verified = COALESCE(EXCLUDED.last_verified, cg_user_verification.last_verified),
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(record.user_id())
        .bind(record.joined_group_1())
        .bind(record.joined_group_2())
        .bind(record.status().as_str())
        .bind(record.last_verified().map(|t| t.timestamp_millis()))
        .bind(record.updated_at().timestamp_millis())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_grant(&self, user_id: UserId, tier: AccessTier) -> Result<Option<AccessGrant>> {
        let row = sqlx::query_as::<_, GrantRow>(
            r#"
            SELECT user_id, status, expired_at, daily_limit, features, created_at, updated_at
            FROM cg_access_grants
            WHERE user_id = $1 AND tier = $2
            "#,
        )
        .bind(user_id)
        .bind(tier.as_str())
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|r| {
            AccessGrant::from_db_row(
                r.user_id,
                tier,
                r.status,
                r.expired_at,
                r.daily_limit,
                r.features,
                r.created_at,
                r.updated_at,
            )
        }))
    }

    async fn save_grant(&self, grant: &AccessGrant) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cg_access_grants (user_id, tier, status, expired_at, daily_limit, features, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, tier) DO UPDATE SET
                status = EXCLUDED.status,
                expired_at = EXCLUDED.expired_at,
                daily_limit = EXCLUDED.daily_limit,
                features = EXCLUDED.features,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(grant.user_id)
        .bind(grant.tier.as_str())
        .bind(grant.status.as_str())
        .bind(grant.expired_at.timestamp_millis())
        .bind(grant.daily_limit)
        .bind(serde_json::to_value(&grant.features)?)
        .bind(grant.created_at.timestamp_millis())
        .bind(grant.updated_at.timestamp_millis())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn revoke_active_grant(
        &self,
        user_id: UserId,
        tier: AccessTier,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE cg_access_grants SET status = 'revoked', updated_at = $3
            WHERE user_id = $1 AND tier = $2 AND status = 'active'
            "#,
        )
        .bind(user_id)
        .bind(tier.as_str())
        .bind(now.timestamp_millis())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_group_settings(&self, group_id: ChatId) -> Result<Option<GroupSettings>> {
        let row = sqlx::query_as::<_, GroupSettingsRow>(
            r#"
            SELECT group_id, group_title, anti_link, anti_spam, anti_virtex, auto_welcome,
                   welcome_message, banned_words, link_whitelist, slowmode_seconds, updated_at
            FROM cg_group_settings
            WHERE group_id = $1
            "#,
        )
        .bind(group_id)
        .fetch_optional(self.pool())
        .await?;

        let Some(r) = row else {
            return Ok(None);
        };

        Ok(Some(GroupSettings {
            group_id: r.group_id,
            group_title: r.group_title,
            anti_link: r.anti_link,
            anti_spam: r.anti_spam,
            anti_virtex: r.anti_virtex,
            auto_welcome: r.auto_welcome,
            welcome_message: r.welcome_message,
            banned_words: serde_json::from_value(r.banned_words)?,
            link_whitelist: serde_json::from_value(r.link_whitelist)?,
            slowmode_seconds: r.slowmode_seconds.max(0) as u32,
            updated_at: crate::model::from_millis(r.updated_at),
        }))
    }

    async fn save_group_settings(&self, settings: &GroupSettings) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cg_group_settings (group_id, group_title, anti_link, anti_spam, anti_virtex,
                auto_welcome, welcome_message, banned_words, link_whitelist, slowmode_seconds, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (group_id) DO UPDATE SET
                group_title = COALESCE(EXCLUDED.group_title, cg_group_settings.group_title),
                anti_link = EXCLUDED.anti_link,
                anti_spam = EXCLUDED.anti_spam,
                anti_virtex = EXCLUDED.anti_virtex,
                auto_welcome = EXCLUDED.auto_welcome,
                welcome_message = EXCLUDED.welcome_message,
                banned_words = EXCLUDED.banned_words,
                link_whitelist = EXCLUDED.link_whitelist,
                slowmode_seconds = EXCLUDED.slowmode_seconds,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(settings.group_id)
        .bind(&settings.group_title)
        .bind(settings.anti_link)
        .bind(settings.anti_spam)
        .bind(settings.anti_virtex)
        .bind(settings.auto_welcome)
        .bind(&settings.welcome_message)
        .bind(serde_json::to_value(&settings.banned_words)?)
        .bind(serde_json::to_value(&settings.link_whitelist)?)
        .bind(settings.slowmode_seconds as i32)
        .bind(settings.updated_at.timestamp_millis())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_member(&self, group_id: ChatId, user_id: UserId) -> Result<Option<GroupMember>> {
        let row = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT group_id, user_id, username, first_name, warnings, is_active, joined_at, updated_at
            FROM cg_group_members
            WHERE group_id = $1 AND user_id = $2
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|r| {
            GroupMember::from_db_row(
                r.group_id,
                r.user_id,
                r.username,
                r.first_name,
                r.warnings,
                r.is_active,
                r.joined_at,
                r.updated_at,
            )
        }))
    }

    async fn upsert_member(&self, member: &GroupMember) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cg_group_members (group_id, user_id, username, first_name, warnings, is_active, joined_at, updated_at)
            VALUES ($1, $2, $3, $4, 0, TRUE, $5, $6)
            ON CONFLICT (group_id, user_id) DO UPDATE SET
                username = COALESCE(EXCLUDED.username, cg_group_members.username),
                first_name = COALESCE(EXCLUDED.first_name, cg_group_members.first_name),
                is_active = TRUE,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(member.group_id)
        .bind(member.user_id)
        .bind(&member.username)
        .bind(&member.first_name)
        .bind(member.joined_at.timestamp_millis())
        .bind(member.updated_at.timestamp_millis())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn deactivate_member(&self, group_id: ChatId, user_id: UserId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE cg_group_members SET is_active = FALSE, updated_at = $3 WHERE group_id = $1 AND user_id = $2",
        )
        .bind(group_id)
        .bind(user_id)
        .bind(now_millis())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cg_activity_logs (user_id, username, group_id, action, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.user_id)
        .bind(&entry.username)
        .bind(entry.group_id)
        .bind(&entry.action)
        .bind(&entry.details)
        .bind(entry.created_at.timestamp_millis())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn recent_audit(&self, user_id: UserId, limit: usize) -> Result<Vec<AuditLogEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT user_id, username, group_id, action, details, created_at
            FROM cg_activity_logs
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| AuditLogEntry {
                user_id: r.user_id,
                action: r.action,
                group_id: r.group_id,
                username: r.username,
                details: r.details,
                created_at: crate::model::from_millis(r.created_at),
            })
            .collect())
    }
}
