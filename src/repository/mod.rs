//! 存储层
//!
//! `GuardStore` 只提供 CRUD，不包含任何业务规则；
//! 状态推导（例如验证状态）由模型层与服务层负责。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{
    AccessGrant, AccessTier, AuditLogEntry, ChatId, GroupMember, GroupSettings, User, UserId,
    UserRole, VerificationRecord,
};

pub mod memory_store;
pub mod pg_store;

pub use memory_store::MemoryGuardStore;
pub use pg_store::PgGuardStore;

/// 守卫引擎使用的持久化接口
#[async_trait]
pub trait GuardStore: Send + Sync {
    // === 用户 ===
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>>;
    async fn upsert_user(&self, user: &User) -> Result<()>;
    /// 更新角色（用户不存在时不做任何事）
    async fn set_role(&self, user_id: UserId, role: UserRole) -> Result<()>;
    /// 更新每日额度（用户不存在时不做任何事）
    async fn set_daily_limit(&self, user_id: UserId, daily_limit: i32) -> Result<()>;
    /// 同时更新角色和额度
    async fn set_entitlement(&self, user_id: UserId, role: UserRole, daily_limit: i32) -> Result<()>;

    // === 验证记录 ===
    async fn get_verification(&self, user_id: UserId) -> Result<Option<VerificationRecord>>;
    async fn save_verification(&self, record: &VerificationRecord) -> Result<()>;

    // === VIP / VVIP 授权 ===
    async fn get_grant(&self, user_id: UserId, tier: AccessTier) -> Result<Option<AccessGrant>>;
    async fn save_grant(&self, grant: &AccessGrant) -> Result<()>;
    /// 将 active 授权置为 revoked，返回是否有记录被修改
    async fn revoke_active_grant(
        &self,
        user_id: UserId,
        tier: AccessTier,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    // === 群组 ===
    async fn get_group_settings(&self, group_id: ChatId) -> Result<Option<GroupSettings>>;
    async fn save_group_settings(&self, settings: &GroupSettings) -> Result<()>;
    async fn get_member(&self, group_id: ChatId, user_id: UserId) -> Result<Option<GroupMember>>;
    /// 插入或重新激活成员
    async fn upsert_member(&self, member: &GroupMember) -> Result<()>;
    /// 标记成员为非活跃，返回是否有记录被修改
    async fn deactivate_member(&self, group_id: ChatId, user_id: UserId) -> Result<bool>;

    // === 审计日志 ===
    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<()>;
    async fn recent_audit(&self, user_id: UserId, limit: usize) -> Result<Vec<AuditLogEntry>>;
}
