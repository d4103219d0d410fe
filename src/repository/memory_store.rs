//! 内存存储实现
//!
//! 用于测试以及未配置数据库时的单进程运行。`set_available(false)` 可模拟存储宕机。

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use super::GuardStore;
use crate::error::{GuardError, Result};
use crate::model::{
    AccessGrant, AccessTier, AuditLogEntry, ChatId, GrantStatus, GroupMember, GroupSettings, User,
    UserId, UserRole, VerificationRecord,
};

pub struct MemoryGuardStore {
    users: DashMap<UserId, User>,
    verifications: DashMap<UserId, VerificationRecord>,
    grants: DashMap<(UserId, AccessTier), AccessGrant>,
    group_settings: DashMap<ChatId, GroupSettings>,
    members: DashMap<(ChatId, UserId), GroupMember>,
    audit_log: Mutex<Vec<AuditLogEntry>>,
    available: AtomicBool,
}

impl MemoryGuardStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            verifications: DashMap::new(),
            grants: DashMap::new(),
            group_settings: DashMap::new(),
            members: DashMap::new(),
            audit_log: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// 切换可用状态（false 时所有操作返回 PersistenceUnavailable）
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// 全部审计日志（按写入顺序）
    pub fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.audit_log.lock().clone()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GuardError::PersistenceUnavailable(
                "memory store marked unavailable".to_string(),
            ))
        }
    }
}

impl Default for MemoryGuardStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GuardStore for MemoryGuardStore {
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        self.ensure_available()?;
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        self.ensure_available()?;
        self.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn set_role(&self, user_id: UserId, role: UserRole) -> Result<()> {
        self.ensure_available()?;
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.role = role;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_daily_limit(&self, user_id: UserId, daily_limit: i32) -> Result<()> {
        self.ensure_available()?;
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.daily_limit = daily_limit;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_entitlement(&self, user_id: UserId, role: UserRole, daily_limit: i32) -> Result<()> {
        self.ensure_available()?;
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.role = role;
            user.daily_limit = daily_limit;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_verification(&self, user_id: UserId) -> Result<Option<VerificationRecord>> {
        self.ensure_available()?;
        Ok(self.verifications.get(&user_id).map(|r| r.clone()))
    }

    async fn save_verification(&self, record: &VerificationRecord) -> Result<()> {
        self.ensure_available()?;
        self.verifications.insert(record.user_id(), record.clone());
        Ok(())
    }

    async fn get_grant(&self, user_id: UserId, tier: AccessTier) -> Result<Option<AccessGrant>> {
        self.ensure_available()?;
        Ok(self.grants.get(&(user_id, tier)).map(|g| g.clone()))
    }

    async fn save_grant(&self, grant: &AccessGrant) -> Result<()> {
        self.ensure_available()?;
        self.grants.insert((grant.user_id, grant.tier), grant.clone());
        Ok(())
    }

    async fn revoke_active_grant(
        &self,
        user_id: UserId,
        tier: AccessTier,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.ensure_available()?;
        match self.grants.get_mut(&(user_id, tier)) {
            Some(mut grant) if grant.status == GrantStatus::Active => {
                grant.status = GrantStatus::Revoked;
                grant.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_group_settings(&self, group_id: ChatId) -> Result<Option<GroupSettings>> {
        self.ensure_available()?;
        Ok(self.group_settings.get(&group_id).map(|s| s.clone()))
    }

    async fn save_group_settings(&self, settings: &GroupSettings) -> Result<()> {
        self.ensure_available()?;
        self.group_settings.insert(settings.group_id, settings.clone());
        Ok(())
    }

    async fn get_member(&self, group_id: ChatId, user_id: UserId) -> Result<Option<GroupMember>> {
        self.ensure_available()?;
        Ok(self.members.get(&(group_id, user_id)).map(|m| m.clone()))
    }

    async fn upsert_member(&self, member: &GroupMember) -> Result<()> {
        self.ensure_available()?;
        self.members
            .entry((member.group_id, member.user_id))
            .and_modify(|existing| {
                if member.username.is_some() {
                    existing.username = member.username.clone();
                }
                if member.first_name.is_some() {
                    existing.first_name = member.first_name.clone();
                }
                existing.is_active = true;
                existing.updated_at = member.updated_at;
            })
            .or_insert_with(|| member.clone());
        Ok(())
    }

    async fn deactivate_member(&self, group_id: ChatId, user_id: UserId) -> Result<bool> {
        self.ensure_available()?;
        match self.members.get_mut(&(group_id, user_id)) {
            Some(mut member) => {
                member.is_active = false;
                member.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<()> {
        self.ensure_available()?;
        self.audit_log.lock().push(entry.clone());
        Ok(())
    }

    async fn recent_audit(&self, user_id: UserId, limit: usize) -> Result<Vec<AuditLogEntry>> {
        self.ensure_available()?;
        let log = self.audit_log.lock();
        Ok(log
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_store_rejects_every_call() {
        let store = MemoryGuardStore::new();
        store.set_available(false);

        let err = store.get_user(1).await.unwrap_err();
        assert!(matches!(err, GuardError::PersistenceUnavailable(_)));
        assert!(store.append_audit(&AuditLogEntry::new(1, "x")).await.is_err());

        store.set_available(true);
        assert!(store.get_user(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_member_reactivates() {
        let store = MemoryGuardStore::new();
        let mut member = GroupMember::new(-100, 5);
        member.first_name = Some("Ana".into());
        store.upsert_member(&member).await.unwrap();
        assert!(store.deactivate_member(-100, 5).await.unwrap());
        assert!(!store.get_member(-100, 5).await.unwrap().unwrap().is_active);

        store.upsert_member(&GroupMember::new(-100, 5)).await.unwrap();
        let stored = store.get_member(-100, 5).await.unwrap().unwrap();
        assert!(stored.is_active);
        assert_eq!(stored.first_name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn test_revoke_only_touches_active_grants() {
        let store = MemoryGuardStore::new();
        let now = Utc::now();
        assert!(!store.revoke_active_grant(1, AccessTier::Vip, now).await.unwrap());

        store
            .save_grant(&AccessGrant {
                user_id: 1,
                tier: AccessTier::Vip,
                status: GrantStatus::Expired,
                expired_at: now,
                daily_limit: 50,
                features: vec![],
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        assert!(!store.revoke_active_grant(1, AccessTier::Vip, now).await.unwrap());
        let grant = store.get_grant(1, AccessTier::Vip).await.unwrap().unwrap();
        assert_eq!(grant.status, GrantStatus::Expired);
    }
}
