//! 审计日志写入
//!
//! 写入失败只记录日志，永远不影响调用方的决策。

use std::sync::Arc;

use tracing::{debug, error};

use crate::model::AuditLogEntry;
use crate::repository::GuardStore;

#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn GuardStore>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn GuardStore>) -> Self {
        Self { store }
    }

    /// 同步写入（等待完成），返回是否成功
    pub async fn record(&self, entry: AuditLogEntry) -> bool {
        match self.store.append_audit(&entry).await {
            Ok(()) => {
                debug!("📝 审计: user={} action={}", entry.user_id, entry.action);
                true
            }
            Err(e) => {
                error!(
                    "❌ 审计日志写入失败: user={} action={} error={}",
                    entry.user_id, entry.action, e
                );
                false
            }
        }
    }

    /// 后台写入，不等待结果；没有 tokio 运行时时直接丢弃
    pub fn record_detached(&self, entry: AuditLogEntry) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let logger = self.clone();
                handle.spawn(async move {
                    logger.record(entry).await;
                });
            }
            Err(_) => {
                debug!(
                    "⏭️ 无运行时，跳过审计: user={} action={}",
                    entry.user_id, entry.action
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryGuardStore;

    #[tokio::test]
    async fn test_record_swallows_store_failure() {
        let store = Arc::new(MemoryGuardStore::new());
        let logger = AuditLogger::new(store.clone());

        assert!(logger.record(AuditLogEntry::new(1, "member_joined")).await);

        store.set_available(false);
        assert!(!logger.record(AuditLogEntry::new(1, "member_left")).await);

        store.set_available(true);
        assert_eq!(store.audit_entries().len(), 1);
    }
}
