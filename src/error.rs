use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 守卫引擎错误类型
///
/// 分类说明：
/// - `Platform` / `Timeout`：聊天平台调用失败（网络、超时），调用方吞掉并降级为 no-op
/// - `PersistenceUnavailable`：存储不可用，验证/权限层降级为“仅特权用户放行”
/// - `Configuration`：配置条目格式错误，跳过该条目，其余照常处理
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum GuardError {
    /// 平台调用错误
    #[error("Platform error: {0}")]
    Platform(String),
    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),
    /// 存储不可用
    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(String),
    /// 配置错误
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// 资源未找到
    #[error("Not found: {0}")]
    NotFound(String),
    /// 无效输入
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GuardError {
    /// 是否为瞬时平台错误（不重试，直接降级）
    pub fn is_transient(&self) -> bool {
        matches!(self, GuardError::Platform(_) | GuardError::Timeout(_))
    }

    /// 是否为存储层错误
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            GuardError::PersistenceUnavailable(_) | GuardError::Database(_)
        )
    }
}

impl From<sqlx::Error> for GuardError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                GuardError::PersistenceUnavailable(err.to_string())
            }
            sqlx::Error::RowNotFound => GuardError::NotFound(err.to_string()),
            other => GuardError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for GuardError {
    fn from(err: serde_json::Error) -> Self {
        GuardError::Serialization(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for GuardError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        GuardError::Timeout(err.to_string())
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, GuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(GuardError::Platform("bot was blocked".into()).is_transient());
        assert!(GuardError::Timeout("deadline".into()).is_transient());
        assert!(!GuardError::Database("constraint".into()).is_transient());

        assert!(GuardError::PersistenceUnavailable("down".into()).is_persistence());
        assert!(!GuardError::Configuration("bad group".into()).is_persistence());
    }

    #[test]
    fn test_pool_timeout_maps_to_unavailable() {
        let err: GuardError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, GuardError::PersistenceUnavailable(_)));
    }
}
