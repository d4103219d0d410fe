use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{ChatPlatformClient, ChatRef, MemberRole, SendOptions};
use crate::error::{GuardError, Result};
use crate::model::{ChatId, UserId};

/// 为每次平台调用加上统一超时
pub struct TimeoutPlatform {
    inner: Arc<dyn ChatPlatformClient>,
    timeout: Duration,
}

impl TimeoutPlatform {
    pub fn new(inner: Arc<dyn ChatPlatformClient>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T, F>(&self, call: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!("⏱️ 平台调用超时: {} ({:?})", call, self.timeout);
                Err(GuardError::Timeout(format!("{} exceeded {:?}", call, self.timeout)))
            }
        }
    }
}

#[async_trait]
impl ChatPlatformClient for TimeoutPlatform {
    async fn get_membership(&self, chat: &ChatRef, user_id: UserId) -> Result<Option<MemberRole>> {
        self.bounded("get_membership", self.inner.get_membership(chat, user_id))
            .await
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: i64) -> Result<()> {
        self.bounded("delete_message", self.inner.delete_message(chat_id, message_id))
            .await
    }

    async fn send_message(&self, chat_id: ChatId, text: &str, options: &SendOptions) -> Result<()> {
        self.bounded("send_message", self.inner.send_message(chat_id, text, options))
            .await
    }

    async fn get_bot_role(&self, chat_id: ChatId) -> Result<Option<MemberRole>> {
        self.bounded("get_bot_role", self.inner.get_bot_role(chat_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowPlatform;

    #[async_trait]
    impl ChatPlatformClient for SlowPlatform {
        async fn get_membership(&self, _: &ChatRef, _: UserId) -> Result<Option<MemberRole>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Some(MemberRole::Member))
        }

        async fn delete_message(&self, _: ChatId, _: i64) -> Result<()> {
            Ok(())
        }

        async fn send_message(&self, _: ChatId, _: &str, _: &SendOptions) -> Result<()> {
            Ok(())
        }

        async fn get_bot_role(&self, _: ChatId) -> Result<Option<MemberRole>> {
            Ok(Some(MemberRole::Administrator))
        }
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let platform = TimeoutPlatform::new(Arc::new(SlowPlatform), Duration::from_millis(50));

        let err = platform
            .get_membership(&ChatRef::Id(-1), 1)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(err, GuardError::Timeout(_)));

        assert_eq!(
            platform.get_bot_role(-1).await.unwrap(),
            Some(MemberRole::Administrator)
        );
    }
}
