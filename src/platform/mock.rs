use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use super::{ChatPlatformClient, ChatRef, MemberRole, SendOptions};
use crate::error::{GuardError, Result};
use crate::model::{ChatId, UserId};

/// 已发送的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub text: String,
    pub options: SendOptions,
}

#[derive(Default)]
struct MockState {
    memberships: HashMap<(ChatRef, UserId), MemberRole>,
    bot_roles: HashMap<ChatId, MemberRole>,
    failing_chats: HashSet<ChatRef>,
    blocked_recipients: HashSet<ChatId>,
    fail_deletes: bool,
    sent: Vec<SentMessage>,
    deleted: Vec<(ChatId, i64)>,
}

/// Mock 平台客户端（用于测试和本地运行）
///
/// 不调用真实 API，记录每次调用，并可注入失败。
#[derive(Default)]
pub struct MockPlatformClient {
    state: Mutex<MockState>,
}

impl MockPlatformClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_membership(&self, chat: ChatRef, user_id: UserId, role: MemberRole) {
        self.state.lock().memberships.insert((chat, user_id), role);
    }

    pub fn remove_membership(&self, chat: &ChatRef, user_id: UserId) {
        self.state.lock().memberships.remove(&(chat.clone(), user_id));
    }

    pub fn set_bot_role(&self, chat_id: ChatId, role: MemberRole) {
        self.state.lock().bot_roles.insert(chat_id, role);
    }

    /// 对该会话的成员查询返回平台错误
    pub fn fail_membership_for(&self, chat: ChatRef) {
        self.state.lock().failing_chats.insert(chat);
    }

    /// 模拟用户屏蔽机器人：发往该会话的消息失败
    pub fn block_recipient(&self, chat_id: ChatId) {
        self.state.lock().blocked_recipients.insert(chat_id);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.state.lock().fail_deletes = fail;
    }

    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.state.lock().sent.clone()
    }

    pub fn sent_to(&self, chat_id: ChatId) -> Vec<SentMessage> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect()
    }

    pub fn deleted_messages(&self) -> Vec<(ChatId, i64)> {
        self.state.lock().deleted.clone()
    }
}

#[async_trait]
impl ChatPlatformClient for MockPlatformClient {
    async fn get_membership(&self, chat: &ChatRef, user_id: UserId) -> Result<Option<MemberRole>> {
        let state = self.state.lock();
        if state.failing_chats.contains(chat) {
            return Err(GuardError::Platform(format!("chat {} not reachable", chat)));
        }
        Ok(state.memberships.get(&(chat.clone(), user_id)).copied())
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: i64) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_deletes {
            return Err(GuardError::Platform("message can't be deleted".to_string()));
        }
        state.deleted.push((chat_id, message_id));
        info!("[MOCK PLATFORM] delete chat={} message={}", chat_id, message_id);
        Ok(())
    }

    async fn send_message(&self, chat_id: ChatId, text: &str, options: &SendOptions) -> Result<()> {
        let mut state = self.state.lock();
        if state.blocked_recipients.contains(&chat_id) {
            return Err(GuardError::Platform(
                "Forbidden: bot was blocked by the user".to_string(),
            ));
        }
        state.sent.push(SentMessage {
            chat_id,
            text: text.to_string(),
            options: options.clone(),
        });
        info!("[MOCK PLATFORM] send chat={} len={}", chat_id, text.len());
        Ok(())
    }

    async fn get_bot_role(&self, chat_id: ChatId) -> Result<Option<MemberRole>> {
        let state = self.state.lock();
        if state.failing_chats.contains(&ChatRef::Id(chat_id)) {
            return Err(GuardError::Platform(format!("chat {} not reachable", chat_id)));
        }
        Ok(state.bot_roles.get(&chat_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_calls_and_injects_failures() {
        let client = MockPlatformClient::new();
        client.set_membership(ChatRef::Id(-1), 7, MemberRole::Member);

        assert_eq!(
            client.get_membership(&ChatRef::Id(-1), 7).await.unwrap(),
            Some(MemberRole::Member)
        );
        assert_eq!(client.get_membership(&ChatRef::Id(-1), 8).await.unwrap(), None);

        client.block_recipient(7);
        assert!(client.send_message(7, "hi", &SendOptions::default()).await.is_err());
        client.send_message(-1, "hi", &SendOptions::default()).await.unwrap();
        assert_eq!(client.sent_messages().len(), 1);

        client.fail_membership_for(ChatRef::Id(-1));
        assert!(client.get_membership(&ChatRef::Id(-1), 7).await.is_err());
    }
}
