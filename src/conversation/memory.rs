//! In-memory conversation store.
//!
//! Nothing survives a restart. Good enough for tests, demos and the
//! `receive` command; anything longer-lived should use the [`file`] backend.
//!
//! [`file`]: crate::conversation::file

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::conversation::{Conversation, ConversationRepository, StoreError, User};
use crate::registry::{BackendError, BackendParams};

/// Name this store registers under.
pub const BACKEND_NAME: &str = "memory";

#[derive(Default)]
pub struct InMemoryRepository {
    /// Users keyed by their platform id.
    users: RwLock<HashMap<String, User>>,
    /// Conversations keyed by their id.
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the store from backend parameters. None are needed.
    pub fn from_params(_params: &BackendParams) -> Result<Self, BackendError> {
        Ok(Self::new())
    }
}

#[async_trait]
impl ConversationRepository for InMemoryRepository {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn find_latest_conversation(
        &self,
        user: &User,
    ) -> Result<Option<Conversation>, StoreError> {
        let conversations = self.conversations.read().await;
        let latest = conversations
            .values()
            .filter(|conversation| conversation.has_message_from(&user.channel_id))
            .max_by_key(|conversation| conversation.created_at)
            .cloned();
        Ok(latest)
    }

    async fn save_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        self.conversations
            .write()
            .await
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn find_user_by_channel_id(
        &self,
        channel_id: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(channel_id).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.channel_id) {
            return Err(StoreError::DuplicateUser(user.channel_id.clone()));
        }
        users.insert(user.channel_id.clone(), user.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::UserMessage;
    use chrono::{Duration, Utc};

    fn message_from(channel_id: &str) -> UserMessage {
        UserMessage {
            sender_id: channel_id.to_string(),
            recipient_id: "bot".to_string(),
            text: "hello".to_string(),
            quick_reply_payload: None,
            sent_at: Utc::now(),
            parsed: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find_user() {
        let store = InMemoryRepository::new();
        let user = User::new("fb-123").with_name("Ada");
        store.insert_user(&user).await.unwrap();

        let found = store.find_user_by_channel_id("fb-123").await.unwrap();
        assert_eq!(found, Some(user));
        assert!(store.find_user_by_channel_id("fb-999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inserting_a_known_user_fails() {
        let store = InMemoryRepository::new();
        store.insert_user(&User::new("fb-123")).await.unwrap();

        let err = store.insert_user(&User::new("fb-123")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUser(id) if id == "fb-123"));
    }

    #[tokio::test]
    async fn test_latest_conversation_picks_the_newest() {
        let store = InMemoryRepository::new();
        let user = User::new("fb-123");

        let mut older = Conversation::new();
        older.created_at = Utc::now() - Duration::hours(2);
        older.add_user_message(message_from("fb-123"));
        store.save_conversation(&older).await.unwrap();

        let mut newer = Conversation::new();
        newer.add_user_message(message_from("fb-123"));
        store.save_conversation(&newer).await.unwrap();

        let latest = store.find_latest_conversation(&user).await.unwrap().unwrap();
        assert_eq!(latest.id, newer.id);
    }

    #[tokio::test]
    async fn test_latest_conversation_ignores_other_users() {
        let store = InMemoryRepository::new();

        let mut conversation = Conversation::new();
        conversation.add_user_message(message_from("fb-456"));
        store.save_conversation(&conversation).await.unwrap();

        let found = store
            .find_latest_conversation(&User::new("fb-123"))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_saving_twice_overwrites_in_place() {
        let store = InMemoryRepository::new();

        let mut conversation = Conversation::new();
        conversation.add_user_message(message_from("fb-123"));
        store.save_conversation(&conversation).await.unwrap();
        conversation.add_user_message(message_from("fb-123"));
        store.save_conversation(&conversation).await.unwrap();

        let latest = store
            .find_latest_conversation(&User::new("fb-123"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.messages.len(), 2);
    }
}
