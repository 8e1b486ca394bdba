//! JSON file conversation store.
//!
//! Keeps the whole store in memory and rewrites one pretty-printed JSON file
//! after every mutation. Development-grade persistence: fine for a single
//! process and small histories, replaced by a real database once the bot
//! outgrows it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::conversation::{Conversation, ConversationRepository, StoreError, User};
use crate::registry::{BackendError, BackendParams};

/// Name this store registers under.
pub const BACKEND_NAME: &str = "file";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    /// Users keyed by their platform id.
    #[serde(default)]
    users: HashMap<String, User>,
    /// Conversations keyed by their id.
    #[serde(default)]
    conversations: HashMap<String, Conversation>,
}

pub struct FileRepository {
    path: PathBuf,
    state: RwLock<StoreState>,
}

impl FileRepository {
    /// Opens the store at `path`, loading existing content if the file is
    /// there. The file itself is only created on the first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let state: StoreState = serde_json::from_str(&content)?;
            info!(
                "loaded conversation store from {} ({} users, {} conversations)",
                path.display(),
                state.users.len(),
                state.conversations.len()
            );
            state
        } else {
            StoreState::default()
        };

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    /// Builds the store from backend parameters. `path` is required.
    pub fn from_params(params: &BackendParams) -> Result<Self, BackendError> {
        let path = params.require_str("path")?;
        Self::open(path).map_err(|err| BackendError::Build(err.into()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrites the backing file from the given state. Called with the write
    /// lock held so saves cannot interleave.
    async fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationRepository for FileRepository {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn find_latest_conversation(
        &self,
        user: &User,
    ) -> Result<Option<Conversation>, StoreError> {
        let state = self.state.read().await;
        let latest = state
            .conversations
            .values()
            .filter(|conversation| conversation.has_message_from(&user.channel_id))
            .max_by_key(|conversation| conversation.created_at)
            .cloned();
        Ok(latest)
    }

    async fn save_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        self.persist(&state).await
    }

    async fn find_user_by_channel_id(
        &self,
        channel_id: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.get(channel_id).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.users.contains_key(&user.channel_id) {
            return Err(StoreError::DuplicateUser(user.channel_id.clone()));
        }
        state.users.insert(user.channel_id.clone(), user.clone());
        self.persist(&state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::UserMessage;
    use chrono::Utc;
    use tempfile::tempdir;

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
    async fn test_opens_empty_when_the_file_does_not_exist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = FileRepository::open(&path).unwrap();
        assert_eq!(store.path(), path);
        let found = store.find_user_by_channel_id("fb-123").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_state_survives_a_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let user = User::new("fb-123").with_name("Ada");
        let mut conversation = Conversation::new();
        conversation.add_user_message(message_from("fb-123"));
        {
            let store = FileRepository::open(&path).unwrap();
            store.insert_user(&user).await.unwrap();
            store.save_conversation(&conversation).await.unwrap();
        }

        let reopened = FileRepository::open(&path).unwrap();
        let found_user = reopened.find_user_by_channel_id("fb-123").await.unwrap();
        assert_eq!(found_user, Some(user.clone()));

        let found = reopened
            .find_latest_conversation(&user)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, conversation.id);
        assert_eq!(found.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_user_is_rejected_without_touching_the_file() {
        let dir = tempdir().unwrap();
        let store = FileRepository::open(dir.path().join("store.json")).unwrap();

        store.insert_user(&User::new("fb-123")).await.unwrap();
        let err = store.insert_user(&User::new("fb-123")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUser(_)));
    }

    #[tokio::test]
    async fn test_missing_directories_are_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("store.json");
        let store = FileRepository::open(&path).unwrap();
        store.insert_user(&User::new("fb-123")).await.unwrap();
        assert!(path.exists());
    }
}
