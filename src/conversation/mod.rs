//! Conversation domain model and storage.
//!
//! A [`Conversation`] is the ordered message history between one [`User`] and
//! the bot, together with where the dialogue currently stands. Storage is
//! behind the [`ConversationRepository`] trait with two backends: an
//! in-memory store for tests and demos ([`memory`]) and a JSON file store
//! that survives restarts ([`file`]).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::nlu::ParsedData;

pub mod file;
pub mod memory;

/// Lifecycle state of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The bot is handling the exchange.
    Ongoing,
    /// A human operator took over; the bot only records messages.
    HumanIntervention,
    /// Closed. The next inbound message starts a fresh conversation.
    Over,
}

/// Someone talking to the bot, keyed by the id the messaging platform
/// assigns them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel_id: channel_id.into(),
            name: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A message the user sent, with the normalized NLU result attached once
/// the payload has been run through a parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub sender_id: String,
    pub recipient_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_reply_payload: Option<String>,
    pub sent_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed: Option<ParsedData>,
}

/// A message the bot (or an operator driving it) sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotMessage {
    pub recipient_id: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

/// A stored message, tagged with its direction so the history deserializes
/// through a single dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    FromUser(UserMessage),
    FromBot(BotMessage),
}

impl Message {
    pub fn sent_at(&self) -> DateTime<Utc> {
        match self {
            Message::FromUser(message) => message.sent_at,
            Message::FromBot(message) => message.sent_at,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Message::FromUser(message) => &message.text,
            Message::FromBot(message) => &message.text,
        }
    }

    /// The platform id of the sender, for user messages.
    pub fn sender_id(&self) -> Option<&str> {
        match self {
            Message::FromUser(message) => Some(&message.sender_id),
            Message::FromBot(_) => None,
        }
    }
}

/// The message history between one user and the bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub status: Status,
    /// Where the dialogue stands. Empty until a dialogue engine drives it.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub current_step: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            status: Status::Ongoing,
            current_step: String::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// True while nothing has been said yet.
    pub fn is_new(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn add_user_message(&mut self, message: UserMessage) {
        self.messages.push(Message::FromUser(message));
        self.updated_at = Utc::now();
    }

    pub fn add_bot_message(&mut self, message: BotMessage) {
        self.messages.push(Message::FromBot(message));
        self.updated_at = Utc::now();
    }

    /// True when the given platform user said anything in this conversation.
    pub fn has_message_from(&self, channel_id: &str) -> bool {
        self.messages
            .iter()
            .any(|message| message.sender_id() == Some(channel_id))
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors surfaced by conversation stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user already exists: {0}")]
    DuplicateUser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage backend for users and their conversations.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// The name this backend registers under.
    fn name(&self) -> &'static str;

    /// The most recent conversation the user took part in, if any.
    async fn find_latest_conversation(
        &self,
        user: &User,
    ) -> Result<Option<Conversation>, StoreError>;

    /// Inserts or replaces the conversation, keyed by its id.
    async fn save_conversation(&self, conversation: &Conversation) -> Result<(), StoreError>;

    async fn find_user_by_channel_id(
        &self,
        channel_id: &str,
    ) -> Result<Option<User>, StoreError>;

    /// Registers a new user. Fails with [`StoreError::DuplicateUser`] when
    /// the platform id is already known.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
}
