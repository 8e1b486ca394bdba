//! Bot assembly and the inbound message pipeline.
//!
//! [`BackendRegistries`] holds one [`Registry`] per collaborator kind and is
//! populated by the composition root, so the full set of compiled-in
//! backends is visible in one place. [`Bot::bootstrap`] picks one backend of
//! each kind by the names in the config and wires them into the [`Bot`],
//! which owns the pipeline: look up the user, find the open conversation,
//! normalize the NLU payload, append and save.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::channel::{console::ConsoleClient, http::HttpChannelClient, ChannelClient, InboundMessage};
use crate::config::AppConfig;
use crate::conversation::{
    file::FileRepository, memory::InMemoryRepository, BotMessage, Conversation,
    ConversationRepository, Status, User, UserMessage,
};
use crate::nlu::{fixture::StaticParser, wit::WitParser, NluParser};
use crate::nlu::{fixture, wit};
use crate::registry::{BackendError, Registry};
use crate::{channel, conversation};

/// One registry per collaborator kind.
///
/// Kinds are independent namespaces: registering a parser named `x` says
/// nothing about channels named `x`.
pub struct BackendRegistries {
    pub parsers: Registry<Arc<dyn NluParser>>,
    pub repositories: Registry<Arc<dyn ConversationRepository>>,
    pub channels: Registry<Arc<dyn ChannelClient>>,
}

impl BackendRegistries {
    /// Registries with nothing registered, for callers bringing their own
    /// backends.
    pub fn empty() -> Self {
        Self {
            parsers: Registry::new("nlu parser"),
            repositories: Registry::new("conversation repository"),
            channels: Registry::new("messaging channel"),
        }
    }

    /// Registers every compiled-in backend, in one explicit place.
    pub fn with_builtin_backends() -> Self {
        let registries = Self::empty();

        registries.parsers.register(wit::BACKEND_NAME, |params| {
            let parser: Arc<dyn NluParser> = Arc::new(WitParser::from_params(params)?);
            Ok(parser)
        });
        registries.parsers.register(fixture::BACKEND_NAME, |params| {
            let parser: Arc<dyn NluParser> = Arc::new(StaticParser::from_params(params)?);
            Ok(parser)
        });

        registries
            .repositories
            .register(conversation::memory::BACKEND_NAME, |params| {
                let repository: Arc<dyn ConversationRepository> =
                    Arc::new(InMemoryRepository::from_params(params)?);
                Ok(repository)
            });
        registries
            .repositories
            .register(conversation::file::BACKEND_NAME, |params| {
                let repository: Arc<dyn ConversationRepository> =
                    Arc::new(FileRepository::from_params(params)?);
                Ok(repository)
            });

        registries
            .channels
            .register(channel::console::BACKEND_NAME, |params| {
                let channel: Arc<dyn ChannelClient> = Arc::new(ConsoleClient::from_params(params)?);
                Ok(channel)
            });
        registries
            .channels
            .register(channel::http::BACKEND_NAME, |params| {
                let channel: Arc<dyn ChannelClient> =
                    Arc::new(HttpChannelClient::from_params(params)?);
                Ok(channel)
            });

        registries
    }
}

/// The assembled bot.
pub struct Bot {
    parser: Arc<dyn NluParser>,
    repository: Arc<dyn ConversationRepository>,
    channel: Arc<dyn ChannelClient>,
}

impl Bot {
    /// Builds the bot from the config using the compiled-in backends.
    pub fn bootstrap(config: &AppConfig) -> Result<Self, BackendError> {
        let registries = BackendRegistries::with_builtin_backends();
        Self::from_registries(&registries, config)
    }

    /// Builds the bot from caller-provided registries.
    pub fn from_registries(
        registries: &BackendRegistries,
        config: &AppConfig,
    ) -> Result<Self, BackendError> {
        let parser = registries
            .parsers
            .create(&config.nlu_parser, &config.nlu_params)?;
        info!("using the '{}' NLU parser", parser.name());

        let repository = registries
            .repositories
            .create(&config.repository, &config.repository_params)?;
        info!("using the '{}' conversation repository", repository.name());

        let channel = registries
            .channels
            .create(&config.channel, &config.channel_params)?;
        info!("using the '{}' messaging channel", channel.name());

        Ok(Self::from_parts(parser, repository, channel))
    }

    /// Direct assembly, mainly a seam for tests.
    pub fn from_parts(
        parser: Arc<dyn NluParser>,
        repository: Arc<dyn ConversationRepository>,
        channel: Arc<dyn ChannelClient>,
    ) -> Self {
        Self {
            parser,
            repository,
            channel,
        }
    }

    /// Runs one inbound message through the pipeline and returns the
    /// conversation it ended up in.
    ///
    /// An NLU payload that fails to normalize is logged and dropped; the
    /// message itself is always recorded.
    pub async fn handle_inbound(&self, message: InboundMessage) -> anyhow::Result<Conversation> {
        debug!("handling message {} from {}", message.id, message.sender_id);

        let user = self.find_or_register_user(&message.sender_id).await?;
        let mut conversation = self.latest_open_conversation(&user).await?;

        let parsed = match &message.nlu {
            None => None,
            Some(raw) => match self.parser.parse_data(raw.get().as_bytes()) {
                Ok(data) => Some(data),
                Err(err) => {
                    warn!("could not normalize the NLU payload: {}", err);
                    None
                }
            },
        };

        if let Some(data) = &parsed {
            match data.intent_name() {
                Some(intent) => {
                    info!("understood intent '{}' with {} entities", intent, data.entities.len())
                }
                None => debug!("no intent detected in the message"),
            }
        }

        conversation.add_user_message(UserMessage {
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            text: message.text,
            quick_reply_payload: message.quick_reply_payload,
            sent_at: message.sent_at,
            parsed,
        });
        self.repository.save_conversation(&conversation).await?;

        Ok(conversation)
    }

    /// Sends a text message through the channel and records it in the
    /// recipient's latest conversation when the recipient is a known user.
    ///
    /// Recording targets the latest conversation whatever its status.
    /// Lookups only match conversations the user has spoken in, so a fresh
    /// conversation holding nothing but bot messages could never be found
    /// again.
    pub async fn send_text(&self, recipient_id: &str, text: &str) -> anyhow::Result<()> {
        self.channel.send_text(recipient_id, text).await?;

        let user = match self.repository.find_user_by_channel_id(recipient_id).await? {
            Some(user) => user,
            None => {
                debug!("recipient {} is unknown, outbound message not recorded", recipient_id);
                return Ok(());
            }
        };

        match self.repository.find_latest_conversation(&user).await? {
            Some(mut conversation) => {
                conversation.add_bot_message(BotMessage {
                    recipient_id: recipient_id.to_string(),
                    text: text.to_string(),
                    sent_at: chrono::Utc::now(),
                });
                self.repository.save_conversation(&conversation).await?;
            }
            None => {
                debug!("no conversation with {} yet, outbound message not recorded", recipient_id)
            }
        }
        Ok(())
    }

    async fn find_or_register_user(&self, channel_id: &str) -> anyhow::Result<User> {
        if let Some(user) = self.repository.find_user_by_channel_id(channel_id).await? {
            return Ok(user);
        }
        let user = User::new(channel_id);
        self.repository.insert_user(&user).await?;
        info!("registered a new user for channel id {}", user.channel_id);
        Ok(user)
    }

    /// The latest conversation still open for the user, or a fresh one.
    async fn latest_open_conversation(&self, user: &User) -> anyhow::Result<Conversation> {
        let conversation = match self.repository.find_latest_conversation(user).await? {
            Some(found) if found.status != Status::Over => found,
            _ => Conversation::new(),
        };
        Ok(conversation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Message;
    use chrono::Utc;
    use serde_json::value::RawValue;
    use serde_json::{json, Value};

    fn inbound(sender: &str, text: &str, nlu: Option<Value>) -> InboundMessage {
        InboundMessage {
            id: format!("mid.{}", uuid::Uuid::new_v4()),
            sender_id: sender.to_string(),
            recipient_id: "page-1".to_string(),
            sent_at: Utc::now(),
            text: text.to_string(),
            quick_reply_payload: None,
            nlu: nlu.map(|value| {
                RawValue::from_string(value.to_string()).expect("valid raw JSON")
            }),
        }
    }

    fn test_bot() -> (Bot, Arc<InMemoryRepository>) {
        let repository = Arc::new(InMemoryRepository::new());
        let bot = Bot::from_parts(
            Arc::new(WitParser::new()),
            repository.clone(),
            Arc::new(ConsoleClient::new()),
        );
        (bot, repository)
    }

    #[test]
    fn test_builtin_backends_are_all_registered() {
        let registries = BackendRegistries::with_builtin_backends();
        assert_eq!(registries.parsers.names(), vec!["static", "wit"]);
        assert_eq!(registries.repositories.names(), vec!["file", "memory"]);
        assert_eq!(registries.channels.names(), vec!["console", "http"]);
    }

    #[test]
    fn test_kinds_are_independent_namespaces() {
        let registries = BackendRegistries::with_builtin_backends();
        assert!(registries.parsers.contains("wit"));
        assert!(!registries.channels.contains("wit"));
    }

    #[test]
    fn test_bootstrap_with_defaults() {
        let config = AppConfig::default();
        assert!(Bot::bootstrap(&config).is_ok());
    }

    #[test]
    fn test_bootstrap_rejects_unknown_backend_names() {
        let config = AppConfig {
            nlu_parser: "mystery".to_string(),
            ..AppConfig::default()
        };
        let err = match Bot::bootstrap(&config) {
            Ok(_) => panic!("an unknown parser backend must be rejected"),
            Err(err) => err,
        };
        assert!(matches!(err, BackendError::NotFound(name) if name == "mystery"));
    }

    #[tokio::test]
    async fn test_inbound_message_is_recorded_with_its_nlu_result() {
        let (bot, repository) = test_bot();

        let conversation = bot
            .handle_inbound(inbound(
                "fb-123",
                "a table for four",
                Some(json!({
                    "intent": [{"confidence": 0.99, "value": "book_table"}],
                    "nb_persons": [{"confidence": 0.97, "value": 4}]
                })),
            ))
            .await
            .unwrap();

        assert_eq!(conversation.messages.len(), 1);
        match &conversation.messages[0] {
            Message::FromUser(message) => {
                let parsed = message.parsed.as_ref().unwrap();
                assert_eq!(parsed.intent_name(), Some("book_table"));
                assert_eq!(parsed.entities.len(), 1);
            }
            other => panic!("expected a user message, got {other:?}"),
        }

        let user = repository
            .find_user_by_channel_id("fb-123")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.channel_id, "fb-123");
    }

    #[tokio::test]
    async fn test_followup_messages_join_the_same_conversation() {
        let (bot, _) = test_bot();

        let first = bot
            .handle_inbound(inbound("fb-123", "hello", None))
            .await
            .unwrap();
        let second = bot
            .handle_inbound(inbound("fb-123", "anyone there?", None))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_a_closed_conversation_is_not_reopened() {
        let (bot, repository) = test_bot();

        let mut first = bot
            .handle_inbound(inbound("fb-123", "bye", None))
            .await
            .unwrap();
        first.status = Status::Over;
        repository.save_conversation(&first).await.unwrap();

        let second = bot
            .handle_inbound(inbound("fb-123", "hello again", None))
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_broken_nlu_payload_still_records_the_message() {
        let (bot, _) = test_bot();

        let conversation = bot
            .handle_inbound(InboundMessage {
                nlu: Some(RawValue::from_string("[1, 2, 3]".to_string()).unwrap()),
                ..inbound("fb-123", "hello", None)
            })
            .await
            .unwrap();

        match &conversation.messages[0] {
            Message::FromUser(message) => {
                assert_eq!(message.text, "hello");
                assert!(message.parsed.is_none());
            }
            other => panic!("expected a user message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_outbound_text_is_recorded_for_known_users() {
        let (bot, repository) = test_bot();
        bot.handle_inbound(inbound("fb-123", "hello", None))
            .await
            .unwrap();

        bot.send_text("fb-123", "welcome back").await.unwrap();

        let user = repository
            .find_user_by_channel_id("fb-123")
            .await
            .unwrap()
            .unwrap();
        let conversation = repository
            .find_latest_conversation(&user)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(
            conversation.last_message().map(Message::text),
            Some("welcome back")
        );
    }

    #[tokio::test]
    async fn test_outbound_text_lands_in_the_closed_conversation() {
        let (bot, repository) = test_bot();

        let mut first = bot
            .handle_inbound(inbound("fb-123", "bye", None))
            .await
            .unwrap();
        first.status = Status::Over;
        repository.save_conversation(&first).await.unwrap();

        bot.send_text("fb-123", "thanks for visiting").await.unwrap();
        bot.send_text("fb-123", "come back soon").await.unwrap();

        let user = repository
            .find_user_by_channel_id("fb-123")
            .await
            .unwrap()
            .unwrap();
        let latest = repository
            .find_latest_conversation(&user)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, first.id);
        assert_eq!(latest.status, Status::Over);
        assert_eq!(latest.messages.len(), 3);

        // A later reply still opens a fresh conversation.
        let reply = bot
            .handle_inbound(inbound("fb-123", "hello again", None))
            .await
            .unwrap();
        assert_ne!(reply.id, first.id);
        assert_eq!(reply.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_outbound_text_to_strangers_is_delivered_but_not_recorded() {
        let (bot, repository) = test_bot();
        bot.send_text("fb-999", "hello?").await.unwrap();
        let found = repository.find_user_by_channel_id("fb-999").await.unwrap();
        assert!(found.is_none());
    }
}
