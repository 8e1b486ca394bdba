//! Messaging channel abstraction.
//!
//! The channel is whatever platform the user chats on. Inbound traffic
//! arrives as [`InboundMessage`] values decoded from the webhook body;
//! outbound delivery goes through the [`ChannelClient`] trait, with a
//! console backend for development and an HTTP backend for a real platform
//! endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

pub mod console;
pub mod http;

/// A user message delivered by the platform's webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message id assigned by the platform.
    pub id: String,
    /// Platform id of the user who sent the message.
    pub sender_id: String,
    /// Platform id of the page or bot account that received it.
    pub recipient_id: String,
    #[serde(default = "Utc::now")]
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub text: String,
    /// Payload of the quick reply the user tapped, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_reply_payload: Option<String>,
    /// Raw NLU result the platform attached to the message, carried through
    /// untouched until a parser backend normalizes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nlu: Option<Box<RawValue>>,
}

/// Outbound side of a messaging platform.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    /// The name this backend registers under.
    fn name(&self) -> &'static str;

    /// Delivers a text message to a user on the platform.
    async fn send_text(&self, recipient_id: &str, text: &str) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inbound_message_decodes_with_raw_nlu_payload() {
        let body = json!({
            "id": "mid.123",
            "sender_id": "fb-123",
            "recipient_id": "page-1",
            "sent_at": "2024-07-01T17:59:00Z",
            "text": "a table for four tonight",
            "nlu": {"intent": [{"confidence": 0.99, "value": "book_table"}]}
        });

        let message: InboundMessage = serde_json::from_str(&body.to_string()).unwrap();
        assert_eq!(message.sender_id, "fb-123");
        let raw = message.nlu.as_ref().unwrap().get();
        assert!(raw.contains("book_table"));
    }

    #[test]
    fn test_optional_fields_default() {
        let body = json!({
            "id": "mid.124",
            "sender_id": "fb-123",
            "recipient_id": "page-1"
        });

        let message: InboundMessage = serde_json::from_str(&body.to_string()).unwrap();
        assert!(message.text.is_empty());
        assert!(message.quick_reply_payload.is_none());
        assert!(message.nlu.is_none());
    }
}
