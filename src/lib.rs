//! An early-stage chat-bot backend.
//!
//! Receives messaging-platform webhooks, keeps conversation histories, and
//! runs the raw NLU payload attached to each message through a
//! provider-agnostic normalization engine. Every swappable collaborator
//! (NLU parser, conversation repository, messaging channel) is picked by
//! name from a backend registry at startup, so deployments differ only in
//! configuration.

pub mod bot;
pub mod channel;
pub mod config;
pub mod conversation;
pub mod nlu;
pub mod registry;
pub mod server;

// Re-exports for convenience
pub use bot::{BackendRegistries, Bot};
pub use config::AppConfig;
pub use nlu::{NluParser, ParsedData, ParsedEntity, ParsedIntent};
pub use registry::{BackendError, BackendParams, Registry};
