//! Console channel for local development.

use async_trait::async_trait;
use tracing::debug;

use crate::channel::ChannelClient;
use crate::registry::{BackendError, BackendParams};

/// Name this channel registers under.
pub const BACKEND_NAME: &str = "console";

/// Prints outbound messages to stdout instead of calling a platform.
#[derive(Debug, Default)]
pub struct ConsoleClient;

impl ConsoleClient {
    pub fn new() -> Self {
        Self
    }

    /// Builds the client from backend parameters. None are needed.
    pub fn from_params(_params: &BackendParams) -> Result<Self, BackendError> {
        Ok(Self::new())
    }
}

#[async_trait]
impl ChannelClient for ConsoleClient {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn send_text(&self, recipient_id: &str, text: &str) -> anyhow::Result<()> {
        debug!("delivering a message to {} on the console", recipient_id);
        println!("[{recipient_id}] {text}");
        Ok(())
    }
}
