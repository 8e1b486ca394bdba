//! HTTP channel client.
//!
//! Posts outbound messages to a platform-side endpoint. The wire shape is
//! deliberately small: `POST {base_url}/messages` with a JSON body holding
//! the recipient and the text, authenticated with a bearer token when one is
//! configured.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::channel::ChannelClient;
use crate::registry::{BackendError, BackendParams};

/// Name this channel registers under.
pub const BACKEND_NAME: &str = "http";

#[derive(Debug)]
pub struct HttpChannelClient {
    client: Client,
    base_url: String,
    access_token: Option<String>,
}

impl HttpChannelClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Builds the client from backend parameters. `base_url` is required,
    /// `access_token` is optional.
    pub fn from_params(params: &BackendParams) -> Result<Self, BackendError> {
        let base_url = params.require_str("base_url")?;
        let mut client = Self::new(base_url);
        if let Some(token) = params.opt_str("access_token")? {
            client = client.with_access_token(token);
        }
        Ok(client)
    }
}

#[async_trait]
impl ChannelClient for HttpChannelClient {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn send_text(&self, recipient_id: &str, text: &str) -> anyhow::Result<()> {
        let url = format!("{}/messages", self.base_url.trim_end_matches('/'));
        let body = json!({
            "recipient_id": recipient_id,
            "text": text,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        request
            .send()
            .await
            .with_context(|| format!("could not reach the channel endpoint at {url}"))?
            .error_for_status()
            .context("channel endpoint rejected the message")?;

        debug!("delivered a message to {} over HTTP", recipient_id);
        Ok(())
    }
}
