//! Application configuration.
//!
//! One JSON file selects the backend for each collaborator by name and
//! carries the free-form parameter bag its factory needs. Every field has a
//! sensible development default, so an empty object is a valid config that
//! runs the bot fully in memory.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::channel::console;
use crate::conversation::memory;
use crate::nlu::wit;
use crate::registry::BackendParams;

/// Environment variable that overrides `verify_token`, so the secret can be
/// kept out of the config file.
pub const VERIFY_TOKEN_ENV: &str = "CONVERSE_VERIFY_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Lowers the default log level to debug.
    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_listening_port")]
    pub listening_port: u16,

    /// Token the platform echoes during the webhook subscription handshake.
    #[serde(default)]
    pub verify_token: String,

    #[serde(default = "default_nlu_parser")]
    pub nlu_parser: String,
    #[serde(default)]
    pub nlu_params: BackendParams,

    #[serde(default = "default_repository")]
    pub repository: String,
    #[serde(default)]
    pub repository_params: BackendParams,

    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default)]
    pub channel_params: BackendParams,
}

fn default_listening_port() -> u16 {
    8080
}

fn default_nlu_parser() -> String {
    wit::BACKEND_NAME.to_string()
}

fn default_repository() -> String {
    memory::BACKEND_NAME.to_string()
}

fn default_channel() -> String {
    console::BACKEND_NAME.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debug: false,
            listening_port: default_listening_port(),
            verify_token: String::new(),
            nlu_parser: default_nlu_parser(),
            nlu_params: BackendParams::new(),
            repository: default_repository(),
            repository_params: BackendParams::new(),
            channel: default_channel(),
            channel_params: BackendParams::new(),
        }
    }
}

impl AppConfig {
    /// Loads the config file and applies environment overrides.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var(VERIFY_TOKEN_ENV) {
            self.verify_token = token;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    // The verify token override reads the process environment, which is
    // shared across test threads; tests touching it serialize here.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[tokio::test]
    async fn test_empty_object_gets_development_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, "{}").await.unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.listening_port, 8080);
        assert_eq!(config.nlu_parser, "wit");
        assert_eq!(config.repository, "memory");
        assert_eq!(config.channel, "console");
        assert!(!config.debug);
    }

    #[tokio::test]
    async fn test_full_config_round_trips() {
        let _env = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(
            &path,
            r#"{
                "debug": true,
                "listening_port": 9000,
                "verify_token": "open-sesame",
                "repository": "file",
                "repository_params": {"path": "data/store.json"},
                "channel": "http",
                "channel_params": {"base_url": "https://graph.example.com"}
            }"#,
        )
        .await
        .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert!(config.debug);
        assert_eq!(config.listening_port, 9000);
        assert_eq!(config.verify_token, "open-sesame");
        assert_eq!(config.repository, "file");
        assert_eq!(
            config.repository_params.require_str("path").unwrap(),
            "data/store.json"
        );
        assert_eq!(config.channel, "http");
    }

    #[tokio::test]
    async fn test_env_verify_token_wins_over_the_file() {
        let _env = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{"verify_token": "from-file"}"#)
            .await
            .unwrap();

        std::env::set_var(VERIFY_TOKEN_ENV, "from-env");
        let overridden = AppConfig::load(&path).await.unwrap();
        std::env::remove_var(VERIFY_TOKEN_ENV);
        assert_eq!(overridden.verify_token, "from-env");

        // Once the variable is gone the file value stands again.
        let plain = AppConfig::load(&path).await.unwrap();
        assert_eq!(plain.verify_token, "from-file");
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = AppConfig::load(dir.path().join("nope.json")).await.unwrap_err();
        assert!(err.to_string().contains("nope.json"));
    }

    #[tokio::test]
    async fn test_broken_json_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, "{ listening_port: }").await.unwrap();
        assert!(AppConfig::load(&path).await.is_err());
    }
}
