//! Name-keyed backend registries.
//!
//! Every swappable collaborator in the bot (NLU parser, conversation
//! repository, messaging channel client) is built by a factory looked up by
//! name in a [`Registry`]. Each collaborator kind owns its own registry
//! instance, created and populated by the composition root during bootstrap,
//! so backend names only need to be unique within their kind and nothing is
//! registered as a load-time side effect.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Errors surfaced by registry lookups and backend factories.
#[derive(Debug, Error)]
pub enum BackendError {
    /// No factory is registered under the requested name.
    #[error("backend not found: {0}")]
    NotFound(String),

    /// A factory was handed a parameter bag missing a usable value.
    #[error("invalid or missing parameter: {0}")]
    InvalidOrMissingParam(String),

    /// A factory failed while constructing its backend.
    #[error("could not build backend: {0}")]
    Build(#[from] anyhow::Error),
}

/// Free-form configuration handed to a backend factory.
///
/// The bag is deserialized straight out of the configuration file; its keys
/// are only meaningful to the factory that receives it. Factories validate
/// the entries they need and fail with
/// [`BackendError::InvalidOrMissingParam`] otherwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendParams(HashMap<String, Value>);

impl BackendParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, consuming and returning the bag.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Raw access for factories with structured parameters.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// A string entry that must be present.
    pub fn require_str(&self, key: &str) -> Result<&str, BackendError> {
        self.opt_str(key)?
            .ok_or_else(|| BackendError::InvalidOrMissingParam(key.to_string()))
    }

    /// A string entry that may be absent, but must be a string if present.
    pub fn opt_str(&self, key: &str) -> Result<Option<&str>, BackendError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| BackendError::InvalidOrMissingParam(key.to_string())),
        }
    }
}

/// Factory signature shared by every backend kind.
pub type BackendFactory<T> = Box<dyn Fn(&BackendParams) -> Result<T, BackendError> + Send + Sync>;

/// A name-keyed factory registry for one kind of pluggable backend.
///
/// Registration is expected to happen during bootstrap, before any lookup,
/// but the registry is safe for concurrent use either way.
pub struct Registry<T> {
    kind: &'static str,
    factories: RwLock<HashMap<String, BackendFactory<T>>>,
}

impl<T> Registry<T> {
    /// Creates an empty registry. `kind` is a human-readable label used in
    /// log lines, e.g. `"nlu parser"`.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a factory under `name`. Re-registering an existing name is
    /// tolerated: a warning is logged and the newest factory wins.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&BackendParams) -> Result<T, BackendError> + Send + Sync + 'static,
    {
        let name = name.into();
        let mut factories = self.factories.write().expect("registry lock poisoned");
        if factories.contains_key(&name) {
            warn!("{} backend '{}' already registered, replacing it", self.kind, name);
        }
        factories.insert(name, Box::new(factory));
    }

    /// Builds the backend registered under `name`.
    ///
    /// Fails with [`BackendError::NotFound`] when no factory carries that
    /// name; any error returned by the factory itself is passed through
    /// untouched.
    pub fn create(&self, name: &str, params: &BackendParams) -> Result<T, BackendError> {
        let factories = self.factories.read().expect("registry lock poisoned");
        let factory = factories
            .get(name)
            .ok_or_else(|| BackendError::NotFound(name.to_string()))?;
        factory(params)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories
            .read()
            .expect("registry lock poisoned")
            .contains_key(name)
    }

    /// Registered backend names, sorted for stable log output.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
