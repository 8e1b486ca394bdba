//! Canned NLU results for development and demos.
//!
//! Lets the rest of the pipeline run before a real NLU service is wired up,
//! and doubles as the second registered parser backend so switching backends
//! by configuration is exercised end to end.

use tracing::debug;

use crate::nlu::{NluError, NluParser, ParsedData, ParsedEntity, ParsedIntent};
use crate::registry::{BackendError, BackendParams};

/// Name this parser registers under.
pub const BACKEND_NAME: &str = "static";

/// A parser that ignores the payload and answers with a fixed result.
#[derive(Debug)]
pub struct StaticParser {
    intent: String,
}

impl StaticParser {
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
        }
    }

    /// Builds the parser from backend parameters. `intent`, when present,
    /// overrides the canned intent name.
    pub fn from_params(params: &BackendParams) -> Result<Self, BackendError> {
        let intent = params.opt_str("intent")?.unwrap_or("greeting");
        Ok(Self::new(intent))
    }
}

impl Default for StaticParser {
    fn default() -> Self {
        Self::new("greeting")
    }
}

impl NluParser for StaticParser {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn parse_data(&self, raw: &[u8]) -> Result<ParsedData, NluError> {
        debug!("answering with a canned result for {} payload bytes", raw.len());
        Ok(ParsedData::new(
            Some(ParsedIntent::new(self.intent.clone())),
            vec![ParsedEntity::Text {
                name: "subject".to_string(),
                confidence: 1.0,
                value: "world".to_string(),
            }],
        ))
    }
}
