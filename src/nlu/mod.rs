//! Provider-agnostic NLU model.
//!
//! NLU services disagree wildly on their response shapes, so everything past
//! the parser boundary works on the normalized types in this module: a
//! [`ParsedData`] holding at most one [`ParsedIntent`] and any number of
//! typed [`ParsedEntity`] values. Each concrete service gets its own
//! [`NluParser`] implementation (see [`wit`] and [`fixture`]) registered as a
//! backend under its own name.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod fixture;
pub mod wit;

/// Errors surfaced while normalizing a raw NLU payload.
///
/// Only [`NluError::MalformedPayload`] aborts a whole [`NluParser::parse_data`]
/// call; the other variants describe a single field or candidate and are
/// logged and tolerated by the parsers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NluError {
    /// The payload bytes are not a JSON object.
    #[error("could not parse NLU payload as a JSON object")]
    MalformedPayload,

    /// A required key is absent.
    #[error("missing key: {0}")]
    MissingKey(String),

    /// A value exists but does not have the shape the extractor needs.
    #[error("could not cast {key} to {expected}")]
    CannotCastValue { key: String, expected: &'static str },

    /// The data type map names a type no extractor handles.
    #[error("unhandled data type: {0}")]
    UnhandledDataType(String),
}

impl NluError {
    pub fn missing_key(key: impl Into<String>) -> Self {
        Self::MissingKey(key.into())
    }

    pub fn cannot_cast(key: impl Into<String>, expected: &'static str) -> Self {
        Self::CannotCastValue {
            key: key.into(),
            expected,
        }
    }
}

/// The normalized shape a payload field is mapped to before extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Intent,
    Int,
    DateTime,
    Text,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Intent => "intent",
            EntityType::Int => "int",
            EntityType::DateTime => "datetime",
            EntityType::Text => "text",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a configured type name matches no [`EntityType`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown entity type: {0}")]
pub struct ParseEntityTypeError(pub String);

impl FromStr for EntityType {
    type Err = ParseEntityTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intent" => Ok(EntityType::Intent),
            "int" => Ok(EntityType::Int),
            "datetime" => Ok(EntityType::DateTime),
            "text" => Ok(EntityType::Text),
            other => Err(ParseEntityTypeError(other.to_string())),
        }
    }
}

/// Maps provider payload keys to the [`EntityType`] used to extract them.
/// Keys absent from the map are skipped with a warning.
pub type DataTypeMap = HashMap<String, EntityType>;

/// Granularity attached to a datetime value by the NLU service.
///
/// Known grains get a typed variant; anything else is carried through
/// verbatim in [`Grain::Other`] so an unexpected provider value never breaks
/// extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Grain {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
    Other(String),
}

impl Grain {
    pub fn as_str(&self) -> &str {
        match self {
            Grain::Second => "second",
            Grain::Minute => "minute",
            Grain::Hour => "hour",
            Grain::Day => "day",
            Grain::Week => "week",
            Grain::Month => "month",
            Grain::Quarter => "quarter",
            Grain::Year => "year",
            Grain::Other(value) => value,
        }
    }
}

impl From<&str> for Grain {
    fn from(value: &str) -> Self {
        match value {
            "second" => Grain::Second,
            "minute" => Grain::Minute,
            "hour" => Grain::Hour,
            "day" => Grain::Day,
            "week" => Grain::Week,
            "month" => Grain::Month,
            "quarter" => Grain::Quarter,
            "year" => Grain::Year,
            other => Grain::Other(other.to_string()),
        }
    }
}

impl From<String> for Grain {
    fn from(value: String) -> Self {
        Grain::from(value.as_str())
    }
}

impl From<Grain> for String {
    fn from(grain: Grain) -> Self {
        grain.as_str().to_string()
    }
}

impl fmt::Display for Grain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single intent an NLU service detected in a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedIntent {
    name: String,
}

impl ParsedIntent {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One normalized entity extracted from a payload field.
///
/// Every variant carries the payload key it came from as `name` and the
/// service's `confidence` in the candidate. A value is only ever built whole;
/// extraction failures never produce a partially filled entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParsedEntity {
    /// A free-text value, as produced by keyword-style services.
    Text {
        name: String,
        confidence: f32,
        value: String,
    },
    /// An integer quantity, e.g. a number of guests.
    Int {
        name: String,
        confidence: f32,
        value: i64,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        role: String,
    },
    /// A single instant with the granularity the service resolved it at.
    DateTime {
        name: String,
        confidence: f32,
        instant: DateTime<FixedOffset>,
        grain: Grain,
    },
    /// A time range with per-endpoint granularity.
    DateTimeInterval {
        name: String,
        confidence: f32,
        from: DateTime<FixedOffset>,
        from_grain: Grain,
        to: DateTime<FixedOffset>,
        to_grain: Grain,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        role: String,
    },
}

impl ParsedEntity {
    /// The payload key this entity was extracted from.
    pub fn name(&self) -> &str {
        match self {
            ParsedEntity::Text { name, .. }
            | ParsedEntity::Int { name, .. }
            | ParsedEntity::DateTime { name, .. }
            | ParsedEntity::DateTimeInterval { name, .. } => name,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            ParsedEntity::Text { confidence, .. }
            | ParsedEntity::Int { confidence, .. }
            | ParsedEntity::DateTime { confidence, .. }
            | ParsedEntity::DateTimeInterval { confidence, .. } => *confidence,
        }
    }
}

/// The complete normalized result for one NLU payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<ParsedIntent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<ParsedEntity>,
}

impl ParsedData {
    pub fn new(intent: Option<ParsedIntent>, entities: Vec<ParsedEntity>) -> Self {
        Self { intent, entities }
    }

    /// True when the payload yielded neither an intent nor any entity.
    pub fn is_empty(&self) -> bool {
        self.intent.is_none() && self.entities.is_empty()
    }

    pub fn intent_name(&self) -> Option<&str> {
        self.intent.as_ref().map(ParsedIntent::name)
    }

    /// First entity extracted from the given payload key, if any.
    pub fn entity(&self, name: &str) -> Option<&ParsedEntity> {
        self.entities.iter().find(|entity| entity.name() == name)
    }
}

/// A backend that turns one NLU service's raw response into [`ParsedData`].
pub trait NluParser: Send + Sync {
    /// The name this backend registers under.
    fn name(&self) -> &'static str;

    /// Normalizes a raw provider payload.
    ///
    /// Fails only when the payload as a whole is unusable
    /// ([`NluError::MalformedPayload`]); unparseable fields and candidates
    /// inside an otherwise valid payload are logged and skipped.
    fn parse_data(&self, raw: &[u8]) -> Result<ParsedData, NluError>;
}
