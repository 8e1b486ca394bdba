//! Normalization of Wit-style NLU responses.
//!
//! A Wit response is a JSON object keyed by trained entity name, each key
//! holding an array of candidate objects ranked by the service. The parser
//! walks every key, dispatches on the [`EntityType`] the key is mapped to,
//! and keeps the first candidate that extracts cleanly. Bad fields and bad
//! candidates are logged and skipped; the only fatal failure is a payload
//! that is not a JSON object at all.

use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};
use tracing::warn;

use crate::nlu::{
    DataTypeMap, EntityType, Grain, NluError, NluParser, ParsedData, ParsedEntity, ParsedIntent,
};
use crate::registry::{BackendError, BackendParams};

/// Name this parser registers under.
pub const BACKEND_NAME: &str = "wit";

/// Parser for Wit-style JSON payloads.
///
/// The data type map decides which payload keys are extracted and how;
/// everything else is skipped. The default map covers the entities the bot is
/// trained on today and can be extended per deployment through the `data_types`
/// backend parameter.
#[derive(Debug)]
pub struct WitParser {
    data_type_map: DataTypeMap,
}

impl WitParser {
    pub fn new() -> Self {
        Self::with_data_type_map(default_data_type_map())
    }

    pub fn with_data_type_map(data_type_map: DataTypeMap) -> Self {
        Self { data_type_map }
    }

    /// Builds the parser from backend parameters.
    ///
    /// `data_types`, when present, must be an object mapping payload keys to
    /// entity type names (`"intent"`, `"int"`, `"datetime"`, `"text"`); its
    /// entries are merged over the default map.
    pub fn from_params(params: &BackendParams) -> Result<Self, BackendError> {
        let mut map = default_data_type_map();
        if let Some(overrides) = params.get("data_types") {
            let overrides = overrides
                .as_object()
                .ok_or_else(|| BackendError::InvalidOrMissingParam("data_types".to_string()))?;
            for (key, type_name) in overrides {
                let entity_type = type_name
                    .as_str()
                    .and_then(|name| name.parse::<EntityType>().ok())
                    .ok_or_else(|| BackendError::InvalidOrMissingParam("data_types".to_string()))?;
                map.insert(key.clone(), entity_type);
            }
        }
        Ok(Self::with_data_type_map(map))
    }
}

impl Default for WitParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload keys the bot is trained on, mapped to their normalized types.
pub fn default_data_type_map() -> DataTypeMap {
    DataTypeMap::from([
        ("intent".to_string(), EntityType::Intent),
        ("nb_persons".to_string(), EntityType::Int),
        ("datetime".to_string(), EntityType::DateTime),
    ])
}

impl NluParser for WitParser {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn parse_data(&self, raw: &[u8]) -> Result<ParsedData, NluError> {
        let payload: Value = serde_json::from_slice(raw).map_err(|err| {
            warn!("could not parse NLU payload: {}", err);
            NluError::MalformedPayload
        })?;
        let object = payload.as_object().ok_or_else(|| {
            warn!("NLU payload is not a JSON object");
            NluError::MalformedPayload
        })?;

        let mut intent = None;
        let mut entities = Vec::new();

        for (key, value) in object {
            let Some(&data_type) = self.data_type_map.get(key.as_str()) else {
                warn!("data type is not handled, skipping it: {}", key);
                continue;
            };

            if data_type == EntityType::Intent {
                match extract_intent(value) {
                    Ok(parsed) => intent = Some(parsed),
                    Err(err) => warn!("could not extract the intent from {}: {}", key, err),
                }
                continue;
            }

            match extract_entity(key, value, data_type) {
                Ok(Some(entity)) => entities.push(entity),
                Ok(None) => warn!("no usable candidate for {}, skipping it", key),
                Err(err) => warn!("could not extract an entity from {}: {}", key, err),
            }
        }

        Ok(ParsedData::new(intent, entities))
    }
}

/// Keeps the name of the top-ranked intent candidate.
fn extract_intent(value: &Value) -> Result<ParsedIntent, NluError> {
    let candidates = value
        .as_array()
        .ok_or_else(|| NluError::cannot_cast("intent", "array"))?;
    let first = candidates
        .first()
        .ok_or_else(|| NluError::missing_key("value"))?;
    let name = first
        .get("value")
        .and_then(Value::as_str)
        .ok_or_else(|| NluError::missing_key("value"))?;
    Ok(ParsedIntent::new(name))
}

/// Extracts one entity from a field's candidate array.
///
/// Candidates are probed in service order and the first clean one wins; a
/// candidate that fails is logged and skipped without touching the rest.
/// Returns `Ok(None)` when no candidate survived. Field-level problems, a
/// value that is not an array or a type without an extractor, are the
/// caller's to report.
fn extract_entity(
    key: &str,
    value: &Value,
    data_type: EntityType,
) -> Result<Option<ParsedEntity>, NluError> {
    let extract = candidate_extractor(data_type)
        .ok_or_else(|| NluError::UnhandledDataType(data_type.to_string()))?;
    let candidates = value
        .as_array()
        .ok_or_else(|| NluError::cannot_cast(key, "array"))?;

    for candidate in candidates {
        let extracted = candidate
            .as_object()
            .ok_or_else(|| NluError::cannot_cast(key, "object"))
            .and_then(|object| {
                let confidence = confidence_of(object)?;
                extract(key, object, confidence)
            });
        match extracted {
            Ok(entity) => return Ok(Some(entity)),
            Err(err) => warn!("skipping a candidate of {}: {}", key, err),
        }
    }

    Ok(None)
}

type CandidateExtractor =
    fn(&str, &Map<String, Value>, f32) -> Result<ParsedEntity, NluError>;

/// Single dispatch point from a normalized type to its extractor.
fn candidate_extractor(data_type: EntityType) -> Option<CandidateExtractor> {
    match data_type {
        EntityType::Int => Some(extract_int_entity),
        EntityType::DateTime => Some(extract_datetime_entity),
        EntityType::Intent | EntityType::Text => None,
    }
}

/// Every candidate must state how sure the service is about it.
fn confidence_of(object: &Map<String, Value>) -> Result<f32, NluError> {
    object
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|confidence| confidence as f32)
        .ok_or_else(|| NluError::cannot_cast("confidence", "f64"))
}

fn role_of(object: &Map<String, Value>) -> String {
    object
        .get("role")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn extract_int_entity(
    name: &str,
    object: &Map<String, Value>,
    confidence: f32,
) -> Result<ParsedEntity, NluError> {
    let value = object
        .get("value")
        .and_then(Value::as_i64)
        .ok_or_else(|| NluError::cannot_cast("value", "i64"))?;
    Ok(ParsedEntity::Int {
        name: name.to_string(),
        confidence,
        value,
        role: role_of(object),
    })
}

/// Wit overloads the datetime shape: a single instant carries `value` and
/// `grain` at the top level of the candidate, an interval nests the same pair
/// under `from` and `to`. There is no discriminator on the wire, so the
/// instant shape is probed first and the interval is the fallback.
fn extract_datetime_entity(
    name: &str,
    object: &Map<String, Value>,
    confidence: f32,
) -> Result<ParsedEntity, NluError> {
    if object.get("value").is_some_and(Value::is_string) {
        let (instant, grain) = extract_instant(object)?;
        return Ok(ParsedEntity::DateTime {
            name: name.to_string(),
            confidence,
            instant,
            grain,
        });
    }

    let from = object
        .get("from")
        .and_then(Value::as_object)
        .ok_or_else(|| NluError::missing_key("from"))?;
    let (from_instant, from_grain) = extract_instant(from)?;
    let to = object
        .get("to")
        .and_then(Value::as_object)
        .ok_or_else(|| NluError::missing_key("to"))?;
    let (to_instant, to_grain) = extract_instant(to)?;

    Ok(ParsedEntity::DateTimeInterval {
        name: name.to_string(),
        confidence,
        from: from_instant,
        from_grain,
        to: to_instant,
        to_grain,
        role: role_of(object),
    })
}

/// Reads a `value` + `grain` pair, the building block of both datetime shapes.
fn extract_instant(object: &Map<String, Value>) -> Result<(DateTime<FixedOffset>, Grain), NluError> {
    let value = object
        .get("value")
        .and_then(Value::as_str)
        .ok_or_else(|| NluError::missing_key("value"))?;
    let instant = DateTime::parse_from_rfc3339(value)
        .map_err(|_| NluError::cannot_cast("value", "RFC 3339 datetime"))?;
    let grain = object
        .get("grain")
        .and_then(Value::as_str)
        .ok_or_else(|| NluError::missing_key("grain"))?;
    Ok((instant, Grain::from(grain)))
}
