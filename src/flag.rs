// src/flag.rs
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_ENDPOINT: &str = "https://flags-api.basestack.co/v1";

/// A flag as served to callers, after normalization of the wire record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    pub slug: String,
    pub enabled: bool,
    pub payload: Option<Value>,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
}

/// A wire record known to carry a string `slug` and a boolean `enabled`.
///
/// Only obtainable through [`RawFlag::from_value`] or [`raw_flags_from_list`], so
/// [`normalize`] never sees unvalidated input.
#[derive(Debug, Clone)]
pub struct RawFlag {
    fields: Map<String, Value>,
}

impl RawFlag {
    /// Narrows a decoded JSON value, handing it back untouched when it is not a raw flag.
    pub fn from_value(value: Value) -> Result<Self, Value> {
        if !is_raw_flag(&value) {
            return Err(value);
        }

        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(other),
        }
    }

    pub fn slug(&self) -> &str {
        self.fields.get("slug").and_then(Value::as_str).unwrap_or_default()
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }
}

impl From<RawFlag> for Flag {
    fn from(raw: RawFlag) -> Self {
        normalize(raw)
    }
}

pub fn normalize(raw: RawFlag) -> Flag {
    Flag {
        slug: raw.slug().to_string(),
        enabled: raw.field("enabled").map(truthy).unwrap_or(false),
        payload: raw.field("payload").cloned(),
        description: raw
            .field("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        created_at: parse_timestamp(raw.field("createdAt")),
        updated_at: parse_timestamp(raw.field("updatedAt")),
        expired_at: parse_timestamp(raw.field("expiredAt")),
    }
}

/// Narrows a `{ "flags": [...] }` body into its raw flags.
pub fn raw_flags_from_list(value: Value) -> Result<Vec<RawFlag>, Value> {
    if !is_flags_list_response(&value) {
        return Err(value);
    }

    match value {
        Value::Object(mut fields) => match fields.remove("flags") {
            Some(Value::Array(items)) => items.into_iter().map(RawFlag::from_value).collect(),
            _ => Err(Value::Object(fields)),
        },
        other => Err(other),
    }
}

pub fn is_record(value: &Value) -> bool {
    value.is_object()
}

pub fn is_raw_flag(value: &Value) -> bool {
    is_record(value) && value["slug"].is_string() && value["enabled"].is_boolean()
}

pub fn is_flags_list_response(value: &Value) -> bool {
    if !is_record(value) {
        return false;
    }

    match &value["flags"] {
        Value::Array(items) => items.iter().all(is_raw_flag),
        _ => false,
    }
}

pub fn is_error_response(value: &Value) -> bool {
    is_record(value) && value["error"] == Value::Bool(true)
}

/// Decodes a response body; empty or malformed text yields `None`.
pub fn parse_json(raw: &str) -> Option<Value> {
    if raw.is_empty() {
        return None;
    }

    serde_json::from_str(raw).ok()
}

pub fn trim_trailing_slash(value: &str) -> &str {
    value.trim_end_matches('/')
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let raw = value.and_then(Value::as_str).filter(|s| !s.is_empty())?;

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
