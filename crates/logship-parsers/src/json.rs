use crate::timestamp;
use chrono::{DateTime, Utc};
use logship_core::{LineParser, LogRecord, SourceSpec};
use serde_json::{Map, Value};

/// Field names probed for an event timestamp, in priority order
const TIMESTAMP_FIELDS: [&str; 7] = [
    "timestamp",
    "time",
    "@timestamp",
    "datetime",
    "created_at",
    "createdAt",
    "date",
];

/// Field names probed for a severity level, in priority order
const LEVEL_FIELDS: [&str; 5] = ["level", "severity", "loglevel", "log_level", "priority"];

/// Field names probed for the message text, in priority order
const MESSAGE_FIELDS: [&str; 5] = ["message", "msg", "text", "log", "content"];

/// Parser for JSON-formatted log lines
///
/// Only structurally invalid input is rejected. A decoded object with no
/// recognized message field is still a record; its message is the object
/// serialized back to text.
pub struct JsonParser;

impl JsonParser {
    pub fn new() -> Self {
        Self
    }

    fn extract_timestamp(object: &Map<String, Value>) -> DateTime<Utc> {
        for field in TIMESTAMP_FIELDS {
            if let Some(value) = object.get(field) {
                if let Some(ts) = timestamp::from_value(value) {
                    return ts;
                }
            }
        }
        Utc::now()
    }

    fn extract_level(object: &Map<String, Value>) -> String {
        for field in LEVEL_FIELDS {
            match object.get(field) {
                Some(Value::String(text)) if !text.is_empty() => return text.to_uppercase(),
                Some(Value::Number(number)) => return number.to_string(),
                _ => {}
            }
        }
        "INFO".to_string()
    }

    fn extract_message(object: &Map<String, Value>) -> String {
        for field in MESSAGE_FIELDS {
            match object.get(field) {
                Some(Value::String(text)) if !text.is_empty() => return text.clone(),
                Some(Value::Null) | Some(Value::String(_)) | None => {}
                Some(other) => return other.to_string(),
            }
        }
        // No message field: the whole object becomes the message
        serde_json::to_string(object).unwrap_or_default()
    }
}

impl Default for JsonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LineParser for JsonParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn parse(&self, line: &str, spec: &SourceSpec) -> Option<LogRecord> {
        let object: Map<String, Value> = serde_json::from_str(line).ok()?;

        let message = Self::extract_message(&object);
        if message.is_empty() {
            return None;
        }

        Some(
            LogRecord::new(&spec.name, message)
                .with_timestamp(Self::extract_timestamp(&object))
                .with_level(Self::extract_level(&object))
                .with_labels(spec.labels.clone())
                .with_attributes(object)
                .with_raw(line),
        )
    }
}
