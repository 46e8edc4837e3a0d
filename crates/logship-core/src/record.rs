use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A parsed log record awaiting delivery
///
/// Records carry everything extracted from one log line. The application
/// name is a property of the whole agent and is attached by the transport
/// at delivery time, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Event timestamp; falls back to parse time when the line has none
    pub timestamp: DateTime<Utc>,

    /// Severity as an uppercase string (free-form, default "INFO")
    pub level: String,

    /// Message text; never empty
    pub message: String,

    /// Name of the source this record came from
    pub source: String,

    /// Static labels inherited from the source configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,

    /// Parser-specific extracted fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Map<String, Value>>,

    /// The original line, kept for audit and debugging
    #[serde(rename = "raw_log", default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl LogRecord {
    /// Create a record with the current time and default INFO level
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: "INFO".to_string(),
            message: message.into(),
            source: source.into(),
            labels: None,
            attributes: None,
            raw: None,
        }
    }

    /// Set the event timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the severity level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Attach static labels
    pub fn with_labels(mut self, labels: Option<HashMap<String, String>>) -> Self {
        self.labels = labels;
        self
    }

    /// Attach parser-extracted attributes
    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Keep the original raw line
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_defaults() {
        let record = LogRecord::new("app", "something happened");
        assert_eq!(record.level, "INFO");
        assert_eq!(record.source, "app");
        assert_eq!(record.message, "something happened");
        assert!(record.labels.is_none());
        assert!(record.attributes.is_none());
        assert!(record.raw.is_none());
    }

    #[test]
    fn test_builder_helpers() {
        let mut attrs = Map::new();
        attrs.insert("status".to_string(), Value::from(200));

        let record = LogRecord::new("web", "GET / - 200")
            .with_level("WARN")
            .with_attributes(attrs)
            .with_raw("raw line");

        assert_eq!(record.level, "WARN");
        assert_eq!(record.attributes.unwrap()["status"], 200);
        assert_eq!(record.raw.as_deref(), Some("raw line"));
    }

    #[test]
    fn test_serialized_field_names() {
        let record = LogRecord::new("app", "msg").with_raw("the line");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["raw_log"], "the line");
        assert_eq!(json["source"], "app");
        // chrono serializes DateTime<Utc> as RFC 3339
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }
}
