use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Textual formats accepted for timestamps that arrive without a declared
/// format, roughly the shapes log libraries emit by default.
const TEXTUAL_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

/// Parse a timestamp from free-form text
pub(crate) fn from_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in TEXTUAL_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Parse a timestamp from a JSON value: text, or an epoch number in
/// seconds or milliseconds (values past ~2001 in milliseconds are assumed
/// to be milliseconds).
pub(crate) fn from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => from_text(text),
        Value::Number(number) => {
            let number = number.as_f64()?;
            if !number.is_finite() || number <= 0.0 {
                return None;
            }
            let millis = if number >= 1e12 { number } else { number * 1000.0 };
            Utc.timestamp_millis_opt(millis as i64).single()
        }
        _ => None,
    }
}
