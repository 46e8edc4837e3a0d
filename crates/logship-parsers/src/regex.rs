use crate::timestamp;
use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc};
use logship_core::{LineParser, LogRecord, SourceSpec};
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::warn;

// Pre-compiled built-in patterns
static BRACKETED_REGEX: OnceLock<Regex> = OnceLock::new();
static NGINX_REGEX: OnceLock<Regex> = OnceLock::new();
static APACHE_REGEX: OnceLock<Regex> = OnceLock::new();
static SYSLOG_REGEX: OnceLock<Regex> = OnceLock::new();

fn bracketed_regex() -> &'static Regex {
    BRACKETED_REGEX.get_or_init(|| {
        // Generic bracketed format: [2024-01-15 10:30:45] INFO: message
        Regex::new(r"^\[(.+?)\]\s+(\w+):\s+(.+)$").unwrap()
    })
}

fn nginx_regex() -> &'static Regex {
    NGINX_REGEX.get_or_init(|| {
        // Nginx access log with referer and user agent
        Regex::new(
            r#"^(\S+) \S+ \S+ \[([^\]]+)\] "(\S+) (\S+) \S+" (\d+) (\d+) "([^"]*)" "([^"]*)""#,
        )
        .unwrap()
    })
}

fn apache_regex() -> &'static Regex {
    APACHE_REGEX.get_or_init(|| {
        // Apache access log, common format without trailing fields
        Regex::new(r#"^(\S+) \S+ \S+ \[([^\]]+)\] "(\S+) (\S+) \S+" (\d+) (\d+)"#).unwrap()
    })
}

fn syslog_regex() -> &'static Regex {
    SYSLOG_REGEX.get_or_init(|| {
        // Syslog line: Jan  5 14:32:01 myhost sshd[12345]: message
        Regex::new(r"^(\w+\s+\d+\s+\d+:\d+:\d+) (\S+) (\w+)\[(\d+)\]: (.+)$").unwrap()
    })
}

/// Which extraction rules apply to a matched line
#[derive(Debug, Clone, Copy, PartialEq)]
enum Family {
    /// Web access logs (nginx/apache); severity derived from status code
    Web,
    /// Syslog lines; hostname/process/pid go to attributes
    Syslog,
    /// Generic bracketed timestamp-level-message
    Bracketed,
}

/// Regex-family parser: custom pattern, built-in format, or generic default
///
/// The pattern is resolved once at construction. A custom pattern that does
/// not compile downgrades the parser to plain-text handling for every line,
/// with a configuration warning. A line that does not match the resolved
/// pattern falls back to plain text, so every non-empty line yields a
/// record.
pub struct RegexParser {
    regex: Option<Regex>,
    family: Family,
    /// Web variant that also captures referer and user agent
    extended: bool,
}

impl RegexParser {
    /// Build the parser for one source, resolving the pattern in priority
    /// order: custom pattern, built-in format, generic default.
    pub fn for_source(spec: &SourceSpec) -> Self {
        let family = match spec.format.as_deref() {
            Some("nginx") | Some("apache") => Family::Web,
            Some("syslog") => Family::Syslog,
            _ => Family::Bracketed,
        };
        let extended = matches!(spec.format.as_deref(), Some("nginx"));

        let regex = if let Some(pattern) = &spec.pattern {
            match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(
                        source = %spec.name,
                        error = %e,
                        "Invalid custom pattern, falling back to plain text"
                    );
                    None
                }
            }
        } else {
            Some(
                match spec.format.as_deref() {
                    Some("nginx") => nginx_regex(),
                    Some("apache") => apache_regex(),
                    Some("syslog") => syslog_regex(),
                    _ => bracketed_regex(),
                }
                .clone(),
            )
        };

        Self {
            regex,
            family,
            extended,
        }
    }

    /// Last-resort outcome: the whole line becomes the message
    fn plain_text(line: &str, spec: &SourceSpec) -> LogRecord {
        LogRecord::new(&spec.name, line)
            .with_labels(spec.labels.clone())
            .with_raw(line)
    }

    fn parse_bracketed(caps: &Captures<'_>, spec: &SourceSpec, line: &str) -> LogRecord {
        let ts = caps
            .get(1)
            .and_then(|m| timestamp::from_text(m.as_str()))
            .unwrap_or_else(Utc::now);
        let level = caps
            .get(2)
            .map(|m| m.as_str().to_uppercase())
            .unwrap_or_else(|| "INFO".to_string());
        let message = caps.get(3).map(|m| m.as_str()).unwrap_or(line);

        LogRecord::new(&spec.name, message)
            .with_timestamp(ts)
            .with_level(level)
            .with_labels(spec.labels.clone())
            .with_raw(line)
    }

    fn parse_web(&self, caps: &Captures<'_>, spec: &SourceSpec, line: &str) -> LogRecord {
        let status: u16 = caps
            .get(5)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(200);
        let level = if status >= 500 {
            "ERROR"
        } else if status >= 400 {
            "WARN"
        } else {
            "INFO"
        };
        let method = caps.get(3).map(|m| m.as_str()).unwrap_or("");
        let path = caps.get(4).map(|m| m.as_str()).unwrap_or("");
        let ts = caps
            .get(2)
            .and_then(|m| parse_web_timestamp(m.as_str()))
            .unwrap_or_else(Utc::now);

        let mut attributes = Map::new();
        if let Some(client) = caps.get(1) {
            attributes.insert("client_ip".to_string(), Value::from(client.as_str()));
        }
        attributes.insert("method".to_string(), Value::from(method));
        attributes.insert("path".to_string(), Value::from(path));
        attributes.insert("status_code".to_string(), Value::from(status));
        let bytes_sent: u64 = caps
            .get(6)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        attributes.insert("bytes_sent".to_string(), Value::from(bytes_sent));
        if self.extended {
            if let Some(referer) = caps.get(7) {
                attributes.insert("referer".to_string(), Value::from(referer.as_str()));
            }
            if let Some(user_agent) = caps.get(8) {
                attributes.insert("user_agent".to_string(), Value::from(user_agent.as_str()));
            }
        }

        LogRecord::new(&spec.name, format!("{} {} - {}", method, path, status))
            .with_timestamp(ts)
            .with_level(level)
            .with_labels(spec.labels.clone())
            .with_attributes(attributes)
            .with_raw(line)
    }

    fn parse_syslog(caps: &Captures<'_>, spec: &SourceSpec, line: &str) -> LogRecord {
        let ts = caps
            .get(1)
            .and_then(|m| parse_syslog_timestamp(m.as_str()))
            .unwrap_or_else(Utc::now);
        let message = caps.get(5).map(|m| m.as_str()).unwrap_or(line);

        let mut attributes = Map::new();
        if let Some(hostname) = caps.get(2) {
            attributes.insert("hostname".to_string(), Value::from(hostname.as_str()));
        }
        if let Some(process) = caps.get(3) {
            attributes.insert("process".to_string(), Value::from(process.as_str()));
        }
        let pid: u32 = caps
            .get(4)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        attributes.insert("pid".to_string(), Value::from(pid));

        LogRecord::new(&spec.name, message)
            .with_timestamp(ts)
            .with_labels(spec.labels.clone())
            .with_attributes(attributes)
            .with_raw(line)
    }
}

impl LineParser for RegexParser {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn parse(&self, line: &str, spec: &SourceSpec) -> Option<LogRecord> {
        if line.trim().is_empty() {
            return None;
        }

        let Some(regex) = &self.regex else {
            return Some(Self::plain_text(line, spec));
        };
        let Some(caps) = regex.captures(line) else {
            return Some(Self::plain_text(line, spec));
        };

        Some(match self.family {
            Family::Web => self.parse_web(&caps, spec, line),
            Family::Syslog => Self::parse_syslog(&caps, spec, line),
            Family::Bracketed => Self::parse_bracketed(&caps, spec, line),
        })
    }
}

/// Web access log timestamps: 10/Oct/2024:13:55:36 -0700
fn parse_web_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(text, "%d/%b/%Y:%H:%M:%S %z")
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Syslog timestamps carry no year: Jan  5 14:32:01
fn parse_syslog_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let with_year = format!("{} {}", Utc::now().year(), text);
    NaiveDateTime::parse_from_str(&with_year, "%Y %b %e %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
