//! logship parsers
//!
//! Line parsers for the logship agent. Two families: strict JSON and
//! regex-based (built-in web-access/syslog/bracketed patterns, custom
//! patterns, plain-text fallback).

pub mod json;
pub mod regex;
mod timestamp;

pub use json::JsonParser;
pub use self::regex::RegexParser;

use logship_core::{LineParser, SourceSpec};

/// Select the parser for one source
///
/// Format `json` gets the JSON parser; every other declared format, custom
/// pattern, or absence of both gets the regex-family parser. Deterministic
/// and side-effect free; called once per source at discovery time.
pub fn select_parser(spec: &SourceSpec) -> Box<dyn LineParser> {
    if spec.format.as_deref() == Some("json") {
        Box::new(JsonParser::new())
    } else {
        Box::new(RegexParser::for_source(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(format: Option<&str>, pattern: Option<&str>) -> SourceSpec {
        SourceSpec {
            name: "src".to_string(),
            path: "/var/log/test.log".to_string(),
            format: format.map(String::from),
            pattern: pattern.map(String::from),
            labels: None,
            from_beginning: false,
        }
    }

    #[test]
    fn test_json_format_selects_json_parser() {
        let parser = select_parser(&spec(Some("json"), None));
        assert_eq!(parser.name(), "json");
    }

    #[test]
    fn test_everything_else_selects_regex_parser() {
        assert_eq!(select_parser(&spec(None, None)).name(), "regex");
        assert_eq!(select_parser(&spec(Some("nginx"), None)).name(), "regex");
        assert_eq!(select_parser(&spec(Some("unknown"), None)).name(), "regex");
        assert_eq!(
            select_parser(&spec(None, Some(r"^(\S+)$"))).name(),
            "regex"
        );
    }
}
