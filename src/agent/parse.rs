//! Recovery of finding arrays from free-form model output.
//!
//! Models wrap JSON in prose and code fences more often than not. The
//! strategies below are tried in order and the first one that yields a
//! JSON array wins; anything else means "no findings".

use crate::models::Severity;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn json_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json\s*(\[.*?\])\s*```").expect("valid regex"))
}

fn bare_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```\s*(\[.*?\])\s*```").expect("valid regex"))
}

/// Extract the first JSON array from model output.
pub fn extract_json_array(text: &str) -> Vec<Value> {
    let text = text.trim();

    if let Some(items) = parse_array(text) {
        return items;
    }

    for re in [json_fence(), bare_fence()] {
        if let Some(items) = re
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_array(m.as_str()))
        {
            return items;
        }
    }

    for (start, _) in text.match_indices('[') {
        if let Some(end) = balanced_end(&text[start..]) {
            if let Some(items) = parse_array(&text[start..start + end]) {
                return items;
            }
        }
    }

    Vec::new()
}

fn parse_array(candidate: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Array(items)) => Some(items),
        _ => None,
    }
}

/// Byte length of the bracket-balanced span starting at `s[0] == '['`,
/// ignoring brackets inside string literals.
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// One finding as reported by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportedFinding {
    pub category: Option<String>,
    pub severity: Severity,
    pub title: String,
    pub detail: String,
    pub recommendation: String,
}

impl ReportedFinding {
    /// Build from a JSON object, filling gaps with defaults. Non-objects yield `None`.
    pub fn from_json(item: &Value) -> Option<Self> {
        let obj = item.as_object()?;
        let text = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);

        Some(Self {
            category: text("category"),
            severity: Severity::parse_lenient(&text("severity").unwrap_or_default()),
            title: text("title").unwrap_or_else(|| "Unknown issue".to_string()),
            detail: text("detail").unwrap_or_default(),
            recommendation: text("recommendation").unwrap_or_default(),
        })
    }
}

/// Parse model output straight into reported findings.
pub fn parse_findings(text: &str) -> Vec<ReportedFinding> {
    extract_json_array(text)
        .iter()
        .filter_map(ReportedFinding::from_json)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_array() {
        let items = extract_json_array("  [{\"title\": \"a\"}]  ");
        assert_eq!(items, vec![json!({"title": "a"})]);
    }

    #[test]
    fn test_empty_array() {
        assert!(extract_json_array("[]").is_empty());
    }

    #[test]
    fn test_json_fenced_block() {
        let text = "Here is my analysis:\n```json\n[{\"title\": \"High CRC\"}]\n```\nDone.";
        let items = extract_json_array(text);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["title"], "High CRC");
    }

    #[test]
    fn test_bare_fenced_block() {
        let text = "Result:\n```\n[{\"title\": \"x\"}, {\"title\": \"y\"}]\n```";
        assert_eq!(extract_json_array(text).len(), 2);
    }

    #[test]
    fn test_embedded_array_with_nested_brackets() {
        let text = r#"I found [1 issue]: [{"title": "Peer down [10.0.0.1]", "tags": ["bgp", "core"]}] end"#;
        let items = extract_json_array(text);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["title"], "Peer down [10.0.0.1]");
        assert_eq!(items[0]["tags"], json!(["bgp", "core"]));
    }

    #[test]
    fn test_escaped_quote_inside_string() {
        let text = r#"see [{"title": "a \"quoted] title"}]"#;
        let items = extract_json_array(text);
        assert_eq!(items[0]["title"], "a \"quoted] title");
    }

    #[test]
    fn test_object_is_not_an_array() {
        assert!(extract_json_array("{\"title\": \"x\"}").is_empty());
    }

    #[test]
    fn test_garbage_yields_empty() {
        assert!(extract_json_array("No issues to report, everything looks fine.").is_empty());
        assert!(extract_json_array("[unterminated").is_empty());
        assert!(extract_json_array("").is_empty());
    }

    #[test]
    fn test_reported_finding_defaults() {
        let f = ReportedFinding::from_json(&json!({"severity": "urgent"})).unwrap();
        assert_eq!(f.severity, Severity::Info);
        assert_eq!(f.title, "Unknown issue");
        assert!(f.category.is_none());
        assert!(ReportedFinding::from_json(&json!("just a string")).is_none());
    }

    #[test]
    fn test_parse_findings() {
        let text = r#"[{"severity":"warning","title":"High CRC","detail":"d","recommendation":"r"}, 3]"#;
        let findings = parse_findings(text);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warning);
        assert_eq!(findings[0].recommendation, "r");
    }
}
