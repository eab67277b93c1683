//! Structured response parser.
//!
//! Models are asked to reply with a JSON object, usually inside a fenced
//! code block but sometimes raw. Failure is a value here — callers always
//! have a deterministic fallback and never surface the raw failure to the
//! user as final output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").expect("static regex"));

/// Parse failure carrying the raw model text for auditing.
#[derive(Debug, Clone)]
pub struct ParseFailure {
    pub raw: String,
    pub error: String,
}

/// Extract a JSON object from free-form model output.
///
/// Prefers the first fenced code block (tagged `json` or bare); otherwise
/// parses the trimmed whole text. Non-object JSON (arrays, scalars) counts
/// as a failure — every phase expects an object.
pub fn extract_json(text: &str) -> Result<Map<String, Value>, ParseFailure> {
    let candidate = match FENCED_BLOCK.captures(text) {
        Some(captures) => captures[1].trim().to_string(),
        None => text.trim().to_string(),
    };

    match serde_json::from_str::<Value>(&candidate) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ParseFailure {
            raw: text.to_string(),
            error: format!("expected a JSON object, got {}", json_kind(&other)),
        }),
        Err(e) => Err(ParseFailure {
            raw: text.to_string(),
            error: e.to_string(),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// String field accessor treating `null` and missing alike.
pub fn str_field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_fenced_json_block() {
        let text = "Here is my analysis:\n```json\n{\"decision\": \"end\"}\n```\nDone.";
        let map = extract_json(text).unwrap();
        assert_eq!(map.get("decision").unwrap(), "end");
    }

    #[test]
    fn test_parses_untagged_fence() {
        let text = "```\n{\"score\": 85}\n```";
        let map = extract_json(text).unwrap();
        assert_eq!(map.get("score").unwrap(), 85);
    }

    #[test]
    fn test_parses_raw_json() {
        let map = extract_json("  {\"a\": [1, 2]}  ").unwrap();
        assert_eq!(map.get("a").unwrap(), &serde_json::json!([1, 2]));
    }

    #[test]
    fn test_roundtrip_preserves_object() {
        let original = serde_json::json!({
            "decision": "continue",
            "nested": {"scores": [1.5, 2.0]},
            "flag": true
        });
        let fenced = format!("```json\n{}\n```", original);
        let from_fenced = Value::Object(extract_json(&fenced).unwrap());
        let from_raw = Value::Object(extract_json(&original.to_string()).unwrap());
        assert_eq!(from_fenced, original);
        assert_eq!(from_raw, original);
    }

    #[test]
    fn test_failure_carries_raw_text() {
        let text = "I think the answer is probably 42.";
        let failure = extract_json(text).unwrap_err();
        assert_eq!(failure.raw, text);
        assert!(!failure.error.is_empty());
    }

    #[test]
    fn test_non_object_json_is_failure() {
        let failure = extract_json("[1, 2, 3]").unwrap_err();
        assert!(failure.error.contains("array"));
    }

    #[test]
    fn test_prefers_fenced_block_over_surrounding_prose() {
        let text = "{\"wrong\": true} then ```json\n{\"right\": true}\n```";
        let map = extract_json(text).unwrap();
        assert!(map.contains_key("right"));
    }
}
