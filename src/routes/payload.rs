//! Lenient readers for loosely-typed JSON payloads coming from the intake UI,
//! which sends numbers as strings and booleans in several spellings.

use serde_json::{Map, Value};

use crate::config::parse_flag;

pub fn text(data: &Map<String, Value>, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// First present key wins, so legacy spellings can be listed as fallbacks.
pub fn text_any(data: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| text(data, k))
}

pub fn int(data: &Map<String, Value>, key: &str) -> Option<i64> {
    match data.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn int_any(data: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|k| int(data, k))
}

pub fn flag(data: &Map<String, Value>, key: &str) -> Option<bool> {
    match data.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(parse_flag(s)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_text_coerces_scalars() {
        let data = map(json!({"a": "x", "b": 2015, "c": true, "d": null}));
        assert_eq!(text(&data, "a").as_deref(), Some("x"));
        assert_eq!(text(&data, "b").as_deref(), Some("2015"));
        assert_eq!(text(&data, "c").as_deref(), Some("true"));
        assert_eq!(text(&data, "d"), None);
        assert_eq!(text(&data, "missing"), None);
    }

    #[test]
    fn test_int_accepts_numeric_strings() {
        let data = map(json!({"a": 12, "b": " 40 ", "c": "x"}));
        assert_eq!(int(&data, "a"), Some(12));
        assert_eq!(int(&data, "b"), Some(40));
        assert_eq!(int(&data, "c"), None);
        assert_eq!(int_any(&data, &["missing", "a"]), Some(12));
    }

    #[test]
    fn test_flag_spellings() {
        let data = map(json!({"a": true, "b": "yes", "c": "off", "d": 1, "e": ""}));
        assert_eq!(flag(&data, "a"), Some(true));
        assert_eq!(flag(&data, "b"), Some(true));
        assert_eq!(flag(&data, "c"), Some(false));
        assert_eq!(flag(&data, "d"), Some(true));
        assert_eq!(flag(&data, "e"), None);
    }
}
