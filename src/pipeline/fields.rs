use serde_json::{Map, Value, json};

fn stringify(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn normalize(value: Option<&Value>) -> String {
    stringify(value).trim().to_lowercase()
}

/// Compares what the model read against what the provider typed, one entry
/// per provided key, in the provided key order. Values are stored trimmed
/// and lower-cased.
#[tracing::instrument(name = "pipeline_stage fields", skip_all, fields(pipeline.stage = "fields", fields.mismatches))]
pub fn compare_fields(extracted: &Value, provided: &Map<String, Value>) -> Value {
    let mut result = Map::with_capacity(provided.len());
    let mut mismatches = 0usize;

    for (key, provided_value) in provided {
        let extracted_value = normalize(extracted.get(key));
        let provided_value = normalize(Some(provided_value));
        let score = match extracted.get(format!("{key}_confident_score")) {
            None | Some(Value::Null) => "no score".to_string(),
            score => normalize(score),
        };

        let matched = extracted_value == provided_value;
        if !matched {
            mismatches += 1;
        }

        result.insert(
            key.clone(),
            json!({
                "match": matched,
                "extracted": extracted_value,
                "extracted_confident_score": score,
                "provided": provided_value,
            }),
        );
    }

    tracing::Span::current().record("fields.mismatches", mismatches);
    Value::Object(result)
}

/// Field names whose `match` is false in a stored `json_match` value.
pub fn mismatched_fields(json_match: &Value) -> Vec<String> {
    json_match
        .as_object()
        .map(|fields| {
            fields
                .iter()
                .filter(|(_, entry)| entry.get("match").and_then(Value::as_bool) == Some(false))
                .map(|(name, _)| name.clone())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provided(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_case_and_whitespace_are_ignored() {
        let extracted = json!({"fn": " JANE ", "fn_confident_score": 0.95});
        let result = compare_fields(&extracted, &provided(json!({"fn": "jane"})));
        assert_eq!(result["fn"]["match"], true);
        assert_eq!(result["fn"]["extracted"], "jane");
        assert_eq!(result["fn"]["extracted_confident_score"], "0.95");
        assert_eq!(result["fn"]["provided"], "jane");
    }

    #[test]
    fn test_missing_extracted_key() {
        let result = compare_fields(&json!({}), &provided(json!({"dl": "D123"})));
        assert_eq!(result["dl"]["match"], false);
        assert_eq!(result["dl"]["extracted"], "");
        assert_eq!(result["dl"]["extracted_confident_score"], "no score");
    }

    #[test]
    fn test_null_matches_empty_provided() {
        let extracted = json!({"ln": null});
        let result = compare_fields(&extracted, &provided(json!({"ln": ""})));
        assert_eq!(result["ln"]["match"], true);
    }

    #[test]
    fn test_numeric_values_compare_as_text() {
        let extracted = json!({"year": 2015, "year_confident_score": "0.8"});
        let result = compare_fields(&extracted, &provided(json!({"year": "2015"})));
        assert_eq!(result["year"]["match"], true);
        assert_eq!(result["year"]["extracted"], "2015");
        assert_eq!(result["year"]["extracted_confident_score"], "0.8");
    }

    #[test]
    fn test_only_provided_keys_in_provided_order() {
        let extracted = json!({"fn": "a", "sex": "F", "ln": "b"});
        let result = compare_fields(&extracted, &provided(json!({"ln": "b", "fn": "a"})));
        let keys: Vec<&String> = result.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["ln", "fn"]);
    }

    #[test]
    fn test_error_marker_produces_mismatches() {
        let extracted = json!({"error": "Failed to parse JSON from response"});
        let result = compare_fields(&extracted, &provided(json!({"npi": "1234567893"})));
        assert_eq!(mismatched_fields(&result), vec!["npi".to_string()]);
    }

    #[test]
    fn test_mismatched_fields_ignores_non_objects() {
        assert!(mismatched_fields(&json!("nope")).is_empty());
        assert!(mismatched_fields(&json!({"fn": {"match": true}})).is_empty());
    }
}
