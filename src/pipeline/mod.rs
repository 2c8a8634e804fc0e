pub mod extract;
pub mod fields;
pub mod layout;
pub mod orchestrator;
pub mod render;
pub mod worker;

pub use orchestrator::{PipelineInput, PipelineResult, run_pipeline};
pub use render::{DocumentImager, PageRenderer, PdfiumRenderer};

use serde_json::{Value, json};

pub const PARSE_FAILURE: &str = "Failed to parse JSON from response";

/// Document types the pipeline can verify, in claim order.
pub const SUPPORTED_TYPES: [&str; 3] = ["dl", "npi", "degree"];

/// Fields the vision model is asked to read for each document type.
pub fn reference_keys(file_type: &str) -> Option<&'static [&'static str]> {
    match file_type {
        "dl" => Some(&[
            "fn", "dl", "ln", "class", "dob", "sex", "hair", "eyes", "hgt", "wgt", "exp",
        ]),
        "npi" => Some(&["npi", "Enumeration Date", "Status", "Primary Practice Address"]),
        "degree" => Some(&["degree", "college name", "year", "major"]),
        _ => None,
    }
}

pub(crate) fn extract_json(content: &str) -> String {
    if let Some(start) = content.find("```json")
        && let Some(end) = content[start + 7..].find("```")
    {
        return content[start + 7..start + 7 + end].trim().to_string();
    }
    if let Some(start) = content.find("```")
        && let Some(end) = content[start + 3..].find("```")
    {
        let inner = content[start + 3..start + 3 + end].trim();
        if inner.starts_with('{') {
            return inner.to_string();
        }
    }
    if let Some(start) = content.find('{')
        && let Some(end) = content.rfind('}')
        && start < end
    {
        return content[start..=end].to_string();
    }
    content.to_string()
}

/// Parses the JSON object out of a model reply. Anything that is not an
/// object becomes the `{"error": ...}` marker stored alongside the document.
pub fn parse_json_object(content: &str) -> Value {
    match serde_json::from_str::<Value>(&extract_json(content)) {
        Ok(value @ Value::Object(_)) => value,
        _ => json!({ "error": PARSE_FAILURE }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_raw() {
        let input = r#"{"fn": "JANE", "fn_confident_score": 0.9}"#;
        let parsed: Value = serde_json::from_str(&extract_json(input)).unwrap();
        assert_eq!(parsed["fn"], "JANE");
    }

    #[test]
    fn test_extract_json_markdown_block() {
        let input = "Here you go:\n```json\n{\"match\": true}\n```\nDone.";
        assert_eq!(extract_json(input), "{\"match\": true}");
    }

    #[test]
    fn test_extract_json_generic_code_block() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(extract_json(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_extract_json_generic_block_not_object_falls_through() {
        let input = "```\nplain text\n``` then {\"a\": 1}";
        assert_eq!(extract_json(input), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_embedded_in_text() {
        let input = "The result is {\"a\": 1} and that's it.";
        assert_eq!(extract_json(input), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_no_json() {
        let input = "No JSON here at all";
        assert_eq!(extract_json(input), input);
    }

    #[test]
    fn test_parse_json_object_fallback() {
        assert_eq!(
            parse_json_object("I could not read this document."),
            json!({"error": "Failed to parse JSON from response"})
        );
        assert_eq!(
            parse_json_object("```json\n[1, 2]\n```"),
            json!({"error": "Failed to parse JSON from response"})
        );
        assert_eq!(
            parse_json_object("{\"match\": tru"),
            json!({"error": "Failed to parse JSON from response"})
        );
    }

    #[test]
    fn test_parse_json_object_ok() {
        let value = parse_json_object("```json\n{\"match\": false, \"reason\": \"photo moved\"}\n```");
        assert_eq!(value["match"], false);
        assert_eq!(value["reason"], "photo moved");
    }

    #[test]
    fn test_reference_keys() {
        assert_eq!(reference_keys("dl").map(|k| k.len()), Some(11));
        assert_eq!(reference_keys("npi").unwrap()[1], "Enumeration Date");
        assert_eq!(reference_keys("degree").unwrap()[1], "college name");
        assert!(reference_keys("cv").is_none());
        for file_type in SUPPORTED_TYPES {
            assert!(reference_keys(file_type).is_some());
        }
    }
}
