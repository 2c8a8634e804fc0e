use serde_json::Value;

use crate::error::AppError;
use crate::llm::{GenerateRequest, ImageInput, LlmClient};

use super::parse_json_object;

pub(crate) fn build_prompt(keys: &[&str]) -> String {
    let key_list = serde_json::to_string(keys).unwrap_or_default();
    format!(
        "Extract the following fields from the document and return as JSON:\n\
         {key_list}\n\
         Also for each key, give confidence score as '<key>_confident_score', \
         explaining how confident you are about this match, ranging between 0-1.\n\
         Only return JSON. No explanation."
    )
}

/// Reads the requested fields off a document image.
#[tracing::instrument(
    name = "pipeline_stage extract",
    skip(llm_client, image, keys),
    fields(
        pipeline.stage = "extract",
        extract.keys = keys.len(),
        extract.parsed,
    )
)]
pub async fn extract(
    llm_client: &LlmClient,
    model: &str,
    image: &ImageInput,
    keys: &[&str],
) -> Result<Value, AppError> {
    let resp = llm_client
        .generate(&GenerateRequest {
            model: model.to_string(),
            system: String::new(),
            prompt: build_prompt(keys),
            images: vec![image.clone()],
            temperature: 0.0,
            max_tokens: 500,
            stage: "extract".to_string(),
        })
        .await
        .map_err(|e| AppError::Llm(e.to_string()))?;

    let extracted = parse_json_object(&resp.content);
    tracing::Span::current().record("extract.parsed", extracted.get("error").is_none());

    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_keys() {
        let prompt = build_prompt(&["npi", "Enumeration Date"]);
        assert!(prompt.contains(r#"["npi","Enumeration Date"]"#));
        assert!(prompt.contains("_confident_score"));
        assert!(prompt.ends_with("Only return JSON. No explanation."));
    }
}
