use serde_json::Value;

use crate::error::AppError;
use crate::llm::{GenerateRequest, ImageInput, LlmClient};

use super::parse_json_object;

const LAYOUT_PROMPT: &str = "You are given two images of documents. The first is a reference \
template, the second was submitted by a provider. Decide if they follow the same general \
layout and formatting style.

Make a soft comparison. Do not be strict.

Focus on:
- General background layout and visual style
- Rough positioning of key elements like photo, signature, and key fields (Name, DOB, license number)
- Overall document structure and form style (ID, license, certificate)

Ignore:
- Exact text content or field values
- Small shifts in alignment, spacing, font, or color
- Presence or absence of some optional fields
- Differences in handwriting, personal details, or signatures

The goal is to determine if these two documents could be considered the same type of form, \
visually from the same template family.

Respond only in this JSON format:
{
  \"match\": true or false,
  \"reason\": short explanation naming any misplaced field,
  \"confidance_score\": a decimal number representing the match score
}
If the answer is false, validate again before returning.";

/// Asks the model whether the submitted document matches the reference
/// template family. The reply keeps the `confidance_score` key as stored.
#[tracing::instrument(
    name = "pipeline_stage layout",
    skip(llm_client, reference, submitted),
    fields(pipeline.stage = "layout", layout.match)
)]
pub async fn compare_layout(
    llm_client: &LlmClient,
    model: &str,
    reference: &ImageInput,
    submitted: &ImageInput,
) -> Result<Value, AppError> {
    let resp = llm_client
        .generate(&GenerateRequest {
            model: model.to_string(),
            system: String::new(),
            prompt: LAYOUT_PROMPT.to_string(),
            images: vec![reference.clone(), submitted.clone()],
            temperature: 1.0,
            max_tokens: 100,
            stage: "layout".to_string(),
        })
        .await
        .map_err(|e| AppError::Llm(e.to_string()))?;

    let verdict = parse_json_object(&resp.content);
    if let Some(matched) = verdict.get("match").and_then(Value::as_bool) {
        tracing::Span::current().record("layout.match", matched);
    }

    Ok(verdict)
}
