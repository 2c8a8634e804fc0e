use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::llm::LlmClient;

use super::render::DocumentImager;
use super::{extract, fields, layout};

pub struct PipelineInput<'a> {
    pub keys: &'a [&'a str],
    pub reference_path: &'a Path,
    pub user_path: &'a Path,
    pub provided: &'a Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub extracted_json: Value,
    pub pdf_match: Value,
    pub json_match: Value,
}

#[tracing::instrument(
    name = "pipeline document",
    skip(llm_client, imager, input),
    fields(
        pipeline.user_path = %input.user_path.display(),
        pipeline.duration_ms,
    )
)]
pub async fn run_pipeline(
    llm_client: &LlmClient,
    imager: &DocumentImager,
    model: &str,
    input: &PipelineInput<'_>,
) -> Result<PipelineResult, AppError> {
    let start = std::time::Instant::now();

    let user_image = imager.load(input.user_path).await?;
    let extracted_json = extract::extract(llm_client, model, &user_image, input.keys).await?;

    let reference_image = imager.load(input.reference_path).await?;
    let pdf_match =
        layout::compare_layout(llm_client, model, &reference_image, &user_image).await?;

    let json_match = fields::compare_fields(&extracted_json, input.provided);

    tracing::Span::current().record("pipeline.duration_ms", start.elapsed().as_millis() as u64);

    Ok(PipelineResult {
        extracted_json,
        pdf_match,
        json_match,
    })
}
