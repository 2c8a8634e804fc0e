use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::AppState;
use crate::db::documents::{self, DocumentRow, PipelineOutcome};
use crate::db::forms::FormRow;
use crate::db::{applications, events, forms};
use crate::error::{AppError, AppResult};
use crate::status::human_doc_label;
use crate::storage;
use crate::telemetry::metrics::{
    PIPELINE_DOCUMENT_DURATION, PIPELINE_DOCUMENTS_PROCESSED, PIPELINE_FIELD_MISMATCHES,
};

use super::fields::mismatched_fields;
use super::{PipelineInput, SUPPORTED_TYPES, reference_keys, run_pipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Processed,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Processed => "processed",
            Outcome::Failed => "failed",
        }
    }
}

/// Values the provider typed on the intake form, keyed the way the
/// extraction prompt names them.
pub fn provided_fields(file_type: &str, form: &FormRow) -> Map<String, Value> {
    let text = |v: &Option<String>| Value::String(v.clone().unwrap_or_default());

    let pairs: Vec<(&str, Value)> = match file_type {
        "dl" => vec![
            ("fn", text(&form.provider_name)),
            ("ln", text(&form.provider_last_name)),
            ("dl", text(&form.dl_number)),
        ],
        "npi" => vec![
            ("fn", text(&form.provider_name)),
            ("ln", text(&form.provider_last_name)),
            ("npi", text(&form.npi)),
        ],
        "degree" => vec![
            ("degree", text(&form.degree_type)),
            ("college name", text(&form.university)),
            ("year", text(&form.year)),
        ],
        _ => Vec::new(),
    };

    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn failure_message(err: &AppError) -> String {
    match err {
        AppError::Validation(msg)
        | AppError::NotFound(msg)
        | AppError::Conflict(msg)
        | AppError::Llm(msg)
        | AppError::Pipeline(msg)
        | AppError::Internal(msg) => msg.clone(),
        other => other.to_string(),
    }
}

/// Claims the oldest `New` document of a supported type and runs it.
/// Returns `None` when nothing is waiting.
pub async fn process_next(state: &AppState) -> AppResult<Option<(i64, Outcome)>> {
    let Some(doc) = documents::claim_next_new(&state.pool, &SUPPORTED_TYPES).await? else {
        return Ok(None);
    };

    let outcome = process_claimed(state, &doc).await;
    Ok(Some((doc.id, outcome)))
}

/// Runs the pipeline on one document right away and returns its updated row.
pub async fn process_document(state: &AppState, id: i64) -> AppResult<DocumentRow> {
    let doc = documents::get_document(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Document not found".to_string()))?;

    if reference_keys(&doc.file_type).is_none() {
        return Err(AppError::Validation(format!(
            "Document type '{}' cannot be verified automatically",
            doc.file_type
        )));
    }

    let claimed = documents::claim_document(&state.pool, id)
        .await?
        .ok_or_else(|| {
            AppError::Conflict("Document is being processed, was replaced or is already approved".to_string())
        })?;

    process_claimed(state, &claimed).await;

    documents::get_document(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Document not found".to_string()))
}

/// Drains up to `limit` waiting documents.
pub async fn drain(state: &AppState, limit: usize) -> AppResult<Vec<(i64, Outcome)>> {
    let mut done = Vec::new();
    while done.len() < limit {
        match process_next(state).await? {
            Some(result) => done.push(result),
            None => break,
        }
    }
    Ok(done)
}

#[tracing::instrument(
    name = "pipeline process_document",
    skip(state, doc),
    fields(document.id = doc.id, document.type = %doc.file_type, document.outcome)
)]
async fn process_claimed(state: &AppState, doc: &DocumentRow) -> Outcome {
    let start = Instant::now();

    let outcome = match verify(state, doc).await {
        Ok(()) => Outcome::Processed,
        Err(e) => {
            let message = failure_message(&e);
            tracing::warn!(document_id = doc.id, error = %message, "Document verification failed");
            if let Err(db_err) =
                documents::record_pipeline_error(&state.pool, doc.id, &message).await
            {
                tracing::error!(document_id = doc.id, error = %db_err, "Failed to record pipeline error");
            }
            Outcome::Failed
        }
    };

    let attrs = [
        KeyValue::new("document.type", doc.file_type.clone()),
        KeyValue::new("outcome", outcome.as_str()),
    ];
    PIPELINE_DOCUMENT_DURATION.record(start.elapsed().as_secs_f64(), &attrs);
    PIPELINE_DOCUMENTS_PROCESSED.add(1, &attrs);
    tracing::Span::current().record("document.outcome", outcome.as_str());

    outcome
}

async fn verify(state: &AppState, doc: &DocumentRow) -> AppResult<()> {
    let pool = &state.pool;
    let keys = reference_keys(&doc.file_type).ok_or_else(|| {
        AppError::Validation(format!("No reference keys for type '{}'", doc.file_type))
    })?;

    let form = forms::get_form(pool, &doc.form_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Form data not found".to_string()))?;

    let label = human_doc_label(Some(doc.file_type.as_str()));
    if let Some(app_id) = applications::mark_ai_read_started(pool, &doc.form_id).await? {
        events::insert_event(
            pool,
            &app_id,
            events::AI_READ_STARTED,
            &format!("AI started reading {label}"),
        )
        .await?;
    }

    let provided = provided_fields(&doc.file_type, &form);
    let ext = doc.file_extension.as_deref().unwrap_or("");
    let reference_path = storage::reference_path(&state.config.reference_dir, &doc.file_type, ext);
    let user_path = storage::upload_path(&state.config.upload_dir, &doc.filename, &doc.form_id);

    let result = run_pipeline(
        &state.llm_client,
        &state.imager,
        &state.config.llm_model_vision,
        &PipelineInput {
            keys,
            reference_path: &reference_path,
            user_path: &user_path,
            provided: &provided,
        },
    )
    .await?;

    documents::record_pipeline_result(
        pool,
        doc.id,
        &PipelineOutcome {
            ocr_output: &result.extracted_json,
            pdf_match: &result.pdf_match,
            json_match: &result.json_match,
        },
    )
    .await?;

    let mismatches = mismatched_fields(&result.json_match);
    PIPELINE_FIELD_MISMATCHES.record(
        mismatches.len() as f64,
        &[KeyValue::new("document.type", doc.file_type.clone())],
    );

    if let Some(app) = applications::find_by_form_id(pool, &doc.form_id).await? {
        let message = if mismatches.is_empty() {
            format!("AI finished reading {label}")
        } else {
            format!(
                "AI finished reading {label}; mismatched fields: {}",
                mismatches.join(", ")
            )
        };
        events::insert_event(pool, &app.id, events::AI_READ_COMPLETE, &message).await?;
    }

    tracing::info!(
        document_id = doc.id,
        mismatches = mismatches.len(),
        "Document verified"
    );

    Ok(())
}

/// Polls for new documents until the shutdown channel fires.
pub async fn run_worker(state: AppState, mut shutdown: broadcast::Receiver<()>) {
    let period = Duration::from_secs(state.config.pipeline_poll_interval_secs.max(1));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(interval_secs = period.as_secs(), "Pipeline worker started");

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = interval.tick() => {
                match process_next(&state).await {
                    Ok(Some((id, outcome))) => {
                        tracing::debug!(document_id = id, outcome = outcome.as_str(), "Worker tick processed a document");
                    }
                    Ok(None) => {}
                    Err(e) => tracing::error!(error = %e, "Pipeline worker tick failed"),
                }
            }
        }
    }

    tracing::info!("Pipeline worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn form() -> FormRow {
        FormRow {
            id: 1,
            form_id: "form-1".to_string(),
            provider_id: None,
            provider_name: Some("Jane".to_string()),
            provider_last_name: Some("Doe".to_string()),
            npi: Some("1234567893".to_string()),
            dob: None,
            email: None,
            phone: None,
            specialty: None,
            address: None,
            degree_type: Some("MD".to_string()),
            university: Some("State University".to_string()),
            year: Some("2010".to_string()),
            training_type: None,
            experience: None,
            last_org: None,
            work_history_desc: None,
            dl_number: None,
            ml_number: None,
            other_name: None,
            additional_info: None,
            info_correct: None,
            consent_verification: None,
            dl_upload_id: None,
            npi_upload_id: None,
            degree_upload_id: None,
            training_upload_id: None,
            cv_upload_id: None,
            work_history_upload_id: None,
            ml_upload_id: None,
            other_upload_id: None,
            malpractice_upload_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_provided_fields_dl() {
        let fields = provided_fields("dl", &form());
        let keys: Vec<&String> = fields.keys().collect();
        assert_eq!(keys, vec!["fn", "ln", "dl"]);
        assert_eq!(fields["fn"], "Jane");
        assert_eq!(fields["dl"], "");
    }

    #[test]
    fn test_provided_fields_degree() {
        let fields = provided_fields("degree", &form());
        assert_eq!(fields["college name"], "State University");
        assert_eq!(fields["year"], "2010");
    }

    #[test]
    fn test_provided_fields_unknown_type() {
        assert!(provided_fields("cv", &form()).is_empty());
    }

    #[test]
    fn test_failure_message_uses_inner_text() {
        let err = AppError::NotFound("Form data not found".to_string());
        assert_eq!(failure_message(&err), "Form data not found");
    }
}
