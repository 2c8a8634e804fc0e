use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::AppState;
use crate::db::applications::{self, ApplicationFields, ApplicationRow};
use crate::db::documents::{self, DocumentRow, parse_json_column};
use crate::db::emails::{self, EmailRow};
use crate::db::forms::{self, FormRow};
use crate::db::{events, reports as report_rows};
use crate::error::{AppError, AppResult};
use crate::report;
use crate::status::{CommitteeStatus, PsvStatus, compute_progress, document, human_doc_label, npi_is_valid};

use super::payload::{int, text, text_any};

const DEFAULT_EVENT_LIMIT: i64 = 50;

/// Application as the dashboard reads it. `status` mirrors `psvStatus`
/// for clients written against the single-status contract.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationView {
    pub id: String,
    pub form_id: Option<String>,
    pub provider_id: Option<String>,
    pub name: Option<String>,
    pub provider_last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: String,
    pub psv_status: String,
    pub committee_status: String,
    pub psv_original_label: Option<String>,
    pub progress: i64,
    pub assignee: Option<String>,
    pub source: Option<String>,
    pub market: Option<String>,
    pub specialty: Option<String>,
    pub address: Option<String>,
    pub npi: Option<String>,
    #[serde(rename = "create_dt")]
    pub create_dt: DateTime<Utc>,
    #[serde(rename = "last_updt_dt")]
    pub last_updt_dt: DateTime<Utc>,
}

impl From<ApplicationRow> for ApplicationView {
    fn from(row: ApplicationRow) -> Self {
        Self {
            id: row.id,
            form_id: row.form_id,
            provider_id: row.provider_id,
            name: row.name,
            provider_last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            status: row.psv_status.clone(),
            psv_status: row.psv_status,
            committee_status: row.committee_status,
            psv_original_label: row.psv_original_label,
            progress: row.progress,
            assignee: row.assignee,
            source: row.source,
            market: row.market,
            specialty: row.specialty,
            address: row.address,
            npi: row.npi,
            create_dt: row.create_dt,
            last_updt_dt: row.last_updt_dt,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeBody {
    pub psv_status: Option<String>,
    pub committee_status: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEventBody {
    pub event_type: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<i64>,
}

fn parse_psv(raw: &str) -> AppResult<PsvStatus> {
    PsvStatus::parse(raw).ok_or_else(|| AppError::Validation(format!("Unknown psvStatus '{raw}'")))
}

fn parse_committee(raw: &str) -> AppResult<CommitteeStatus> {
    CommitteeStatus::parse(raw)
        .ok_or_else(|| AppError::Validation(format!("Unknown committeeStatus '{raw}'")))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Builds the stored fields from an upsert body. Statuses absent from the
/// body keep the values of `existing`, or the defaults for a new row.
pub fn application_fields(
    body: &Map<String, Value>,
    existing: Option<&ApplicationRow>,
) -> AppResult<ApplicationFields> {
    let raw_psv = non_blank(text_any(body, &["psvStatus", "status"]));
    let (psv_status, psv_original_label) = match raw_psv.as_deref() {
        Some(raw) => {
            let status = parse_psv(raw)?;
            let label = (raw.trim() != status.as_str()).then(|| raw.trim().to_string());
            (status.as_str().to_string(), label)
        }
        None => (
            existing
                .map(|a| a.psv_status.clone())
                .unwrap_or_else(|| PsvStatus::New.as_str().to_string()),
            None,
        ),
    };

    let committee_status = match non_blank(text(body, "committeeStatus")) {
        Some(raw) => parse_committee(&raw)?.as_str().to_string(),
        None => existing
            .map(|a| a.committee_status.clone())
            .unwrap_or_else(|| CommitteeStatus::NotStarted.as_str().to_string()),
    };

    let progress = int(body, "progress")
        .unwrap_or_else(|| compute_progress(Some(psv_status.as_str()), Some(committee_status.as_str())))
        .clamp(0, 100);

    Ok(ApplicationFields {
        provider_id: text(body, "providerId"),
        form_id: text(body, "formId"),
        name: text(body, "name"),
        last_name: text(body, "providerLastName"),
        email: text(body, "email"),
        phone: text(body, "phone"),
        specialty: text(body, "specialty"),
        address: text(body, "address"),
        npi: text(body, "npi"),
        psv_status,
        committee_status,
        psv_original_label,
        progress,
        assignee: text(body, "assignee"),
        source: text(body, "source"),
        market: text(body, "market"),
    })
}

/// Confidence scores arrive as numbers, numeric strings or "no score".
fn score_value(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Issues a reviewer should look at: field and layout mismatches found by
/// the pipeline, plus a format check of the provider's NPI.
pub fn ai_issues(uploads: &[DocumentRow], form: &FormRow) -> Vec<Value> {
    let mut issues = Vec::new();

    for upload in uploads {
        if let Value::Object(fields) = parse_json_column(upload.json_match.as_deref()) {
            for (field, result) in &fields {
                if result.get("match").and_then(Value::as_bool) == Some(true) {
                    continue;
                }
                let name = field.to_uppercase();
                let extracted = value_text(&result["extracted"]);
                let provided = value_text(&result["provided"]);
                issues.push(json!({
                    "field": name,
                    "issue": format!("{name} field mismatch."),
                    "confidence": score_value(&result["extracted_confident_score"]),
                    "value": result["extracted"],
                    "reasoning": format!(
                        "Extracted value '{extracted}' does not match provided value '{provided}'."
                    ),
                }));
            }
        }

        let layout = parse_json_column(upload.pdf_match.as_deref());
        if layout.get("match").and_then(Value::as_bool) == Some(false) {
            let label = human_doc_label(Some(upload.file_type.as_str()));
            issues.push(json!({
                "field": format!("{label} Document"),
                "issue": format!("{label} layout does not match the reference template."),
                "confidence": score_value(&layout["confidance_score"]),
                "value": "",
                "reasoning": layout["reason"],
            }));
        }
    }

    if let Some(npi) = form.npi.as_deref().filter(|n| !n.trim().is_empty())
        && !npi_is_valid(npi)
    {
        issues.push(json!({
            "field": "NPI",
            "issue": "NPI number failed format validation.",
            "confidence": 1.0,
            "value": npi,
            "reasoning": "An NPI is 10 digits whose last digit is a Luhn check digit over the 80840 prefix.",
        }));
    }

    issues
}

/// `(approved, in_progress, total)` over live documents.
pub fn document_counts(uploads: &[DocumentRow]) -> (usize, usize, usize) {
    let approved = uploads
        .iter()
        .filter(|u| document::is_verified(Some(u.status.as_str())))
        .count();
    let in_progress = uploads
        .iter()
        .filter(|u| document::is_pending(Some(u.status.as_str())))
        .count();
    (approved, in_progress, uploads.len())
}

/// `(sent, draft, pending)` email counts.
pub fn email_counts(emails: &[EmailRow]) -> (usize, usize, usize) {
    let count = |status: &str| {
        emails
            .iter()
            .filter(|e| e.status.eq_ignore_ascii_case(status))
            .count()
    };
    (count("SENT"), count("DRAFT"), count("PENDING"))
}

async fn require_application(state: &AppState, id: &str) -> AppResult<ApplicationRow> {
    applications::get_application(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Application not found".to_string()))
}

async fn require_form(state: &AppState, application: &ApplicationRow) -> AppResult<FormRow> {
    let form_id = application.form_id.as_deref().unwrap_or_default();
    forms::get_form(&state.pool, form_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Form data not found".to_string()))
}

#[tracing::instrument(name = "upsert_application", skip(state, body))]
pub async fn upsert_application(
    State(state): State<AppState>,
    Json(body): Json<Map<String, Value>>,
) -> AppResult<Json<ApplicationView>> {
    let form_id = non_blank(text(&body, "formId"))
        .ok_or_else(|| AppError::Validation("formId is required".to_string()))?;

    let mut tx = state.pool.begin().await?;
    let existing = applications::find_by_form_id(&mut *tx, &form_id).await?;
    let fields = application_fields(&body, existing.as_ref())?;

    let row = match existing {
        Some(existing) => {
            let row = applications::update_application(&mut *tx, &existing.id, &fields).await?;
            tracing::info!(app_id = %row.id, form_id, "Application updated");
            row
        }
        None => {
            let id = applications::next_application_id(&mut *tx).await?;
            let row = applications::insert_application(&mut *tx, &id, &fields).await?;
            tracing::info!(app_id = %row.id, form_id, "Application created");
            row
        }
    };
    tx.commit().await?;

    Ok(Json(row.into()))
}

pub async fn list_applications(State(state): State<AppState>) -> AppResult<Json<Vec<ApplicationView>>> {
    let rows = applications::list_applications(&state.pool).await?;
    if rows.is_empty() {
        return Err(AppError::NotFound("No applications found".to_string()));
    }
    Ok(Json(rows.into_iter().map(ApplicationView::from).collect()))
}

pub async fn get_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApplicationView>> {
    Ok(Json(require_application(&state, &id).await?.into()))
}

#[tracing::instrument(name = "change_application_status", skip(state, body))]
pub async fn change_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StatusChangeBody>,
) -> AppResult<Json<ApplicationView>> {
    let psv = non_blank(body.psv_status).map(|s| parse_psv(&s)).transpose()?;
    let committee = non_blank(body.committee_status)
        .map(|s| parse_committee(&s))
        .transpose()?;
    if psv.is_none() && committee.is_none() {
        return Err(AppError::Validation(
            "psvStatus or committeeStatus is required".to_string(),
        ));
    }

    let current = require_application(&state, &id).await?;
    let new_psv = psv.map_or(current.psv_status.as_str(), |s| s.as_str());
    let new_committee = committee.map_or(current.committee_status.as_str(), |s| s.as_str());

    let row = applications::update_statuses(&state.pool, &id, new_psv, new_committee)
        .await?
        .ok_or_else(|| AppError::NotFound("Application not found".to_string()))?;

    let mut message = format!(
        "PSV {} to {}, committee {} to {}.",
        current.psv_status, row.psv_status, current.committee_status, row.committee_status
    );
    if let Some(note) = non_blank(body.note) {
        message.push(' ');
        message.push_str(note.trim());
    }
    events::insert_event(&state.pool, &id, events::STATUS_CHANGE, &message).await?;

    tracing::info!(psv = %row.psv_status, committee = %row.committee_status, progress = row.progress, "Application status changed");
    Ok(Json(row.into()))
}

pub async fn list_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> AppResult<Json<Vec<events::EventRow>>> {
    require_application(&state, &id).await?;
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT).clamp(1, 500);
    Ok(Json(events::recent_events(&state.pool, &id, limit).await?))
}

pub async fn add_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<NewEventBody>,
) -> AppResult<Json<events::EventRow>> {
    let message = non_blank(body.message)
        .ok_or_else(|| AppError::Validation("message is required".to_string()))?;
    let event_type = non_blank(body.event_type).unwrap_or_else(|| "COMMENT".to_string());

    require_application(&state, &id).await?;
    let event = events::insert_event(&state.pool, &id, event_type.trim(), message.trim()).await?;
    Ok(Json(event))
}

pub async fn get_ai_issues(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let application = require_application(&state, &id).await?;
    let form = require_form(&state, &application).await?;
    let uploads = documents::list_active_for_form(&state.pool, &form.form_id).await?;

    Ok(Json(json!({ "issues": ai_issues(&uploads, &form) })))
}

pub async fn get_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let application = require_application(&state, &id).await?;
    let form = require_form(&state, &application).await?;
    let uploads = documents::list_active_for_form(&state.pool, &form.form_id).await?;
    let emails = emails::list_for_application(&state.pool, &application.id).await?;

    let (approved, in_progress, total) = document_counts(&uploads);
    let (sent, draft, pending) = email_counts(&emails);
    let remaining = total.saturating_sub(approved + in_progress);

    Ok(Json(json!({
        "providerName": form.provider_name,
        "providerLastName": form.provider_last_name,
        "npi": form.npi,
        "status": application.psv_status,
        "issues": [],
        "docsSummary": format!(
            "{}/{total} ({approved} approved, {in_progress} in progress)",
            approved + in_progress
        ),
        "emailSummary": format!("{sent} sent, {draft} draft, {pending} pending"),
        "nextActions": [
            format!("Verify {remaining} remaining docs"),
            format!("Review draft, send {pending} emails"),
        ],
    })))
}

pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let result =
        report::generate_credentialing_report(&state.pool, state.report_enhancer(), &id).await?;

    Ok(Json(json!({
        "report": result.markdown,
        "meta": result.data.session_metadata,
        "reportId": result.id,
        "llmEnhanced": result.llm_enhanced,
    })))
}

pub async fn get_summary_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let result = report::generate_short_summary(&state.pool, &id).await?;
    Ok(Json(json!({ "report": result.markdown })))
}

pub async fn get_report_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<report_rows::ReportRow>>> {
    require_application(&state, &id).await?;
    Ok(Json(report_rows::list_for_application(&state.pool, &id).await?))
}
