use axum::{
    Json,
    extract::{Query, State},
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::AppState;
use crate::db::forms::{self, FormFields, FormRow};
use crate::error::{AppError, AppResult};

use super::payload::{flag, int, int_any, text};
use super::resolve_form;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFormBody {
    pub form_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormBody {
    pub form_id: String,
    #[serde(default)]
    pub type_form: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormLookup {
    pub form_id: Option<String>,
    pub app_id: Option<String>,
}

/// Maps the intake UI's keys onto form columns.
pub fn fields_from_payload(data: &Map<String, Value>) -> AppResult<FormFields> {
    let dob = match text(data, "dob").filter(|s| !s.trim().is_empty()) {
        Some(raw) => Some(
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|_| AppError::Validation(format!("Invalid dob '{raw}', use YYYY-MM-DD")))?,
        ),
        None => None,
    };

    Ok(FormFields {
        provider_id: text(data, "providerId"),
        provider_name: text(data, "providerName"),
        provider_last_name: text(data, "providerLastName"),
        npi: text(data, "npi"),
        dob,
        email: text(data, "email"),
        phone: text(data, "phone"),
        specialty: text(data, "specialty"),
        address: text(data, "address"),
        degree_type: text(data, "degreeType"),
        university: text(data, "university"),
        year: text(data, "year"),
        training_type: text(data, "training-type"),
        experience: text(data, "experience"),
        last_org: text(data, "lastOrg"),
        work_history_desc: text(data, "work-history-desc"),
        dl_number: text(data, "dl-number"),
        ml_number: text(data, "ml-number"),
        other_name: text(data, "other-name"),
        additional_info: text(data, "additional-info"),
        info_correct: flag(data, "info-correct"),
        consent_verification: flag(data, "consent-verification"),
        dl_upload_id: int(data, "dl-upload-id"),
        npi_upload_id: int(data, "npi-upload-id"),
        degree_upload_id: int(data, "degree-upload-id"),
        training_upload_id: int(data, "training-upload-id"),
        cv_upload_id: int(data, "cv-upload-id"),
        work_history_upload_id: int_any(
            data,
            &["work-history-upload-id", "work_history-upload-id"],
        ),
        ml_upload_id: int(data, "ml-upload-id"),
        other_upload_id: int(data, "other-upload-id"),
        malpractice_upload_id: int(data, "malpractice-upload-id"),
    })
}

/// Response shape the intake UI reads back; keys are mixed-case on purpose.
pub fn form_view(form: &FormRow) -> Value {
    json!({
        "providerId": form.provider_id,
        "providerName": form.provider_name,
        "providerLastName": form.provider_last_name,
        "npi": form.npi,
        "dob": form.dob,
        "email": form.email,
        "phone": form.phone,
        "specialty": form.specialty,
        "address": form.address,
        "degreeType": form.degree_type,
        "university": form.university,
        "year": form.year,
        "training_type": form.training_type,
        "experience": form.experience,
        "lastOrg": form.last_org,
        "work_history_desc": form.work_history_desc,
        "dl_number": form.dl_number,
        "ml_number": form.ml_number,
        "other_name": form.other_name,
        "additional_info": form.additional_info,
        "info-correct": form.info_correct,
        "consent-verification": form.consent_verification,
        "dl-upload-id": form.dl_upload_id,
        "npi-upload-id": form.npi_upload_id,
        "degree-upload-id": form.degree_upload_id,
        "training-upload-id": form.training_upload_id,
        "cv-upload-id": form.cv_upload_id,
        "work_history-upload-id": form.work_history_upload_id,
        "ml-upload-id": form.ml_upload_id,
        "other-upload-id": form.other_upload_id,
        "malpractice-upload-id": form.malpractice_upload_id,
    })
}

fn require_form_id(form_id: &str) -> AppResult<&str> {
    let trimmed = form_id.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("formId is required".to_string()));
    }
    Ok(trimmed)
}

pub async fn create_form(
    State(state): State<AppState>,
    Json(body): Json<CreateFormBody>,
) -> AppResult<Json<Value>> {
    let form_id = require_form_id(body.form_id.as_deref().unwrap_or(""))?;

    if !forms::create_form(&state.pool, form_id).await? {
        return Err(AppError::Validation("Form already exists".to_string()));
    }

    tracing::info!(form_id, "Form created");
    Ok(Json(json!({ "formId": form_id })))
}

pub async fn save_form(
    State(state): State<AppState>,
    Json(body): Json<FormBody>,
) -> AppResult<Json<Value>> {
    let form_id = require_form_id(&body.form_id)?;
    let fields = fields_from_payload(&body.data)?;

    forms::upsert_form(&state.pool, form_id, &fields).await?;

    tracing::info!(form_id, type_form = ?body.type_form, "Form saved");
    Ok(Json(json!({ "message": "Form saved" })))
}

pub async fn submit_form(
    State(state): State<AppState>,
    Json(body): Json<FormBody>,
) -> AppResult<Json<Value>> {
    let form_id = require_form_id(&body.form_id)?;
    let fields = fields_from_payload(&body.data)?;

    forms::update_form(&state.pool, form_id, &fields)
        .await?
        .ok_or_else(|| AppError::NotFound("Form not found".to_string()))?;

    tracing::info!(form_id, "Form submitted");
    Ok(Json(json!({ "message": "Form submitted" })))
}

pub async fn get_form(
    State(state): State<AppState>,
    Query(lookup): Query<FormLookup>,
) -> AppResult<Json<Value>> {
    if lookup.form_id.is_none() && lookup.app_id.is_none() {
        return Err(AppError::Validation("formId or appId is required".to_string()));
    }

    let resolved = resolve_form(&state, lookup.form_id.as_deref(), lookup.app_id.as_deref()).await?;
    if lookup.app_id.is_some() && resolved.application.is_none() {
        return Err(AppError::NotFound("Application not found".to_string()));
    }
    let form_id = resolved
        .form_id
        .ok_or_else(|| AppError::NotFound("Form not found".to_string()))?;

    let form = forms::get_form(&state.pool, &form_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Form not found".to_string()))?;

    Ok(Json(form_view(&form)))
}
