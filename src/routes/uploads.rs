use axum::{
    Json,
    extract::{Multipart, Query, State},
};
use opentelemetry::KeyValue;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::AppState;
use crate::db::documents::{self, DocumentRow, InsertDocument, parse_json_column};
use crate::db::saved_files::{self, InsertSavedFile};
use crate::db::{applications, events, forms};
use crate::error::{AppError, AppResult};
use crate::status::{document, document_progress, human_doc_label, normalize_provider_type};
use crate::storage;
use crate::telemetry::metrics::UPLOAD_BYTES;

use super::forms::FormLookup;
use super::resolve_form;

/// Stored spellings of provider-submitted document types.
const PROVIDER_TYPES: [&str; 10] = [
    "DEA",
    "CV",
    "MEDICAL_TRAINING_CERTIFICATE",
    "malpractice_insurance",
    "dea",
    "cv",
    "degree",
    "cv/resume",
    "medical_training_certificate",
    "medical_training_cert",
];

/// Tiles the provider dashboard always shows, filled or not.
const EXPECTED_PROVIDER_TILES: [&str; 4] =
    ["MEDICAL_TRAINING_CERTIFICATE", "DEA", "CV", "malpractice_insurance"];

const MALPRACTICE: &str = "malpractice_insurance";
const MALPRACTICE_VERIFICATION: &str = "Insurance Policy Verification";
const RECENT_COMMENTS: i64 = 10;

struct PsvType {
    file_type: &'static str,
    verification: Option<&'static str>,
    ocr_keys: &'static [&'static str],
}

const PSV_TYPES: [PsvType; 4] = [
    PsvType {
        file_type: "board_certification",
        verification: Some("Verification with Board Certificate"),
        ocr_keys: &[
            "abmsuid",
            "abms_name",
            "abms_dob",
            "abms_education",
            "abms_address",
            "abms_certification_board",
            "abms_certification_type",
            "abms_status",
            "abms_duration",
            "abms_occurrence",
            "abms_start_date",
            "abms_end_date",
            "abms_reverification_date",
            "abms_participating_in_moc",
        ],
    },
    PsvType {
        file_type: "license_board",
        verification: Some("License Number Match"),
        ocr_keys: &[
            "LicenseBoard_ExtractedLicense",
            "LicenseBoard_Extracted_Name",
            "LicenseBoard_Extracted_License_Type",
            "LicenseBoard_Extracted_Primary_Status",
            "LicenseBoard_Extracted_Specialty",
            "LicenseBoard_Extracted_Qualification",
            "LicenseBoard_Extracted_School_Name",
            "LicenseBoard_Extracted_Graduation_Year",
            "LicenseBoard_Extracted_Previous_Names",
            "LicenseBoard_Extracted_Address",
            "LicenseBoard_Extracted_Issuance_Date",
            "LicenseBoard_Extracted_Expiration_Date",
            "LicenseBoard_Extracted_Current_Date_Time",
            "LicenseBoard_Extracted_Professional_Url",
            "LicenseBoard_Extracted_Disciplinary_Actions",
            "LicenseBoard_Extracted_Public_Record_Actions",
        ],
    },
    PsvType {
        file_type: "sanctions",
        verification: None,
        ocr_keys: &[],
    },
    PsvType {
        file_type: "npi",
        verification: Some("NPPES Verification"),
        ocr_keys: &[],
    },
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateQuery {
    pub form_id: Option<String>,
    pub status_update: Option<String>,
    pub file_type: Option<String>,
}

/// Dashboard tile for one provider-submitted document, keyed by its
/// normalized type.
pub fn document_tile(doc: &DocumentRow) -> Value {
    let key = normalize_provider_type(&doc.file_type);
    let mut tile = json!({
        "filename": doc.filename,
        "fileType": key,
        "fileExtension": doc.file_extension,
        "fileId": doc.id,
        "status": doc.status,
        "progress": document_progress(&key, Some(doc.status.as_str())),
        "pdfMatch": parse_json_column(doc.pdf_match.as_deref()),
        "ocrData": parse_json_column(doc.ocr_output.as_deref()),
        "jsonMatch": parse_json_column(doc.json_match.as_deref()),
    });

    let verification = parse_json_column(doc.verification_data.as_deref());
    if key == MALPRACTICE {
        tile["verification"] = json!(MALPRACTICE_VERIFICATION);
        tile["verificationDetails"] = verification;
    } else {
        tile["verification"] = verification;
    }
    tile
}

fn placeholder_tile(key: &str) -> Value {
    let mut tile = json!({
        "filename": null,
        "fileType": key,
        "fileExtension": null,
        "fileId": null,
        "status": null,
        "progress": document_progress(key, None),
        "pdfMatch": {},
        "ocrData": {},
        "jsonMatch": {},
    });
    if key == MALPRACTICE {
        tile["verification"] = json!(MALPRACTICE_VERIFICATION);
        tile["verificationDetails"] = json!({});
    } else {
        tile["verification"] = json!({});
    }
    tile
}

/// Builds the provider tiles from a form's live documents, newest first.
pub fn provider_tiles(rows: &[DocumentRow]) -> Map<String, Value> {
    let provider_rows: Vec<&DocumentRow> = rows
        .iter()
        .filter(|r| PROVIDER_TYPES.contains(&r.file_type.as_str()))
        .collect();
    let rows: Vec<&DocumentRow> = if provider_rows.is_empty() {
        rows.iter().collect()
    } else {
        provider_rows
    };

    let mut files = Map::new();
    for row in rows {
        let key = normalize_provider_type(&row.file_type);
        if key == "COI" || files.contains_key(&key) {
            continue;
        }
        files.insert(key, document_tile(row));
    }

    for key in EXPECTED_PROVIDER_TILES {
        if !files.contains_key(key) {
            files.insert(key.to_string(), placeholder_tile(key));
        }
    }
    files
}

/// Sanction hits are surfaced as flat values so the dashboard can show them.
fn sanctions_ocr(details: &Value) -> Value {
    let text = |v: &Value, fallback: &str| -> Value {
        match v {
            Value::Null => json!(fallback),
            Value::String(s) if s.is_empty() => json!(fallback),
            other => other.clone(),
        }
    };
    let sanction = &details["sanction"];

    json!({
        "Sanction Status": text(&sanction["status"], "N/A"),
        "Sanction Details": text(&sanction["details"], "N/A"),
        "Comment 1": text(&sanction["comment_1"], ""),
        "Comment 2": text(&sanction["comment_2"], ""),
        "NPI": text(&details["npi"], ""),
        "Provider Name": text(&details["provider"]["name"], ""),
    })
}

fn psv_tile(psv: &PsvType, doc: &DocumentRow) -> Value {
    let mut ocr = parse_json_column(doc.ocr_output.as_deref());
    let details = parse_json_column(doc.verification_data.as_deref());

    if psv.file_type == "sanctions" && details.as_object().is_some_and(|m| !m.is_empty()) {
        ocr = sanctions_ocr(&details);
    }
    if !psv.ocr_keys.is_empty() {
        ocr = Value::Object(
            psv.ocr_keys
                .iter()
                .map(|k| (k.to_string(), ocr.get(*k).cloned().unwrap_or(Value::Null)))
                .collect(),
        );
    }

    json!({
        "filename": doc.filename,
        "fileType": psv.file_type,
        "fileExtension": doc.file_extension,
        "fileId": doc.id,
        "status": doc.status,
        "progress": document_progress(psv.file_type, None),
        "pdfMatch": parse_json_column(doc.pdf_match.as_deref()),
        "ocrData": ocr,
        "jsonMatch": parse_json_column(doc.json_match.as_deref()),
        "verification": psv.verification,
        "verificationDetails": details,
    })
}

fn psv_placeholder(psv: &PsvType) -> Value {
    json!({
        "filename": null,
        "fileType": psv.file_type,
        "fileExtension": null,
        "fileId": null,
        "status": null,
        "progress": document_progress(psv.file_type, None),
        "pdfMatch": {},
        "ocrData": {},
        "jsonMatch": {},
        "verification": psv.verification,
        "verificationDetails": {},
    })
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Validation(format!("Invalid multipart body: {}", err.body_text()))
}

#[tracing::instrument(name = "upload_file", skip(state, multipart), fields(form_id, file_type, upload.bytes))]
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    let mut form_id = None;
    let mut file_type = None;
    let mut file: Option<(String, Option<String>, axum::body::Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("formId") => form_id = Some(field.text().await.map_err(multipart_error)?),
            Some("fileType") => file_type = Some(field.text().await.map_err(multipart_error)?),
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some((filename, content_type, bytes));
            }
            _ => {}
        }
    }

    let form_id = form_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("formId is required".to_string()))?;
    let file_type = file_type
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("fileType is required".to_string()))?;
    if !storage::is_safe_component(&form_id) {
        return Err(AppError::Validation(
            "formId must not contain path separators or '..'".to_string(),
        ));
    }
    let (raw_filename, content_type, bytes) =
        file.ok_or_else(|| AppError::Validation("file is required".to_string()))?;
    let filename = storage::base_name(raw_filename.trim()).to_string();
    if !storage::is_safe_component(&filename) {
        return Err(AppError::Validation("file must have a filename".to_string()));
    }

    let span = tracing::Span::current();
    span.record("form_id", form_id.as_str());
    span.record("file_type", file_type.as_str());
    span.record("upload.bytes", bytes.len() as u64);

    let (stem, ext) = storage::split_filename(&filename);
    let stored_name = storage::stored_name(stem, &form_id, ext);
    let path = state.config.upload_dir.join(&stored_name);

    tokio::fs::create_dir_all(&state.config.upload_dir).await?;
    tokio::fs::write(&path, &bytes).await?;

    let mut tx = state.pool.begin().await?;
    saved_files::insert_saved_file(
        &mut *tx,
        &InsertSavedFile {
            form_id: &form_id,
            file_type: &file_type,
            original_name: &filename,
            stored_name: &stored_name,
            stored_path: &path.to_string_lossy(),
            size_bytes: bytes.len() as i64,
            content_type: content_type.as_deref(),
        },
    )
    .await?;
    let replaced = documents::replace_previous(&mut *tx, &form_id, &file_type).await?;
    let file_id = documents::insert_document(
        &mut *tx,
        &InsertDocument {
            form_id: &form_id,
            filename: &filename,
            file_extension: ext,
            file_type: &file_type,
        },
    )
    .await?;
    forms::set_upload_id(&mut *tx, &form_id, &file_type, file_id).await?;
    tx.commit().await?;

    UPLOAD_BYTES.record(
        bytes.len() as f64,
        &[KeyValue::new("upload.file_type", file_type.clone())],
    );
    tracing::info!(file_id, replaced, stored_name = %stored_name, "File uploaded");

    Ok(Json(json!({
        "message": "File uploaded successfully",
        "fileId": file_id,
        "filename": filename,
        "fileType": file_type,
    })))
}

async fn upload_info_for(
    state: &AppState,
    form_id: Option<String>,
    app_id: Option<&str>,
) -> AppResult<Value> {
    let Some(form_id) = form_id else {
        return Ok(json!({ "formId": null, "files": {}, "comments": [] }));
    };

    let rows = documents::list_active_for_form(&state.pool, &form_id).await?;

    let comments: Vec<Value> = match app_id {
        Some(app_id) => events::recent_events(&state.pool, app_id, RECENT_COMMENTS)
            .await?
            .into_iter()
            .map(|ev| {
                json!({
                    "id": ev.id,
                    "type": ev.event_type,
                    "message": ev.message,
                    "createdAt": ev.created_at.to_rfc3339(),
                })
            })
            .collect(),
        None => Vec::new(),
    };

    Ok(json!({
        "formId": form_id,
        "files": provider_tiles(&rows),
        "comments": comments,
    }))
}

pub async fn upload_info(
    State(state): State<AppState>,
    Query(lookup): Query<FormLookup>,
) -> AppResult<Json<Value>> {
    let app_id = lookup.app_id.as_deref().filter(|id| !id.trim().is_empty());
    let resolved = resolve_form(&state, lookup.form_id.as_deref(), app_id).await?;
    Ok(Json(upload_info_for(&state, resolved.form_id, app_id).await?))
}

pub async fn upload_info_psv(
    State(state): State<AppState>,
    Query(lookup): Query<FormLookup>,
) -> AppResult<Json<Value>> {
    let resolved = resolve_form(&state, lookup.form_id.as_deref(), lookup.app_id.as_deref()).await?;
    let Some(form_id) = resolved.form_id else {
        return Ok(Json(json!({ "formId": null, "files": {} })));
    };

    let mut files = Map::new();
    for psv in &PSV_TYPES {
        let tile = match documents::find_active(&state.pool, &form_id, psv.file_type).await? {
            Some(doc) => psv_tile(psv, &doc),
            None => psv_placeholder(psv),
        };
        files.insert(psv.file_type.to_string(), tile);
    }

    Ok(Json(json!({ "formId": form_id, "files": files })))
}

#[tracing::instrument(name = "upload_status_update", skip(state))]
pub async fn upload_status_update(
    State(state): State<AppState>,
    Query(query): Query<StatusUpdateQuery>,
) -> AppResult<Json<Value>> {
    let required = |v: Option<String>, name: &str| {
        v.map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Validation(format!("{name} is required")))
    };
    let form_id = required(query.form_id, "formId")?;
    let file_type = required(query.file_type, "fileType")?;
    let status_update = required(query.status_update, "statusUpdate")?;

    let new_status = match status_update.as_str() {
        "Accepted" => document::APPROVED,
        "Rejected" => document::IN_PROGRESS,
        other => {
            return Err(AppError::Validation(format!(
                "Unknown statusUpdate '{other}', expected Accepted or Rejected"
            )));
        }
    };

    let changed =
        documents::update_status_for_type(&state.pool, &form_id, &file_type, new_status).await?;
    if changed == 0 {
        return Err(AppError::NotFound(format!(
            "No {file_type} documents found for form {form_id}"
        )));
    }

    if let Some(app) = applications::find_by_form_id(&state.pool, &form_id).await? {
        let message = format!(
            "{} {} by reviewer.",
            human_doc_label(Some(file_type.as_str())),
            status_update.to_lowercase()
        );
        events::insert_event(&state.pool, &app.id, events::DOCUMENT_REVIEW, &message).await?;
    }

    tracing::info!(changed, status = new_status, "Document review recorded");
    Ok(Json(upload_info_for(&state, Some(form_id), None).await?))
}
