use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::Value;

use crate::AppState;
use crate::db::{applications, documents};
use crate::error::{AppError, AppResult};
use crate::pipeline::worker;
use crate::storage;

use super::uploads::document_tile;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    /// Application id.
    pub id: String,
    #[serde(rename = "type")]
    pub file_type: String,
}

#[tracing::instrument(name = "download_document", skip(state))]
pub async fn download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> AppResult<Response> {
    let application = applications::get_application(&state.pool, &query.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Application not found".to_string()))?;
    let form_id = application.form_id.unwrap_or_default();

    let doc = documents::find_active(&state.pool, &form_id, &query.file_type)
        .await?
        .ok_or_else(|| AppError::NotFound("Document not found".to_string()))?;

    let path = storage::upload_path(&state.config.upload_dir, &doc.filename, &form_id);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound("File not found on disk".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let (stem, ext) = storage::split_filename(&doc.filename);
    let download_name = if ext.is_empty() {
        stem.to_string()
    } else {
        format!("{stem}.{ext}")
    };
    let disposition = format!(
        "attachment; filename=\"{}\"",
        download_name.replace('"', "")
    );

    tracing::info!(doc_id = doc.id, bytes = bytes.len(), "Serving document");
    Ok((
        [
            (header::CONTENT_TYPE, storage::content_type_for(ext).to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(bytes),
    )
        .into_response())
}

/// Runs the verification pipeline on one document now instead of waiting
/// for the background worker.
pub async fn process(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<Value>> {
    let doc = worker::process_document(&state, id).await?;
    Ok(Json(document_tile(&doc)))
}
