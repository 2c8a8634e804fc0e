use axum::{
    Json,
    extract::{Query, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::AppState;
use crate::db::emails::{self, EmailRow, InsertEmail};
use crate::error::{AppError, AppResult};

const EMAIL_STATUSES: [&str; 3] = ["SENT", "DRAFT", "PENDING"];

#[derive(Debug, Deserialize)]
pub struct SaveEmailBody {
    pub application_id: String,
    pub recipient_email: String,
    pub subject: String,
    pub body: String,
    pub status: String,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEmailsQuery {
    pub application_id: String,
}

pub async fn save_email(
    State(state): State<AppState>,
    Json(body): Json<SaveEmailBody>,
) -> AppResult<Json<Value>> {
    if body.application_id.trim().is_empty() {
        return Err(AppError::Validation("application_id is required".to_string()));
    }
    let status = body.status.trim().to_uppercase();
    if !EMAIL_STATUSES.contains(&status.as_str()) {
        return Err(AppError::Validation(format!(
            "Unknown email status '{}'",
            body.status
        )));
    }

    let id = emails::insert_email(
        &state.pool,
        &InsertEmail {
            application_id: body.application_id.trim(),
            recipient_email: &body.recipient_email,
            subject: &body.subject,
            body: &body.body,
            status: &status,
            sent_at: body.sent_at,
        },
    )
    .await?;

    tracing::info!(email_id = %id, application_id = %body.application_id, status, "Email saved");
    Ok(Json(json!({ "message": "Email saved successfully", "id": id })))
}

pub async fn list_emails(
    State(state): State<AppState>,
    Query(query): Query<ListEmailsQuery>,
) -> AppResult<Json<Vec<EmailRow>>> {
    Ok(Json(
        emails::list_for_application(&state.pool, &query.application_id).await?,
    ))
}
