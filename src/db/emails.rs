use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EmailRow {
    pub id: String,
    pub application_id: String,
    pub recipient_email: String,
    pub subject: String,
    pub body: String,
    pub status: String,
    pub sent_at: DateTime<Utc>,
}

pub struct InsertEmail<'a> {
    pub application_id: &'a str,
    pub recipient_email: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
    pub status: &'a str,
    pub sent_at: Option<DateTime<Utc>>,
}

#[tracing::instrument(name = "db.emails.insert", skip_all, fields(application_id = %params.application_id))]
pub async fn insert_email(pool: &SqlitePool, params: &InsertEmail<'_>) -> Result<String, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO email_records \
         (id, application_id, recipient_email, subject, body, status, sent_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(params.application_id)
    .bind(params.recipient_email)
    .bind(params.subject)
    .bind(params.body)
    .bind(params.status)
    .bind(params.sent_at.unwrap_or_else(Utc::now))
    .execute(pool)
    .await?;

    Ok(id)
}

/// Emails of an application, oldest first.
#[tracing::instrument(name = "db.emails.list", skip(pool))]
pub async fn list_for_application(
    pool: &SqlitePool,
    application_id: &str,
) -> Result<Vec<EmailRow>, sqlx::Error> {
    sqlx::query_as::<_, EmailRow>(
        "SELECT id, application_id, recipient_email, subject, body, status, sent_at \
         FROM email_records WHERE application_id = ? ORDER BY sent_at ASC",
    )
    .bind(application_id)
    .fetch_all(pool)
    .await
}
