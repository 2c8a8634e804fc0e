use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

pub const AI_READ_STARTED: &str = "AI_READ_STARTED";
pub const AI_READ_COMPLETE: &str = "AI_READ_COMPLETE";
pub const DOCUMENT_REVIEW: &str = "DOCUMENT_REVIEW";
pub const STATUS_CHANGE: &str = "STATUS_CHANGE";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EventRow {
    pub id: i64,
    pub application_id: String,
    pub event_type: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[tracing::instrument(name = "db.events.insert", skip(pool, message))]
pub async fn insert_event(
    pool: &SqlitePool,
    application_id: &str,
    event_type: &str,
    message: &str,
) -> Result<EventRow, sqlx::Error> {
    sqlx::query_as::<_, EventRow>(
        "INSERT INTO application_events (application_id, event_type, message, created_at) \
         VALUES (?, ?, ?, ?) \
         RETURNING id, application_id, event_type, message, created_at",
    )
    .bind(application_id)
    .bind(event_type)
    .bind(message)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

/// Latest events first.
#[tracing::instrument(name = "db.events.recent", skip(pool))]
pub async fn recent_events(
    pool: &SqlitePool,
    application_id: &str,
    limit: i64,
) -> Result<Vec<EventRow>, sqlx::Error> {
    sqlx::query_as::<_, EventRow>(
        "SELECT id, application_id, event_type, message, created_at \
         FROM application_events WHERE application_id = ? \
         ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(application_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}
