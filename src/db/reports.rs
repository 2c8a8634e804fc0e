use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReportRow {
    pub id: String,
    pub application_id: String,
    pub kind: String,
    pub markdown: String,
    pub llm_enhanced: bool,
    pub generation_duration_ms: i64,
    pub trace_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub struct InsertReport<'a> {
    pub application_id: &'a str,
    pub kind: &'a str,
    pub markdown: &'a str,
    pub llm_enhanced: bool,
    pub generation_duration_ms: i64,
    pub trace_id: Option<&'a str>,
}

#[tracing::instrument(name = "db.reports.insert", skip_all, fields(application_id = %params.application_id, kind = %params.kind))]
pub async fn insert_report(pool: &SqlitePool, params: &InsertReport<'_>) -> Result<String, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO credentialing_reports \
         (id, application_id, kind, markdown, llm_enhanced, generation_duration_ms, \
          trace_id, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(params.application_id)
    .bind(params.kind)
    .bind(params.markdown)
    .bind(params.llm_enhanced)
    .bind(params.generation_duration_ms)
    .bind(params.trace_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(id)
}

/// Report history for an application, newest first.
#[tracing::instrument(name = "db.reports.list", skip(pool))]
pub async fn list_for_application(
    pool: &SqlitePool,
    application_id: &str,
) -> Result<Vec<ReportRow>, sqlx::Error> {
    sqlx::query_as::<_, ReportRow>(
        "SELECT id, application_id, kind, markdown, llm_enhanced, generation_duration_ms, \
         trace_id, created_at \
         FROM credentialing_reports WHERE application_id = ? \
         ORDER BY created_at DESC",
    )
    .bind(application_id)
    .fetch_all(pool)
    .await
}
