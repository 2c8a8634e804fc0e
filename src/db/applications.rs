use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteExecutor, SqlitePool};

use crate::status::{PsvStatus, compute_progress};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ApplicationRow {
    pub id: String,
    pub provider_id: Option<String>,
    pub form_id: Option<String>,
    pub name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub specialty: Option<String>,
    pub address: Option<String>,
    pub npi: Option<String>,
    pub psv_status: String,
    pub committee_status: String,
    pub psv_original_label: Option<String>,
    pub progress: i64,
    pub assignee: Option<String>,
    pub source: Option<String>,
    pub market: Option<String>,
    pub create_dt: DateTime<Utc>,
    pub last_updt_dt: DateTime<Utc>,
}

/// Writable application fields shared by insert and update.
#[derive(Debug, Clone, Default)]
pub struct ApplicationFields {
    pub provider_id: Option<String>,
    pub form_id: Option<String>,
    pub name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub specialty: Option<String>,
    pub address: Option<String>,
    pub npi: Option<String>,
    pub psv_status: String,
    pub committee_status: String,
    pub psv_original_label: Option<String>,
    pub progress: i64,
    pub assignee: Option<String>,
    pub source: Option<String>,
    pub market: Option<String>,
}

const APPLICATION_COLUMNS: &str = "id, provider_id, form_id, name, last_name, email, phone, \
     specialty, address, npi, psv_status, committee_status, psv_original_label, progress, \
     assignee, source, market, create_dt, last_updt_dt";

/// Formats the numeric part of an application id, zero-padded to three digits.
pub fn format_application_id(n: i64) -> String {
    format!("APP-{n:03}")
}

/// Next free `APP-NNN` id, based on the numeric maximum so `APP-1000`
/// follows `APP-999`.
#[tracing::instrument(name = "db.applications.next_id", skip(executor))]
pub async fn next_application_id(executor: impl SqliteExecutor<'_>) -> Result<String, sqlx::Error> {
    let row: (Option<i64>,) = sqlx::query_as(
        "SELECT MAX(CAST(SUBSTR(id, 5) AS INTEGER)) FROM applications WHERE id LIKE 'APP-%'",
    )
    .fetch_one(executor)
    .await?;

    Ok(format_application_id(row.0.unwrap_or(0) + 1))
}

#[tracing::instrument(name = "db.applications.insert", skip(executor, fields))]
pub async fn insert_application(
    executor: impl SqliteExecutor<'_>,
    id: &str,
    fields: &ApplicationFields,
) -> Result<ApplicationRow, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as::<_, ApplicationRow>(&format!(
        "INSERT INTO applications \
         (id, provider_id, form_id, name, last_name, email, phone, specialty, address, npi, \
          psv_status, committee_status, psv_original_label, progress, assignee, source, \
          market, create_dt, last_updt_dt) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         RETURNING {APPLICATION_COLUMNS}"
    ))
    .bind(id)
    .bind(fields.provider_id.as_deref())
    .bind(fields.form_id.as_deref())
    .bind(fields.name.as_deref())
    .bind(fields.last_name.as_deref())
    .bind(fields.email.as_deref())
    .bind(fields.phone.as_deref())
    .bind(fields.specialty.as_deref())
    .bind(fields.address.as_deref())
    .bind(fields.npi.as_deref())
    .bind(&fields.psv_status)
    .bind(&fields.committee_status)
    .bind(fields.psv_original_label.as_deref())
    .bind(fields.progress)
    .bind(fields.assignee.as_deref())
    .bind(fields.source.as_deref())
    .bind(fields.market.as_deref())
    .bind(now)
    .bind(now)
    .fetch_one(executor)
    .await
}

#[tracing::instrument(name = "db.applications.update", skip(executor, fields))]
pub async fn update_application(
    executor: impl SqliteExecutor<'_>,
    id: &str,
    fields: &ApplicationFields,
) -> Result<ApplicationRow, sqlx::Error> {
    sqlx::query_as::<_, ApplicationRow>(&format!(
        "UPDATE applications SET \
             provider_id = ?, form_id = ?, name = ?, last_name = ?, email = ?, phone = ?, \
             specialty = ?, address = ?, npi = ?, psv_status = ?, committee_status = ?, \
             psv_original_label = COALESCE(?, psv_original_label), progress = ?, \
             assignee = ?, source = ?, market = ?, last_updt_dt = ? \
         WHERE id = ? \
         RETURNING {APPLICATION_COLUMNS}"
    ))
    .bind(fields.provider_id.as_deref())
    .bind(fields.form_id.as_deref())
    .bind(fields.name.as_deref())
    .bind(fields.last_name.as_deref())
    .bind(fields.email.as_deref())
    .bind(fields.phone.as_deref())
    .bind(fields.specialty.as_deref())
    .bind(fields.address.as_deref())
    .bind(fields.npi.as_deref())
    .bind(&fields.psv_status)
    .bind(&fields.committee_status)
    .bind(fields.psv_original_label.as_deref())
    .bind(fields.progress)
    .bind(fields.assignee.as_deref())
    .bind(fields.source.as_deref())
    .bind(fields.market.as_deref())
    .bind(Utc::now())
    .bind(id)
    .fetch_one(executor)
    .await
}

#[tracing::instrument(name = "db.applications.get", skip(pool))]
pub async fn get_application(
    pool: &SqlitePool,
    id: &str,
) -> Result<Option<ApplicationRow>, sqlx::Error> {
    sqlx::query_as::<_, ApplicationRow>(&format!(
        "SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

#[tracing::instrument(name = "db.applications.find_by_form", skip(executor))]
pub async fn find_by_form_id(
    executor: impl SqliteExecutor<'_>,
    form_id: &str,
) -> Result<Option<ApplicationRow>, sqlx::Error> {
    sqlx::query_as::<_, ApplicationRow>(&format!(
        "SELECT {APPLICATION_COLUMNS} FROM applications WHERE form_id = ? \
         ORDER BY create_dt DESC LIMIT 1"
    ))
    .bind(form_id)
    .fetch_optional(executor)
    .await
}

#[tracing::instrument(name = "db.applications.list", skip(pool))]
pub async fn list_applications(pool: &SqlitePool) -> Result<Vec<ApplicationRow>, sqlx::Error> {
    sqlx::query_as::<_, ApplicationRow>(&format!(
        "SELECT {APPLICATION_COLUMNS} FROM applications ORDER BY create_dt DESC, id DESC"
    ))
    .fetch_all(pool)
    .await
}

/// Sets both review phases and the progress derived from them.
#[tracing::instrument(name = "db.applications.update_statuses", skip(pool))]
pub async fn update_statuses(
    pool: &SqlitePool,
    id: &str,
    psv_status: &str,
    committee_status: &str,
) -> Result<Option<ApplicationRow>, sqlx::Error> {
    let progress = compute_progress(Some(psv_status), Some(committee_status));
    sqlx::query_as::<_, ApplicationRow>(&format!(
        "UPDATE applications \
         SET psv_status = ?, committee_status = ?, progress = ?, last_updt_dt = ? \
         WHERE id = ? \
         RETURNING {APPLICATION_COLUMNS}"
    ))
    .bind(psv_status)
    .bind(committee_status)
    .bind(progress)
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Moves a still-new application into PSV when document reading starts.
/// Returns the application id when a row changed.
#[tracing::instrument(name = "db.applications.mark_ai_read_started", skip(pool))]
pub async fn mark_ai_read_started(
    pool: &SqlitePool,
    form_id: &str,
) -> Result<Option<String>, sqlx::Error> {
    let in_progress = PsvStatus::InProgress.as_str();
    let row: Option<(String,)> = sqlx::query_as(
        "UPDATE applications \
         SET psv_status = ?, \
             progress = CASE committee_status \
                 WHEN 'IN_REVIEW' THEN ? WHEN 'DECIDED' THEN ? ELSE ? END, \
             last_updt_dt = ? \
         WHERE id = ( \
             SELECT id FROM applications WHERE form_id = ? AND psv_status = ? \
             ORDER BY create_dt DESC LIMIT 1 \
         ) \
         RETURNING id",
    )
    .bind(in_progress)
    .bind(compute_progress(Some(in_progress), Some("IN_REVIEW")))
    .bind(compute_progress(Some(in_progress), Some("DECIDED")))
    .bind(compute_progress(Some(in_progress), None))
    .bind(Utc::now())
    .bind(form_id)
    .bind(PsvStatus::New.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.0))
}

#[tracing::instrument(name = "db.applications.update_progress", skip(pool))]
pub async fn update_progress(pool: &SqlitePool, id: &str, progress: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE applications SET progress = ? WHERE id = ?")
        .bind(progress)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_application_id() {
        assert_eq!(format_application_id(1), "APP-001");
        assert_eq!(format_application_id(42), "APP-042");
        assert_eq!(format_application_id(1000), "APP-1000");
    }
}
