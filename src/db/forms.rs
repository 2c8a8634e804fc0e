use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{SqliteExecutor, SqlitePool};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FormRow {
    pub id: i64,
    pub form_id: String,
    pub provider_id: Option<String>,
    pub provider_name: Option<String>,
    pub provider_last_name: Option<String>,
    pub npi: Option<String>,
    pub dob: Option<NaiveDate>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub specialty: Option<String>,
    pub address: Option<String>,
    pub degree_type: Option<String>,
    pub university: Option<String>,
    pub year: Option<String>,
    pub training_type: Option<String>,
    pub experience: Option<String>,
    pub last_org: Option<String>,
    pub work_history_desc: Option<String>,
    pub dl_number: Option<String>,
    pub ml_number: Option<String>,
    pub other_name: Option<String>,
    pub additional_info: Option<String>,
    pub info_correct: Option<bool>,
    pub consent_verification: Option<bool>,
    pub dl_upload_id: Option<i64>,
    pub npi_upload_id: Option<i64>,
    pub degree_upload_id: Option<i64>,
    pub training_upload_id: Option<i64>,
    pub cv_upload_id: Option<i64>,
    pub work_history_upload_id: Option<i64>,
    pub ml_upload_id: Option<i64>,
    pub other_upload_id: Option<i64>,
    pub malpractice_upload_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Intake fields written by save/submit. Scalar fields overwrite the stored
/// value; upload ids only overwrite when present.
#[derive(Debug, Clone, Default)]
pub struct FormFields {
    pub provider_id: Option<String>,
    pub provider_name: Option<String>,
    pub provider_last_name: Option<String>,
    pub npi: Option<String>,
    pub dob: Option<NaiveDate>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub specialty: Option<String>,
    pub address: Option<String>,
    pub degree_type: Option<String>,
    pub university: Option<String>,
    pub year: Option<String>,
    pub training_type: Option<String>,
    pub experience: Option<String>,
    pub last_org: Option<String>,
    pub work_history_desc: Option<String>,
    pub dl_number: Option<String>,
    pub ml_number: Option<String>,
    pub other_name: Option<String>,
    pub additional_info: Option<String>,
    pub info_correct: Option<bool>,
    pub consent_verification: Option<bool>,
    pub dl_upload_id: Option<i64>,
    pub npi_upload_id: Option<i64>,
    pub degree_upload_id: Option<i64>,
    pub training_upload_id: Option<i64>,
    pub cv_upload_id: Option<i64>,
    pub work_history_upload_id: Option<i64>,
    pub ml_upload_id: Option<i64>,
    pub other_upload_id: Option<i64>,
    pub malpractice_upload_id: Option<i64>,
}

const FORM_COLUMNS: &str = "id, form_id, provider_id, provider_name, provider_last_name, npi, \
     dob, email, phone, specialty, address, degree_type, university, year, training_type, \
     experience, last_org, work_history_desc, dl_number, ml_number, other_name, \
     additional_info, info_correct, consent_verification, dl_upload_id, npi_upload_id, \
     degree_upload_id, training_upload_id, cv_upload_id, work_history_upload_id, \
     ml_upload_id, other_upload_id, malpractice_upload_id, created_at, updated_at";

/// Upload-id column for a document type, if the form tracks that type.
pub fn upload_id_column(file_type: &str) -> Option<&'static str> {
    match file_type {
        "dl" => Some("dl_upload_id"),
        "npi" => Some("npi_upload_id"),
        "degree" => Some("degree_upload_id"),
        "training" => Some("training_upload_id"),
        "cv" => Some("cv_upload_id"),
        "work_history" => Some("work_history_upload_id"),
        "ml" => Some("ml_upload_id"),
        "other" => Some("other_upload_id"),
        "malpractice" | "malpractice_insurance" => Some("malpractice_upload_id"),
        _ => None,
    }
}

#[tracing::instrument(name = "db.forms.get", skip(pool))]
pub async fn get_form(pool: &SqlitePool, form_id: &str) -> Result<Option<FormRow>, sqlx::Error> {
    sqlx::query_as::<_, FormRow>(&format!(
        "SELECT {FORM_COLUMNS} FROM form_data WHERE form_id = ?"
    ))
    .bind(form_id)
    .fetch_optional(pool)
    .await
}

/// Inserts an empty form. Returns false when the id is already taken.
#[tracing::instrument(name = "db.forms.create", skip(pool))]
pub async fn create_form(pool: &SqlitePool, form_id: &str) -> Result<bool, sqlx::Error> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO form_data (form_id, created_at, updated_at) VALUES (?, ?, ?) \
         ON CONFLICT(form_id) DO NOTHING",
    )
    .bind(form_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

#[tracing::instrument(name = "db.forms.upsert", skip(pool, fields))]
pub async fn upsert_form(
    pool: &SqlitePool,
    form_id: &str,
    fields: &FormFields,
) -> Result<FormRow, sqlx::Error> {
    let now = Utc::now();
    let sql = format!(
        "INSERT INTO form_data \
         (form_id, provider_id, provider_name, provider_last_name, npi, dob, email, phone, \
          specialty, address, degree_type, university, year, training_type, experience, \
          last_org, work_history_desc, dl_number, ml_number, other_name, additional_info, \
          info_correct, consent_verification, dl_upload_id, npi_upload_id, degree_upload_id, \
          training_upload_id, cv_upload_id, work_history_upload_id, ml_upload_id, \
          other_upload_id, malpractice_upload_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, \
                 ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(form_id) DO UPDATE SET {UPDATE_ASSIGNMENTS_EXCLUDED}, \
             updated_at = excluded.updated_at \
         RETURNING {FORM_COLUMNS}"
    );

    bind_fields(sqlx::query_as::<_, FormRow>(&sql).bind(form_id), fields)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
}

/// Applies intake fields to an existing form; `None` when the form is missing.
#[tracing::instrument(name = "db.forms.update", skip(pool, fields))]
pub async fn update_form(
    pool: &SqlitePool,
    form_id: &str,
    fields: &FormFields,
) -> Result<Option<FormRow>, sqlx::Error> {
    let sql = format!(
        "UPDATE form_data SET \
             provider_id = ?, provider_name = ?, provider_last_name = ?, npi = ?, dob = ?, \
             email = ?, phone = ?, specialty = ?, address = ?, degree_type = ?, \
             university = ?, year = ?, training_type = ?, experience = ?, last_org = ?, \
             work_history_desc = ?, dl_number = ?, ml_number = ?, other_name = ?, \
             additional_info = ?, info_correct = ?, consent_verification = ?, \
             dl_upload_id = COALESCE(?, dl_upload_id), \
             npi_upload_id = COALESCE(?, npi_upload_id), \
             degree_upload_id = COALESCE(?, degree_upload_id), \
             training_upload_id = COALESCE(?, training_upload_id), \
             cv_upload_id = COALESCE(?, cv_upload_id), \
             work_history_upload_id = COALESCE(?, work_history_upload_id), \
             ml_upload_id = COALESCE(?, ml_upload_id), \
             other_upload_id = COALESCE(?, other_upload_id), \
             malpractice_upload_id = COALESCE(?, malpractice_upload_id), \
             updated_at = ? \
         WHERE form_id = ? \
         RETURNING {FORM_COLUMNS}"
    );

    bind_fields(sqlx::query_as::<_, FormRow>(&sql), fields)
        .bind(Utc::now())
        .bind(form_id)
        .fetch_optional(pool)
        .await
}

/// Points the form's per-type upload reference at a new document. Types the
/// form does not track are ignored.
#[tracing::instrument(name = "db.forms.set_upload_id", skip(executor))]
pub async fn set_upload_id(
    executor: impl SqliteExecutor<'_>,
    form_id: &str,
    file_type: &str,
    upload_id: i64,
) -> Result<bool, sqlx::Error> {
    let Some(column) = upload_id_column(file_type) else {
        return Ok(false);
    };

    let result = sqlx::query(&format!(
        "UPDATE form_data SET {column} = ?, updated_at = ? WHERE form_id = ?"
    ))
    .bind(upload_id)
    .bind(Utc::now())
    .bind(form_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

const UPDATE_ASSIGNMENTS_EXCLUDED: &str = "provider_id = excluded.provider_id, \
     provider_name = excluded.provider_name, \
     provider_last_name = excluded.provider_last_name, npi = excluded.npi, dob = excluded.dob, \
     email = excluded.email, phone = excluded.phone, specialty = excluded.specialty, \
     address = excluded.address, degree_type = excluded.degree_type, \
     university = excluded.university, year = excluded.year, \
     training_type = excluded.training_type, experience = excluded.experience, \
     last_org = excluded.last_org, work_history_desc = excluded.work_history_desc, \
     dl_number = excluded.dl_number, ml_number = excluded.ml_number, \
     other_name = excluded.other_name, additional_info = excluded.additional_info, \
     info_correct = excluded.info_correct, \
     consent_verification = excluded.consent_verification, \
     dl_upload_id = COALESCE(excluded.dl_upload_id, form_data.dl_upload_id), \
     npi_upload_id = COALESCE(excluded.npi_upload_id, form_data.npi_upload_id), \
     degree_upload_id = COALESCE(excluded.degree_upload_id, form_data.degree_upload_id), \
     training_upload_id = COALESCE(excluded.training_upload_id, form_data.training_upload_id), \
     cv_upload_id = COALESCE(excluded.cv_upload_id, form_data.cv_upload_id), \
     work_history_upload_id = \
         COALESCE(excluded.work_history_upload_id, form_data.work_history_upload_id), \
     ml_upload_id = COALESCE(excluded.ml_upload_id, form_data.ml_upload_id), \
     other_upload_id = COALESCE(excluded.other_upload_id, form_data.other_upload_id), \
     malpractice_upload_id = \
         COALESCE(excluded.malpractice_upload_id, form_data.malpractice_upload_id)";

type FormQuery<'q> =
    sqlx::query::QueryAs<'q, sqlx::Sqlite, FormRow, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_fields<'q>(query: FormQuery<'q>, fields: &'q FormFields) -> FormQuery<'q> {
    query
        .bind(fields.provider_id.as_deref())
        .bind(fields.provider_name.as_deref())
        .bind(fields.provider_last_name.as_deref())
        .bind(fields.npi.as_deref())
        .bind(fields.dob)
        .bind(fields.email.as_deref())
        .bind(fields.phone.as_deref())
        .bind(fields.specialty.as_deref())
        .bind(fields.address.as_deref())
        .bind(fields.degree_type.as_deref())
        .bind(fields.university.as_deref())
        .bind(fields.year.as_deref())
        .bind(fields.training_type.as_deref())
        .bind(fields.experience.as_deref())
        .bind(fields.last_org.as_deref())
        .bind(fields.work_history_desc.as_deref())
        .bind(fields.dl_number.as_deref())
        .bind(fields.ml_number.as_deref())
        .bind(fields.other_name.as_deref())
        .bind(fields.additional_info.as_deref())
        .bind(fields.info_correct)
        .bind(fields.consent_verification)
        .bind(fields.dl_upload_id)
        .bind(fields.npi_upload_id)
        .bind(fields.degree_upload_id)
        .bind(fields.training_upload_id)
        .bind(fields.cv_upload_id)
        .bind(fields.work_history_upload_id)
        .bind(fields.ml_upload_id)
        .bind(fields.other_upload_id)
        .bind(fields.malpractice_upload_id)
}
