use chrono::Utc;
use sqlx::SqliteExecutor;

pub struct InsertSavedFile<'a> {
    pub form_id: &'a str,
    pub file_type: &'a str,
    pub original_name: &'a str,
    pub stored_name: &'a str,
    pub stored_path: &'a str,
    pub size_bytes: i64,
    pub content_type: Option<&'a str>,
}

#[tracing::instrument(name = "db.saved_files.insert", skip_all, fields(stored_name = %params.stored_name))]
pub async fn insert_saved_file(
    executor: impl SqliteExecutor<'_>,
    params: &InsertSavedFile<'_>,
) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO saved_files \
         (form_id, file_type, original_name, stored_name, stored_path, size_bytes, \
          content_type, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         RETURNING id",
    )
    .bind(params.form_id)
    .bind(params.file_type)
    .bind(params.original_name)
    .bind(params.stored_name)
    .bind(params.stored_path)
    .bind(params.size_bytes)
    .bind(params.content_type)
    .bind(Utc::now())
    .fetch_one(executor)
    .await?;

    Ok(row.0)
}
