use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteExecutor, SqlitePool};

use crate::status::document;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DocumentRow {
    pub id: i64,
    pub form_id: String,
    pub filename: String,
    pub file_extension: Option<String>,
    pub file_type: String,
    pub status: String,
    pub ocr_output: Option<String>,
    pub pdf_match: Option<String>,
    pub json_match: Option<String>,
    pub verification_data: Option<String>,
    pub llm_extraction: Option<String>,
    pub llm_summary: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct InsertDocument<'a> {
    pub form_id: &'a str,
    pub filename: &'a str,
    pub file_extension: &'a str,
    pub file_type: &'a str,
}

/// Pipeline outputs written back onto a processed document.
pub struct PipelineOutcome<'a> {
    pub ocr_output: &'a serde_json::Value,
    pub pdf_match: &'a serde_json::Value,
    pub json_match: &'a serde_json::Value,
}

const DOCUMENT_COLUMNS: &str = "id, form_id, filename, file_extension, file_type, status, \
     ocr_output, pdf_match, json_match, verification_data, llm_extraction, llm_summary, \
     error_message, created_at, updated_at";

#[tracing::instrument(name = "db.documents.insert", skip_all, fields(form_id = %params.form_id, file_type = %params.file_type))]
pub async fn insert_document(
    executor: impl SqliteExecutor<'_>,
    params: &InsertDocument<'_>,
) -> Result<i64, sqlx::Error> {
    let now = Utc::now();
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO uploaded_documents \
         (form_id, filename, file_extension, file_type, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?) \
         RETURNING id",
    )
    .bind(params.form_id)
    .bind(params.filename)
    .bind(params.file_extension)
    .bind(params.file_type)
    .bind(document::NEW)
    .bind(now)
    .bind(now)
    .fetch_one(executor)
    .await?;

    Ok(row.0)
}

/// Marks every live document of this form and type as replaced.
#[tracing::instrument(name = "db.documents.replace_previous", skip(executor))]
pub async fn replace_previous(
    executor: impl SqliteExecutor<'_>,
    form_id: &str,
    file_type: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE uploaded_documents SET status = ?, updated_at = ? \
         WHERE form_id = ? AND file_type = ? AND status != ?",
    )
    .bind(document::REPLACED)
    .bind(Utc::now())
    .bind(form_id)
    .bind(file_type)
    .bind(document::REPLACED)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

#[tracing::instrument(name = "db.documents.get", skip(pool))]
pub async fn get_document(pool: &SqlitePool, id: i64) -> Result<Option<DocumentRow>, sqlx::Error> {
    sqlx::query_as::<_, DocumentRow>(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM uploaded_documents WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Non-replaced documents of a form, newest first.
#[tracing::instrument(name = "db.documents.list_active", skip(pool))]
pub async fn list_active_for_form(
    pool: &SqlitePool,
    form_id: &str,
) -> Result<Vec<DocumentRow>, sqlx::Error> {
    sqlx::query_as::<_, DocumentRow>(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM uploaded_documents \
         WHERE form_id = ? AND status != ? ORDER BY id DESC"
    ))
    .bind(form_id)
    .bind(document::REPLACED)
    .fetch_all(pool)
    .await
}

/// Newest non-replaced document of one type.
#[tracing::instrument(name = "db.documents.find_active", skip(pool))]
pub async fn find_active(
    pool: &SqlitePool,
    form_id: &str,
    file_type: &str,
) -> Result<Option<DocumentRow>, sqlx::Error> {
    sqlx::query_as::<_, DocumentRow>(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM uploaded_documents \
         WHERE form_id = ? AND file_type = ? AND status != ? \
         ORDER BY id DESC LIMIT 1"
    ))
    .bind(form_id)
    .bind(file_type)
    .bind(document::REPLACED)
    .fetch_optional(pool)
    .await
}

/// Sets the review status of the live documents of one type.
#[tracing::instrument(name = "db.documents.update_status_for_type", skip(pool))]
pub async fn update_status_for_type(
    pool: &SqlitePool,
    form_id: &str,
    file_type: &str,
    status: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE uploaded_documents SET status = ?, updated_at = ? \
         WHERE form_id = ? AND file_type = ? AND status != ?",
    )
    .bind(status)
    .bind(Utc::now())
    .bind(form_id)
    .bind(file_type)
    .bind(document::REPLACED)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Atomically moves the oldest `New` document of one of `file_types` to
/// `In Progress` and returns it. Concurrent callers never get the same row.
#[tracing::instrument(name = "db.documents.claim_next", skip(pool))]
pub async fn claim_next_new(
    pool: &SqlitePool,
    file_types: &[&str],
) -> Result<Option<DocumentRow>, sqlx::Error> {
    if file_types.is_empty() {
        return Ok(None);
    }

    let placeholders = vec!["?"; file_types.len()].join(", ");
    let sql = format!(
        "UPDATE uploaded_documents SET status = ?, updated_at = ? \
         WHERE id = ( \
             SELECT id FROM uploaded_documents \
             WHERE status = ? AND file_type IN ({placeholders}) \
             ORDER BY id ASC LIMIT 1 \
         ) AND status = ? \
         RETURNING {DOCUMENT_COLUMNS}"
    );

    let mut query = sqlx::query_as::<_, DocumentRow>(&sql)
        .bind(document::IN_PROGRESS)
        .bind(Utc::now())
        .bind(document::NEW);
    for file_type in file_types {
        query = query.bind(*file_type);
    }

    query.bind(document::NEW).fetch_optional(pool).await
}

/// Claims one document by id for on-demand processing. Returns `None` when
/// it is already being processed, has been replaced or a reviewer approved it.
#[tracing::instrument(name = "db.documents.claim", skip(pool))]
pub async fn claim_document(pool: &SqlitePool, id: i64) -> Result<Option<DocumentRow>, sqlx::Error> {
    sqlx::query_as::<_, DocumentRow>(&format!(
        "UPDATE uploaded_documents SET status = ?, error_message = NULL, updated_at = ? \
         WHERE id = ? AND status NOT IN (?, ?) \
           AND UPPER(status) NOT IN ('APPROVED', 'VERIFIED') \
         RETURNING {DOCUMENT_COLUMNS}"
    ))
    .bind(document::IN_PROGRESS)
    .bind(Utc::now())
    .bind(id)
    .bind(document::IN_PROGRESS)
    .bind(document::REPLACED)
    .fetch_optional(pool)
    .await
}

#[tracing::instrument(name = "db.documents.record_result", skip(pool, outcome))]
pub async fn record_pipeline_result(
    pool: &SqlitePool,
    id: i64,
    outcome: &PipelineOutcome<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE uploaded_documents \
         SET ocr_output = ?, pdf_match = ?, json_match = ?, status = ?, \
             error_message = NULL, updated_at = ? \
         WHERE id = ?",
    )
    .bind(outcome.ocr_output.to_string())
    .bind(outcome.pdf_match.to_string())
    .bind(outcome.json_match.to_string())
    .bind(document::PROCESSED)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

#[tracing::instrument(name = "db.documents.record_error", skip(pool))]
pub async fn record_pipeline_error(
    pool: &SqlitePool,
    id: i64,
    message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE uploaded_documents SET status = ?, error_message = ?, updated_at = ? WHERE id = ?",
    )
    .bind(document::ERROR)
    .bind(message)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Parses a stored JSON column. Rows written by older tooling may hold a
/// Python literal (`{'a': True}`), which is converted before parsing.
/// Missing or unparsable values read as `{}`.
pub fn parse_json_column(raw: Option<&str>) -> serde_json::Value {
    raw.and_then(|s| {
        serde_json::from_str::<serde_json::Value>(s)
            .ok()
            .or_else(|| serde_json::from_str(&python_literal_to_json(s)).ok())
    })
    .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()))
}

/// Rewrites single-quoted strings and `True`/`False`/`None` into JSON.
/// Anything else passes through, so invalid input stays invalid.
fn python_literal_to_json(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    let mut word = String::new();

    let flush = |word: &mut String, out: &mut String| {
        out.push_str(match word.as_str() {
            "True" => "true",
            "False" => "false",
            "None" => "null",
            other => other,
        });
        word.clear();
    };

    while let Some(c) = chars.next() {
        if c.is_alphanumeric() || c == '_' {
            word.push(c);
            continue;
        }
        flush(&mut word, &mut out);

        if c != '\'' && c != '"' {
            out.push(c);
            continue;
        }

        let quote = c;
        out.push('"');
        while let Some(inner) = chars.next() {
            match inner {
                '\\' => match chars.next() {
                    Some('\'') => out.push('\''),
                    Some(escaped) => {
                        out.push('\\');
                        out.push(escaped);
                    }
                    None => out.push('\\'),
                },
                '"' if quote == '\'' => out.push_str("\\\""),
                q if q == quote => break,
                other => out.push(other),
            }
        }
        out.push('"');
    }
    flush(&mut word, &mut out);
    out
}
