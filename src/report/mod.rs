pub mod builder;
pub mod enhance;
pub mod markdown;

use std::time::Instant;

use chrono::Utc;
use opentelemetry::KeyValue;
use opentelemetry::trace::TraceContextExt;
use sqlx::SqlitePool;
use tracing_opentelemetry::OpenTelemetrySpanExt;

pub use builder::ReportData;

use crate::db::reports::InsertReport;
use crate::db::{applications, documents, emails, forms};
use crate::error::{AppError, AppResult};
use crate::llm::LlmClient;
use crate::telemetry::metrics::{REPORT_GENERATION_DURATION, REPORT_LLM_ENHANCED};

pub const KIND_DETAILED: &str = "detailed";
pub const KIND_SUMMARY: &str = "summary";

#[derive(Debug, Clone)]
pub struct CredentialingReport {
    pub id: String,
    pub markdown: String,
    pub data: ReportData,
    pub llm_enhanced: bool,
}

/// Model used to append the detailed analysis; `None` skips enhancement.
#[derive(Clone, Copy)]
pub struct Enhancer<'a> {
    pub llm_client: &'a LlmClient,
    pub model: &'a str,
}

async fn load_report_data(pool: &SqlitePool, app_id: &str) -> AppResult<ReportData> {
    let application = applications::get_application(pool, app_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Application not found".to_string()))?;

    let form_id = application.form_id.clone().unwrap_or_default();
    let form = forms::get_form(pool, &form_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Form data not found".to_string()))?;

    let mut uploads = documents::list_active_for_form(pool, &form_id).await?;
    uploads.reverse();
    let emails = emails::list_for_application(pool, &application.id).await?;

    Ok(builder::build_report_data(
        &application,
        &form,
        &uploads,
        &emails,
    ))
}

fn current_trace_id() -> Option<String> {
    let context = tracing::Span::current().context();
    let span = context.span();
    let span_context = span.span_context();
    span_context
        .is_valid()
        .then(|| span_context.trace_id().to_string())
}

async fn persist(
    pool: &SqlitePool,
    app_id: &str,
    kind: &str,
    markdown: &str,
    llm_enhanced: bool,
    start: Instant,
) -> AppResult<String> {
    let duration = start.elapsed();
    let trace_id = current_trace_id();

    let id = crate::db::reports::insert_report(
        pool,
        &InsertReport {
            application_id: app_id,
            kind,
            markdown,
            llm_enhanced,
            generation_duration_ms: duration.as_millis() as i64,
            trace_id: trace_id.as_deref(),
        },
    )
    .await?;

    REPORT_GENERATION_DURATION.record(
        duration.as_secs_f64(),
        &[KeyValue::new("report.kind", kind.to_string())],
    );

    Ok(id)
}

#[tracing::instrument(
    name = "report detailed",
    skip(pool, enhancer),
    fields(report.id, report.llm_enhanced, report.duration_ms)
)]
pub async fn generate_credentialing_report(
    pool: &SqlitePool,
    enhancer: Option<Enhancer<'_>>,
    app_id: &str,
) -> AppResult<CredentialingReport> {
    let start = Instant::now();
    let mut data = load_report_data(pool, app_id).await?;

    let mut extra = None;
    if let Some(enhancer) = enhancer {
        extra = enhance::detailed_sections(enhancer.llm_client, enhancer.model, &data).await;
        if extra.is_some() {
            data.record_llm_interaction("report_enhancement", enhancer.model);
            REPORT_LLM_ENHANCED.add(1, &[]);
        }
    }

    let mut markdown = markdown::render_report_markdown(&data, Utc::now());
    if let Some(section) = &extra {
        markdown.push_str("\n\n## AI-Generated Detailed Analysis\n\n");
        markdown.push_str(section);
    }

    let llm_enhanced = extra.is_some();
    let id = persist(pool, app_id, KIND_DETAILED, &markdown, llm_enhanced, start).await?;

    let span = tracing::Span::current();
    span.record("report.id", id.as_str());
    span.record("report.llm_enhanced", llm_enhanced);
    span.record("report.duration_ms", start.elapsed().as_millis() as u64);

    Ok(CredentialingReport {
        id,
        markdown,
        data,
        llm_enhanced,
    })
}

#[tracing::instrument(name = "report summary", skip(pool), fields(report.id))]
pub async fn generate_short_summary(pool: &SqlitePool, app_id: &str) -> AppResult<CredentialingReport> {
    let start = Instant::now();
    let data = load_report_data(pool, app_id).await?;
    let markdown = markdown::render_short_summary(&data);

    let id = persist(pool, app_id, KIND_SUMMARY, &markdown, false, start).await?;
    tracing::Span::current().record("report.id", id.as_str());

    Ok(CredentialingReport {
        id,
        markdown,
        data,
        llm_enhanced: false,
    })
}
