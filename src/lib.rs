pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod report;
pub mod routes;
pub mod status;
pub mod storage;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Request, Response, StatusCode};
use axum::routing::{get, patch, post};
use opentelemetry::KeyValue;
use sqlx::SqlitePool;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::{MakeSpan, OnResponse, TraceLayer},
};
use tracing::Span;

use config::Config;
use llm::LlmClient;
use pipeline::DocumentImager;
use report::Enhancer;
use telemetry::{HTTP_REQUEST_DURATION, HTTP_REQUESTS_TOTAL};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub llm_client: Arc<LlmClient>,
    pub imager: DocumentImager,
}

impl AppState {
    /// Model used to extend detailed reports, when enabled and a key is set.
    pub fn report_enhancer(&self) -> Option<Enhancer<'_>> {
        (self.config.report_llm_enabled && self.config.has_llm_credentials()).then(|| Enhancer {
            llm_client: &self.llm_client,
            model: &self.config.report_llm_model,
        })
    }
}

const X_REQUEST_ID: &str = "x-request-id";

#[derive(Clone)]
struct HttpMakeSpan;

impl<B> MakeSpan<B> for HttpMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let method = request.method().as_str();
        let uri = request.uri();
        let path = uri.path();

        let request_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        tracing::info_span!(
            "HTTP request",
            otel.name = %format!("{} {}", method, path),
            http.method = %method,
            http.route = %path,
            http.target = %uri,
            http.scheme = "http",
            http.flavor = ?request.version(),
            http.user_agent = request.headers()
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .unwrap_or(""),
            http.request_id = %request_id,
            http.response.status_code = tracing::field::Empty,
            otel.status_code = tracing::field::Empty,
        )
    }
}

#[derive(Clone)]
struct HttpOnResponse;

impl<B> OnResponse<B> for HttpOnResponse {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        let status = response.status().as_u16();

        span.record("http.response.status_code", status as i64);

        if status >= 500 {
            span.record("otel.status_code", "ERROR");
        } else {
            span.record("otel.status_code", "OK");
        }

        let latency_ms = latency.as_secs_f64() * 1000.0;
        let status_class = format!("{}xx", status / 100);

        HTTP_REQUESTS_TOTAL.add(
            1,
            &[
                KeyValue::new("http.status_code", status.to_string()),
                KeyValue::new("http.status_class", status_class.clone()),
            ],
        );

        HTTP_REQUEST_DURATION.record(
            latency_ms,
            &[
                KeyValue::new("http.status_code", status.to_string()),
                KeyValue::new("http.status_class", status_class),
            ],
        );

        tracing::info!(
            http.response.status_code = status,
            latency_ms = latency_ms,
            "finished processing request"
        );
    }
}

/// Configured origins, with credentials allowed. Unparsable entries are
/// skipped with a warning.
fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

fn api_routes(config: &Config) -> Router<AppState> {
    use routes::{
        applications, documents, emails, executive_summary, forms, health, psv_info, uploads,
    };

    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/health/ready", get(health::ready))
        // forms
        .route("/api/forms", get(forms::get_form))
        .route("/api/forms/", get(forms::get_form))
        .route("/api/forms/create-form", post(forms::create_form))
        .route("/api/forms/save-form", post(forms::save_form))
        .route("/api/forms/submit-form", post(forms::submit_form))
        // uploads
        .route(
            "/api/forms/upload-file",
            post(uploads::upload_file).layer(DefaultBodyLimit::max(config.max_upload_bytes)),
        )
        .route("/api/forms/upload-info", get(uploads::upload_info))
        .route("/api/forms/upload-info-psv", get(uploads::upload_info_psv))
        .route(
            "/api/forms/upload-status-update",
            post(uploads::upload_status_update),
        )
        // applications
        .route(
            "/api/applications",
            get(applications::list_applications).post(applications::upsert_application),
        )
        .route(
            "/api/applications/",
            get(applications::list_applications).post(applications::upsert_application),
        )
        .route("/api/applications/{id}", get(applications::get_application))
        .route("/api/applications/{id}/status", patch(applications::change_status))
        .route(
            "/api/applications/{id}/events",
            get(applications::list_events).post(applications::add_event),
        )
        .route("/api/applications/aiissues/{id}", get(applications::get_ai_issues))
        .route("/api/applications/summary/{id}", get(applications::get_summary))
        .route("/api/applications/report/{id}", get(applications::get_report))
        .route(
            "/api/applications/summary-report/{id}",
            get(applications::get_summary_report),
        )
        .route(
            "/api/applications/report-history/{id}",
            get(applications::get_report_history),
        )
        // documents
        .route("/api/documents/download", get(documents::download))
        .route("/api/documents/{id}/process", post(documents::process))
        // emails
        .route("/api/emails", get(emails::list_emails))
        .route("/api/emails/save", post(emails::save_email))
        // dashboards
        .route(
            "/api/executive-summary",
            get(executive_summary::executive_summary),
        )
        .route("/api/psv-info/{application_id}", get(psv_info::get_psv_info))
}

/// The full HTTP surface with tracing, request ids, timeout and CORS.
pub fn build_router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(X_REQUEST_ID);
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    api_routes(&state.config)
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(HttpMakeSpan)
                .on_response(HttpOnResponse),
        )
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(cors_layer(&state.config))
        .with_state(state)
}
