use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub environment: String,
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub reference_dir: PathBuf,
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
    pub request_timeout_secs: u64,
    pub llm_provider: String,
    pub llm_model_vision: String,
    pub report_llm_model: String,
    pub report_llm_enabled: bool,
    pub fallback_provider: String,
    pub fallback_model: String,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub pdfium_library_path: Option<PathBuf>,
    pub render_dpi: u16,
    pub pipeline_worker_enabled: bool,
    pub pipeline_poll_interval_secs: u64,
    pub otel_service_name: String,
    pub otel_exporter_endpoint: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            environment: "development".to_string(),
            database_url: "sqlite://credentialing.db?mode=rwc".to_string(),
            upload_dir: PathBuf::from("uploads"),
            reference_dir: PathBuf::from("ref_uploads"),
            cors_origins: vec![
                "http://localhost:9002".to_string(),
                "http://127.0.0.1:9002".to_string(),
            ],
            max_upload_bytes: 25 * 1024 * 1024,
            request_timeout_secs: 120,
            llm_provider: "openai".to_string(),
            llm_model_vision: "gpt-4o-mini".to_string(),
            report_llm_model: "gpt-4o-mini".to_string(),
            report_llm_enabled: true,
            fallback_provider: "none".to_string(),
            fallback_model: "claude-haiku-4-5-20251001".to_string(),
            openai_api_key: None,
            anthropic_api_key: None,
            pdfium_library_path: None,
            render_dpi: 300,
            pipeline_worker_enabled: false,
            pipeline_poll_interval_secs: 10,
            otel_service_name: "credentialing-service".to_string(),
            otel_exporter_endpoint: "http://localhost:4317".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        Ok(Self {
            port: parse_var("APP_PORT", defaults.port)?,
            environment: env::var("APP_ENVIRONMENT").unwrap_or(defaults.environment),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            reference_dir: env::var("REFERENCE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.reference_dir),
            cors_origins: env::var("CORS_ORIGINS")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.cors_origins),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            request_timeout_secs: parse_var(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
            llm_provider: env::var("LLM_PROVIDER").unwrap_or(defaults.llm_provider),
            llm_model_vision: env::var("LLM_MODEL_VISION").unwrap_or(defaults.llm_model_vision),
            report_llm_model: env::var("REPORT_LLM_MODEL").unwrap_or(defaults.report_llm_model),
            report_llm_enabled: flag_var("ENABLE_REPORT_LLM", defaults.report_llm_enabled),
            fallback_provider: env::var("FALLBACK_PROVIDER")
                .unwrap_or(defaults.fallback_provider),
            fallback_model: env::var("FALLBACK_MODEL").unwrap_or(defaults.fallback_model),
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            anthropic_api_key: non_empty_var("ANTHROPIC_API_KEY"),
            pdfium_library_path: non_empty_var("PDFIUM_LIBRARY_PATH").map(PathBuf::from),
            render_dpi: parse_var("RENDER_DPI", defaults.render_dpi)?,
            pipeline_worker_enabled: flag_var(
                "PIPELINE_WORKER_ENABLED",
                defaults.pipeline_worker_enabled,
            ),
            pipeline_poll_interval_secs: parse_var(
                "PIPELINE_POLL_INTERVAL_SECS",
                defaults.pipeline_poll_interval_secs,
            )?,
            otel_service_name: env::var("OTEL_SERVICE_NAME")
                .unwrap_or(defaults.otel_service_name),
            otel_exporter_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or(defaults.otel_exporter_endpoint),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Whether the configured primary provider has credentials to call.
    pub fn has_llm_credentials(&self) -> bool {
        match self.llm_provider.as_str() {
            "anthropic" => self.anthropic_api_key.is_some(),
            _ => self.openai_api_key.is_some(),
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} must be a valid number, got {raw:?}")),
        _ => Ok(default),
    }
}

fn flag_var(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| parse_flag(&v))
        .unwrap_or(default)
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
