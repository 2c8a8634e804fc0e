use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::pricing::{calculate_cost, server_address};
use super::{GenerateRequest, GenerateResponse, Provider};
use crate::telemetry::metrics::{
    GEN_AI_COST, GEN_AI_ERROR_COUNT, GEN_AI_FALLBACK_COUNT, GEN_AI_OPERATION_DURATION,
    GEN_AI_RETRY_COUNT, GEN_AI_TOKEN_USAGE,
};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no sleeping.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        let base = base.min(self.max_delay);
        // 25% jitter to avoid thundering herd
        let jitter_ms = fastrand::u64(0..=base.as_millis() as u64 / 4);
        base + Duration::from_millis(jitter_ms)
    }
}

pub struct LlmClient {
    pub primary: Arc<dyn Provider>,
    pub fallback: Option<Arc<dyn Provider>>,
    pub primary_provider: String,
    pub fallback_provider: String,
    pub fallback_model: String,
    pub retry: RetryPolicy,
}

impl LlmClient {
    /// Client with a single provider and no fallback.
    pub fn single(provider: Arc<dyn Provider>, retry: RetryPolicy) -> Self {
        let name = provider.name().to_string();
        Self {
            primary: provider,
            fallback: None,
            primary_provider: name,
            fallback_provider: "none".to_string(),
            fallback_model: String::new(),
            retry,
        }
    }

    /// One call to `provider`, wrapped in a `gen_ai.chat` span with usage
    /// and cost recorded on success.
    pub async fn generate_once(
        &self,
        provider: &dyn Provider,
        provider_name: &str,
        req: &GenerateRequest,
    ) -> anyhow::Result<GenerateResponse> {
        let span = chat_span(provider_name, req);
        let start = Instant::now();

        let result = provider.generate(req).instrument(span.clone()).await;
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(mut resp) => {
                resp.provider = provider_name.to_string();
                resp.cost_usd = calculate_cost(&resp.model, resp.input_tokens, resp.output_tokens);
                record_success(&span, &resp, elapsed);
                Ok(resp)
            }
            Err(err) => {
                span.record("otel.status_code", "ERROR");
                span.record("error.type", classify_error(&err));
                GEN_AI_ERROR_COUNT.add(
                    1,
                    &[
                        KeyValue::new("gen_ai.provider.name", provider_name.to_string()),
                        KeyValue::new("gen_ai.request.model", req.model.clone()),
                        KeyValue::new("pipeline.stage", req.stage.clone()),
                    ],
                );
                Err(err)
            }
        }
    }

    pub async fn generate_with_retry(
        &self,
        provider: &dyn Provider,
        provider_name: &str,
        req: &GenerateRequest,
    ) -> anyhow::Result<GenerateResponse> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let err = match self.generate_once(provider, provider_name, req).await {
                Ok(resp) => return Ok(resp),
                Err(err) => err,
            };
            attempt += 1;

            tracing::warn!(
                attempt,
                attempts,
                provider = provider_name,
                model = %req.model,
                stage = %req.stage,
                error = %err,
                "LLM call failed"
            );
            if attempt >= attempts {
                return Err(err);
            }

            GEN_AI_RETRY_COUNT.add(
                1,
                &[
                    KeyValue::new("gen_ai.provider.name", provider_name.to_string()),
                    KeyValue::new("gen_ai.request.model", req.model.clone()),
                ],
            );
            tokio::time::sleep(self.retry.delay_for(attempt - 1)).await;
        }
    }

    /// Tries the primary provider, then the fallback with its own model.
    pub async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let primary_err = match self
            .generate_with_retry(self.primary.as_ref(), &self.primary_provider, req)
            .await
        {
            Ok(resp) => return Ok(resp),
            Err(err) => err,
        };

        let Some(fallback) = &self.fallback else {
            anyhow::bail!(
                "primary provider {} failed after retries: {primary_err}",
                self.primary_provider
            );
        };

        tracing::warn!(
            primary_provider = %self.primary_provider,
            fallback_provider = %self.fallback_provider,
            stage = %req.stage,
            error = %primary_err,
            "Primary provider failed, falling back"
        );
        GEN_AI_FALLBACK_COUNT.add(1, &[KeyValue::new("pipeline.stage", req.stage.clone())]);

        let fallback_req = GenerateRequest {
            model: self.fallback_model.clone(),
            ..req.clone()
        };
        self.generate_with_retry(fallback.as_ref(), &self.fallback_provider, &fallback_req)
            .await
    }
}

fn chat_span(provider_name: &str, req: &GenerateRequest) -> tracing::Span {
    let server_addr = server_address(provider_name);
    let server_port: i64 = 443;

    let span = tracing::info_span!(
        "gen_ai.chat",
        otel.name = %format!("gen_ai.chat {}", req.model),
        gen_ai.operation.name = "chat",
        gen_ai.provider.name = %provider_name,
        gen_ai.request.model = %req.model,
        server.address = %server_addr,
        server.port = server_port,
        gen_ai.request.temperature = req.temperature,
        gen_ai.request.max_tokens = req.max_tokens as i64,
        gen_ai.request.image_count = req.images.len() as i64,
        gen_ai.response.model = tracing::field::Empty,
        gen_ai.usage.input_tokens = tracing::field::Empty,
        gen_ai.usage.output_tokens = tracing::field::Empty,
        gen_ai.usage.cost_usd = tracing::field::Empty,
        gen_ai.response.finish_reasons = tracing::field::Empty,
        pipeline.stage = %req.stage,
        otel.status_code = tracing::field::Empty,
        error.type = tracing::field::Empty,
    );

    // Image payloads are never attached; only the text prompt is.
    let mut attrs = vec![KeyValue::new("gen_ai.prompt", truncate(&req.prompt, 1000))];
    if !req.system.is_empty() {
        attrs.push(KeyValue::new(
            "gen_ai.system_instructions",
            truncate(&req.system, 500),
        ));
    }
    span.add_event("gen_ai.user.message", attrs);
    span
}

fn record_success(span: &tracing::Span, resp: &GenerateResponse, elapsed_secs: f64) {
    span.record("gen_ai.response.model", resp.model.as_str());
    span.record("gen_ai.usage.input_tokens", resp.input_tokens as i64);
    span.record("gen_ai.usage.output_tokens", resp.output_tokens as i64);
    span.record("gen_ai.usage.cost_usd", resp.cost_usd);
    if !resp.finish_reason.is_empty() {
        span.record("gen_ai.response.finish_reasons", resp.finish_reason.as_str());
    }
    span.add_event(
        "gen_ai.assistant.message",
        vec![KeyValue::new("gen_ai.completion", truncate(&resp.content, 2000))],
    );

    let attrs = [
        KeyValue::new("gen_ai.operation.name", "chat"),
        KeyValue::new("gen_ai.provider.name", resp.provider.clone()),
        KeyValue::new("gen_ai.request.model", resp.model.clone()),
    ];
    for (kind, tokens) in [("input", resp.input_tokens), ("output", resp.output_tokens)] {
        let mut token_attrs = attrs.to_vec();
        token_attrs.push(KeyValue::new("gen_ai.token.type", kind));
        GEN_AI_TOKEN_USAGE.record(f64::from(tokens), &token_attrs);
    }
    GEN_AI_OPERATION_DURATION.record(elapsed_secs, &attrs);
    GEN_AI_COST.add(resp.cost_usd, &attrs);
}

/// Error classes for `error.type`, checked in order against the lower-cased
/// message.
const ERROR_CLASSES: &[(&str, &[&str])] = &[
    ("rate_limit", &["rate limit", "429"]),
    ("timeout", &["timeout", "timed out", "deadline"]),
    ("auth_error", &["401", "403", "auth", "api key"]),
    ("invalid_request", &["400", "422", "invalid"]),
    ("server_error", &["500", "502", "503", "server"]),
    ("network_error", &["connect", "dns", "network", "reset"]),
];

fn classify_error(err: &anyhow::Error) -> &'static str {
    let msg = err.to_string().to_lowercase();
    ERROR_CLASSES
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| msg.contains(n)))
        .map_or("unknown_error", |(class, _)| *class)
}

/// First `max` characters of `s`.
fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((end, _)) => s[..end].to_string(),
        None => s.to_string(),
    }
}
