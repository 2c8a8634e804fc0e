pub mod anthropic;
pub mod client;
pub mod openai;
pub mod pricing;

use std::sync::Arc;

pub use client::{LlmClient, RetryPolicy};

use crate::config::Config;

/// An image attached to a chat request, already base64-encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInput {
    pub media_type: String,
    pub data_base64: String,
}

impl ImageInput {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data_base64)
    }
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub images: Vec<ImageInput>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stage: String,
}

#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub finish_reason: String,
    pub provider: String,
}

#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse>;
    fn name(&self) -> &str;
}

fn provider_for(name: &str, config: &Config) -> Option<Arc<dyn Provider>> {
    match name {
        "anthropic" => Some(Arc::new(anthropic::AnthropicProvider::new(
            config.anthropic_api_key.as_deref().unwrap_or(""),
        ))),
        "openai" => Some(Arc::new(openai::OpenAIProvider::new(
            config.openai_api_key.as_deref().unwrap_or(""),
        ))),
        _ => None,
    }
}

/// Builds the primary/fallback client from configuration. Unknown primary
/// names fall back to OpenAI.
pub fn client_from_config(config: &Config) -> LlmClient {
    let primary = provider_for(&config.llm_provider, config).unwrap_or_else(|| {
        Arc::new(openai::OpenAIProvider::new(
            config.openai_api_key.as_deref().unwrap_or(""),
        ))
    });
    let fallback = provider_for(&config.fallback_provider, config);

    tracing::info!(
        primary_provider = %config.llm_provider,
        fallback_provider = %config.fallback_provider,
        "LLM client initialized"
    );

    LlmClient {
        primary,
        fallback,
        primary_provider: config.llm_provider.clone(),
        fallback_provider: config.fallback_provider.clone(),
        fallback_model: config.fallback_model.clone(),
        retry: RetryPolicy::default(),
    }
}
