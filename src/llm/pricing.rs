//! Per-model token prices, in USD per million tokens.

use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ModelPrice {
    pub input: f64,
    pub output: f64,
}

#[derive(Deserialize)]
struct PriceTable {
    models: HashMap<String, ModelPrice>,
}

const BUNDLED: &str = include_str!("../../data/pricing.json");

fn parse(raw: &str) -> anyhow::Result<HashMap<String, ModelPrice>> {
    let table: PriceTable = serde_json::from_str(raw).context("invalid pricing table")?;
    anyhow::ensure!(!table.models.is_empty(), "pricing table lists no models");
    Ok(table.models)
}

fn load_override(path: &str) -> anyhow::Result<HashMap<String, ModelPrice>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    parse(&raw)
}

/// Prices from `PRICING_JSON_PATH` when it loads, else the bundled table.
pub static PRICES: LazyLock<HashMap<String, ModelPrice>> = LazyLock::new(|| {
    if let Some(path) = std::env::var("PRICING_JSON_PATH").ok().filter(|p| !p.is_empty()) {
        match load_override(&path) {
            Ok(models) => return models,
            Err(e) => tracing::warn!(%path, error = %e, "pricing override ignored"),
        }
    }
    parse(BUNDLED).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "bundled pricing unusable, costs report as zero");
        HashMap::new()
    })
});

pub fn calculate_cost(model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
    PRICES.get(model).map_or(0.0, |price| {
        (f64::from(input_tokens) * price.input + f64::from(output_tokens) * price.output)
            / 1_000_000.0
    })
}

/// Host reported on `gen_ai.chat` spans.
pub fn server_address(provider: &str) -> &'static str {
    match provider {
        "openai" => "api.openai.com",
        "anthropic" => "api.anthropic.com",
        _ => "unknown",
    }
}
