//! Process-wide OpenTelemetry instruments, created lazily on first use.

use std::sync::LazyLock;

use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};

static METER: LazyLock<Meter> = LazyLock::new(|| global::meter("credentialing-service"));

fn histogram(name: &'static str, description: &'static str, unit: &'static str) -> Histogram<f64> {
    METER
        .f64_histogram(name)
        .with_description(description)
        .with_unit(unit)
        .build()
}

fn counter(name: &'static str, description: &'static str, unit: &'static str) -> Counter<u64> {
    METER
        .u64_counter(name)
        .with_description(description)
        .with_unit(unit)
        .build()
}

// GenAI client semantic conventions.

pub static GEN_AI_TOKEN_USAGE: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    histogram("gen_ai.client.token.usage", "Tokens consumed per model call", "{token}")
});

pub static GEN_AI_OPERATION_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    histogram("gen_ai.client.operation.duration", "Model call latency", "s")
});

pub static GEN_AI_COST: LazyLock<Counter<f64>> = LazyLock::new(|| {
    METER
        .f64_counter("gen_ai.client.cost")
        .with_description("Estimated model spend")
        .with_unit("usd")
        .build()
});

pub static GEN_AI_RETRY_COUNT: LazyLock<Counter<u64>> =
    LazyLock::new(|| counter("gen_ai.client.retry.count", "Model call retries", "{retry}"));

pub static GEN_AI_FALLBACK_COUNT: LazyLock<Counter<u64>> = LazyLock::new(|| {
    counter("gen_ai.client.fallback.count", "Switches to the fallback provider", "{fallback}")
});

pub static GEN_AI_ERROR_COUNT: LazyLock<Counter<u64>> =
    LazyLock::new(|| counter("gen_ai.client.error.count", "Failed model calls", "{error}"));

// Document verification.

pub static PIPELINE_DOCUMENT_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    histogram("pipeline.document.duration", "Time to verify one uploaded document", "s")
});

pub static PIPELINE_DOCUMENTS_PROCESSED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    counter("pipeline.documents.processed", "Verified documents by outcome", "{document}")
});

pub static PIPELINE_FIELD_MISMATCHES: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    histogram("pipeline.field.mismatches", "Mismatched fields per verified document", "{field}")
});

// Reports and uploads.

pub static REPORT_GENERATION_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    histogram("report.generation.duration", "Time to build a credentialing report", "s")
});

pub static REPORT_LLM_ENHANCED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    counter("report.llm_enhanced", "Reports with a model-written analysis", "{report}")
});

pub static UPLOAD_BYTES: LazyLock<Histogram<f64>> =
    LazyLock::new(|| histogram("upload.bytes", "Size of uploaded documents", "By"));

// HTTP server.

pub static HTTP_REQUESTS_TOTAL: LazyLock<Counter<u64>> =
    LazyLock::new(|| counter("http.requests.total", "Handled HTTP requests", "{request}"));

pub static HTTP_REQUEST_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("http.request.duration")
        .with_description("HTTP request latency")
        .with_unit("ms")
        .with_boundaries(vec![
            5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 10000.0, 30000.0,
        ])
        .build()
});
