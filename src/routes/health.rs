use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

use crate::AppState;
use crate::db;

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "credentialing-service",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Ready once the database answers.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match db::ping(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ready", "database": "ok" })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "database": "error" })),
            )
        }
    }
}
