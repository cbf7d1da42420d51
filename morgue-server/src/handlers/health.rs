use axum::{Json, extract::State, http::StatusCode};
use morgue_core::database::IngestionQueue;
use morgue_model::JobId;
use serde_json::{Value, json};
use tracing::warn;

use crate::infra::app_state::AppState;

pub async fn health_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<Value>) {
    // A lookup of a fresh id exercises the store round trip without
    // touching real rows.
    let database = match state.pipeline.queue.get(JobId::new()).await {
        Ok(_) => json!({ "status": "ok" }),
        Err(err) => {
            warn!(error = %err, "health check: queue store unreachable");
            json!({ "status": "error", "message": err.to_string() })
        }
    };
    let healthy = database["status"] == "ok";
    let overall = if healthy { "healthy" } else { "unhealthy" };

    let body = json!({
        "status": overall,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "checks": { "database": database },
    });

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}
