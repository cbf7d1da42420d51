use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use morgue_core::{EventOutcome, database::IngestionQueue};
use morgue_model::{IngestionJob, JobId};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    errors::{AppError, AppResult},
    infra::app_state::AppState,
};

/// Body of an insert notification for one queue row.
#[derive(Debug, Deserialize)]
pub struct IngestionEvent {
    pub job_id: Uuid,
}

/// Accept an insert event and process the job in the background. Duplicate
/// or stale deliveries are harmless: the runner only proceeds if its claim
/// wins.
pub async fn ingestion_event_handler(
    State(state): State<AppState>,
    Json(event): Json<IngestionEvent>,
) -> (StatusCode, Json<Value>) {
    let job_id = JobId(event.job_id);
    let runner = state.events.clone();

    tokio::spawn(async move {
        match runner.handle_event(job_id).await {
            EventOutcome::NotClaimed => {
                debug!(%job_id, "event ignored; job already claimed or missing")
            }
            EventOutcome::Finished(outcome) => {
                info!(%job_id, ?outcome, "event-driven ingestion finished")
            }
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({ "job_id": job_id, "status": "accepted" })),
    )
}

/// Trigger one queue drain outside the regular poll schedule.
pub async fn poll_trigger_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<Value>) {
    let poller = state.poller.clone();
    let shutdown = state.shutdown.clone();

    tokio::spawn(async move {
        let processed = poller.drain(&shutdown).await;
        info!(processed, "manual queue drain finished");
    });

    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" })))
}

pub async fn get_job_handler(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> AppResult<Json<IngestionJob>> {
    state
        .pipeline
        .queue
        .get(JobId(job_id))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("job {job_id} not found")))
}
