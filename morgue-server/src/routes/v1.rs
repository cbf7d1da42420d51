use axum::{
    Router,
    routing::{get, post},
};

use crate::{
    handlers::ingestion::{get_job_handler, ingestion_event_handler, poll_trigger_handler},
    infra::app_state::AppState,
};

pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/ingestion/events", post(ingestion_event_handler))
        .route("/ingestion/poll", post(poll_trigger_handler))
        .route("/ingestion/jobs/{id}", get(get_job_handler))
}
