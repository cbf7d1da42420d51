use std::{sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use morgue_core::scrape::ContentSource;
use morgue_core::testing::{
    FakeMovie, InMemoryStore, StaticMetadataCatalog, StaticSource, fast_config, pipeline,
};
use morgue_model::{JobId, JobStatus};
use morgue_server::{AppState, create_app};
use serde_json::{Value, json};
use tower::ServiceExt;

const JAWS_WIKI: &str = "'''Jaws''' is a 1975 thriller directed by Steven Spielberg.\n== Victims ==\n* '''Chrissie Watkins''' - Eaten by the shark\n* '''Quint''' - Eaten by the shark\n";
const JAWS_VICTIMS: &str = "* '''Chrissie Watkins''' - Eaten by the shark\n* '''Quint''' - Eaten by the shark";

fn app() -> (Router, Arc<InMemoryStore>) {
    let store = InMemoryStore::new();
    let metadata = StaticMetadataCatalog::new(vec![FakeMovie::new(
        578,
        "Jaws",
        "1975-06-20",
        "Steven Spielberg",
    )]);
    let wiki: Arc<dyn ContentSource> = Arc::new(StaticSource::new("wiki").with_page("Jaws", JAWS_WIKI, Some(JAWS_VICTIMS)));
    let pipeline = pipeline(
        store.clone(),
        metadata,
        vec![wiki],
        Vec::new(),
        None,
        fast_config(),
    );
    let state = AppState::new(pipeline, Duration::from_secs(60));
    (create_app(state), store)
}

async fn json_body(response: axum::response::Response) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), 64 * 1024).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn post_json(uri: &str, body: Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))?)
}

async fn wait_for_terminal(store: &InMemoryStore, id: JobId) -> JobStatus {
    for _ in 0..200 {
        if let Some(job) = store.job(id) {
            if job.status.is_terminal() {
                return job.status;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never reached a terminal state");
}

#[tokio::test]
async fn health_reports_store_status() -> Result<()> {
    let (app, _) = app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["database"]["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn insert_event_is_accepted_and_processed() -> Result<()> {
    let (app, store) = app();
    let id = store.push_job("jaws 1975", None);

    let response = app
        .oneshot(post_json(
            "/api/v1/ingestion/events",
            json!({ "job_id": id.to_uuid() }),
        )?)
        .await?;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await?;
    assert_eq!(body["job_id"], id.to_uuid().to_string());

    assert_eq!(wait_for_terminal(&store, id).await, JobStatus::Complete);
    assert_eq!(store.commit_count(), 1);
    Ok(())
}

#[tokio::test]
async fn malformed_events_are_rejected() -> Result<()> {
    let (app, store) = app();

    let missing_id = app
        .clone()
        .oneshot(post_json("/api/v1/ingestion/events", json!({}))?)
        .await?;
    assert_eq!(missing_id.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let bad_uuid = app
        .oneshot(post_json(
            "/api/v1/ingestion/events",
            json!({ "job_id": "not-a-uuid" }),
        )?)
        .await?;
    assert_eq!(bad_uuid.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(store.commit_count(), 0);
    Ok(())
}

#[tokio::test]
async fn poll_trigger_drains_pending_jobs() -> Result<()> {
    let (app, store) = app();
    let found = store.push_job("Jaws", Some(1975));
    let missing = store.push_job("A Movie That Does Not Exist", None);

    let response = app
        .oneshot(post_json("/api/v1/ingestion/poll", json!({}))?)
        .await?;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    assert_eq!(wait_for_terminal(&store, found).await, JobStatus::Complete);
    assert_eq!(wait_for_terminal(&store, missing).await, JobStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn job_lookup_returns_queue_row() -> Result<()> {
    let (app, store) = app();
    let id = store.push_job("Jaws", None);

    let found = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/ingestion/jobs/{}", id.to_uuid()))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(found.status(), StatusCode::OK);
    let body = json_body(found).await?;
    assert_eq!(body["query"], "Jaws");
    assert_eq!(body["status"], "pending");

    let unknown = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/ingestion/jobs/{}", JobId::new().to_uuid()))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    let body = json_body(unknown).await?;
    assert_eq!(body["error"]["status"], 404);
    Ok(())
}
