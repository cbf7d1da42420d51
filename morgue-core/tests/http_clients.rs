//! HTTP clients against in-process axum servers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use morgue_core::IngestError;
use morgue_core::config::RetryPolicy;
use morgue_core::extract::{
    GenerationError, GenerationRequest, OpenAiCompatibleGenerator, TextGenerator,
};
use morgue_core::metadata::{MetadataCatalog, MetadataResolver, TmdbCatalog};
use morgue_core::scrape::{ContentSource, EncyclopediaSource, SpoilerSource, WikiSource};
use morgue_model::TmdbId;
use serde_json::{Value, json};

async fn spawn(app: Router) -> Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

fn tmdb_router() -> Router {
    async fn search(Query(params): Query<HashMap<String, String>>) -> Response {
        if params.get("api_key").map(String::as_str) != Some("test-key") {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        match params.get("query").map(String::as_str) {
            Some("busy") => StatusCode::TOO_MANY_REQUESTS.into_response(),
            Some("jaws") => {
                assert_eq!(params.get("year").map(String::as_str), Some("1975"));
                Json(json!({
                    "page": 1,
                    "results": [
                        { "id": 578, "title": "Jaws", "release_date": "1975-06-20", "popularity": 40.1 },
                        { "id": 579, "title": "Jaws 2", "release_date": "1978-06-16" }
                    ]
                }))
                .into_response()
            }
            _ => Json(json!({ "page": 1, "results": [] })).into_response(),
        }
    }

    async fn details(Path(id): Path<u64>) -> Response {
        if id != 578 {
            return StatusCode::NOT_FOUND.into_response();
        }
        Json(json!({
            "id": 578,
            "title": "Jaws",
            "release_date": "1975-06-20",
            "tagline": "Don't go in the water.",
            "poster_path": "/jaws.jpg",
            "runtime": 124,
            "genres": [{ "id": 27, "name": "Horror" }]
        }))
        .into_response()
    }

    async fn credits(Path(_id): Path<u64>) -> Json<Value> {
        Json(json!({
            "id": 578,
            "cast": [{ "name": "Roy Scheider", "character": "Brody" }],
            "crew": [
                { "name": "Steven Spielberg", "job": "Director", "department": "Directing" },
                { "name": "Richard D. Zanuck", "job": "Producer", "department": "Production" }
            ]
        }))
    }

    async fn release_dates(Path(_id): Path<u64>) -> Json<Value> {
        Json(json!({
            "id": 578,
            "results": [
                { "iso_3166_1": "GB", "release_dates": [{ "certification": "12", "type": 3 }] },
                { "iso_3166_1": "US", "release_dates": [
                    { "certification": "", "type": 1 },
                    { "certification": "PG", "type": 3 }
                ] }
            ]
        }))
    }

    Router::new()
        .route("/3/search/movie", get(search))
        .route("/3/movie/{id}", get(details))
        .route("/3/movie/{id}/credits", get(credits))
        .route("/3/movie/{id}/release_dates", get(release_dates))
}

async fn tmdb(api_key: &str) -> Result<TmdbCatalog> {
    let base = spawn(tmdb_router()).await?;
    Ok(TmdbCatalog::new(
        api_key,
        Some(format!("{base}/3")),
        Duration::from_secs(5),
    )?)
}

#[tokio::test]
async fn tmdb_resolver_combines_three_detail_requests() -> Result<()> {
    let catalog: Arc<dyn MetadataCatalog> = Arc::new(tmdb("test-key").await?);
    let resolver = MetadataResolver::new(
        catalog,
        RetryPolicy::metadata(),
        Duration::from_secs(5),
        "US",
    );

    let id = resolver.search("jaws", Some(1975)).await?;
    assert_eq!(id, TmdbId(578));

    let movie = resolver.fetch_metadata(id).await?;
    assert_eq!(movie.title, "Jaws");
    assert_eq!(movie.year, 1975);
    assert_eq!(movie.director, "Steven Spielberg");
    assert_eq!(movie.tagline.as_deref(), Some("Don't go in the water."));
    assert_eq!(movie.poster_path.as_deref(), Some("/jaws.jpg"));
    assert_eq!(movie.runtime, 124);
    assert_eq!(movie.content_rating, "PG");
    Ok(())
}

#[tokio::test]
async fn tmdb_empty_search_is_not_found() -> Result<()> {
    let catalog: Arc<dyn MetadataCatalog> = Arc::new(tmdb("test-key").await?);
    let resolver = MetadataResolver::new(
        catalog,
        RetryPolicy::metadata(),
        Duration::from_secs(5),
        "US",
    );

    let err = resolver.search("nothing", None).await.unwrap_err();
    assert!(matches!(err, IngestError::NotFound(_)));
    assert!(err.to_string().contains("not found"));
    Ok(())
}

#[tokio::test]
async fn tmdb_status_codes_are_classified() -> Result<()> {
    let catalog = tmdb("test-key").await?;

    let missing = catalog.details(TmdbId(999)).await.unwrap_err();
    assert!(matches!(missing, IngestError::NotFound(_)));
    assert!(!missing.is_transient());

    let busy = catalog.search("busy", None).await.unwrap_err();
    assert!(busy.is_transient());

    let unauthorized = tmdb("wrong-key").await?.search("jaws", Some(1975)).await.unwrap_err();
    assert!(!unauthorized.is_transient());
    Ok(())
}

#[test]
fn tmdb_requires_an_api_key() {
    let err = TmdbCatalog::new("  ", None, Duration::from_secs(5)).unwrap_err();
    assert!(matches!(err, IngestError::Config(_)));
}

const WIKITEXT: &str = "'''Jaws''' is a 1975 film.\n== Victims ==\n* '''Quint''' - Eaten by the shark\n== Trivia ==\nNone";

fn mediawiki_router() -> Router {
    async fn api(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        match params.get("action").map(String::as_str) {
            Some("parse") => match params.get("page").map(String::as_str) {
                Some("Jaws") => Json(json!({ "parse": { "title": "Jaws", "pageid": 1, "wikitext": WIKITEXT } })),
                _ => Json(json!({ "error": { "code": "missingtitle", "info": "The page you specified doesn't exist." } })),
            },
            Some("query") => match params.get("titles").map(String::as_str) {
                Some("Jaws (film)") => Json(json!({ "batchcomplete": true, "query": { "pages": [{
                    "pageid": 2,
                    "title": "Jaws (film)",
                    "extract": "Jaws is a 1975 American thriller film directed by Steven Spielberg.\n\n== Plot ==\nA great white shark attacks Amity.\n\n== Cast ==\nRoy Scheider"
                }] } })),
                Some(title) => Json(json!({ "batchcomplete": true, "query": { "pages": [{ "title": title, "missing": true }] } })),
                None => Json(json!({})),
            },
            _ => Json(json!({ "error": { "code": "badvalue", "info": "unknown action" } })),
        }
    }

    Router::new().route("/api.php", get(api))
}

#[tokio::test]
async fn wiki_source_returns_wikitext_and_victims_section() -> Result<()> {
    let base = spawn(mediawiki_router()).await?;
    let wiki = WikiSource::new(format!("{base}/api.php"), Duration::from_secs(5))?;

    let document = wiki.fetch("Jaws").await?.expect("page exists");
    assert_eq!(document.full_text, WIKITEXT);
    assert_eq!(
        document.section.as_deref(),
        Some("* '''Quint''' - Eaten by the shark")
    );

    assert!(wiki.fetch("Jaws (1975)").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn encyclopedia_source_returns_plot_section() -> Result<()> {
    let base = spawn(mediawiki_router()).await?;
    let encyclopedia = EncyclopediaSource::new(format!("{base}/api.php"), Duration::from_secs(5))?;

    let document = encyclopedia.fetch("Jaws (film)").await?.expect("page exists");
    assert_eq!(document.page_title, "Jaws (film)");
    assert_eq!(
        document.section.as_deref(),
        Some("A great white shark attacks Amity.")
    );

    assert!(encyclopedia.fetch("Jaws").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn spoiler_source_fetches_by_slug() -> Result<()> {
    async fn page(Path(slug): Path<String>) -> Response {
        if slug != "jaws-1975" {
            return StatusCode::NOT_FOUND.into_response();
        }
        Html("<html><head><title>Jaws (1975)</title></head><body><article><p>Quint is eaten.</p></article></body></html>")
            .into_response()
    }

    let base = spawn(Router::new().route("/movies/{slug}", get(page))).await?;
    let spoiler = SpoilerSource::new(format!("{base}/movies/"), Duration::from_secs(5))?;

    let document = spoiler.fetch("Jaws (1975)").await?.expect("page exists");
    assert_eq!(document.section.as_deref(), Some("Quint is eaten."));
    assert!(document.full_text.contains("1975"));

    assert!(spoiler.fetch("Jaws").await?.is_none());
    Ok(())
}

fn generation_router() -> Router {
    async fn completions(headers: HeaderMap, Json(body): Json<Value>) -> Response {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer gen-key") {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        match body["model"].as_str() {
            Some("busy") => StatusCode::TOO_MANY_REQUESTS.into_response(),
            Some("slow") => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                StatusCode::OK.into_response()
            }
            _ => {
                assert_eq!(body["messages"][0]["role"], "system");
                assert_eq!(body["messages"][1]["content"], "list deaths");
                Json(json!({
                    "id": "cmpl-1",
                    "choices": [{ "index": 0, "message": { "role": "assistant", "content": "[]" } }]
                }))
                .into_response()
            }
        }
    }

    Router::new().route("/v1/chat/completions", post(completions))
}

fn request(timeout: Duration) -> GenerationRequest<'static> {
    GenerationRequest {
        system: Some("system prompt"),
        prompt: "list deaths",
        max_tokens: 256,
        temperature: 0.0,
        timeout,
    }
}

#[tokio::test]
async fn generator_speaks_chat_completions() -> Result<()> {
    let base = spawn(generation_router()).await?;
    let generator = OpenAiCompatibleGenerator::new(format!("{base}/v1"), "gen-key", "test-model")?;

    let text = generator.generate(request(Duration::from_secs(5))).await?;
    assert_eq!(text, "[]");
    Ok(())
}

#[tokio::test]
async fn generator_errors_are_classified() -> Result<()> {
    let base = spawn(generation_router()).await?;

    let unauthorized = OpenAiCompatibleGenerator::new(format!("{base}/v1"), "wrong", "test-model")?
        .generate(request(Duration::from_secs(5)))
        .await
        .unwrap_err();
    assert!(matches!(unauthorized, GenerationError::Unauthorized(401)));

    let busy = OpenAiCompatibleGenerator::new(format!("{base}/v1"), "gen-key", "busy")?
        .generate(request(Duration::from_secs(5)))
        .await
        .unwrap_err();
    assert!(matches!(busy, GenerationError::RateLimited));
    assert!(busy.is_retryable());

    let slow = OpenAiCompatibleGenerator::new(format!("{base}/v1"), "gen-key", "slow")?
        .generate(request(Duration::from_millis(200)))
        .await
        .unwrap_err();
    assert!(matches!(slow, GenerationError::Timeout(_)));
    assert!(!slow.is_retryable());
    Ok(())
}
