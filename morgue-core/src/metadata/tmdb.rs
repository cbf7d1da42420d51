use std::time::Duration;

use async_trait::async_trait;
use morgue_model::TmdbId;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};

use super::{CrewMember, MetadataCatalog, MovieDetails, ReleaseCountry, SearchCandidate};
use crate::error::{IngestError, Result};

pub const TMDB_API_BASE: &str = "https://api.themoviedb.org/3";

/// TMDB v3 client. Accepts either a v3 API key (sent as `api_key`) or a v4
/// read access token (sent as a bearer header).
#[derive(Clone)]
pub struct TmdbCatalog {
    client: Client,
    base_url: String,
    credential: Credential,
}

#[derive(Clone)]
enum Credential {
    ApiKey(String),
    Bearer(String),
}

impl std::fmt::Debug for TmdbCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TmdbCatalog")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TmdbSearchResponse {
    results: Vec<SearchCandidate>,
}

#[derive(Debug, Deserialize)]
struct TmdbCredits {
    #[serde(default)]
    crew: Vec<CrewMember>,
}

#[derive(Debug, Deserialize)]
struct TmdbReleaseDates {
    #[serde(default)]
    results: Vec<ReleaseCountry>,
}

impl TmdbCatalog {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>, timeout: Duration) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(IngestError::Config("TMDB API key is empty".into()));
        }

        // v4 read tokens are JWTs.
        let credential = if api_key.starts_with("eyJ") {
            Credential::Bearer(api_key)
        } else {
            Credential::ApiKey(api_key)
        };

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("morgue/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IngestError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or_else(|| TMDB_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            credential,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        tracing::debug!("TMDB request URL: {}", url);

        let mut request = self.client.get(&url).query(params);
        request = match &self.credential {
            Credential::ApiKey(key) => request.query(&[("api_key", key.as_str())]),
            Credential::Bearer(token) => request.bearer_auth(token),
        };

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(IngestError::NotFound(format!("TMDB resource {endpoint}")));
        }

        if !status.is_success() {
            return Err(IngestError::status(url, status));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl MetadataCatalog for TmdbCatalog {
    async fn search(&self, title: &str, year: Option<i32>) -> Result<Vec<SearchCandidate>> {
        tracing::info!(query = title, year = ?year, "TMDB search");

        let mut params = vec![
            ("query", title.to_string()),
            ("include_adult", "false".to_string()),
        ];
        if let Some(year) = year {
            params.push(("year", year.to_string()));
        }

        let response: TmdbSearchResponse = self.get_json("search/movie", &params).await?;
        tracing::info!("TMDB search returned {} results", response.results.len());
        Ok(response.results)
    }

    async fn details(&self, id: TmdbId) -> Result<MovieDetails> {
        self.get_json(&format!("movie/{id}"), &[]).await
    }

    async fn credits(&self, id: TmdbId) -> Result<Vec<CrewMember>> {
        let credits: TmdbCredits = self.get_json(&format!("movie/{id}/credits"), &[]).await?;
        Ok(credits.crew)
    }

    async fn release_dates(&self, id: TmdbId) -> Result<Vec<ReleaseCountry>> {
        let releases: TmdbReleaseDates = self
            .get_json(&format!("movie/{id}/release_dates"), &[])
            .await?;
        Ok(releases.results)
    }
}
