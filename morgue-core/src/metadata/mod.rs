//! Metadata resolution against the external movie catalog.
//!
//! [`MetadataCatalog`] is the raw provider surface (TMDB in production);
//! [`MetadataResolver`] adds candidate selection, retries, timeouts and the
//! rules that fold three detail responses into one [`MovieRecord`].

pub mod tmdb;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use futures::{FutureExt, future::BoxFuture};
use morgue_model::{MovieRecord, NOT_RATED, TmdbId, UNKNOWN};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RetryPolicy;
use crate::error::{IngestError, Result};
use crate::retry::retry_with_policy;

pub use tmdb::TmdbCatalog;

/// TMDB release type for theatrical releases.
const THEATRICAL_RELEASE: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieDetails {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub runtime: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrewMember {
    pub name: String,
    pub job: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseCountry {
    pub iso_3166_1: String,
    #[serde(default)]
    pub release_dates: Vec<ReleaseDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDate {
    #[serde(default)]
    pub certification: String,
    #[serde(rename = "type")]
    pub release_type: u8,
}

/// Raw read access to the external metadata catalog.
#[async_trait]
pub trait MetadataCatalog: Send + Sync {
    /// Candidates in the provider's ranking order.
    async fn search(&self, title: &str, year: Option<i32>) -> Result<Vec<SearchCandidate>>;

    async fn details(&self, id: TmdbId) -> Result<MovieDetails>;

    async fn credits(&self, id: TmdbId) -> Result<Vec<CrewMember>>;

    async fn release_dates(&self, id: TmdbId) -> Result<Vec<ReleaseCountry>>;
}

#[derive(Clone)]
pub struct MetadataResolver {
    catalog: Arc<dyn MetadataCatalog>,
    retry: RetryPolicy,
    timeout: Duration,
    region: String,
}

impl std::fmt::Debug for MetadataResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataResolver")
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl MetadataResolver {
    pub fn new(
        catalog: Arc<dyn MetadataCatalog>,
        retry: RetryPolicy,
        timeout: Duration,
        region: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            retry,
            timeout,
            region: region.into(),
        }
    }

    /// Resolve a free-text title to the provider's top-ranked candidate.
    pub async fn search(&self, title: &str, year: Option<i32>) -> Result<TmdbId> {
        let candidates = self
            .with_retry("tmdb.search", || self.catalog.search(title, year))
            .await?;

        let Some((first, rest)) = candidates.split_first() else {
            return Err(IngestError::NotFound(match year {
                Some(year) => format!("movie not found: \"{title}\" ({year})"),
                None => format!("movie not found: \"{title}\""),
            }));
        };

        if !rest.is_empty() {
            let alternatives: Vec<String> = rest
                .iter()
                .take(5)
                .map(|c| {
                    format!(
                        "{} ({}) #{}",
                        c.title,
                        c.release_date.as_deref().unwrap_or("?"),
                        c.id
                    )
                })
                .collect();
            debug!(
                query = title,
                chosen = first.id,
                alternatives = ?alternatives,
                "multiple search candidates; taking the first"
            );
        }

        info!(query = title, tmdb_id = first.id, title = %first.title, "resolved search query");
        Ok(TmdbId(first.id))
    }

    /// Fetch base details, credits and certifications concurrently and fold
    /// them into a catalog record.
    pub async fn fetch_metadata(&self, id: TmdbId) -> Result<MovieRecord> {
        let (details, crew, releases) = tokio::try_join!(
            self.with_retry("tmdb.details", || self.catalog.details(id)),
            self.with_retry("tmdb.credits", || self.catalog.credits(id)),
            self.with_retry("tmdb.release_dates", || self.catalog.release_dates(id)),
        )?;

        Ok(MovieRecord {
            tmdb_id: id,
            title: details.title,
            year: year_from_release_date(details.release_date.as_deref()),
            director: directors_from_crew(&crew),
            tagline: details.tagline.filter(|t| !t.trim().is_empty()),
            poster_path: details.poster_path.filter(|p| !p.trim().is_empty()),
            runtime: details.runtime.map(|r| r as i32).unwrap_or(0),
            content_rating: content_rating(&releases, &self.region),
        })
    }

    async fn with_retry<'a, T, F>(&self, label: &'a str, mut call: F) -> Result<T>
    where
        T: Send + 'a,
        F: FnMut() -> BoxFuture<'a, Result<T>>,
    {
        let timeout = self.timeout;
        retry_with_policy(&self.retry, label, IngestError::is_transient, |_| {
            let fut = call();
            async move {
                match tokio::time::timeout(timeout, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(IngestError::Timeout(format!(
                        "{label} exceeded {}s",
                        timeout.as_secs()
                    ))),
                }
            }
            .boxed()
        })
        .await
    }
}

/// Comma-joined names of every crew member credited as "Director".
pub fn directors_from_crew(crew: &[CrewMember]) -> String {
    let mut names: Vec<&str> = Vec::new();
    for member in crew.iter().filter(|m| m.job == "Director") {
        if !names.contains(&member.name.as_str()) {
            names.push(member.name.as_str());
        }
    }

    if names.is_empty() {
        UNKNOWN.to_string()
    } else {
        names.join(", ")
    }
}

/// Certification for `region`: the theatrical release when present, else the
/// first listed release; "NR" when absent or an empty/zero placeholder.
pub fn content_rating(releases: &[ReleaseCountry], region: &str) -> String {
    let Some(country) = releases
        .iter()
        .find(|r| r.iso_3166_1.eq_ignore_ascii_case(region))
    else {
        return NOT_RATED.to_string();
    };

    let chosen = country
        .release_dates
        .iter()
        .find(|d| d.release_type == THEATRICAL_RELEASE)
        .or_else(|| country.release_dates.first());

    match chosen.map(|d| d.certification.trim()) {
        Some(cert) if !cert.is_empty() && cert != "0" => cert.to_string(),
        _ => NOT_RATED.to_string(),
    }
}

/// Calendar year of a `YYYY-MM-DD` release date, `0` when absent or invalid.
pub fn year_from_release_date(date: Option<&str>) -> i32 {
    date.and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
        .map(|d| d.year())
        .unwrap_or(0)
}
