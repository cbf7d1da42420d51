//! In-memory queue/catalog and scripted collaborators for tests.
//!
//! The store keeps the same compare-and-swap semantics as the Postgres
//! adapters: every transition happens under one lock and is guarded by the
//! expected prior status.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use morgue_model::{DeathRecord, IngestionJob, JobId, JobStatus, MovieRecord, TmdbId};
use reqwest::StatusCode;

use crate::config::PipelineConfig;
use crate::database::{CatalogRepository, EnqueueOutcome, IngestionQueue};
use crate::error::{IngestError, Result};
use crate::extract::{DeathExtractor, GenerationError, GenerationRequest, TextGenerator};
use crate::metadata::{
    CrewMember, MetadataCatalog, MetadataResolver, MovieDetails, ReleaseCountry, ReleaseDate,
    SearchCandidate,
};
use crate::pipeline::Pipeline;
use crate::scrape::{ContentSource, Scraper, SourceDocument};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct StoreState {
    jobs: Vec<IngestionJob>,
    movies: HashMap<TmdbId, (MovieRecord, Vec<DeathRecord>)>,
}

/// Queue and catalog in one lock, so `commit_ingestion` is atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
    commits: AtomicUsize,
    commit_attempts: AtomicUsize,
    fail_commits: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert a pending job directly, bypassing duplicate suppression.
    pub fn push_job(&self, query: &str, year: Option<i32>) -> JobId {
        let job = IngestionJob::pending(query, year);
        let id = job.id;
        lock(&self.state).jobs.push(job);
        id
    }

    pub fn job(&self, id: JobId) -> Option<IngestionJob> {
        lock(&self.state).jobs.iter().find(|job| job.id == id).cloned()
    }

    pub fn set_status(&self, id: JobId, status: JobStatus) {
        if let Some(job) = lock(&self.state).jobs.iter_mut().find(|job| job.id == id) {
            job.status = status;
        }
    }

    pub fn insert_movie(&self, movie: MovieRecord, deaths: Vec<DeathRecord>) {
        lock(&self.state).movies.insert(movie.tmdb_id, (movie, deaths));
    }

    pub fn movie_count(&self) -> usize {
        lock(&self.state).movies.len()
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn commit_attempts(&self) -> usize {
        self.commit_attempts.load(Ordering::SeqCst)
    }

    /// Make every `commit_ingestion` fail as a persistence error.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl IngestionQueue for InMemoryStore {
    async fn enqueue(&self, query: &str, year: Option<i32>) -> Result<EnqueueOutcome> {
        let mut state = lock(&self.state);
        let normalized = query.trim().to_lowercase();
        if let Some(existing) = state.jobs.iter().find(|job| {
            !job.status.is_terminal() && job.query.trim().to_lowercase() == normalized
        }) {
            return Ok(EnqueueOutcome::Duplicate(existing.id));
        }
        let job = IngestionJob::pending(query.trim(), year);
        let id = job.id;
        state.jobs.push(job);
        Ok(EnqueueOutcome::Created(id))
    }

    async fn claim_next_pending(&self) -> Result<Option<IngestionJob>> {
        let mut state = lock(&self.state);
        let oldest = state
            .jobs
            .iter_mut()
            .filter(|job| job.status == JobStatus::Pending)
            .min_by_key(|job| (job.created_at, job.id));
        Ok(oldest.map(|job| {
            job.status = JobStatus::Processing;
            job.clone()
        }))
    }

    async fn claim_specific(&self, id: JobId) -> Result<bool> {
        let mut state = lock(&self.state);
        match state
            .jobs
            .iter_mut()
            .find(|job| job.id == id && job.status == JobStatus::Pending)
        {
            Some(job) => {
                job.status = JobStatus::Processing;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, id: JobId) -> Result<Option<IngestionJob>> {
        Ok(self.job(id))
    }

    async fn record_resolution(&self, id: JobId, tmdb_id: TmdbId) -> Result<()> {
        let mut state = lock(&self.state);
        if let Some(job) = state
            .jobs
            .iter_mut()
            .find(|job| job.id == id && job.status == JobStatus::Processing)
        {
            job.tmdb_id = Some(tmdb_id);
            job.resolved_at.get_or_insert_with(Utc::now);
        }
        Ok(())
    }

    async fn find_earlier_processing(&self, tmdb_id: TmdbId, job_id: JobId) -> Result<Option<JobId>> {
        let state = lock(&self.state);
        let Some(me) = state.jobs.iter().find(|job| job.id == job_id) else {
            return Ok(None);
        };
        let resolved_before_me = |other: &IngestionJob| match (other.resolved_at, me.resolved_at) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(theirs), Some(mine)) => (theirs, other.id) < (mine, me.id),
        };
        Ok(state
            .jobs
            .iter()
            .filter(|other| {
                other.id != job_id
                    && other.status == JobStatus::Processing
                    && other.tmdb_id == Some(tmdb_id)
                    && resolved_before_me(*other)
            })
            .min_by_key(|other| (other.resolved_at, other.id))
            .map(|other| other.id))
    }

    async fn mark_complete(&self, id: JobId, tmdb_id: Option<TmdbId>) -> Result<bool> {
        let mut state = lock(&self.state);
        Ok(complete_job(&mut state, id, tmdb_id))
    }

    async fn mark_failed(&self, id: JobId, reason: &str) -> Result<bool> {
        let mut state = lock(&self.state);
        match state
            .jobs
            .iter_mut()
            .find(|job| job.id == id && job.status == JobStatus::Processing)
        {
            Some(job) => {
                job.status = JobStatus::Failed;
                job.failure_reason = Some(reason.to_string());
                job.completed_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn complete_job(state: &mut StoreState, id: JobId, tmdb_id: Option<TmdbId>) -> bool {
    match state
        .jobs
        .iter_mut()
        .find(|job| job.id == id && job.status == JobStatus::Processing)
    {
        Some(job) => {
            job.status = JobStatus::Complete;
            if tmdb_id.is_some() {
                job.tmdb_id = tmdb_id;
            }
            job.completed_at = Some(Utc::now());
            true
        }
        None => false,
    }
}

#[async_trait]
impl CatalogRepository for InMemoryStore {
    async fn movie_exists(&self, tmdb_id: TmdbId) -> Result<bool> {
        Ok(lock(&self.state).movies.contains_key(&tmdb_id))
    }

    async fn commit_ingestion(
        &self,
        job_id: JobId,
        movie: &MovieRecord,
        deaths: &[DeathRecord],
    ) -> Result<()> {
        self.commit_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(IngestError::Internal("commit ingestion: connection reset".into()));
        }

        let mut state = lock(&self.state);
        let processing = state
            .jobs
            .iter()
            .any(|job| job.id == job_id && job.status == JobStatus::Processing);
        if !processing {
            return Err(IngestError::Internal(format!(
                "commit ingestion: job {job_id} is not processing"
            )));
        }

        state
            .movies
            .insert(movie.tmdb_id, (movie.clone(), deaths.to_vec()));
        complete_job(&mut state, job_id, Some(movie.tmdb_id));
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_movie(&self, tmdb_id: TmdbId) -> Result<Option<MovieRecord>> {
        Ok(lock(&self.state)
            .movies
            .get(&tmdb_id)
            .map(|(movie, _)| movie.clone()))
    }

    async fn deaths_for(&self, tmdb_id: TmdbId) -> Result<Vec<DeathRecord>> {
        Ok(lock(&self.state)
            .movies
            .get(&tmdb_id)
            .map(|(_, deaths)| deaths.clone())
            .unwrap_or_default())
    }
}

/// Movie served by [`StaticMetadataCatalog`].
#[derive(Debug, Clone)]
pub struct FakeMovie {
    pub id: u64,
    pub title: String,
    pub release_date: String,
    pub directors: Vec<String>,
    pub certification: String,
}

impl FakeMovie {
    pub fn new(id: u64, title: &str, release_date: &str, director: &str) -> Self {
        Self {
            id,
            title: title.to_string(),
            release_date: release_date.to_string(),
            directors: vec![director.to_string()],
            certification: "PG".to_string(),
        }
    }
}

/// Metadata catalog answering from a fixed movie list.
#[derive(Debug, Default)]
pub struct StaticMetadataCatalog {
    movies: Vec<FakeMovie>,
    failing_searches: AtomicUsize,
    search_calls: AtomicUsize,
}

impl StaticMetadataCatalog {
    pub fn new(movies: Vec<FakeMovie>) -> Arc<Self> {
        Arc::new(Self {
            movies,
            ..Default::default()
        })
    }

    /// The next `count` searches answer 503.
    pub fn fail_next_searches(&self, count: usize) {
        self.failing_searches.store(count, Ordering::SeqCst);
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    fn movie(&self, id: TmdbId) -> Result<&FakeMovie> {
        self.movies
            .iter()
            .find(|movie| movie.id == id.get())
            .ok_or_else(|| IngestError::NotFound(format!("movie {id}")))
    }
}

#[async_trait]
impl MetadataCatalog for StaticMetadataCatalog {
    async fn search(&self, title: &str, year: Option<i32>) -> Result<Vec<SearchCandidate>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_searches.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_searches.store(remaining - 1, Ordering::SeqCst);
            return Err(IngestError::status("fake://search", StatusCode::SERVICE_UNAVAILABLE));
        }

        let wanted = title.to_lowercase();
        Ok(self
            .movies
            .iter()
            .filter(|movie| movie.title.to_lowercase() == wanted)
            .filter(|movie| {
                year.is_none_or(|year| movie.release_date.starts_with(&year.to_string()))
            })
            .map(|movie| SearchCandidate {
                id: movie.id,
                title: movie.title.clone(),
                release_date: Some(movie.release_date.clone()),
            })
            .collect())
    }

    async fn details(&self, id: TmdbId) -> Result<MovieDetails> {
        let movie = self.movie(id)?;
        Ok(MovieDetails {
            id: movie.id,
            title: movie.title.clone(),
            release_date: Some(movie.release_date.clone()),
            tagline: None,
            poster_path: None,
            runtime: Some(120),
        })
    }

    async fn credits(&self, id: TmdbId) -> Result<Vec<CrewMember>> {
        Ok(self
            .movie(id)?
            .directors
            .iter()
            .map(|name| CrewMember {
                name: name.clone(),
                job: "Director".to_string(),
            })
            .collect())
    }

    async fn release_dates(&self, id: TmdbId) -> Result<Vec<ReleaseCountry>> {
        let movie = self.movie(id)?;
        Ok(vec![ReleaseCountry {
            iso_3166_1: "US".to_string(),
            release_dates: vec![ReleaseDate {
                certification: movie.certification.clone(),
                release_type: 3,
            }],
        }])
    }
}

/// Content source serving fixed pages by title.
#[derive(Debug)]
pub struct StaticSource {
    name: &'static str,
    pages: HashMap<String, SourceDocument>,
    fetches: AtomicUsize,
}

impl StaticSource {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            pages: HashMap::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_page(mut self, page_title: &str, full_text: &str, section: Option<&str>) -> Self {
        self.pages.insert(
            page_title.to_string(),
            SourceDocument {
                page_title: page_title.to_string(),
                full_text: full_text.to_string(),
                section: section.map(str::to_string),
            },
        );
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for StaticSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, page_title: &str) -> Result<Option<SourceDocument>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.pages.get(page_title).cloned())
    }
}

/// Text generator replaying scripted responses in order. Once the script
/// runs out every call returns [`GenerationError::Empty`].
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<std::result::Result<String, GenerationError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(
        responses: impl IntoIterator<Item = std::result::Result<String, GenerationError>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().collect()),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> std::result::Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.prompts).push(request.prompt.to_string());
        lock(&self.responses)
            .pop_front()
            .unwrap_or(Err(GenerationError::Empty))
    }
}

/// Config with the pacing delays removed.
pub fn fast_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.scrape.pre_scrape_delay_ms = 0;
    config.scrape.request_spacing_ms = 0;
    config
}

/// Wire a pipeline over the in-memory store.
pub fn pipeline(
    store: Arc<InMemoryStore>,
    metadata: Arc<dyn MetadataCatalog>,
    structured: Vec<Arc<dyn ContentSource>>,
    narrative: Vec<Arc<dyn ContentSource>>,
    generator: Option<Arc<dyn TextGenerator>>,
    config: PipelineConfig,
) -> Pipeline {
    let resolver = MetadataResolver::new(
        metadata,
        config.metadata_retry,
        config.timeouts.http(),
        "US",
    );
    let scraper = Scraper::new(structured, narrative, config.scrape.clone())
        .with_generator(generator.clone(), config.timeouts.validation());
    let extractor = DeathExtractor::new(generator, &config);

    Pipeline {
        queue: store.clone(),
        catalog: store,
        resolver,
        scraper,
        extractor,
        config,
    }
}
