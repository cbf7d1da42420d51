//! Job processing: the orchestrator, the event-driven runner and the poller
//! all sequence the same stages defined here.

pub mod events;
pub mod orchestrator;
pub mod worker;

use std::any::Any;
use std::sync::Arc;

use morgue_model::{DeathRecord, IngestionJob, JobId, MovieQuery, MovieRecord, TmdbId};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::database::{CatalogRepository, IngestionQueue};
use crate::error::Result;
use crate::extract::DeathExtractor;
use crate::metadata::MetadataResolver;
use crate::scrape::{ScrapedContent, Scraper};

pub use events::{EventOutcome, EventRunner};
pub use orchestrator::JobOrchestrator;
pub use worker::QueuePoller;

/// How a claimed job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Movie and deaths were written.
    Ingested { tmdb_id: TmdbId, deaths: usize },
    /// An older job is already processing the same movie.
    DeferredTo { tmdb_id: TmdbId, other: JobId },
    /// The movie is already in the catalog.
    AlreadyCataloged { tmdb_id: TmdbId },
    /// The job was marked failed with this reason.
    Failed { reason: String },
}

impl JobOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, JobOutcome::Failed { .. })
    }
}

/// Collaborators shared by every trigger path.
#[derive(Clone)]
pub struct Pipeline {
    pub queue: Arc<dyn IngestionQueue>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub resolver: MetadataResolver,
    pub scraper: Scraper,
    pub extractor: DeathExtractor,
    pub config: PipelineConfig,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("resolver", &self.resolver)
            .field("scraper", &self.scraper)
            .field("extractor", &self.extractor)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Parse the job's query and resolve it to full metadata.
    pub(crate) async fn resolve(&self, job: &IngestionJob) -> Result<MovieRecord> {
        let query = MovieQuery::parse(&job.query, job.year)?;
        let tmdb_id = self.resolver.search(&query.title, query.year).await?;
        let movie = self.resolver.fetch_metadata(tmdb_id).await?;
        info!(
            job_id = %job.id,
            tmdb_id = %movie.tmdb_id,
            title = %movie.title,
            year = movie.year,
            "resolved movie metadata"
        );
        Ok(movie)
    }

    /// Record the resolution, then close the job early when another job or
    /// an existing catalog entry already covers the movie.
    pub(crate) async fn dedupe(&self, job_id: JobId, tmdb_id: TmdbId) -> Result<Option<JobOutcome>> {
        self.queue.record_resolution(job_id, tmdb_id).await?;

        if let Some(other) = self.queue.find_earlier_processing(tmdb_id, job_id).await? {
            info!(%job_id, %tmdb_id, other_job = %other, "movie already being processed by another job");
            self.complete_without_write(job_id, tmdb_id).await?;
            return Ok(Some(JobOutcome::DeferredTo { tmdb_id, other }));
        }

        if self.catalog.movie_exists(tmdb_id).await? {
            info!(%job_id, %tmdb_id, "movie already cataloged");
            self.complete_without_write(job_id, tmdb_id).await?;
            return Ok(Some(JobOutcome::AlreadyCataloged { tmdb_id }));
        }

        Ok(None)
    }

    /// Pause after metadata resolution, then scrape every source.
    pub(crate) async fn scrape(&self, movie: &MovieRecord) -> ScrapedContent {
        let delay = self.config.scrape.pre_scrape_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.scraper
            .scrape(&movie.title, movie.year, &movie.director)
            .await
    }

    pub(crate) async fn extract(
        &self,
        movie: &MovieRecord,
        content: &ScrapedContent,
    ) -> Result<Vec<DeathRecord>> {
        self.extractor
            .extract(&movie.title, movie.year, content)
            .await
    }

    pub(crate) async fn write(
        &self,
        job_id: JobId,
        movie: &MovieRecord,
        deaths: &[DeathRecord],
    ) -> Result<JobOutcome> {
        self.catalog.commit_ingestion(job_id, movie, deaths).await?;
        Ok(JobOutcome::Ingested {
            tmdb_id: movie.tmdb_id,
            deaths: deaths.len(),
        })
    }

    /// Terminal failure: store a bounded reason. Errors here are logged
    /// since there is nothing left to report them to.
    pub(crate) async fn fail(&self, job_id: JobId, reason: &str) -> JobOutcome {
        let reason =
            morgue_model::truncate_reason(reason, self.config.queue.max_failure_reason_chars);
        match self.queue.mark_failed(job_id, &reason).await {
            Ok(true) => warn!(%job_id, reason = %reason, "job failed"),
            Ok(false) => warn!(%job_id, reason = %reason, "job failed but was no longer processing"),
            Err(err) => {
                tracing::error!(%job_id, error = %err, "could not record job failure")
            }
        }
        JobOutcome::Failed { reason }
    }

    async fn complete_without_write(&self, job_id: JobId, tmdb_id: TmdbId) -> Result<()> {
        if !self.queue.mark_complete(job_id, Some(tmdb_id)).await? {
            warn!(%job_id, "job was no longer processing when marked complete");
        }
        Ok(())
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
