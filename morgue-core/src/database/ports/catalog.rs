use async_trait::async_trait;
use morgue_model::{DeathRecord, JobId, MovieRecord, TmdbId};

use crate::error::Result;

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn movie_exists(&self, tmdb_id: TmdbId) -> Result<bool>;

    /// Persist one ingestion as a single atomic unit: upsert the movie by
    /// external id, replace its whole death set, and mark the originating job
    /// `complete`. Either everything is visible afterwards or nothing is.
    async fn commit_ingestion(
        &self,
        job: JobId,
        movie: &MovieRecord,
        deaths: &[DeathRecord],
    ) -> Result<()>;

    async fn get_movie(&self, tmdb_id: TmdbId) -> Result<Option<MovieRecord>>;

    async fn deaths_for(&self, tmdb_id: TmdbId) -> Result<Vec<DeathRecord>>;
}
