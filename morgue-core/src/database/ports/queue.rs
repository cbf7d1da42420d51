use async_trait::async_trait;
use morgue_model::{IngestionJob, JobId, TmdbId};

use crate::error::Result;

/// Result of inserting a request into the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new `pending` row was created.
    Created(JobId),
    /// An identical query is already pending or processing.
    Duplicate(JobId),
}

impl EnqueueOutcome {
    pub fn job_id(&self) -> JobId {
        match self {
            EnqueueOutcome::Created(id) | EnqueueOutcome::Duplicate(id) => *id,
        }
    }
}

#[async_trait]
pub trait IngestionQueue: Send + Sync {
    /// Insert a `pending` job unless a case-insensitively identical query is
    /// already pending or processing.
    async fn enqueue(&self, query: &str, year: Option<i32>) -> Result<EnqueueOutcome>;

    /// Atomically move the oldest `pending` job to `processing` and return
    /// it. Concurrent callers never receive the same job.
    async fn claim_next_pending(&self) -> Result<Option<IngestionJob>>;

    /// Guarded `pending → processing` transition for one job. Returns `false`
    /// when the job is missing or already past `pending`.
    async fn claim_specific(&self, id: JobId) -> Result<bool>;

    async fn get(&self, id: JobId) -> Result<Option<IngestionJob>>;

    /// Store the resolved external id on a processing job and stamp the
    /// first resolution time.
    async fn record_resolution(&self, id: JobId, tmdb_id: TmdbId) -> Result<()>;

    /// Another job currently processing `tmdb_id` whose resolution was
    /// recorded before `job`'s, ties broken by id. The order is total, so
    /// two jobs never defer to each other.
    async fn find_earlier_processing(
        &self,
        tmdb_id: TmdbId,
        job: JobId,
    ) -> Result<Option<JobId>>;

    /// `processing → complete` without touching the catalog. Returns `false`
    /// if the job was not processing.
    async fn mark_complete(&self, id: JobId, tmdb_id: Option<TmdbId>) -> Result<bool>;

    /// `processing → failed` with a reason already clipped by the caller.
    /// Returns `false` if the job was not processing.
    async fn mark_failed(&self, id: JobId, reason: &str) -> Result<bool>;
}
