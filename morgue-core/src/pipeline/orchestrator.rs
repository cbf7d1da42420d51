use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use morgue_model::IngestionJob;
use tracing::{error, info, instrument};

use super::{JobOutcome, Pipeline, panic_message};
use crate::error::Result;

/// Processes claimed jobs end to end. Every error after the claim is turned
/// into a `failed` queue entry; nothing propagates to the caller.
#[derive(Debug, Clone)]
pub struct JobOrchestrator {
    pipeline: Pipeline,
}

impl JobOrchestrator {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Claim the oldest pending job and process it. `None` when the queue
    /// has nothing pending or the claim itself could not be made.
    pub async fn process_next(&self) -> Option<JobOutcome> {
        let job = match self.pipeline.queue.claim_next_pending().await {
            Ok(Some(job)) => job,
            Ok(None) => return None,
            Err(err) => {
                error!(error = %err, "failed to claim next pending job");
                return None;
            }
        };
        Some(self.process_job(job).await)
    }

    /// Run a job that is already `processing`.
    #[instrument(skip(self, job), fields(job_id = %job.id, query = %job.query))]
    pub async fn process_job(&self, job: IngestionJob) -> JobOutcome {
        let outcome = AssertUnwindSafe(self.run(&job)).catch_unwind().await;
        match outcome {
            Ok(Ok(outcome)) => {
                info!(?outcome, "job finished");
                outcome
            }
            Ok(Err(err)) => self.pipeline.fail(job.id, &err.to_string()).await,
            Err(panic) => {
                let message = panic_message(&*panic);
                error!(panic = %message, "job panicked");
                self.pipeline
                    .fail(job.id, &format!("internal panic: {message}"))
                    .await
            }
        }
    }

    async fn run(&self, job: &IngestionJob) -> Result<JobOutcome> {
        let movie = self.pipeline.resolve(job).await?;

        if let Some(outcome) = self.pipeline.dedupe(job.id, movie.tmdb_id).await? {
            return Ok(outcome);
        }

        let content = self.pipeline.scrape(&movie).await;
        let deaths = self.pipeline.extract(&movie, &content).await?;
        self.pipeline.write(job.id, &movie, &deaths).await
    }
}
