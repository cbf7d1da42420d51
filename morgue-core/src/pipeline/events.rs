//! Event-driven trigger path.
//!
//! Events are delivered at least once. The runner claims the job by id and
//! runs the pipeline as named steps, each retried on its own budget. A
//! finished step is never repeated by a later step's retries. Only when a
//! step exhausts its budget does the failure handler mark the job failed,
//! so the job stays `processing` while retries are in flight.

use std::panic::AssertUnwindSafe;

use futures::{FutureExt, future::BoxFuture};
use morgue_model::JobId;
use tracing::{error, info, instrument, warn};

use super::{JobOutcome, Pipeline, panic_message};
use crate::config::RetryPolicy;
use crate::error::{IngestError, Result};
use crate::retry::retry_with_policy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Another trigger already claimed the job, or it does not exist.
    NotClaimed,
    Finished(JobOutcome),
}

#[derive(Debug, Clone)]
pub struct EventRunner {
    pipeline: Pipeline,
    step_retry: RetryPolicy,
}

impl EventRunner {
    pub fn new(pipeline: Pipeline) -> Self {
        let step_retry = pipeline.config.events.step_retry;
        Self {
            pipeline,
            step_retry,
        }
    }

    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn handle_event(&self, job_id: JobId) -> EventOutcome {
        match self.pipeline.queue.claim_specific(job_id).await {
            Ok(true) => {}
            Ok(false) => {
                info!("job already claimed or missing, ignoring event");
                return EventOutcome::NotClaimed;
            }
            Err(err) => {
                warn!(error = %err, "claim failed, ignoring event");
                return EventOutcome::NotClaimed;
            }
        }

        let finished = AssertUnwindSafe(self.run_steps(job_id))
            .catch_unwind()
            .await;
        match finished {
            Ok(Ok(outcome)) => {
                info!(?outcome, "event processing finished");
                EventOutcome::Finished(outcome)
            }
            Ok(Err(StepFailure { step, error })) => {
                let reason = format!("step {step} failed: {error}");
                EventOutcome::Finished(self.pipeline.fail(job_id, &reason).await)
            }
            Err(panic) => {
                let message = panic_message(&*panic);
                error!(panic = %message, "event processing panicked");
                let reason = format!("internal panic: {message}");
                EventOutcome::Finished(self.pipeline.fail(job_id, &reason).await)
            }
        }
    }

    async fn run_steps(&self, job_id: JobId) -> std::result::Result<JobOutcome, StepFailure> {
        let pipeline = &self.pipeline;

        let job = self
            .step("load-job", move || {
                async move {
                    pipeline
                        .queue
                        .get(job_id)
                        .await?
                        .ok_or_else(|| IngestError::NotFound(format!("job {job_id} disappeared")))
                }
                .boxed()
            })
            .await?;
        let job = &job;

        let movie = self
            .step("resolve-metadata", move || pipeline.resolve(job).boxed())
            .await?;
        let movie = &movie;

        let early = self
            .step("dedupe", move || pipeline.dedupe(job_id, movie.tmdb_id).boxed())
            .await?;
        if let Some(outcome) = early {
            return Ok(outcome);
        }

        let content = self
            .step("scrape", move || {
                async move { Ok::<_, IngestError>(pipeline.scrape(movie).await) }.boxed()
            })
            .await?;
        let content = &content;

        let deaths = self
            .step("extract", move || pipeline.extract(movie, content).boxed())
            .await?;
        let deaths = deaths.as_slice();

        self.step("commit", move || pipeline.write(job_id, movie, deaths).boxed())
            .await
    }

    /// Run one step under the per-step budget.
    async fn step<'a, T, F>(
        &self,
        name: &'static str,
        mut op: F,
    ) -> std::result::Result<T, StepFailure>
    where
        F: FnMut() -> BoxFuture<'a, Result<T>>,
    {
        retry_with_policy(&self.step_retry, name, is_step_retryable, |_| op())
            .await
            .map_err(|error| StepFailure { step: name, error })
    }
}

/// Retries apply to any failure except those that cannot change on a rerun.
fn is_step_retryable(err: &IngestError) -> bool {
    !matches!(
        err,
        IngestError::NotFound(_) | IngestError::Config(_) | IngestError::Model(_)
    )
}

struct StepFailure {
    step: &'static str,
    error: IngestError,
}
