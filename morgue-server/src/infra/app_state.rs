use morgue_core::{EventRunner, JobOrchestrator, Pipeline, QueuePoller};
use tokio_util::sync::CancellationToken;

use crate::infra::config::Config;

/// Shared handles for the HTTP layer and background tasks.
#[derive(Debug, Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub poller: QueuePoller,
    pub events: EventRunner,
    /// Cancelled on shutdown; background drains stop between jobs.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(pipeline: Pipeline, poll_interval: std::time::Duration) -> Self {
        let orchestrator = JobOrchestrator::new(pipeline.clone());
        Self {
            poller: QueuePoller::new(orchestrator, poll_interval),
            events: EventRunner::new(pipeline.clone()),
            pipeline,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn from_config(pipeline: Pipeline, config: &Config) -> Self {
        Self::new(pipeline, config.poll_interval())
    }
}
