use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::JobOrchestrator;

/// Fixed-interval poller that drains pending jobs one at a time.
#[derive(Debug, Clone)]
pub struct QueuePoller {
    orchestrator: JobOrchestrator,
    interval: Duration,
}

impl QueuePoller {
    pub fn new(orchestrator: JobOrchestrator, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    /// Sweep until `shutdown` is cancelled. A job in flight is finished
    /// before the loop exits.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            "Queue poller started with interval of {} seconds",
            self.interval.as_secs()
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let processed = self.drain(&shutdown).await;
                    if processed > 0 {
                        info!(processed, "poller sweep finished");
                    }
                }
            }
        }

        info!("Queue poller shutting down");
    }

    /// Process pending jobs until the queue is empty or shutdown is
    /// requested. Returns how many jobs were processed.
    pub async fn drain(&self, shutdown: &CancellationToken) -> usize {
        let mut processed = 0;
        while !shutdown.is_cancelled() {
            match self.orchestrator.process_next().await {
                Some(outcome) => {
                    debug!(?outcome, "processed job");
                    processed += 1;
                }
                None => break,
            }
        }
        processed
    }
}
