use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Global knobs that tune the ingestion pipeline.
///
/// All fields carry defaults so deployments only need to supply the values
/// they want to change.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Retry policy for metadata catalog requests.
    pub metadata_retry: RetryPolicy,
    /// Retry policy for text-generation requests.
    pub extraction_retry: RetryPolicy,
    /// Per-call timeouts.
    pub timeouts: TimeoutConfig,
    /// Source scraping and disambiguation settings.
    pub scrape: ScrapeConfig,
    /// Generative extraction settings.
    pub extraction: ExtractionConfig,
    /// Queue bookkeeping.
    pub queue: QueueConfig,
    /// Event-driven trigger settings.
    pub events: EventConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            metadata_retry: RetryPolicy::metadata(),
            extraction_retry: RetryPolicy::extraction(),
            timeouts: TimeoutConfig::default(),
            scrape: ScrapeConfig::default(),
            extraction: ExtractionConfig::default(),
            queue: QueueConfig::default(),
            events: EventConfig::default(),
        }
    }
}

/// Bounded retry with doubling backoff: attempt `n` (1-based) that fails
/// waits `backoff_base_ms * 2^(n-1)`, capped at `backoff_max_ms`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u16,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl RetryPolicy {
    /// Metadata requests: three retries after the first attempt (2s, 4s, 8s).
    pub const fn metadata() -> Self {
        Self {
            max_attempts: 4,
            backoff_base_ms: 2_000,
            backoff_max_ms: 8_000,
        }
    }

    /// Generation requests: five attempts with escalating backoff.
    pub const fn extraction() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_ms: 2_000,
            backoff_max_ms: 32_000,
        }
    }

    /// Event-driven steps: three attempts per step.
    pub const fn event_step() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 2_000,
            backoff_max_ms: 8_000,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u16) -> Duration {
        if attempt == 0 || self.backoff_base_ms == 0 {
            return Duration::ZERO;
        }
        let exp = u32::from(attempt.saturating_sub(1)).min(20);
        let scaled = self.backoff_base_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(scaled.min(self.backoff_max_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::metadata()
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Metadata and scraping requests.
    pub http_secs: u64,
    /// Short yes/no generation prompts.
    pub validation_secs: u64,
    /// Structured extraction prompts.
    pub extraction_secs: u64,
}

impl TimeoutConfig {
    pub fn http(&self) -> Duration {
        Duration::from_secs(self.http_secs)
    }

    pub fn validation(&self) -> Duration {
        Duration::from_secs(self.validation_secs)
    }

    pub fn extraction(&self) -> Duration {
        Duration::from_secs(self.extraction_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            http_secs: 20,
            validation_secs: 15,
            extraction_secs: 120,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Number of leading characters inspected by the disambiguation check.
    /// Later sections often mention remakes and originals of the same title.
    pub disambiguation_window: usize,
    /// Pause between metadata resolution and the first scrape request.
    pub pre_scrape_delay_ms: u64,
    /// Pause between consecutive scrape requests.
    pub request_spacing_ms: u64,
    /// Ask the generation service to confirm accepted content.
    pub confirm_with_model: bool,
    /// Upper bound on narrative text handed to the extractor.
    pub max_narrative_chars: usize,
}

impl ScrapeConfig {
    pub fn pre_scrape_delay(&self) -> Duration {
        Duration::from_millis(self.pre_scrape_delay_ms)
    }

    pub fn request_spacing(&self) -> Duration {
        Duration::from_millis(self.request_spacing_ms)
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            disambiguation_window: 2_500,
            pre_scrape_delay_ms: 500,
            request_spacing_ms: 500,
            confirm_with_model: false,
            max_narrative_chars: 15_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Enrichment output with fewer deaths than this fraction of the parsed
    /// input is discarded as truncated.
    pub enrichment_min_ratio: f64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enrichment_min_ratio: 0.8,
            temperature: 0.0,
            max_tokens: 8_192,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueueConfig {
    /// Failure reasons stored on the job are clipped to this many characters.
    pub max_failure_reason_chars: usize,
    /// Fixed interval between poller sweeps.
    pub poll_interval_secs: u64,
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_failure_reason_chars: 500,
            poll_interval_secs: 60,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EventConfig {
    /// Retry budget applied to every event-driven step.
    pub step_retry: RetryPolicy,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            step_retry: RetryPolicy::event_step(),
        }
    }
}
