//! # Morgue Core
//!
//! Ingestion pipeline for the Morgue movie death catalog. A free-text request
//! such as `"jaws 1975"` is queued, claimed atomically, resolved against TMDB,
//! matched to scraped death content, converted into structured records and
//! written to the catalog in one transaction.
//!
//! ## Feature Flags
//!
//! - `test-utils`: in-memory queue/catalog and scripted collaborators
//!
//! ## Architecture
//!
//! - [`database`]: queue and catalog ports with their Postgres adapters
//! - [`metadata`]: TMDB client and metadata resolution
//! - [`scrape`]: source fetching and disambiguation
//! - [`extract`]: deterministic parsing and generative extraction
//! - [`pipeline`]: orchestrator, event-driven runner and poller

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Pipeline tuning knobs
pub mod config;

/// Queue and catalog persistence
pub mod database;

/// Error types and error handling utilities
pub mod error;

/// Structured extraction of death records
pub mod extract;

/// External metadata resolution (TMDB)
pub mod metadata;

/// Job orchestration and trigger paths
pub mod pipeline;

/// Bounded retry with backoff
pub mod retry;

/// Death content scraping
pub mod scrape;

/// In-memory fakes for tests
#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub mod testing;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub use config::PipelineConfig;
pub use error::{IngestError, Result};
pub use pipeline::{EventOutcome, EventRunner, JobOrchestrator, JobOutcome, Pipeline, QueuePoller};
