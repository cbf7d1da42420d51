//! Core data model definitions shared across Morgue crates.
#![allow(missing_docs)]

pub mod error;
pub mod ids;
pub mod job;
pub mod movie;
pub mod query;

pub use error::{ModelError, Result as ModelResult};
pub use ids::{JobId, TmdbId};
pub use job::{IngestionJob, JobStatus, truncate_reason};
pub use movie::{
    DeathRecord, MovieRecord, NOT_APPLICABLE, NOT_RATED, UNKNOWN,
};
pub use query::MovieQuery;
