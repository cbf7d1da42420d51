//! Queue and catalog persistence.
//!
//! `ports` holds the storage-agnostic traits the pipeline depends on;
//! `infrastructure` holds the Postgres adapters. Both traits are
//! compare-and-swap style: every state transition is a single guarded write,
//! so independent processes can share the backing store without locks.

pub mod infrastructure;
pub mod ports;

pub use infrastructure::postgres::{PostgresCatalogRepository, PostgresIngestionQueue};
pub use ports::catalog::CatalogRepository;
pub use ports::queue::{EnqueueOutcome, IngestionQueue};
