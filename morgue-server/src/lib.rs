//! # Morgue Server
//!
//! Runs the ingestion pipeline from `morgue-core` as a service: a fixed
//! interval queue poller, an HTTP endpoint for insert events, and operator
//! commands for migrations and manual runs.

pub mod errors;
pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;
pub use routes::create_app;
