pub mod health;
pub mod ingestion;
