use reqwest::StatusCode;
use thiserror::Error;

use crate::extract::generation::GenerationError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid model value: {0}")]
    Model(#[from] morgue_model::ModelError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// Transient network conditions worth retrying: rate limiting, 5xx,
    /// connection failures and timeouts. Everything else (client errors,
    /// configuration, persistence, missing data) is fatal for the job.
    pub fn is_transient(&self) -> bool {
        match self {
            IngestError::Http(err) => {
                err.is_timeout()
                    || err.is_connect()
                    || err
                        .status()
                        .is_some_and(|status| is_transient_status(status))
            }
            IngestError::HttpStatus { status, .. } => {
                is_transient_status(*status)
            }
            IngestError::Timeout(_) => true,
            IngestError::Generation(err) => err.is_retryable(),
            _ => false,
        }
    }

    pub fn status(url: impl Into<String>, status: StatusCode) -> Self {
        IngestError::HttpStatus {
            status,
            url: url.into(),
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Wrap a database failure with the operation that hit it.
pub(crate) fn db_error(
    context: &'static str,
) -> impl FnOnce(sqlx::Error) -> IngestError {
    move |err| IngestError::Internal(format!("{context}: {err}"))
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        assert!(
            IngestError::status("http://x", StatusCode::TOO_MANY_REQUESTS)
                .is_transient()
        );
        assert!(
            IngestError::status("http://x", StatusCode::BAD_GATEWAY)
                .is_transient()
        );
        assert!(IngestError::Timeout("search".into()).is_transient());
    }

    #[test]
    fn client_errors_are_fatal() {
        assert!(
            !IngestError::status("http://x", StatusCode::UNAUTHORIZED)
                .is_transient()
        );
        assert!(
            !IngestError::status("http://x", StatusCode::NOT_FOUND)
                .is_transient()
        );
        assert!(!IngestError::NotFound("movie".into()).is_transient());
        assert!(!IngestError::Config("missing key".into()).is_transient());
    }
}
