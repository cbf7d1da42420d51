use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ModelError, Result},
    ids::{JobId, TmdbId},
};

/// Lifecycle of a queued ingestion request.
///
/// `pending → processing → {complete | failed}`; terminal states never
/// transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "complete" => Ok(JobStatus::Complete),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ModelError::InvalidStatus(other.to_string())),
        }
    }
}

/// One queued ingestion request. Rows are never deleted and double as an
/// audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionJob {
    pub id: JobId,
    pub query: String,
    pub year: Option<i32>,
    pub status: JobStatus,
    pub tmdb_id: Option<TmdbId>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    /// When the external id was first recorded; orders duplicate checks.
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl IngestionJob {
    /// A fresh `pending` job as the intake layer would insert it.
    pub fn pending(query: impl Into<String>, year: Option<i32>) -> Self {
        Self {
            id: JobId::new(),
            query: query.into(),
            year,
            status: JobStatus::Pending,
            tmdb_id: None,
            failure_reason: None,
            created_at: Utc::now(),
            resolved_at: None,
            completed_at: None,
        }
    }
}

/// Clip a failure reason to at most `max_chars` characters, respecting
/// UTF-8 boundaries.
pub fn truncate_reason(reason: &str, max_chars: usize) -> String {
    match reason.char_indices().nth(max_chars) {
        Some((idx, _)) => reason[..idx].to_string(),
        None => reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_text() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Complete,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("leased".parse::<JobStatus>().is_err());
    }

    #[test]
    fn only_complete_and_failed_are_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Complete.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn truncate_reason_respects_char_boundaries() {
        let reason = "é".repeat(600);
        let clipped = truncate_reason(&reason, 500);
        assert_eq!(clipped.chars().count(), 500);
        assert_eq!(truncate_reason("short", 500), "short");
    }
}
