use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Strongly typed ID for ingestion queue entries
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl JobId {
    /// Time-ordered so ids sort the same way jobs were created.
    pub fn new() -> Self {
        JobId(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn to_uuid(&self) -> Uuid {
        self.0
    }
}

impl AsRef<Uuid> for JobId {
    fn as_ref(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for JobId {
    fn from(value: Uuid) -> Self {
        JobId(value)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External catalog identifier (TMDB movie id).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TmdbId(pub u64);

impl TmdbId {
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Postgres has no unsigned integers; ids are stored as BIGINT.
    pub fn as_i64(&self) -> i64 {
        self.0 as i64
    }

    pub fn from_i64(value: i64) -> Self {
        TmdbId(value.max(0) as u64)
    }
}

impl std::fmt::Display for TmdbId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_sort_by_creation() {
        let first = JobId::new();
        let second = JobId::new();
        assert!(first < second);
    }

    #[test]
    fn tmdb_id_roundtrips_through_bigint() {
        let id = TmdbId(578);
        assert_eq!(TmdbId::from_i64(id.as_i64()), id);
        assert_eq!(TmdbId::from_i64(-4), TmdbId(0));
    }
}
