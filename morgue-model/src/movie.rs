use serde::{Deserialize, Serialize};

use crate::ids::TmdbId;

/// Placeholder for fields that could not be determined.
pub const UNKNOWN: &str = "Unknown";
/// Placeholder for a death with no identifiable killer.
pub const NOT_APPLICABLE: &str = "N/A";
/// Placeholder content rating.
pub const NOT_RATED: &str = "NR";

/// Canonical catalog entry, keyed by its TMDB id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieRecord {
    pub tmdb_id: TmdbId,
    pub title: String,
    /// Release year, `0` when TMDB has no release date.
    pub year: i32,
    /// Comma-joined director names.
    pub director: String,
    pub tagline: Option<String>,
    pub poster_path: Option<String>,
    /// Runtime in minutes, `0` when unknown.
    pub runtime: i32,
    pub content_rating: String,
}

/// One character's death within a movie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeathRecord {
    pub character: String,
    pub time_of_death: String,
    pub cause: String,
    pub killed_by: String,
    pub context: String,
    pub is_ambiguous: bool,
}

impl DeathRecord {
    pub fn new(character: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            character: character.into(),
            time_of_death: UNKNOWN.to_string(),
            cause: cause.into(),
            killed_by: NOT_APPLICABLE.to_string(),
            context: String::new(),
            is_ambiguous: false,
        }
    }
}
