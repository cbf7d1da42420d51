use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

const EARLIEST_FILM_YEAR: i32 = 1888;
/// Announced releases are occasionally requested a few years ahead.
const FUTURE_YEAR_SLACK: i32 = 5;

/// A job's free-text request split into a title and an optional year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieQuery {
    pub title: String,
    pub year: Option<i32>,
}

impl MovieQuery {
    /// Parse a raw request such as `"jaws 1975"` or `"Jaws (1975)"`.
    ///
    /// An explicit `year_hint` wins and leaves the text untouched. Otherwise a
    /// trailing plausible release year is split off the title.
    pub fn parse(raw: &str, year_hint: Option<i32>) -> Result<Self> {
        Self::parse_in(raw, year_hint, Utc::now().year())
    }

    /// [`MovieQuery::parse`] with the calendar year fixed by the caller.
    pub fn parse_in(raw: &str, year_hint: Option<i32>, current_year: i32) -> Result<Self> {
        let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            return Err(ModelError::InvalidQuery("query is empty".into()));
        }

        if year_hint.is_some() {
            return Ok(Self {
                title: text,
                year: year_hint,
            });
        }

        if let Some((head, tail)) = text.rsplit_once(' ') {
            let candidate = tail.trim_start_matches('(').trim_end_matches(')');
            if let Some(year) = plausible_year(candidate, current_year) {
                let title = head.trim().to_string();
                if !title.is_empty() {
                    return Ok(Self {
                        title,
                        year: Some(year),
                    });
                }
            }
        }

        Ok(Self {
            title: text,
            year: None,
        })
    }
}

fn plausible_year(token: &str, current_year: i32) -> Option<i32> {
    if token.len() != 4 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = token.parse().ok()?;
    let latest = current_year + FUTURE_YEAR_SLACK;
    (EARLIEST_FILM_YEAR..=latest)
        .contains(&year)
        .then_some(year)
}
