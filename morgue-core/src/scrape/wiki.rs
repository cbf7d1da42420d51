use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{ContentSource, SourceDocument, endpoint, get_optional, http_client};
use crate::error::{IngestError, Result};

/// Section headings that introduce a victim list.
const VICTIM_HEADINGS: [&str; 6] = [
    "victims",
    "deaths",
    "kills",
    "death list",
    "casualties",
    "fatalities",
];

#[derive(Debug, Deserialize)]
struct ParseResponse {
    parse: Option<ParsePayload>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ParsePayload {
    title: String,
    #[serde(default)]
    wikitext: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    info: String,
}

/// MediaWiki `action=parse` client returning raw wikitext.
#[derive(Debug, Clone)]
pub struct WikiSource {
    client: Client,
    api_url: String,
}

impl WikiSource {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_url: api_url.into(),
        })
    }
}

#[async_trait]
impl ContentSource for WikiSource {
    fn name(&self) -> &'static str {
        "wiki"
    }

    async fn fetch(&self, page_title: &str) -> Result<Option<SourceDocument>> {
        let url = endpoint(
            &self.api_url,
            &[
                ("action", "parse"),
                ("page", page_title),
                ("prop", "wikitext"),
                ("format", "json"),
                ("formatversion", "2"),
                ("redirects", "1"),
            ],
        )?;

        let Some(response) = get_optional(&self.client, url).await? else {
            return Ok(None);
        };
        let body: ParseResponse = serde_json::from_str(&response.text().await?)?;

        if let Some(error) = body.error {
            return match error.code.as_str() {
                "missingtitle" | "invalidtitle" => Ok(None),
                _ => Err(IngestError::Internal(format!(
                    "wiki API error {}: {}",
                    error.code, error.info
                ))),
            };
        }

        let Some(page) = body.parse else {
            return Ok(None);
        };
        debug!(page = %page.title, chars = page.wikitext.len(), "fetched wikitext");

        Ok(Some(SourceDocument {
            section: victims_section(&page.wikitext),
            page_title: page.title,
            full_text: page.wikitext,
        }))
    }
}

/// Body of the first victim-list section, up to the next heading of the
/// same or higher level.
pub fn victims_section(wikitext: &str) -> Option<String> {
    let mut lines = wikitext.lines();
    let level = lines.by_ref().find_map(|line| {
        let (level, name) = heading(line)?;
        VICTIM_HEADINGS
            .contains(&name.to_lowercase().as_str())
            .then_some(level)
    })?;

    let body: Vec<&str> = lines
        .take_while(|line| heading(line).is_none_or(|(next, _)| next > level))
        .collect();
    let body = body.join("\n");
    let body = body.trim();
    (!body.is_empty()).then(|| body.to_string())
}

/// `== Name ==` → `(2, "Name")`.
fn heading(line: &str) -> Option<(usize, &str)> {
    let line = line.trim_end();
    let level = line.chars().take_while(|c| *c == '=').count();
    if level < 2 || !line.ends_with(&"=".repeat(level)) || line.len() <= level * 2 {
        return None;
    }
    Some((level, line[level..line.len() - level].trim()))
}
