use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{ContentSource, SourceDocument, endpoint, get_optional, http_client};
use crate::error::Result;

const PLOT_HEADINGS: [&str; 4] = ["plot", "plot summary", "synopsis", "story"];

#[derive(Debug, Deserialize)]
struct QueryResponse {
    query: Option<QueryPayload>,
}

#[derive(Debug, Deserialize)]
struct QueryPayload {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    extract: Option<String>,
}

/// MediaWiki `prop=extracts` client returning plain text with `== Plot ==`
/// style headings.
#[derive(Debug, Clone)]
pub struct EncyclopediaSource {
    client: Client,
    api_url: String,
}

impl EncyclopediaSource {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_url: api_url.into(),
        })
    }
}

#[async_trait]
impl ContentSource for EncyclopediaSource {
    fn name(&self) -> &'static str {
        "encyclopedia"
    }

    async fn fetch(&self, page_title: &str) -> Result<Option<SourceDocument>> {
        let url = endpoint(
            &self.api_url,
            &[
                ("action", "query"),
                ("prop", "extracts"),
                ("explaintext", "1"),
                ("exsectionformat", "wiki"),
                ("titles", page_title),
                ("format", "json"),
                ("formatversion", "2"),
                ("redirects", "1"),
            ],
        )?;

        let Some(response) = get_optional(&self.client, url).await? else {
            return Ok(None);
        };
        let body: QueryResponse = serde_json::from_str(&response.text().await?)?;

        let page = body
            .query
            .and_then(|query| query.pages.into_iter().next())
            .filter(|page| !page.missing);
        let Some(Page {
            title,
            extract: Some(extract),
            ..
        }) = page
        else {
            return Ok(None);
        };
        if extract.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(SourceDocument {
            section: plot_section(&extract),
            page_title: title,
            full_text: extract,
        }))
    }
}

/// Text of the first plot-like level-2 section.
pub fn plot_section(text: &str) -> Option<String> {
    let mut lines = text.lines();
    lines.by_ref().find(|line| {
        level_two_heading(line)
            .is_some_and(|name| PLOT_HEADINGS.contains(&name.to_lowercase().as_str()))
    })?;

    let body: Vec<&str> = lines
        .take_while(|line| level_two_heading(line).is_none())
        .collect();
    let body = body.join("\n");
    let body = body.trim();
    (!body.is_empty()).then(|| body.to_string())
}

fn level_two_heading(line: &str) -> Option<&str> {
    let name = line.trim().strip_prefix("==")?.strip_suffix("==")?;
    if name.starts_with('=') || name.ends_with('=') {
        return None;
    }
    Some(name.trim())
}
