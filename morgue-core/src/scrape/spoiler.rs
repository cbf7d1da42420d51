use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};

use super::{ContentSource, SourceDocument, get_optional, http_client};
use crate::error::{IngestError, Result};

static HEADLINE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("h1, title").expect("headline selector should parse")
});
static ARTICLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("article p, .entry-content p, .post-content p, main p")
        .expect("article selector should parse")
});
static BODY_PARAGRAPH_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body p").expect("body selector should parse"));

/// Spoiler site addressed by slugified title; the story is read from the
/// page's article paragraphs.
#[derive(Debug, Clone)]
pub struct SpoilerSource {
    client: Client,
    base_url: String,
}

impl SpoilerSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ContentSource for SpoilerSource {
    fn name(&self) -> &'static str {
        "spoiler"
    }

    async fn fetch(&self, page_title: &str) -> Result<Option<SourceDocument>> {
        let slug = slugify(page_title);
        if slug.is_empty() {
            return Ok(None);
        }
        let url = url::Url::parse(&format!("{}/{slug}", self.base_url))
            .map_err(|e| IngestError::Config(format!("invalid spoiler URL {}: {e}", self.base_url)))?;

        let Some(response) = get_optional(&self.client, url).await? else {
            return Ok(None);
        };
        let html = response.text().await?;
        Ok(Some(document_from_html(page_title, &html)))
    }
}

/// Lowercase alphanumerics joined by single hyphens.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn document_from_html(page_title: &str, html: &str) -> SourceDocument {
    let document = Html::parse_document(html);

    let mut paragraphs = collect_text(document.select(&ARTICLE_SELECTOR));
    if paragraphs.is_empty() {
        paragraphs = collect_text(document.select(&BODY_PARAGRAPH_SELECTOR));
    }
    let story = paragraphs.join("\n\n");

    let headline = document
        .select(&HEADLINE_SELECTOR)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    SourceDocument {
        page_title: page_title.to_string(),
        full_text: format!("{headline}\n{story}"),
        section: (!story.is_empty()).then_some(story),
    }
}

fn collect_text<'a>(elements: impl Iterator<Item = ElementRef<'a>>) -> Vec<String> {
    elements
        .map(|element| {
            element
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|text| !text.is_empty())
        .collect()
}
