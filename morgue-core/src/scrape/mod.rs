//! Source scraper.
//!
//! Death content comes from three ranked sources: a wiki with structured
//! victim lists, an encyclopedia with plot sections, and a spoiler site.
//! Every fetched page must pass [`validation::validate`] before it is used.

pub mod encyclopedia;
pub mod spoiler;
pub mod validation;
pub mod wiki;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use morgue_model::DeathRecord;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ScrapeConfig;
use crate::error::{IngestError, Result};
use crate::extract::{GenerationRequest, TextGenerator, parse_death_list, prompts};

pub use encyclopedia::EncyclopediaSource;
pub use spoiler::SpoilerSource;
pub use validation::validate;
pub use wiki::WikiSource;

/// Transient result of scraping one movie. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapedContent {
    /// Deaths parsed deterministically from a validated wiki list.
    pub parsed_deaths: Vec<DeathRecord>,
    /// The validated wiki section the list was parsed from.
    pub structured_text: Option<String>,
    /// Plot or narrative text from the encyclopedia or spoiler site.
    pub plot_summary: Option<String>,
    /// `source:page` labels of accepted documents.
    pub sources: Vec<String>,
}

impl ScrapedContent {
    pub fn is_empty(&self) -> bool {
        self.parsed_deaths.is_empty()
            && self.structured_text.is_none()
            && self.plot_summary.is_none()
    }

    /// Best free text for full extraction.
    pub fn narrative(&self) -> Option<&str> {
        self.plot_summary
            .as_deref()
            .or(self.structured_text.as_deref())
            .filter(|text| !text.trim().is_empty())
    }
}

/// A fetched page. `full_text` is what disambiguation inspects; `section`
/// is the part the pipeline consumes, absent when the page has nothing
/// usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub page_title: String,
    pub full_text: String,
    pub section: Option<String>,
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the page does not exist.
    async fn fetch(&self, page_title: &str) -> Result<Option<SourceDocument>>;
}

/// Page titles tried for each source, in order.
pub fn title_variants(title: &str, year: i32) -> Vec<String> {
    let mut variants = vec![title.to_string()];
    if year > 0 {
        variants.push(format!("{title} ({year})"));
    }
    variants.push(format!("{title} (film)"));
    variants
}

/// What a page must describe to be accepted.
#[derive(Debug, Clone, Copy)]
struct Expectation<'a> {
    title: &'a str,
    year: i32,
    director: &'a str,
}

struct Accepted {
    source: &'static str,
    document: SourceDocument,
    section: String,
}

#[derive(Clone)]
pub struct Scraper {
    structured: Vec<Arc<dyn ContentSource>>,
    narrative: Vec<Arc<dyn ContentSource>>,
    confirmer: Option<Arc<dyn TextGenerator>>,
    /// Without a generator a narrative is only useful when no list parsed.
    generation_enabled: bool,
    config: ScrapeConfig,
    validation_timeout: Duration,
}

impl std::fmt::Debug for Scraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |sources: &[Arc<dyn ContentSource>]| {
            sources.iter().map(|s| s.name()).collect::<Vec<_>>()
        };
        f.debug_struct("Scraper")
            .field("structured", &names(&self.structured))
            .field("narrative", &names(&self.narrative))
            .field("confirm_with_model", &self.confirmer.is_some())
            .field("generation_enabled", &self.generation_enabled)
            .finish_non_exhaustive()
    }
}

impl Scraper {
    /// `structured` sources yield victim lists for the deterministic parser;
    /// `narrative` sources yield plot text. Each list is tried in order.
    pub fn new(
        structured: Vec<Arc<dyn ContentSource>>,
        narrative: Vec<Arc<dyn ContentSource>>,
        config: ScrapeConfig,
    ) -> Self {
        Self {
            structured,
            narrative,
            confirmer: None,
            generation_enabled: true,
            config,
            validation_timeout: Duration::from_secs(15),
        }
    }

    /// Declare the generation service the pipeline runs with. Accepted pages
    /// are confirmed by it when `confirm_with_model` is enabled; with `None`
    /// the narrative chain is skipped once a victim list has been parsed.
    pub fn with_generator(
        mut self,
        generator: Option<Arc<dyn TextGenerator>>,
        timeout: Duration,
    ) -> Self {
        self.generation_enabled = generator.is_some();
        self.confirmer = generator.filter(|_| self.config.confirm_with_model);
        self.validation_timeout = timeout;
        self
    }

    /// Gather content for one movie. Source failures are logged and skipped;
    /// no validated source yields empty content.
    pub async fn scrape(&self, title: &str, year: i32, director: &str) -> ScrapedContent {
        let expected = Expectation {
            title,
            year,
            director,
        };
        let variants = title_variants(title, year);
        let mut pacer = Pacer::new(self.config.request_spacing());
        let mut content = ScrapedContent::default();

        if let Some(accepted) = self
            .first_validated(&self.structured, &variants, expected, &mut pacer)
            .await
        {
            content.parsed_deaths = parse_death_list(&accepted.section);
            info!(
                source = accepted.source,
                page = %accepted.document.page_title,
                parsed = content.parsed_deaths.len(),
                "accepted structured death list"
            );
            content
                .sources
                .push(format!("{}:{}", accepted.source, accepted.document.page_title));
            content.structured_text = Some(accepted.section);
        }

        let narrative_usable = self.generation_enabled || content.parsed_deaths.is_empty();
        if !narrative_usable {
            debug!(title, "no generation service for enrichment, skipping narrative sources");
        } else if let Some(accepted) = self
            .first_validated(&self.narrative, &variants, expected, &mut pacer)
            .await
        {
            info!(
                source = accepted.source,
                page = %accepted.document.page_title,
                chars = accepted.section.chars().count(),
                "accepted narrative content"
            );
            content
                .sources
                .push(format!("{}:{}", accepted.source, accepted.document.page_title));
            content.plot_summary = Some(accepted.section);
        }

        if content.is_empty() {
            info!(title, year, "no source validated, treating as zero deaths");
        }
        content
    }

    /// Walk `(source, variant)` candidates in order and return the first page
    /// that has a usable section and passes validation.
    async fn first_validated(
        &self,
        sources: &[Arc<dyn ContentSource>],
        variants: &[String],
        expected: Expectation<'_>,
        pacer: &mut Pacer,
    ) -> Option<Accepted> {
        for source in sources {
            for variant in variants {
                pacer.wait().await;
                if let Some(accepted) = self.try_page(source.as_ref(), variant, expected).await {
                    return Some(accepted);
                }
            }
        }
        None
    }

    async fn try_page(
        &self,
        source: &dyn ContentSource,
        variant: &str,
        expected: Expectation<'_>,
    ) -> Option<Accepted> {
        let document = match source.fetch(variant).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                debug!(source = source.name(), page = %variant, "page not found");
                return None;
            }
            Err(err) => {
                warn!(source = source.name(), page = %variant, error = %err, "source fetch failed");
                return None;
            }
        };

        let Some(section) = document
            .section
            .clone()
            .filter(|section| !section.trim().is_empty())
        else {
            debug!(source = source.name(), page = %variant, "page has no usable section");
            return None;
        };

        if !validate(
            &document.full_text,
            expected.year,
            expected.director,
            self.config.disambiguation_window,
        ) {
            info!(
                source = source.name(),
                page = %variant,
                "rejected page: header mentions neither year nor director"
            );
            return None;
        }

        if !self.confirm(&document, expected).await {
            info!(source = source.name(), page = %variant, "rejected page after model confirmation");
            return None;
        }

        Some(Accepted {
            source: source.name(),
            document,
            section,
        })
    }

    /// Only an explicit "no" rejects; errors keep the header decision.
    async fn confirm(&self, document: &SourceDocument, expected: Expectation<'_>) -> bool {
        let Some(generator) = &self.confirmer else {
            return true;
        };

        let excerpt: String = document
            .full_text
            .chars()
            .take(self.config.disambiguation_window)
            .collect();
        let prompt = prompts::confirmation_prompt(
            expected.title,
            expected.year,
            expected.director,
            &excerpt,
        );
        let request = GenerationRequest {
            system: None,
            prompt: &prompt,
            max_tokens: 8,
            temperature: 0.0,
            timeout: self.validation_timeout,
        };

        match generator.generate(request).await {
            Ok(answer) => !prompts::is_rejection(&answer),
            Err(err) => {
                warn!(error = %err, "model confirmation failed, keeping header decision");
                true
            }
        }
    }
}

/// Spaces consecutive requests; the first one goes out immediately.
struct Pacer {
    spacing: Duration,
    started: bool,
}

impl Pacer {
    fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            started: false,
        }
    }

    async fn wait(&mut self) {
        if self.started && !self.spacing.is_zero() {
            tokio::time::sleep(self.spacing).await;
        }
        self.started = true;
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("morgue/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| IngestError::Config(format!("failed to build HTTP client: {e}")))
}

pub(crate) fn endpoint(base: &str, params: &[(&str, &str)]) -> Result<Url> {
    Url::parse_with_params(base, params)
        .map_err(|e| IngestError::Config(format!("invalid source URL {base}: {e}")))
}

/// GET that maps 404 to `None` and other failures to errors.
pub(crate) async fn get_optional(client: &Client, url: Url) -> Result<Option<Response>> {
    let response = client.get(url.clone()).send().await?;
    match response.status() {
        StatusCode::NOT_FOUND => Ok(None),
        status if status.is_success() => Ok(Some(response)),
        status => Err(IngestError::status(url.as_str(), status)),
    }
}
