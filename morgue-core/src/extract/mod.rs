//! Structured extractor: turns scraped content into death records.
//!
//! A deterministically parsed wiki list is always preferred. The generation
//! service is used to enrich that list from a plot summary, or to build the
//! list from narrative text when no parsed list exists.

pub mod generation;
pub mod parser;
pub mod prompts;
pub mod repair;

use std::{sync::Arc, time::Duration};

use futures::FutureExt;
use morgue_model::DeathRecord;
use tracing::{debug, info, warn};

use crate::config::{ExtractionConfig, PipelineConfig, RetryPolicy};
use crate::error::{IngestError, Result};
use crate::retry::retry_with_policy;
use crate::scrape::ScrapedContent;

pub use generation::{
    GenerationError, GenerationRequest, OpenAiCompatibleGenerator, TextGenerator,
};
pub use parser::parse_death_list;
pub use repair::parse_generated_deaths;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Parsed list plus plot summary; the model fills in detail.
    Enrichment,
    /// Narrative text only; the model builds the list.
    FullExtraction,
}

impl ExtractionMode {
    fn label(self) -> &'static str {
        match self {
            ExtractionMode::Enrichment => "death enrichment",
            ExtractionMode::FullExtraction => "death extraction",
        }
    }
}

#[derive(Clone)]
pub struct DeathExtractor {
    generator: Option<Arc<dyn TextGenerator>>,
    retry: RetryPolicy,
    timeout: Duration,
    config: ExtractionConfig,
    max_narrative_chars: usize,
}

impl std::fmt::Debug for DeathExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeathExtractor")
            .field("generation_enabled", &self.generator.is_some())
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl DeathExtractor {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>, config: &PipelineConfig) -> Self {
        Self {
            generator,
            retry: config.extraction_retry,
            timeout: config.timeouts.extraction(),
            config: config.extraction.clone(),
            max_narrative_chars: config.scrape.max_narrative_chars,
        }
    }

    pub async fn extract(
        &self,
        title: &str,
        year: i32,
        content: &ScrapedContent,
    ) -> Result<Vec<DeathRecord>> {
        let parsed = &content.parsed_deaths;

        if !parsed.is_empty() {
            let (Some(generator), Some(plot)) = (&self.generator, &content.plot_summary) else {
                debug!(count = parsed.len(), "using parsed death list as-is");
                return Ok(parsed.clone());
            };

            let prompt = prompts::enrichment_prompt(
                title,
                year,
                parsed,
                &clip(plot, self.max_narrative_chars),
            );
            return match self
                .generate(generator.as_ref(), ExtractionMode::Enrichment, &prompt)
                .await
            {
                Ok(enriched) if self.passes_sanity_check(parsed.len(), enriched.len()) => {
                    info!(count = enriched.len(), "enriched parsed death list");
                    Ok(enriched)
                }
                Ok(enriched) => {
                    warn!(
                        parsed = parsed.len(),
                        returned = enriched.len(),
                        "enrichment dropped deaths, keeping parsed list"
                    );
                    Ok(parsed.clone())
                }
                Err(err) => {
                    warn!(error = %err, "enrichment failed, keeping parsed list");
                    Ok(parsed.clone())
                }
            };
        }

        let Some(narrative) = content.narrative() else {
            debug!("no content to extract from");
            return Ok(Vec::new());
        };

        let Some(generator) = &self.generator else {
            return Err(IngestError::Extraction(
                "narrative content found but no generation service is configured".into(),
            ));
        };

        let prompt =
            prompts::extraction_prompt(title, year, &clip(narrative, self.max_narrative_chars));
        let deaths = self
            .generate(generator.as_ref(), ExtractionMode::FullExtraction, &prompt)
            .await
            .map_err(|err| IngestError::Extraction(format!("extraction exhausted: {err}")))?;
        info!(count = deaths.len(), "extracted deaths from narrative");
        Ok(deaths)
    }

    /// Enrichment that returns materially fewer deaths than it was given is
    /// treated as truncated.
    fn passes_sanity_check(&self, parsed: usize, returned: usize) -> bool {
        returned as f64 >= parsed as f64 * self.config.enrichment_min_ratio
    }

    async fn generate(
        &self,
        generator: &dyn TextGenerator,
        mode: ExtractionMode,
        prompt: &str,
    ) -> Result<Vec<DeathRecord>> {
        let request = GenerationRequest {
            system: Some(prompts::SYSTEM_PROMPT),
            prompt,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            timeout: self.timeout,
        };

        retry_with_policy(&self.retry, mode.label(), IngestError::is_transient, |attempt| {
            debug!(attempt, mode = mode.label(), "requesting generation");
            let call = generator.generate(request);
            async move {
                let raw = call.await?;
                parse_generated_deaths(&raw)
                    .map_err(|reason| IngestError::Generation(GenerationError::Malformed(reason)))
            }
            .boxed()
        })
        .await
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    morgue_model::truncate_reason(text, max_chars)
}
