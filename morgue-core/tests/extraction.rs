mod support;

use std::sync::Arc;
use std::time::Duration;

use morgue_core::IngestError;
use morgue_core::extract::{DeathExtractor, GenerationError, TextGenerator, parse_death_list};
use morgue_core::scrape::ScrapedContent;
use morgue_core::testing::{ScriptedGenerator, fast_config};
use morgue_model::DeathRecord;

use support::{JAWS_PLOT, JAWS_VICTIMS, generated_deaths, generator};

fn parsed(count: usize) -> Vec<DeathRecord> {
    (0..count)
        .map(|i| DeathRecord::new(format!("Parsed {i}"), "Eaten by the shark"))
        .collect()
}

fn content(parsed_deaths: Vec<DeathRecord>, plot: Option<&str>) -> ScrapedContent {
    ScrapedContent {
        parsed_deaths,
        plot_summary: plot.map(str::to_string),
        ..Default::default()
    }
}

fn extractor(generator: Option<Arc<ScriptedGenerator>>) -> DeathExtractor {
    DeathExtractor::new(
        generator.map(|g| g as Arc<dyn TextGenerator>),
        &fast_config(),
    )
}

#[tokio::test]
async fn without_generation_parsed_list_is_returned() {
    let deaths = parse_death_list(JAWS_VICTIMS);
    let scraped = content(deaths.clone(), Some(JAWS_PLOT));

    let result = extractor(None).extract("Jaws", 1975, &scraped).await.unwrap();

    assert_eq!(result, deaths);
}

#[tokio::test]
async fn without_generation_or_content_result_is_empty() {
    let result = extractor(None)
        .extract("Jaws", 1975, &ScrapedContent::default())
        .await
        .unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
async fn narrative_without_generation_is_fatal() {
    let err = extractor(None)
        .extract("Jaws", 1975, &content(Vec::new(), Some(JAWS_PLOT)))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Extraction(_)));
}

#[tokio::test]
async fn parsed_list_without_plot_skips_generation() {
    let generator = generator([Ok(generated_deaths(4))]);
    let result = extractor(Some(generator.clone()))
        .extract("Jaws", 1975, &content(parsed(4), None))
        .await
        .unwrap();

    assert_eq!(result, parsed(4));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn enrichment_replaces_parsed_list() {
    let generator = generator([Ok(generated_deaths(4))]);
    let result = extractor(Some(generator.clone()))
        .extract("Jaws", 1975, &content(parsed(4), Some(JAWS_PLOT)))
        .await
        .unwrap();

    assert_eq!(result.len(), 4);
    assert_eq!(result[0].time_of_death, "Act 0");
    assert_eq!(generator.calls(), 1);
    let prompt = &generator.prompts()[0];
    assert!(prompt.contains("Return exactly 4 objects"));
    assert!(prompt.contains(JAWS_PLOT));
}

#[tokio::test]
async fn truncated_enrichment_keeps_parsed_list() {
    let generator = generator([Ok(generated_deaths(3))]);
    let result = extractor(Some(generator))
        .extract("Jaws", 1975, &content(parsed(5), Some(JAWS_PLOT)))
        .await
        .unwrap();

    assert_eq!(result, parsed(5));
}

#[tokio::test]
async fn enrichment_at_the_ratio_is_accepted() {
    let generator = generator([Ok(generated_deaths(4))]);
    let result = extractor(Some(generator))
        .extract("Jaws", 1975, &content(parsed(5), Some(JAWS_PLOT)))
        .await
        .unwrap();

    assert_eq!(result.len(), 4);
    assert_eq!(result[0].character, "Victim 0");
}

#[tokio::test(start_paused = true)]
async fn unparseable_output_is_retried() {
    let generator = generator([
        Ok("I'm sorry, I can't list those.".to_string()),
        Err(GenerationError::RateLimited),
        Ok(format!("```json\n{}\n```", generated_deaths(2))),
    ]);
    let started = tokio::time::Instant::now();

    let result = extractor(Some(generator.clone()))
        .extract("Jaws", 1975, &content(Vec::new(), Some(JAWS_PLOT)))
        .await
        .unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(generator.calls(), 3);
    // 2s after the parse failure, 4s after the rate limit.
    assert_eq!(started.elapsed().as_secs(), 6);
}

#[tokio::test(start_paused = true)]
async fn retry_budget_is_five_attempts() {
    let generator = generator((0..10).map(|_| Err(GenerationError::Server(500))));

    let result = extractor(Some(generator.clone()))
        .extract("Jaws", 1975, &content(parsed(2), Some(JAWS_PLOT)))
        .await
        .unwrap();

    assert_eq!(result, parsed(2));
    assert_eq!(generator.calls(), 5);
}

#[tokio::test]
async fn credential_errors_are_not_retried() {
    let generator = generator([Err(GenerationError::Unauthorized(401)), Ok(generated_deaths(2))]);

    let result = extractor(Some(generator.clone()))
        .extract("Jaws", 1975, &content(parsed(2), Some(JAWS_PLOT)))
        .await
        .unwrap();

    assert_eq!(result, parsed(2));
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn timeouts_are_not_retried() {
    let generator = generator([
        Err(GenerationError::Timeout(Duration::from_secs(120))),
        Ok(generated_deaths(2)),
    ]);

    let err = extractor(Some(generator.clone()))
        .extract("Jaws", 1975, &content(Vec::new(), Some(JAWS_PLOT)))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Extraction(_)));
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn full_extraction_repairs_missing_braces() {
    let generator = generator([Ok(
        "Here are the deaths:\n[\"character\": \"Quint\", \"cause\": \"Eaten\", \"character\": \"Chrissie\", \"cause\": \"Eaten\"]"
            .to_string(),
    )]);

    let result = extractor(Some(generator))
        .extract("Jaws", 1975, &content(Vec::new(), Some(JAWS_PLOT)))
        .await
        .unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result[0].character, "Quint");
    assert_eq!(result[1].killed_by, "N/A");
}
