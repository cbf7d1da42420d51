//! Wiring from resolved configuration to a running pipeline.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use morgue_core::{
    Pipeline,
    database::{PostgresCatalogRepository, PostgresIngestionQueue},
    extract::{DeathExtractor, OpenAiCompatibleGenerator, TextGenerator},
    metadata::{MetadataResolver, TmdbCatalog},
    scrape::{ContentSource, EncyclopediaSource, Scraper, SpoilerSource, WikiSource},
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::{info, warn};

use crate::infra::config::{Config, models::redact_url};

pub async fn connect_database(config: &Config) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database.url)
        .await
        .with_context(|| {
            format!(
                "failed to connect to PostgreSQL at {}",
                redact_url(&config.database.url)
            )
        })?;
    info!("Successfully connected to PostgreSQL");
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    morgue_core::MIGRATOR
        .run(pool)
        .await
        .context("database migration failed")?;
    info!("Database migrations applied successfully");
    Ok(())
}

/// Build the production pipeline: TMDB metadata, wiki victim lists,
/// encyclopedia and spoiler-site narratives, and the optional generation
/// service, all persisting through Postgres.
pub fn build_pipeline(config: &Config, pool: PgPool) -> anyhow::Result<Pipeline> {
    let settings = config.pipeline.clone();
    let http_timeout = settings.timeouts.http();

    let catalog = TmdbCatalog::new(
        config.tmdb.api_key.clone(),
        config.tmdb.base_url.clone(),
        http_timeout,
    )
    .context("failed to initialise TMDB client")?;
    let resolver = MetadataResolver::new(
        Arc::new(catalog),
        settings.metadata_retry,
        http_timeout,
        config.tmdb.region.clone(),
    );

    let wiki: Arc<dyn ContentSource> = Arc::new(
        WikiSource::new(config.sources.wiki_api_url.clone(), http_timeout)
            .context("failed to initialise wiki client")?,
    );
    let encyclopedia: Arc<dyn ContentSource> = Arc::new(
        EncyclopediaSource::new(config.sources.encyclopedia_api_url.clone(), http_timeout)
            .context("failed to initialise encyclopedia client")?,
    );
    let spoiler: Arc<dyn ContentSource> = Arc::new(
        SpoilerSource::new(config.sources.spoiler_base_url.clone(), http_timeout)
            .context("failed to initialise spoiler client")?,
    );

    let generator: Option<Arc<dyn TextGenerator>> = match &config.generation {
        Some(generation) => {
            let client = OpenAiCompatibleGenerator::new(
                generation.api_url.clone(),
                generation.api_key.clone(),
                generation.model.clone(),
            )
            .context("failed to initialise generation client")?;
            info!(model = %generation.model, "generation service configured");
            Some(Arc::new(client))
        }
        None => {
            warn!("generation service disabled; only parsed victim lists will be ingested");
            None
        }
    };

    let scraper = Scraper::new(vec![wiki], vec![encyclopedia, spoiler], settings.scrape.clone())
        .with_generator(generator.clone(), settings.timeouts.validation());
    let extractor = DeathExtractor::new(generator, &settings);

    Ok(Pipeline {
        queue: Arc::new(PostgresIngestionQueue::new(pool.clone())),
        catalog: Arc::new(PostgresCatalogRepository::new(pool)),
        resolver,
        scraper,
        extractor,
        config: settings,
    })
}
