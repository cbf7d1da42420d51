//! Postgres adapters against a throwaway database per test.

use anyhow::Result;
use morgue_core::IngestError;
use morgue_core::database::{
    CatalogRepository, EnqueueOutcome, IngestionQueue, PostgresCatalogRepository,
    PostgresIngestionQueue,
};
use morgue_model::{DeathRecord, JobStatus, MovieRecord, TmdbId};
use sqlx::PgPool;

fn jaws() -> MovieRecord {
    MovieRecord {
        tmdb_id: TmdbId(578),
        title: "Jaws".into(),
        year: 1975,
        director: "Steven Spielberg".into(),
        tagline: Some("Don't go in the water.".into()),
        poster_path: None,
        runtime: 124,
        content_rating: "PG".into(),
    }
}

#[sqlx::test(migrator = "morgue_core::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn enqueue_suppresses_active_duplicates(pool: PgPool) -> Result<()> {
    let queue = PostgresIngestionQueue::new(pool);

    let first = queue.enqueue("Jaws", Some(1975)).await?;
    assert!(matches!(first, EnqueueOutcome::Created(_)));

    let again = queue.enqueue("  jaws ", None).await?;
    assert_eq!(again, EnqueueOutcome::Duplicate(first.job_id()));

    assert!(queue.claim_specific(first.job_id()).await?);
    assert!(queue.mark_failed(first.job_id(), "boom").await?);

    let after_failure = queue.enqueue("Jaws", Some(1975)).await?;
    assert!(matches!(after_failure, EnqueueOutcome::Created(_)));
    Ok(())
}

#[sqlx::test(migrator = "morgue_core::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn claims_are_exclusive_and_oldest_first(pool: PgPool) -> Result<()> {
    let queue = PostgresIngestionQueue::new(pool);
    let older = queue.enqueue("Alien", None).await?.job_id();
    let newer = queue.enqueue("Halloween", None).await?.job_id();

    let (a, b) = tokio::join!(queue.claim_next_pending(), queue.claim_next_pending());
    let mut claimed: Vec<_> = [a?, b?].into_iter().flatten().map(|job| job.id).collect();
    claimed.sort();
    let mut expected = vec![older, newer];
    expected.sort();
    assert_eq!(claimed, expected);
    assert!(queue.claim_next_pending().await?.is_none());

    let third = queue.enqueue("Scream", None).await?.job_id();
    let (x, y) = tokio::join!(queue.claim_specific(third), queue.claim_specific(third));
    assert!(x? ^ y?, "exactly one claimer wins");
    Ok(())
}

#[sqlx::test(migrator = "morgue_core::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn terminal_jobs_never_transition(pool: PgPool) -> Result<()> {
    let queue = PostgresIngestionQueue::new(pool);
    let id = queue.enqueue("Jaws", None).await?.job_id();

    // Not yet processing.
    assert!(!queue.mark_complete(id, None).await?);

    assert!(queue.claim_specific(id).await?);
    queue.record_resolution(id, TmdbId(578)).await?;
    assert!(queue.mark_complete(id, None).await?);

    assert!(!queue.mark_failed(id, "late failure").await?);
    assert!(!queue.claim_specific(id).await?);

    let job = queue.get(id).await?.expect("job exists");
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(job.tmdb_id, Some(TmdbId(578)));
    assert!(job.completed_at.is_some());
    assert!(job.failure_reason.is_none());
    Ok(())
}

#[sqlx::test(migrator = "morgue_core::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn reports_jobs_that_resolved_the_movie_first(pool: PgPool) -> Result<()> {
    let queue = PostgresIngestionQueue::new(pool);
    let older = queue.enqueue("Jaws", None).await?.job_id();
    let newer = queue.enqueue("Jaws 1975", None).await?.job_id();
    assert!(queue.claim_specific(older).await?);
    assert!(queue.claim_specific(newer).await?);

    // The newer job reaches metadata resolution first.
    queue.record_resolution(newer, TmdbId(578)).await?;
    queue.record_resolution(older, TmdbId(578)).await?;
    // A retried resolution keeps its original stamp.
    queue.record_resolution(newer, TmdbId(578)).await?;

    assert_eq!(queue.find_earlier_processing(TmdbId(578), older).await?, Some(newer));
    assert_eq!(queue.find_earlier_processing(TmdbId(578), newer).await?, None);
    assert_eq!(queue.find_earlier_processing(TmdbId(1), older).await?, None);

    let stamped = queue.get(newer).await?.expect("job exists");
    assert!(stamped.resolved_at.is_some());
    Ok(())
}

#[sqlx::test(migrator = "morgue_core::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn commit_replaces_the_death_set(pool: PgPool) -> Result<()> {
    let queue = PostgresIngestionQueue::new(pool.clone());
    let catalog = PostgresCatalogRepository::new(pool);

    let first = queue.enqueue("Jaws", None).await?.job_id();
    assert!(queue.claim_specific(first).await?);
    let deaths = vec![
        DeathRecord::new("Chrissie Watkins", "Eaten by the shark"),
        DeathRecord::new("Alex Kintner", "Eaten by the shark"),
        DeathRecord::new("Quint", "Eaten by the shark"),
    ];
    catalog.commit_ingestion(first, &jaws(), &deaths).await?;

    assert!(catalog.movie_exists(TmdbId(578)).await?);
    assert_eq!(catalog.get_movie(TmdbId(578)).await?, Some(jaws()));
    assert_eq!(catalog.deaths_for(TmdbId(578)).await?, deaths);
    assert_eq!(queue.get(first).await?.expect("job").status, JobStatus::Complete);

    let second = queue.enqueue("Jaws", None).await?.job_id();
    assert!(queue.claim_specific(second).await?);
    let mut retitled = jaws();
    retitled.runtime = 130;
    let replacement = vec![DeathRecord::new("Ben Gardner", "Killed off-screen")];
    catalog.commit_ingestion(second, &retitled, &replacement).await?;

    assert_eq!(catalog.deaths_for(TmdbId(578)).await?, replacement);
    assert_eq!(catalog.get_movie(TmdbId(578)).await?.map(|m| m.runtime), Some(130));
    Ok(())
}

#[sqlx::test(migrator = "morgue_core::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn commit_for_a_finished_job_writes_nothing(pool: PgPool) -> Result<()> {
    let queue = PostgresIngestionQueue::new(pool.clone());
    let catalog = PostgresCatalogRepository::new(pool);

    let id = queue.enqueue("Jaws", None).await?.job_id();
    assert!(queue.claim_specific(id).await?);
    assert!(queue.mark_failed(id, "gave up").await?);

    let err = catalog
        .commit_ingestion(id, &jaws(), &[DeathRecord::new("Quint", "Eaten")])
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Internal(_)));

    assert!(!catalog.movie_exists(TmdbId(578)).await?);
    assert!(catalog.deaths_for(TmdbId(578)).await?.is_empty());
    let job = queue.get(id).await?.expect("job");
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.failure_reason.as_deref(), Some("gave up"));
    Ok(())
}
