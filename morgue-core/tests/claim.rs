use std::sync::Arc;

use futures::future::join_all;
use morgue_core::database::{EnqueueOutcome, IngestionQueue};
use morgue_core::testing::InMemoryStore;
use morgue_model::{JobId, JobStatus};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_specific_claims_have_one_winner() {
    let store = InMemoryStore::new();
    let job_id = store.push_job("jaws", None);

    let attempts = (0..16).map(|_| {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.claim_specific(job_id).await.unwrap() })
    });
    let results: Vec<bool> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|won| **won).count(), 1);
    assert_eq!(store.job(job_id).unwrap().status, JobStatus::Processing);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_pollers_never_share_a_job() {
    let store = InMemoryStore::new();
    let ids: Vec<JobId> = (0..5)
        .map(|i| store.push_job(&format!("movie {i}"), None))
        .collect();

    let attempts = (0..12).map(|_| {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.claim_next_pending().await.unwrap() })
    });
    let mut claimed: Vec<JobId> = join_all(attempts)
        .await
        .into_iter()
        .filter_map(|joined| joined.unwrap())
        .map(|job| job.id)
        .collect();
    claimed.sort();

    let mut expected = ids.clone();
    expected.sort();
    assert_eq!(claimed, expected);
}

#[tokio::test]
async fn claim_next_takes_the_oldest_pending_job() {
    let store = InMemoryStore::new();
    let first = store.push_job("first", None);
    let second = store.push_job("second", None);

    assert_eq!(store.claim_next_pending().await.unwrap().unwrap().id, first);
    assert_eq!(store.claim_next_pending().await.unwrap().unwrap().id, second);
    assert!(store.claim_next_pending().await.unwrap().is_none());
}

#[tokio::test]
async fn specific_claim_tolerates_missing_and_finished_jobs() {
    let store = InMemoryStore::new();
    assert!(!store.claim_specific(JobId::new()).await.unwrap());

    let job_id = store.push_job("jaws", None);
    store.set_status(job_id, JobStatus::Failed);
    assert!(!store.claim_specific(job_id).await.unwrap());
    assert_eq!(store.job(job_id).unwrap().status, JobStatus::Failed);
}

#[tokio::test]
async fn terminal_jobs_do_not_transition_again() {
    let store = InMemoryStore::new();
    let job_id = store.push_job("jaws", None);
    assert!(store.claim_specific(job_id).await.unwrap());

    assert!(store.mark_failed(job_id, "boom").await.unwrap());
    assert!(!store.mark_complete(job_id, None).await.unwrap());
    assert!(!store.mark_failed(job_id, "again").await.unwrap());

    let job = store.job(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.failure_reason.as_deref(), Some("boom"));
}

#[tokio::test]
async fn enqueue_suppresses_active_duplicates_case_insensitively() {
    let store = InMemoryStore::new();
    let created = store.enqueue("Jaws 1975", None).await.unwrap();
    let EnqueueOutcome::Created(job_id) = created else {
        panic!("expected a new job, got {created:?}");
    };

    assert_eq!(
        store.enqueue("  jaws 1975 ", None).await.unwrap(),
        EnqueueOutcome::Duplicate(job_id)
    );

    assert!(store.claim_specific(job_id).await.unwrap());
    assert!(store.mark_complete(job_id, None).await.unwrap());
    assert!(matches!(
        store.enqueue("jaws 1975", None).await.unwrap(),
        EnqueueOutcome::Created(_)
    ));
}
