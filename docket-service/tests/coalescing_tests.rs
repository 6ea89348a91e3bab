//! Write Coalescing Tests
//!
//! Concurrent writes to the same application id SHALL reach the record store
//! once. Every caller receives the leader's outcome, success or failure.
//! Writes to different ids SHALL proceed independently.

use std::sync::Arc;
use std::time::Duration;

use docket_test_utils::fixtures::{at_minute, make_application};
use docket_test_utils::{
    Application, ApplicationStatus, ApplicationStore, CacheConfig, CachedApplicationStore,
    CountingStore, DocketResult, MockApplicationStore, StatusUpdate, StorageError, StoreOp,
    UserId,
};

const STORE_LATENCY: Duration = Duration::from_millis(100);

type Repository = CachedApplicationStore<Arc<CountingStore<MockApplicationStore>>>;

async fn slow_repository(
    records: Vec<Application>,
) -> (Arc<CountingStore<MockApplicationStore>>, Arc<Repository>) {
    let store = Arc::new(
        CountingStore::new(MockApplicationStore::with_applications(records))
            .with_latency(STORE_LATENCY),
    );
    let repo = CachedApplicationStore::new(Arc::clone(&store), CacheConfig::default())
        .await
        .unwrap();
    store.reset_calls();
    (store, Arc::new(repo))
}

async fn concurrent_updates(
    repo: &Arc<Repository>,
    update: StatusUpdate,
    callers: usize,
) -> Vec<DocketResult<Application>> {
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let repo = Arc::clone(repo);
            tokio::spawn(async move { repo.update(&update).await })
        })
        .collect();

    let mut results = Vec::with_capacity(callers);
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_reach_store_once() {
    let app = make_application(ApplicationStatus::Open, UserId::new(), at_minute(0));
    let (store, repo) = slow_repository(vec![app.clone()]).await;

    let results = concurrent_updates(
        &repo,
        StatusUpdate::new(app.id, ApplicationStatus::Closed),
        2,
    )
    .await;

    let first = results[0].clone().unwrap();
    assert_eq!(first.status, ApplicationStatus::Closed);
    assert!(results.iter().all(|r| r.as_ref() == Ok(&first)));
    assert_eq!(store.calls(StoreOp::Update), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_callers_share_one_write() {
    let app = make_application(ApplicationStatus::Open, UserId::new(), at_minute(0));
    let (store, repo) = slow_repository(vec![app.clone()]).await;

    let results = concurrent_updates(
        &repo,
        StatusUpdate::new(app.id, ApplicationStatus::InProgress),
        8,
    )
    .await;

    let first = results[0].clone().unwrap();
    assert!(results.iter().all(|r| r.as_ref() == Ok(&first)));
    assert_eq!(store.calls(StoreOp::Update), 1);

    let metrics = repo.coalesce_metrics();
    assert_eq!(metrics.leader_count, 1);
    assert_eq!(metrics.joined_count, 7);

    // The leader refreshed the cache; reads no longer need the store.
    assert_eq!(repo.find_by_id(app.id).await.unwrap(), Some(first));
    assert_eq!(store.calls(StoreOp::FindById), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_store_failure_is_shared_by_joiners() {
    let app = make_application(ApplicationStatus::Open, UserId::new(), at_minute(0));
    let (store, repo) = slow_repository(vec![app.clone()]).await;
    let outage = StorageError::Unavailable {
        reason: "connection reset".to_string(),
    };
    store.fail_on(StoreOp::Update, outage.clone());

    let update = StatusUpdate::new(app.id, ApplicationStatus::Closed);
    let results = concurrent_updates(&repo, update, 4).await;

    let expected: DocketResult<Application> = Err(outage.into());
    assert!(results.iter().all(|r| r == &expected));
    assert_eq!(store.calls(StoreOp::Update), 1);

    // Failures are not remembered: the next write runs again.
    store.heal(StoreOp::Update);
    let updated = repo.update(&update).await.unwrap();
    assert_eq!(updated.status, ApplicationStatus::Closed);
    assert_eq!(store.calls(StoreOp::Update), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_different_ids_write_independently() {
    let owner = UserId::new();
    let a = make_application(ApplicationStatus::Open, owner, at_minute(0));
    let b = make_application(ApplicationStatus::Open, owner, at_minute(1));
    let (store, repo) = slow_repository(vec![a.clone(), b.clone()]).await;

    let update_a = StatusUpdate::new(a.id, ApplicationStatus::Closed);
    let update_b = StatusUpdate::new(b.id, ApplicationStatus::InProgress);
    let (ra, rb) = tokio::join!(repo.update(&update_a), repo.update(&update_b));

    assert_eq!(ra.unwrap().status, ApplicationStatus::Closed);
    assert_eq!(rb.unwrap().status, ApplicationStatus::InProgress);
    assert_eq!(store.calls(StoreOp::Update), 2);
    assert_eq!(repo.coalesce_metrics().joined_count, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_insert_once() {
    let (store, repo) = slow_repository(Vec::new()).await;
    let app = make_application(ApplicationStatus::Open, UserId::new(), at_minute(0));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let repo = Arc::clone(&repo);
            let app = app.clone();
            tokio::spawn(async move { repo.create(&app).await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), Ok(()));
    }

    assert_eq!(store.calls(StoreOp::Create), 1);
    assert_eq!(store.inner().application_count(), 1);
    assert_eq!(repo.cache().len(), 1);
}
