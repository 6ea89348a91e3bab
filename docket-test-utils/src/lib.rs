//! Docket Test Utilities
//!
//! Shared test infrastructure for the docket workspace:
//! - Proptest generators for records and filters
//! - An instrumented record store that counts calls and injects latency or
//!   failures
//! - Test fixtures for common scenarios
//! - Assertions for comparing unordered result sets

// Re-export the in-memory store from its source crate
pub use docket_storage::{
    ApplicationStore, CacheConfig, CachedApplicationStore, MockApplicationStore,
};

// Re-export core types for convenience
pub use docket_core::{
    Application, ApplicationFilter, ApplicationId, ApplicationStatus, DocketError, DocketResult,
    ExternalStatus, StatusUpdate, StorageError, TimeRange, Timestamp, UserId,
};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

// ============================================================================
// INSTRUMENTED STORE
// ============================================================================

/// Record store operations, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Create,
    FindById,
    FindByFilters,
    Update,
    FindAll,
}

impl StoreOp {
    const ALL: [StoreOp; 5] = [
        StoreOp::Create,
        StoreOp::FindById,
        StoreOp::FindByFilters,
        StoreOp::Update,
        StoreOp::FindAll,
    ];

    fn slot(self) -> usize {
        match self {
            StoreOp::Create => 0,
            StoreOp::FindById => 1,
            StoreOp::FindByFilters => 2,
            StoreOp::Update => 3,
            StoreOp::FindAll => 4,
        }
    }
}

/// Wraps a record store, counting every call per operation.
///
/// Optionally delays each call (so concurrent callers overlap) and fails
/// chosen operations with a fixed error.
#[derive(Debug)]
pub struct CountingStore<S> {
    inner: S,
    calls: [AtomicUsize; 5],
    latency: Option<Duration>,
    failures: Mutex<HashMap<StoreOp, DocketError>>,
}

impl<S: ApplicationStore> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Default::default(),
            latency: None,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail every subsequent `op` with `error`.
    pub fn fail_on(&self, op: StoreOp, error: impl Into<DocketError>) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(op, error.into());
    }

    /// Stop failing `op`.
    pub fn heal(&self, op: StoreOp) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&op);
    }

    /// Number of calls made to `op`.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls[op.slot()].load(Ordering::SeqCst)
    }

    /// Total number of calls across all operations.
    pub fn total_calls(&self) -> usize {
        StoreOp::ALL.iter().map(|op| self.calls(*op)).sum()
    }

    /// Zero every counter.
    pub fn reset_calls(&self) {
        for counter in &self.calls {
            counter.store(0, Ordering::SeqCst);
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn enter(&self, op: StoreOp) -> DocketResult<()> {
        self.calls[op.slot()].fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let failure = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&op)
            .cloned();
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<S: ApplicationStore> ApplicationStore for CountingStore<S> {
    async fn create(&self, app: &Application) -> DocketResult<()> {
        self.enter(StoreOp::Create).await?;
        self.inner.create(app).await
    }

    async fn find_by_id(&self, id: ApplicationId) -> DocketResult<Option<Application>> {
        self.enter(StoreOp::FindById).await?;
        self.inner.find_by_id(id).await
    }

    async fn find_by_filters(&self, filter: &ApplicationFilter) -> DocketResult<Vec<Application>> {
        self.enter(StoreOp::FindByFilters).await?;
        self.inner.find_by_filters(filter).await
    }

    async fn update(&self, update: &StatusUpdate) -> DocketResult<Application> {
        self.enter(StoreOp::Update).await?;
        self.inner.update(update).await
    }

    async fn find_all(&self) -> DocketResult<Vec<Application>> {
        self.enter(StoreOp::FindAll).await?;
        self.inner.find_all().await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating docket records and filters.
    //!
    //! Timestamps are drawn from a one-hour grid of whole minutes so that
    //! generated ranges and records collide often enough to exercise every
    //! intersection path.

    use super::fixtures::at_minute;
    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    /// Minutes in the timestamp grid.
    pub const GRID_MINUTES: i64 = 60;

    /// Generate a random non-nil UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>()
            .prop_map(Uuid::from_bytes)
            .prop_filter("nil ids are rejected", |id| !id.is_nil())
    }

    pub fn arb_application_id() -> impl Strategy<Value = ApplicationId> {
        arb_uuid().prop_map(ApplicationId::from_uuid)
    }

    pub fn arb_user_id() -> impl Strategy<Value = UserId> {
        arb_uuid().prop_map(UserId::from_uuid)
    }

    /// Generate a timestamp on the minute grid.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (0..GRID_MINUTES).prop_map(at_minute)
    }

    /// Generate a valid (non-sentinel) ApplicationStatus.
    pub fn arb_application_status() -> impl Strategy<Value = ApplicationStatus> {
        prop_oneof![
            Just(ApplicationStatus::Open),
            Just(ApplicationStatus::InProgress),
            Just(ApplicationStatus::Closed),
        ]
    }

    /// Generate a valid (non-sentinel) ExternalStatus.
    pub fn arb_external_status() -> impl Strategy<Value = ExternalStatus> {
        prop_oneof![Just(ExternalStatus::Processed), Just(ExternalStatus::Skipped)]
    }

    /// Generate a non-empty half-open range on the minute grid.
    pub fn arb_time_range() -> impl Strategy<Value = TimeRange> {
        (0..GRID_MINUTES, 1..GRID_MINUTES / 2).prop_map(|(start, len)| {
            TimeRange::new(at_minute(start), at_minute(start + len))
        })
    }

    /// Generate a valid record owned by one of `owners`.
    pub fn arb_application(owners: Vec<UserId>) -> impl Strategy<Value = Application> {
        (
            arb_application_id(),
            prop::sample::select(owners),
            arb_application_status(),
            arb_external_status(),
            0..GRID_MINUTES,
            0..GRID_MINUTES / 4,
        )
            .prop_map(|(id, owner, status, external, created, age)| Application {
                id,
                status,
                owner,
                created_at: at_minute(created),
                updated_at: at_minute(created + age),
                external_status: external,
            })
    }

    /// Generate a filter with at least one predicate, drawing owners from
    /// `owners` most of the time.
    pub fn arb_filter(owners: Vec<UserId>) -> impl Strategy<Value = ApplicationFilter> {
        let owner = prop_oneof![
            3 => prop::sample::select(owners),
            1 => arb_user_id(),
        ];
        (
            prop::option::of(arb_application_status()),
            prop::option::of(owner),
            prop::option::of(arb_time_range()),
            prop::option::of(arb_time_range()),
        )
            .prop_map(|(status, owner, created_at, updated_at)| ApplicationFilter {
                status,
                owner,
                created_at,
                updated_at,
            })
            .prop_filter("filters need a predicate", |filter| !filter.is_empty())
    }

    /// Generate a record population together with a filter over it.
    pub fn arb_population_and_filter(
        max_records: usize,
    ) -> impl Strategy<Value = (Vec<Application>, ApplicationFilter)> {
        prop::collection::vec(arb_user_id(), 1..4).prop_flat_map(move |owners| {
            (
                prop::collection::vec(arb_application(owners.clone()), 0..max_records),
                arb_filter(owners),
            )
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use chrono::{DateTime, Duration as ChronoDuration};

    /// Start of the fixture time grid: 2024-01-01T00:00:00Z.
    pub const EPOCH_SECS: i64 = 1_704_067_200;

    /// Timestamp `minute` minutes after the fixture epoch.
    pub fn at_minute(minute: i64) -> Timestamp {
        DateTime::from_timestamp(EPOCH_SECS, 0)
            .map(|epoch| epoch + ChronoDuration::minutes(minute))
            .unwrap_or_default()
    }

    /// A valid record with the given indexed fields.
    pub fn make_application(
        status: ApplicationStatus,
        owner: UserId,
        created_at: Timestamp,
    ) -> Application {
        Application {
            id: ApplicationId::new(),
            status,
            owner,
            created_at,
            updated_at: created_at,
            external_status: ExternalStatus::Processed,
        }
    }

    /// Two records owned by the same user.
    ///
    /// `a` is Open and created at `t0`; `b` is Closed and created at `t1`.
    #[derive(Debug, Clone)]
    pub struct TwoRecordScenario {
        pub owner: UserId,
        pub t0: Timestamp,
        pub t1: Timestamp,
        pub a: Application,
        pub b: Application,
    }

    impl TwoRecordScenario {
        pub fn new() -> Self {
            let owner = UserId::new();
            let t0 = at_minute(0);
            let t1 = at_minute(10);
            Self {
                owner,
                t0,
                t1,
                a: make_application(ApplicationStatus::Open, owner, t0),
                b: make_application(ApplicationStatus::Closed, owner, t1),
            }
        }

        pub fn records(&self) -> Vec<Application> {
            vec![self.a.clone(), self.b.clone()]
        }

        pub fn store(&self) -> MockApplicationStore {
            MockApplicationStore::with_applications(self.records())
        }
    }

    impl Default for TwoRecordScenario {
        fn default() -> Self {
            Self::new()
        }
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for unordered record sets.

    use super::*;
    use std::collections::BTreeMap;

    fn by_id(apps: &[Application]) -> BTreeMap<ApplicationId, &Application> {
        apps.iter().map(|app| (app.id, app)).collect()
    }

    /// Assert two result sets hold the same records, ignoring order.
    pub fn assert_same_records(actual: &[Application], expected: &[Application]) {
        assert_eq!(
            actual.len(),
            expected.len(),
            "result size differs: got {} records, expected {}",
            actual.len(),
            expected.len()
        );
        assert_eq!(by_id(actual), by_id(expected), "result sets differ");
    }

    /// Assert `actual` holds exactly the records with the given ids.
    pub fn assert_ids(actual: &[Application], expected: &[ApplicationId]) {
        let mut got: Vec<_> = actual.iter().map(|app| app.id).collect();
        let mut want = expected.to_vec();
        got.sort();
        want.sort();
        assert_eq!(got, want, "result ids differ");
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::generators::*;
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_counting_store_counts_calls() {
        let store = CountingStore::new(MockApplicationStore::new());
        let app = make_application(ApplicationStatus::Open, UserId::new(), at_minute(0));

        store.create(&app).await.unwrap();
        store.find_by_id(app.id).await.unwrap();
        store.find_by_id(app.id).await.unwrap();

        assert_eq!(store.calls(StoreOp::Create), 1);
        assert_eq!(store.calls(StoreOp::FindById), 2);
        assert_eq!(store.total_calls(), 3);

        store.reset_calls();
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_counting_store_injects_failures() {
        let store = CountingStore::new(MockApplicationStore::new());
        store.fail_on(
            StoreOp::FindAll,
            StorageError::Unavailable {
                reason: "offline".to_string(),
            },
        );

        assert!(store.find_all().await.is_err());
        assert_eq!(store.calls(StoreOp::FindAll), 1);

        store.heal(StoreOp::FindAll);
        assert!(store.find_all().await.unwrap().is_empty());
    }

    #[test]
    fn test_scenario_is_valid() {
        let scenario = TwoRecordScenario::new();
        assert!(scenario.a.validate().is_ok());
        assert!(scenario.b.validate().is_ok());
        assert!(scenario.t0 < scenario.t1);
        assert_eq!(scenario.store().application_count(), 2);
    }

    proptest! {
        #[test]
        fn prop_generated_applications_are_valid(app in arb_application(vec![UserId::new()])) {
            prop_assert!(app.validate().is_ok());
        }

        #[test]
        fn prop_generated_filters_are_valid(filter in arb_filter(vec![UserId::new()])) {
            prop_assert!(filter.validate().is_ok());
        }
    }
}
