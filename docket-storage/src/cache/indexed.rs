//! Primary record map and secondary indexes.
//!
//! Records are held as serde_json snapshots so a caller can never mutate a
//! cached value in place; every read decodes a fresh copy. Each snapshot is
//! reachable from exactly one bucket of each secondary index, keyed by the
//! record's current field values.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use docket_core::{
    Application, ApplicationFilter, ApplicationId, ApplicationStatus, DocketResult, StorageError,
    TimeRange, Timestamp, UserId,
};

use super::planner;

pub(crate) type IdSet = HashSet<ApplicationId>;

/// Field values a record is currently indexed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexKeys {
    status: ApplicationStatus,
    owner: UserId,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl IndexKeys {
    fn of(app: &Application) -> Self {
        Self {
            status: app.status,
            owner: app.owner,
            created_at: app.created_at,
            updated_at: app.updated_at,
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    snapshot: Vec<u8>,
    keys: IndexKeys,
}

impl CacheEntry {
    fn encode(app: &Application) -> Result<Self, StorageError> {
        Ok(Self {
            snapshot: serde_json::to_vec(app)?,
            keys: IndexKeys::of(app),
        })
    }

    fn decode(&self) -> Result<Application, StorageError> {
        Ok(serde_json::from_slice(&self.snapshot)?)
    }
}

/// Everything guarded by the cache lock.
#[derive(Debug, Default)]
pub(crate) struct CacheTables {
    records: HashMap<ApplicationId, CacheEntry>,
    by_status: HashMap<ApplicationStatus, IdSet>,
    by_owner: HashMap<UserId, IdSet>,
    by_created_at: BTreeMap<Timestamp, IdSet>,
    by_updated_at: BTreeMap<Timestamp, IdSet>,
}

impl CacheTables {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            records: HashMap::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Replace the entry for `id` and move it to the buckets of its new keys.
    fn upsert(&mut self, id: ApplicationId, entry: CacheEntry) {
        if let Some(previous) = self.records.get(&id) {
            let keys = previous.keys;
            self.unindex(id, &keys);
        }
        self.index(id, &entry.keys);
        self.records.insert(id, entry);
    }

    /// Upsert unless the cached entry was updated strictly later.
    fn upsert_unless_newer(&mut self, id: ApplicationId, entry: CacheEntry) -> bool {
        let newer_cached = self
            .records
            .get(&id)
            .is_some_and(|cached| cached.keys.updated_at > entry.keys.updated_at);
        if newer_cached {
            return false;
        }
        self.upsert(id, entry);
        true
    }

    fn index(&mut self, id: ApplicationId, keys: &IndexKeys) {
        self.by_status.entry(keys.status).or_default().insert(id);
        self.by_owner.entry(keys.owner).or_default().insert(id);
        self.by_created_at
            .entry(keys.created_at)
            .or_default()
            .insert(id);
        self.by_updated_at
            .entry(keys.updated_at)
            .or_default()
            .insert(id);
    }

    fn unindex(&mut self, id: ApplicationId, keys: &IndexKeys) {
        remove_hashed(&mut self.by_status, &keys.status, id);
        remove_hashed(&mut self.by_owner, &keys.owner, id);
        remove_ranged(&mut self.by_created_at, &keys.created_at, id);
        remove_ranged(&mut self.by_updated_at, &keys.updated_at, id);
    }

    /// Decode the cached snapshot of `id`.
    pub(crate) fn decode(&self, id: ApplicationId) -> Result<Option<Application>, StorageError> {
        self.records.get(&id).map(CacheEntry::decode).transpose()
    }

    pub(crate) fn ids_with_status(
        &self,
        status: ApplicationStatus,
    ) -> impl Iterator<Item = ApplicationId> + '_ {
        self.by_status.get(&status).into_iter().flatten().copied()
    }

    pub(crate) fn ids_with_owner(&self, owner: UserId) -> impl Iterator<Item = ApplicationId> + '_ {
        self.by_owner.get(&owner).into_iter().flatten().copied()
    }

    pub(crate) fn ids_created_in(&self, range: TimeRange) -> impl Iterator<Item = ApplicationId> + '_ {
        range_ids(&self.by_created_at, range)
    }

    pub(crate) fn ids_updated_in(&self, range: TimeRange) -> impl Iterator<Item = ApplicationId> + '_ {
        range_ids(&self.by_updated_at, range)
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    /// Every record sits in exactly the buckets of its keys, and every
    /// bucket member has a record.
    fn verify(&self) -> Result<(), StorageError> {
        let broken = |id: ApplicationId| StorageError::IndexInconsistent { id: id.as_uuid() };

        for (id, entry) in &self.records {
            let keys = entry.keys;
            let indexed = bucket_holds(&self.by_status, &keys.status, id)
                && bucket_holds(&self.by_owner, &keys.owner, id)
                && self
                    .by_created_at
                    .get(&keys.created_at)
                    .is_some_and(|ids| ids.contains(id))
                && self
                    .by_updated_at
                    .get(&keys.updated_at)
                    .is_some_and(|ids| ids.contains(id));
            if !indexed {
                return Err(broken(*id));
            }
        }

        let keys_of = |id: &ApplicationId| self.records.get(id).map(|entry| entry.keys);
        let stray = stray_member(&self.by_status, |id| keys_of(id).map(|k| k.status))
            .or_else(|| stray_member(&self.by_owner, |id| keys_of(id).map(|k| k.owner)))
            .or_else(|| stray_member(&self.by_created_at, |id| keys_of(id).map(|k| k.created_at)))
            .or_else(|| stray_member(&self.by_updated_at, |id| keys_of(id).map(|k| k.updated_at)));
        match stray {
            Some(id) => Err(broken(id)),
            None => Ok(()),
        }
    }
}

/// First bucket member whose record is missing or keyed elsewhere.
fn stray_member<'a, K: PartialEq + 'a>(
    buckets: impl IntoIterator<Item = (&'a K, &'a IdSet)>,
    key_of: impl Fn(&ApplicationId) -> Option<K>,
) -> Option<ApplicationId> {
    buckets.into_iter().find_map(|(key, ids)| {
        ids.iter()
            .find(|id| key_of(id).as_ref() != Some(key))
            .copied()
    })
}

fn bucket_holds<K: Eq + Hash>(index: &HashMap<K, IdSet>, key: &K, id: &ApplicationId) -> bool {
    index.get(key).is_some_and(|ids| ids.contains(id))
}

fn remove_hashed<K: Eq + Hash>(index: &mut HashMap<K, IdSet>, key: &K, id: ApplicationId) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(&id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

fn remove_ranged(index: &mut BTreeMap<Timestamp, IdSet>, key: &Timestamp, id: ApplicationId) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(&id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

fn encode_all(apps: &[Application]) -> Result<Vec<(ApplicationId, CacheEntry)>, StorageError> {
    apps.iter()
        .map(|app| CacheEntry::encode(app).map(|entry| (app.id, entry)))
        .collect()
}

/// Ids whose key lies in `[start, end)`. Empty for an inverted range.
fn range_ids(
    index: &BTreeMap<Timestamp, IdSet>,
    range: TimeRange,
) -> impl Iterator<Item = ApplicationId> + '_ {
    let bounds = (range.start < range.end).then_some(range.start..range.end);
    bounds
        .into_iter()
        .flat_map(move |bounds| index.range(bounds))
        .flat_map(|(_, ids)| ids.iter().copied())
}

// ============================================================================
// INDEXED CACHE
// ============================================================================

/// In-memory record cache with status, owner and time indexes.
///
/// All mutation of one record (primary entry plus its four index buckets)
/// happens under a single write lock, so readers never observe a record in
/// an old bucket and a new one at once.
#[derive(Debug, Default)]
pub struct IndexedCache {
    tables: RwLock<CacheTables>,
}

impl IndexedCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache sized for `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tables: RwLock::new(CacheTables::with_capacity(capacity)),
        }
    }

    /// Get a decoded copy of the cached record.
    ///
    /// A snapshot that fails to decode is reported as
    /// `StorageError::Serialization`; callers treat it as a miss.
    pub fn get(&self, id: ApplicationId) -> DocketResult<Option<Application>> {
        Ok(self.read()?.decode(id)?)
    }

    /// Insert or replace a record and re-index it.
    pub fn put(&self, app: &Application) -> DocketResult<()> {
        let entry = CacheEntry::encode(app)?;
        self.write()?.upsert(app.id, entry);
        Ok(())
    }

    /// Insert `app` unless the cache already holds a later version of it.
    ///
    /// Used when refreshing from a store read that may have started before
    /// a concurrent write. Returns whether the record was stored. A cached
    /// entry with the same `updated_at` is replaced.
    pub fn put_if_newer(&self, app: &Application) -> DocketResult<bool> {
        let entry = CacheEntry::encode(app)?;
        Ok(self.write()?.upsert_unless_newer(app.id, entry))
    }

    /// Insert or replace a batch of records under one lock acquisition.
    ///
    /// Every record is encoded before the lock is taken; an encoding failure
    /// leaves the cache untouched.
    pub fn put_many(&self, apps: &[Application]) -> DocketResult<usize> {
        let entries = encode_all(apps)?;
        let mut tables = self.write()?;
        for (id, entry) in entries {
            tables.upsert(id, entry);
        }
        Ok(apps.len())
    }

    /// Batch form of [`put_if_newer`](Self::put_if_newer). Returns the
    /// number of records stored.
    pub fn put_many_if_newer(&self, apps: &[Application]) -> DocketResult<usize> {
        let entries = encode_all(apps)?;
        let mut tables = self.write()?;
        let mut stored = 0;
        for (id, entry) in entries {
            if tables.upsert_unless_newer(id, entry) {
                stored += 1;
            }
        }
        Ok(stored)
    }

    /// Overwrite the snapshot of `id` with bytes that do not decode.
    #[cfg(test)]
    pub(crate) fn corrupt_snapshot(&self, id: ApplicationId) {
        if let Ok(mut tables) = self.write() {
            if let Some(entry) = tables.records.get_mut(&id) {
                entry.snapshot = b"{not json".to_vec();
            }
        }
    }

    /// Answer `filter` from the indexes alone.
    ///
    /// See [`planner`](super::planner) for the evaluation order.
    pub fn query(&self, filter: &ApplicationFilter) -> DocketResult<Vec<Application>> {
        let tables = self.read()?;
        planner::execute(&tables, filter)
    }

    /// Number of cached records.
    pub fn len(&self) -> usize {
        self.tables
            .read()
            .map(|tables| tables.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that the primary map and the secondary indexes agree.
    pub fn verify_indexes(&self) -> DocketResult<()> {
        Ok(self.read()?.verify()?)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, CacheTables>, StorageError> {
        self.tables.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, CacheTables>, StorageError> {
        self.tables.write().map_err(|_| StorageError::LockPoisoned)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use docket_core::{DocketError, ExternalStatus};
    use proptest::prelude::*;

    fn make_application(status: ApplicationStatus, owner: UserId) -> Application {
        let mut app = Application::open(
            ApplicationId::new(),
            owner,
            ExternalStatus::Processed,
            Utc::now(),
        );
        app.status = status;
        app
    }

    #[test]
    fn test_put_then_get_returns_equal_copy() {
        let cache = IndexedCache::new();
        let app = make_application(ApplicationStatus::Open, UserId::new());
        cache.put(&app).unwrap();

        assert_eq!(cache.get(app.id).unwrap(), Some(app));
        assert_eq!(cache.len(), 1);
        cache.verify_indexes().unwrap();
    }

    #[test]
    fn test_get_missing_is_none() {
        let cache = IndexedCache::new();
        assert_eq!(cache.get(ApplicationId::new()).unwrap(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_moves_record_between_buckets() {
        let cache = IndexedCache::new();
        let owner = UserId::new();
        let app = make_application(ApplicationStatus::Open, owner);
        cache.put(&app).unwrap();

        let closed = app.with_status(
            ApplicationStatus::Closed,
            app.created_at + Duration::seconds(3),
        );
        cache.put(&closed).unwrap();

        let tables = cache.read().unwrap();
        assert_eq!(tables.ids_with_status(ApplicationStatus::Open).count(), 0);
        assert_eq!(
            tables.ids_with_status(ApplicationStatus::Closed).collect::<Vec<_>>(),
            vec![app.id]
        );
        assert!(!tables.by_status.contains_key(&ApplicationStatus::Open));
        assert!(!tables.by_updated_at.contains_key(&app.updated_at));
        assert!(tables.by_updated_at.contains_key(&closed.updated_at));
        drop(tables);

        assert_eq!(cache.len(), 1);
        cache.verify_indexes().unwrap();
    }

    #[test]
    fn test_put_many_indexes_every_record() {
        let cache = IndexedCache::with_capacity(8);
        let owner = UserId::new();
        let apps: Vec<_> = (0..5)
            .map(|_| make_application(ApplicationStatus::InProgress, owner))
            .collect();

        assert_eq!(cache.put_many(&apps).unwrap(), 5);
        assert_eq!(cache.put_many(&[]).unwrap(), 0);

        let tables = cache.read().unwrap();
        assert_eq!(tables.ids_with_owner(owner).count(), 5);
        drop(tables);
        cache.verify_indexes().unwrap();
    }

    #[test]
    fn test_time_range_is_half_open() {
        let cache = IndexedCache::new();
        let app = make_application(ApplicationStatus::Open, UserId::new());
        cache.put(&app).unwrap();

        let tables = cache.read().unwrap();
        let at = app.created_at;
        let second = Duration::seconds(1);
        assert_eq!(
            tables.ids_created_in(TimeRange::new(at, at + second)).count(),
            1
        );
        assert_eq!(
            tables.ids_created_in(TimeRange::new(at - second, at)).count(),
            0
        );
        assert_eq!(
            tables.ids_created_in(TimeRange::new(at + second, at)).count(),
            0
        );
    }

    #[test]
    fn test_put_if_newer_keeps_later_version() {
        let cache = IndexedCache::new();
        let app = make_application(ApplicationStatus::Open, UserId::new());
        let closed = app.with_status(
            ApplicationStatus::Closed,
            app.created_at + Duration::seconds(5),
        );
        cache.put(&closed).unwrap();

        assert!(!cache.put_if_newer(&app).unwrap());
        assert_eq!(cache.get(app.id).unwrap(), Some(closed.clone()));
        assert_eq!(cache.put_many_if_newer(&[app.clone()]).unwrap(), 0);
        assert_eq!(cache.get(app.id).unwrap(), Some(closed.clone()));
        cache.verify_indexes().unwrap();

        let reopened = closed.with_status(
            ApplicationStatus::InProgress,
            closed.updated_at + Duration::seconds(5),
        );
        assert!(cache.put_if_newer(&reopened).unwrap());
        assert_eq!(cache.get(app.id).unwrap(), Some(reopened));
    }

    #[test]
    fn test_put_if_newer_replaces_equal_timestamp() {
        let cache = IndexedCache::new();
        let app = make_application(ApplicationStatus::Open, UserId::new());
        let other = make_application(ApplicationStatus::Closed, UserId::new());
        cache.put(&app).unwrap();
        cache.corrupt_snapshot(app.id);

        assert!(cache.put_if_newer(&app).unwrap());
        assert_eq!(cache.get(app.id).unwrap(), Some(app.clone()));
        assert_eq!(cache.put_many_if_newer(&[app, other]).unwrap(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_corrupt_snapshot_reports_serialization() {
        let cache = IndexedCache::new();
        let app = make_application(ApplicationStatus::Open, UserId::new());
        cache.put(&app).unwrap();

        cache.corrupt_snapshot(app.id);

        assert!(matches!(
            cache.get(app.id),
            Err(DocketError::Storage(StorageError::Serialization { .. }))
        ));
    }

    #[test]
    fn test_verify_detects_orphaned_index_entry() {
        let cache = IndexedCache::new();
        let app = make_application(ApplicationStatus::Open, UserId::new());
        cache.put(&app).unwrap();

        cache.write().unwrap().records.remove(&app.id);

        assert!(matches!(
            cache.verify_indexes(),
            Err(DocketError::Storage(StorageError::IndexInconsistent { .. }))
        ));
    }

    proptest! {
        /// Any sequence of overwrites over a small id pool leaves every
        /// bucket pointing at a live record with a matching key.
        #[test]
        fn prop_overwrites_keep_indexes_consistent(
            writes in prop::collection::vec((0usize..4, 0usize..3, 0i64..30), 1..40),
        ) {
            let statuses = [
                ApplicationStatus::Open,
                ApplicationStatus::InProgress,
                ApplicationStatus::Closed,
            ];
            let owner = UserId::new();
            let pool: Vec<_> = (0..4)
                .map(|_| make_application(ApplicationStatus::Open, owner))
                .collect();

            let cache = IndexedCache::new();
            let mut touched = HashSet::new();
            for (slot, status, minutes) in writes {
                let base = &pool[slot];
                let at = base.created_at + Duration::minutes(minutes);
                let app = base.with_status(statuses[status], at);
                cache.put(&app).unwrap();
                touched.insert(app.id);
            }

            prop_assert_eq!(cache.len(), touched.len());
            prop_assert!(cache.verify_indexes().is_ok());

            let tables = cache.read().unwrap();
            let bucketed: usize = statuses
                .iter()
                .map(|status| tables.ids_with_status(*status).count())
                .sum();
            prop_assert_eq!(bucketed, touched.len());
            prop_assert_eq!(tables.ids_with_owner(owner).count(), touched.len());
        }
    }
}
