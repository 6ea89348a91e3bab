//! Read-through repository over the indexed cache.
//!
//! [`CachedApplicationStore`] wraps any [`ApplicationStore`] and answers reads
//! from an [`IndexedCache`] warmed at construction. Writes are coalesced per
//! id and go to the wrapped store before the cache.

use std::time::Instant;

use async_trait::async_trait;
use docket_core::{
    Application, ApplicationFilter, ApplicationId, ConfigError, DocketResult, StatusUpdate,
};

use super::coordinator::{CoalesceMetrics, WriteCoordinator};
use super::indexed::IndexedCache;
use super::stats::{CacheCounters, CacheStats};
use crate::ApplicationStore;

const DEFAULT_INITIAL_CAPACITY: usize = 1024;
const DEFAULT_WARM_UP_CHUNK_SIZE: usize = 512;

/// Configuration for the indexed cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Number of records the primary map is sized for up front.
    pub initial_capacity: usize,
    /// Records inserted per write-lock acquisition during warm-up.
    pub warm_up_chunk_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            warm_up_chunk_size: DEFAULT_WARM_UP_CHUNK_SIZE,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `DOCKET_CACHE_*` environment variables.
    ///
    /// Environment variables:
    /// - `DOCKET_CACHE_INITIAL_CAPACITY`: primary map capacity (default: 1024)
    /// - `DOCKET_CACHE_WARM_UP_CHUNK_SIZE`: records per warm-up batch (default: 512)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup using the environment variable names.
    ///
    /// Absent or zero values keep their defaults; a value that is not a
    /// non-negative integer is rejected.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            initial_capacity: count(&lookup, "DOCKET_CACHE_INITIAL_CAPACITY")?
                .unwrap_or(DEFAULT_INITIAL_CAPACITY),
            warm_up_chunk_size: count(&lookup, "DOCKET_CACHE_WARM_UP_CHUNK_SIZE")?
                .unwrap_or(DEFAULT_WARM_UP_CHUNK_SIZE),
        })
    }

    /// Set the initial capacity.
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Set the warm-up chunk size. Zero is treated as one.
    pub fn with_warm_up_chunk_size(mut self, size: usize) -> Self {
        self.warm_up_chunk_size = size;
        self
    }
}

fn count(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<usize>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map(|value| (value > 0).then_some(value))
            .map_err(|e| ConfigError::InvalidValue {
                field: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

/// Record store fronted by an [`IndexedCache`].
///
/// # Example
///
/// ```ignore
/// let repo = CachedApplicationStore::new(store, CacheConfig::default()).await?;
/// let app = repo.find_by_id(id).await?;
/// ```
pub struct CachedApplicationStore<S> {
    store: S,
    cache: IndexedCache,
    writes: WriteCoordinator<ApplicationId, Application>,
    counters: CacheCounters,
    config: CacheConfig,
}

impl<S: ApplicationStore> CachedApplicationStore<S> {
    /// Wrap `store` and warm the cache from its full contents.
    ///
    /// Fails if the store cannot be read; a repository is never handed out
    /// with a partially loaded cache.
    pub async fn new(store: S, config: CacheConfig) -> DocketResult<Self> {
        let repo = Self {
            store,
            cache: IndexedCache::with_capacity(config.initial_capacity),
            writes: WriteCoordinator::new(),
            counters: CacheCounters::default(),
            config,
        };
        repo.warm_up().await?;
        Ok(repo)
    }

    async fn warm_up(&self) -> DocketResult<usize> {
        let started = Instant::now();
        let apps = self.store.find_all().await.map_err(|e| {
            tracing::error!(error = %e, "cache warm-up failed");
            e
        })?;

        let mut loaded = 0;
        for chunk in apps.chunks(self.config.warm_up_chunk_size.max(1)) {
            loaded += self.cache.put_many(chunk)?;
        }
        tracing::info!(
            records = loaded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cache warm-up complete"
        );
        Ok(loaded)
    }

    /// The wrapped record store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The underlying indexed cache.
    pub fn cache(&self) -> &IndexedCache {
        &self.cache
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Snapshot of hit/miss/fallback counters.
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.cache.len())
    }

    /// Snapshot of write coalescing counters.
    pub fn coalesce_metrics(&self) -> CoalesceMetrics {
        self.writes.metrics()
    }

    async fn fall_back(&self, filter: &ApplicationFilter) -> DocketResult<Vec<Application>> {
        self.counters.record_fallback();
        let apps = self.store.find_by_filters(filter).await?;
        let stored = self.cache.put_many_if_newer(&apps)?;
        if stored < apps.len() {
            tracing::debug!(
                skipped = apps.len() - stored,
                "fallback read older than cached records"
            );
        }
        Ok(apps)
    }
}

#[async_trait]
impl<S: ApplicationStore> ApplicationStore for CachedApplicationStore<S> {
    async fn create(&self, app: &Application) -> DocketResult<()> {
        app.validate()?;
        self.writes
            .execute(app.id, || async {
                self.store.create(app).await?;
                self.cache.put(app)?;
                Ok(app.clone())
            })
            .await?;
        tracing::debug!(id = %app.id, "application created");
        Ok(())
    }

    async fn find_by_id(&self, id: ApplicationId) -> DocketResult<Option<Application>> {
        match self.cache.get(id) {
            Ok(Some(app)) => {
                self.counters.record_hit();
                return Ok(Some(app));
            }
            Ok(None) => self.counters.record_miss(),
            Err(e) => {
                self.counters.record_miss();
                tracing::warn!(%id, error = %e, "cache read failed, reading record store");
            }
        }

        let found = self.store.find_by_id(id).await?;
        if let Some(app) = &found {
            if !self.cache.put_if_newer(app)? {
                tracing::debug!(%id, "store read older than cached record");
            }
        }
        Ok(found)
    }

    async fn find_by_filters(&self, filter: &ApplicationFilter) -> DocketResult<Vec<Application>> {
        filter.validate()?;

        match self.cache.query(filter) {
            Ok(apps) if !apps.is_empty() => {
                self.counters.record_hit();
                Ok(apps)
            }
            Ok(_) => {
                self.counters.record_miss();
                tracing::debug!(
                    predicates = filter.predicate_count(),
                    "cache query empty, reading record store"
                );
                self.fall_back(filter).await
            }
            Err(e) => {
                self.counters.record_miss();
                tracing::warn!(error = %e, "cache query failed, reading record store");
                self.fall_back(filter).await
            }
        }
    }

    async fn update(&self, update: &StatusUpdate) -> DocketResult<Application> {
        update.validate()?;
        let app = self
            .writes
            .execute(update.id, || async {
                let app = self.store.update(update).await?;
                self.cache.put(&app)?;
                Ok(app)
            })
            .await?;
        tracing::debug!(id = %app.id, status = %app.status, "application updated");
        Ok(app)
    }

    async fn find_all(&self) -> DocketResult<Vec<Application>> {
        self.store.find_all().await
    }
}

// ============================================================================
// TESTS
// ============================================================================
