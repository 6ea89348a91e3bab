//! Docket Storage - Record Store Trait, Reference Store and Indexed Cache
//!
//! Defines the persistence abstraction for application records and the
//! in-memory indexed read-through cache that sits in front of it.

pub mod cache;

pub use cache::{
    CacheConfig, CacheStats, CachedApplicationStore, CoalesceMetrics, IndexedCache,
    WriteCoordinator,
};

use async_trait::async_trait;
use chrono::Utc;
use docket_core::{
    Application, ApplicationFilter, ApplicationId, DocketResult, StatusUpdate, StorageError,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

// ============================================================================
// RECORD STORE TRAIT
// ============================================================================

/// Durable source of truth for application records.
///
/// The cached repository implements this trait as well, so callers cannot
/// tell a bare store from a cached one.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Persist a new record. Fails if the id is already taken.
    async fn create(&self, app: &Application) -> DocketResult<()>;

    /// Fetch a record by id. `Ok(None)` when it does not exist.
    async fn find_by_id(&self, id: ApplicationId) -> DocketResult<Option<Application>>;

    /// Return every record matching all present predicates of `filter`.
    async fn find_by_filters(&self, filter: &ApplicationFilter) -> DocketResult<Vec<Application>>;

    /// Apply a status update and return the record as persisted.
    ///
    /// Fails with `StorageError::NotFound` when the id does not exist.
    async fn update(&self, update: &StatusUpdate) -> DocketResult<Application>;

    /// Return every stored record.
    async fn find_all(&self) -> DocketResult<Vec<Application>>;
}

#[async_trait]
impl<S: ApplicationStore + ?Sized> ApplicationStore for Arc<S> {
    async fn create(&self, app: &Application) -> DocketResult<()> {
        (**self).create(app).await
    }

    async fn find_by_id(&self, id: ApplicationId) -> DocketResult<Option<Application>> {
        (**self).find_by_id(id).await
    }

    async fn find_by_filters(&self, filter: &ApplicationFilter) -> DocketResult<Vec<Application>> {
        (**self).find_by_filters(filter).await
    }

    async fn update(&self, update: &StatusUpdate) -> DocketResult<Application> {
        (**self).update(update).await
    }

    async fn find_all(&self) -> DocketResult<Vec<Application>> {
        (**self).find_all().await
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// In-memory record store.
///
/// Used by tests and local runs in place of a database.
#[derive(Debug, Default)]
pub struct MockApplicationStore {
    applications: RwLock<HashMap<ApplicationId, Application>>,
}

impl MockApplicationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `apps`.
    pub fn with_applications(apps: impl IntoIterator<Item = Application>) -> Self {
        Self {
            applications: RwLock::new(apps.into_iter().map(|app| (app.id, app)).collect()),
        }
    }

    /// Get count of stored applications.
    pub fn application_count(&self) -> usize {
        self.applications.read().map(|apps| apps.len()).unwrap_or(0)
    }

    /// Clear all stored data.
    pub fn clear(&self) -> DocketResult<()> {
        self.applications
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .clear();
        Ok(())
    }
}

#[async_trait]
impl ApplicationStore for MockApplicationStore {
    async fn create(&self, app: &Application) -> DocketResult<()> {
        let mut apps = self
            .applications
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        if apps.contains_key(&app.id) {
            return Err(StorageError::InsertFailed {
                id: app.id.as_uuid(),
                reason: "already exists".to_string(),
            }
            .into());
        }
        apps.insert(app.id, app.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ApplicationId) -> DocketResult<Option<Application>> {
        let apps = self
            .applications
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(apps.get(&id).cloned())
    }

    async fn find_by_filters(&self, filter: &ApplicationFilter) -> DocketResult<Vec<Application>> {
        let apps = self
            .applications
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(apps
            .values()
            .filter(|app| filter.matches(app))
            .cloned()
            .collect())
    }

    async fn update(&self, update: &StatusUpdate) -> DocketResult<Application> {
        let mut apps = self
            .applications
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let app = apps.get_mut(&update.id).ok_or(StorageError::NotFound {
            id: update.id.as_uuid(),
        })?;
        *app = app.with_status(update.status, Utc::now());
        Ok(app.clone())
    }

    async fn find_all(&self) -> DocketResult<Vec<Application>> {
        let apps = self
            .applications
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(apps.values().cloned().collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================
