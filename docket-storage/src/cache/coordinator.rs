//! Per-key write coalescing (singleflight) for concurrent writes.
//!
//! When several tasks write the same key at once, only the first ("leader")
//! runs its write; the others ("joiners") wait for it and receive a clone of
//! its result, success or failure alike. Writes to different keys never wait
//! on each other.
//!
//! Design:
//! - A single `Mutex<HashMap>` guards the in-flight map. It is only held for
//!   the lookup-or-insert, never across an await point.
//! - Each flight is a `tokio::sync::watch` channel. The leader publishes the
//!   result once; joiners wait for the first `Some`.
//! - If the leader's future is dropped before it publishes, the channel
//!   closes and joiners receive `StorageError::WriteAbandoned`.
//! - Atomic counters track leader/joiner/abandon events.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use docket_core::{DocketResult, StorageError};
use tokio::sync::watch;
use uuid::Uuid;

type Flight<V> = Arc<watch::Sender<Option<DocketResult<V>>>>;

/// Snapshot of coalescing metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoalesceMetrics {
    /// Number of writes that ran their own closure.
    pub leader_count: u64,
    /// Number of writes that waited on another caller's in-flight write.
    pub joined_count: u64,
    /// Number of leaders dropped before publishing a result.
    pub abandoned_count: u64,
}

/// Collapses concurrent writes to the same key into one execution.
pub struct WriteCoordinator<K, V> {
    inflight: Mutex<HashMap<K, Flight<V>>>,
    leader_count: AtomicU64,
    joined_count: AtomicU64,
    abandoned_count: AtomicU64,
}

impl<K, V> Default for WriteCoordinator<K, V> {
    fn default() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
            leader_count: AtomicU64::new(0),
            joined_count: AtomicU64::new(0),
            abandoned_count: AtomicU64::new(0),
        }
    }
}

impl<K, V> fmt::Debug for WriteCoordinator<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteCoordinator")
            .field("leader_count", &self.leader_count.load(Ordering::Relaxed))
            .field("joined_count", &self.joined_count.load(Ordering::Relaxed))
            .field("abandoned_count", &self.abandoned_count.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

enum Role<V> {
    Leader(Flight<V>),
    Joiner(watch::Receiver<Option<DocketResult<V>>>),
}

impl<K, V> WriteCoordinator<K, V>
where
    K: Hash + Eq + Copy + Into<Uuid>,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key`, or join a write already in flight for it.
    ///
    /// The leader's result is published to every joiner before the key is
    /// released, so a caller arriving afterwards starts a fresh write.
    pub async fn execute<F, Fut>(&self, key: K, work: F) -> DocketResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DocketResult<V>>,
    {
        match self.claim(key) {
            Role::Joiner(mut rx) => {
                self.joined_count.fetch_add(1, Ordering::Relaxed);
                let id: Uuid = key.into();
                tracing::debug!(%id, "joining in-flight write");
                match rx.wait_for(Option::is_some).await {
                    Ok(published) => match &*published {
                        Some(result) => result.clone(),
                        None => Err(StorageError::WriteAbandoned { id }.into()),
                    },
                    Err(_) => Err(StorageError::WriteAbandoned { id }.into()),
                }
            }
            Role::Leader(flight) => {
                self.leader_count.fetch_add(1, Ordering::Relaxed);
                let mut guard = FlightGuard {
                    coordinator: self,
                    key,
                    flight: Arc::clone(&flight),
                    published: false,
                };
                let result = work().await;
                flight.send_replace(Some(result.clone()));
                guard.published = true;
                drop(guard);
                result
            }
        }
    }

    /// Number of keys with a write in flight.
    pub fn inflight_count(&self) -> usize {
        self.lock().len()
    }

    pub fn metrics(&self) -> CoalesceMetrics {
        CoalesceMetrics {
            leader_count: self.leader_count.load(Ordering::Relaxed),
            joined_count: self.joined_count.load(Ordering::Relaxed),
            abandoned_count: self.abandoned_count.load(Ordering::Relaxed),
        }
    }

    fn claim(&self, key: K) -> Role<V> {
        let mut inflight = self.lock();
        if let Some(flight) = inflight.get(&key) {
            return Role::Joiner(flight.subscribe());
        }
        let (tx, _rx) = watch::channel(None);
        let flight = Arc::new(tx);
        inflight.insert(key, Arc::clone(&flight));
        Role::Leader(flight)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, Flight<V>>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the leader's key on completion or cancellation.
struct FlightGuard<'a, K, V>
where
    K: Hash + Eq + Copy + Into<Uuid>,
    V: Clone,
{
    coordinator: &'a WriteCoordinator<K, V>,
    key: K,
    flight: Flight<V>,
    published: bool,
}

impl<K, V> Drop for FlightGuard<'_, K, V>
where
    K: Hash + Eq + Copy + Into<Uuid>,
    V: Clone,
{
    fn drop(&mut self) {
        let mut inflight = self.coordinator.lock();
        if inflight
            .get(&self.key)
            .is_some_and(|current| Arc::ptr_eq(current, &self.flight))
        {
            inflight.remove(&self.key);
        }
        drop(inflight);

        if !self.published {
            self.coordinator
                .abandoned_count
                .fetch_add(1, Ordering::Relaxed);
            let id: Uuid = self.key.into();
            tracing::warn!(%id, "write leader dropped before completing");
        }
    }
}
