//! Indexed read-through cache for application records.
//!
//! The cache keeps a serialized snapshot of every record it has seen in a
//! primary map, plus four secondary indexes (status, owner, creation time and
//! last update time). Filter queries are answered by intersecting the index
//! lookups of every present predicate.
//!
//! # Consistency
//!
//! Writes go to the record store first; the cache is populated only after the
//! store confirms. Concurrent writes to the same id are collapsed by the
//! [`WriteCoordinator`] so the store sees one write and every caller sees its
//! result.
//!
//! An empty cache answer is never trusted as authoritative: the repository
//! consults the store and repopulates the cache from whatever comes back.
//! Negative results are never cached.
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(MockApplicationStore::new());
//! let repo = CachedApplicationStore::new(store, CacheConfig::default()).await?;
//!
//! let open = repo
//!     .find_by_filters(&ApplicationFilter::new().with_status(ApplicationStatus::Open))
//!     .await?;
//! ```

pub mod coordinator;
pub mod indexed;
pub mod planner;
pub mod read_through;
pub mod stats;

pub use coordinator::{CoalesceMetrics, WriteCoordinator};
pub use indexed::IndexedCache;
pub use read_through::{CacheConfig, CachedApplicationStore};
pub use stats::CacheStats;
