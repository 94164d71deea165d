//! Generic caching layer for dashboard data sources.
//!
//! This module provides a payload-agnostic fetch client that:
//! - Normalizes request keys so equivalent requests share one entry
//! - Serves in-memory entries while they are younger than their TTL
//! - Expires lazily, on read, with no background sweeper
//! - Coalesces concurrent misses on the same key into one fetch
//! - Optionally mirrors results into a persistent snapshot and serves it when
//!   the network is unavailable

mod clock;
mod key;
mod layer;
mod memory;
mod snapshot;
mod storage;
mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::{CacheKey, QueryKey};
pub use layer::{FetchClient, GetOptions};
pub use memory::{CacheEntry, CacheStats, MemoryCache};
pub use snapshot::{Fallback, PersistentSnapshot, Snapshot, SnapshotValue};
pub use storage::{MemoryStorage, NoopStorage, SnapshotStore, SqliteStorage};
pub use traits::{CacheResult, CacheSource, Cacheable};
