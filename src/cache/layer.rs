//! Cache layer that orchestrates caching logic with network fetching.

use chrono::Duration;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::key::{CacheKey, QueryKey};
use super::memory::{CacheStats, MemoryCache};
use super::snapshot::{Fallback, PersistentSnapshot, SnapshotValue};
use super::storage::SnapshotStore;
use super::traits::CacheResult;
use crate::config::CacheConfig;
use crate::error::CacheError;

type PendingFetch<V> = Shared<BoxFuture<'static, Result<V, CacheError>>>;
type InFlightMap<V> = HashMap<CacheKey, InFlight<V>>;

/// A running fetch and the number of callers awaiting it.
struct InFlight<V> {
  fetch: PendingFetch<V>,
  waiters: usize,
}

/// A caller's registration on an in-flight fetch.
///
/// The last waiter to leave, whether the fetch settled or the caller gave
/// up, removes the entry so that the next miss starts a fresh fetch.
struct Waiter<V> {
  in_flight: Arc<Mutex<InFlightMap<V>>>,
  key: CacheKey,
  fetch: PendingFetch<V>,
}

impl<V> Drop for Waiter<V> {
  fn drop(&mut self) {
    let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
    let Some(entry) = in_flight.get_mut(&self.key) else {
      return;
    };
    if !entry.fetch.ptr_eq(&self.fetch) {
      return;
    }
    entry.waiters = entry.waiters.saturating_sub(1);
    if entry.waiters == 0 {
      in_flight.remove(&self.key);
    }
  }
}

/// Per-call overrides of the client defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
  /// TTL to apply to this read instead of the client default
  pub ttl: Option<Duration>,
  /// Whether to consult (and refresh) the persistent snapshot
  pub persist_fallback: Option<bool>,
}

impl GetOptions {
  pub fn ttl(mut self, ttl: Duration) -> Self {
    self.ttl = Some(ttl);
    self
  }

  pub fn ttl_ms(self, ttl_ms: i64) -> Self {
    self.ttl(Duration::milliseconds(ttl_ms))
  }

  pub fn persist_fallback(mut self, enabled: bool) -> Self {
    self.persist_fallback = Some(enabled);
    self
  }
}

/// Cache-backed fetch client.
///
/// Sits between a service and its network calls:
/// 1. A valid in-memory entry is returned without calling the fetcher
/// 2. Otherwise the fetcher runs; concurrent misses on one key share it
/// 3. Success overwrites the in-memory entry (and the snapshot, if enabled)
/// 4. Failure falls back to the persistent snapshot, if enabled and present
///
/// The client never retries; that is left to callers.
pub struct FetchClient<V> {
  memory: Arc<Mutex<MemoryCache<V>>>,
  in_flight: Arc<Mutex<InFlightMap<V>>>,
  snapshot: Option<Arc<dyn Fallback<V>>>,
  clock: Arc<dyn Clock>,
  ttl: Duration,
  persist_fallback: bool,
}

impl<V> FetchClient<V>
where
  V: Clone + Send + Sync + 'static,
{
  /// Create a client with the given default TTL and no persistent fallback.
  pub fn new(ttl: Duration) -> Self {
    Self {
      memory: Arc::new(Mutex::new(MemoryCache::new())),
      in_flight: Arc::new(Mutex::new(HashMap::new())),
      snapshot: None,
      clock: Arc::new(SystemClock),
      ttl,
      persist_fallback: false,
    }
  }

  /// Create a client using the configured TTL and fallback default.
  pub fn from_config(config: &CacheConfig) -> Self {
    Self::new(config.ttl()).with_persist_fallback(config.persist_fallback)
  }

  pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
    self.clock = Arc::new(clock);
    self
  }

  /// Enable or disable the persistent fallback by default.
  pub fn with_persist_fallback(mut self, enabled: bool) -> Self {
    self.persist_fallback = enabled;
    self
  }

  /// Attach any fallback implementation.
  pub fn with_fallback(mut self, fallback: Arc<dyn Fallback<V>>) -> Self {
    self.snapshot = Some(fallback);
    self
  }

  /// Back the fallback with one collection of a snapshot store.
  pub fn with_snapshot<S>(self, store: Arc<S>, collection: impl Into<String>) -> Self
  where
    S: SnapshotStore + 'static,
    V: SnapshotValue,
  {
    self.with_fallback(Arc::new(PersistentSnapshot::new(store, collection)))
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  fn memory(&self) -> MutexGuard<'_, MemoryCache<V>> {
    self.memory.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn pending(&self) -> MutexGuard<'_, InFlightMap<V>> {
    self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Return the freshest available value for `key`.
  ///
  /// `fetch` is only invoked when there is no valid in-memory entry. Its
  /// failure surfaces as [`CacheError::FetchFailed`] unless a persisted
  /// snapshot can be served instead, in which case the failure is attached
  /// to the result as a warning.
  pub async fn get<K, F, Fut>(
    &self,
    query: &K,
    fetch: F,
    options: GetOptions,
  ) -> Result<CacheResult<V>, CacheError>
  where
    K: QueryKey + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = color_eyre::Result<V>> + Send + 'static,
  {
    let key = query.cache_key();
    let ttl = options.ttl.unwrap_or(self.ttl);
    let persist = options.persist_fallback.unwrap_or(self.persist_fallback);

    let now = self.clock.now();
    let hit = self
      .memory()
      .get_valid(&key, now, ttl)
      .map(|entry| (entry.value.clone(), entry.stored_at));
    if let Some((value, stored_at)) = hit {
      debug!(key = %key, "cache hit");
      return Ok(CacheResult::from_cache(value, stored_at));
    }

    let waiter = self.start_or_join(query, &key, fetch, persist);
    let outcome = waiter.fetch.clone().await;
    drop(waiter);

    match outcome {
      Ok(value) => Ok(CacheResult::from_network(value)),
      Err(err) => self.fall_back(&key, err, persist),
    }
  }

  /// Drop the in-memory entry for `key`. Safe on a missing key.
  pub fn invalidate<K: QueryKey + ?Sized>(&self, key: &K) {
    let key = key.cache_key();
    if self.memory().remove(&key).is_some() {
      debug!(key = %key, "cache entry invalidated");
    }
  }

  /// Drop every in-memory entry.
  pub fn clear(&self) {
    self.memory().clear();
    debug!("cache cleared");
  }

  /// Size and keys of the in-memory cache, expired entries included.
  pub fn stats(&self) -> CacheStats {
    self.memory().stats()
  }

  /// Attach to the fetch already running for `key`, or start one.
  fn start_or_join<K, F, Fut>(
    &self,
    query: &K,
    key: &CacheKey,
    fetch: F,
    persist: bool,
  ) -> Waiter<V>
  where
    K: QueryKey + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = color_eyre::Result<V>> + Send + 'static,
  {
    let mut in_flight = self.pending();
    if let Some(entry) = in_flight.get_mut(key) {
      debug!(key = %key, "joining in-flight fetch");
      entry.waiters += 1;
      return Waiter {
        in_flight: Arc::clone(&self.in_flight),
        key: key.clone(),
        fetch: entry.fetch.clone(),
      };
    }

    debug!(key = %key, query = %query.description(), "cache miss, fetching");
    let request = fetch();
    let memory = Arc::clone(&self.memory);
    let clock = Arc::clone(&self.clock);
    let snapshot = if persist { self.snapshot.clone() } else { None };
    let owned_key = key.clone();

    let pending = async move {
      match request.await {
        Ok(value) => {
          memory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(owned_key.clone(), value.clone(), clock.now());
          info!(key = %owned_key, "cache refreshed from network");

          if let Some(snapshot) = snapshot {
            if let Err(e) = snapshot.save(&value) {
              warn!(key = %owned_key, collection = snapshot.collection(), error = %e, "failed to persist snapshot");
            }
          }
          Ok(value)
        }
        Err(report) => Err(CacheError::fetch_failed(owned_key.as_str(), &report)),
      }
    }
    .boxed()
    .shared();

    in_flight.insert(
      key.clone(),
      InFlight {
        fetch: pending.clone(),
        waiters: 1,
      },
    );
    Waiter {
      in_flight: Arc::clone(&self.in_flight),
      key: key.clone(),
      fetch: pending,
    }
  }

  fn fall_back(&self, key: &CacheKey, err: CacheError, persist: bool) -> Result<CacheResult<V>, CacheError> {
    let snapshot = match (&self.snapshot, persist) {
      (Some(snapshot), true) => snapshot,
      _ => {
        warn!(key = %key, error = %err, "fetch failed, no fallback configured");
        return Err(err);
      }
    };

    match snapshot.load() {
      Ok(Some(saved)) => {
        warn!(key = %key, collection = snapshot.collection(), error = %err, "fetch failed, serving persisted snapshot");
        Ok(CacheResult::fallback(saved.value, saved.saved_at, err))
      }
      Ok(None) => {
        warn!(key = %key, collection = snapshot.collection(), error = %err, "fetch failed, no snapshot saved");
        Err(err)
      }
      Err(load_err) => {
        warn!(key = %key, collection = snapshot.collection(), error = %load_err, "snapshot unusable");
        Err(err)
      }
    }
  }
}

impl<V> Clone for FetchClient<V> {
  fn clone(&self) -> Self {
    Self {
      memory: Arc::clone(&self.memory),
      in_flight: Arc::clone(&self.in_flight),
      snapshot: self.snapshot.clone(),
      clock: Arc::clone(&self.clock),
      ttl: self.ttl,
      persist_fallback: self.persist_fallback,
    }
  }
}
