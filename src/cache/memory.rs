//! In-memory TTL map with lazy expiry.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use super::key::CacheKey;

/// A value stored in memory along with the time it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
  pub value: V,
  pub stored_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
  /// An entry is valid iff `now - stored_at < ttl`.
  ///
  /// A zero or negative TTL is never valid.
  pub fn is_valid(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
    ttl > Duration::zero() && now - self.stored_at < ttl
  }
}

/// Read-only snapshot of what the cache holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
  /// Number of physically present entries, expired ones included
  pub size: usize,
  /// Keys in sorted order
  pub keys: Vec<String>,
}

/// Map from normalized key to the last successfully fetched value.
///
/// Expiry is evaluated at read time only. Expired entries stay in place until
/// they are overwritten by a refresh or explicitly invalidated.
#[derive(Debug)]
pub struct MemoryCache<V> {
  entries: HashMap<CacheKey, CacheEntry<V>>,
}

impl<V> Default for MemoryCache<V> {
  fn default() -> Self {
    Self {
      entries: HashMap::new(),
    }
  }
}

impl<V> MemoryCache<V> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Entry for `key` if it is still valid at `now`.
  pub fn get_valid(&self, key: &CacheKey, now: DateTime<Utc>, ttl: Duration) -> Option<&CacheEntry<V>> {
    self.entries.get(key).filter(|e| e.is_valid(now, ttl))
  }

  /// Entry for `key` regardless of age.
  pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry<V>> {
    self.entries.get(key)
  }

  /// Store `value`, replacing whatever was there.
  pub fn insert(&mut self, key: CacheKey, value: V, now: DateTime<Utc>) {
    self.entries.insert(
      key,
      CacheEntry {
        value,
        stored_at: now,
      },
    );
  }

  pub fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry<V>> {
    self.entries.remove(key)
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn stats(&self) -> CacheStats {
    let mut keys: Vec<String> = self.entries.keys().map(|k| k.to_string()).collect();
    keys.sort();
    CacheStats {
      size: self.entries.len(),
      keys,
    }
  }
}
