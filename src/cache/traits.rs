//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::CacheError;

/// A record that can be written to a persistent snapshot.
///
/// Implementors provide a stable identifier (e.g. a film id) under which the
/// record is stored inside its collection.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Unique identifier for this record within its collection
  fn cache_key(&self) -> String;
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was stored (if it did not come straight from the network)
  pub cached_at: Option<DateTime<Utc>>,
  /// Non-fatal failure masked by a fallback
  pub warning: Option<CacheError>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
      warning: None,
    }
  }

  /// Create a new cache result from a valid in-memory entry.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      cached_at: Some(cached_at),
      warning: None,
    }
  }

  /// Create a new cache result served from the persistent snapshot after a
  /// failed fetch.
  pub fn fallback(data: T, saved_at: Option<DateTime<Utc>>, warning: CacheError) -> Self {
    Self {
      data,
      source: CacheSource::Fallback,
      cached_at: saved_at,
      warning: Some(warning),
    }
  }

  pub fn is_fallback(&self) -> bool {
    self.source == CacheSource::Fallback
  }

  pub fn into_data(self) -> T {
    self.data
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from the in-memory cache, still within its TTL
  CacheFresh,
  /// Network unavailable, serving the last persisted snapshot
  Fallback,
}

impl CacheSource {
  /// Message suitable for showing next to the data.
  pub fn notice(&self) -> Option<&'static str> {
    match self {
      CacheSource::Fallback => Some("fresh data unavailable; showing last-known values"),
      CacheSource::Network | CacheSource::CacheFresh => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fallback_carries_warning() {
    let warning = CacheError::FetchFailed {
      key: "films".into(),
      message: "offline".into(),
    };
    let result = CacheResult::fallback(vec![1, 2], None, warning.clone());

    assert!(result.is_fallback());
    assert_eq!(result.warning, Some(warning));
    assert!(result.source.notice().is_some());
  }

  #[test]
  fn test_network_result_has_no_notice() {
    let result = CacheResult::from_network(3);
    assert_eq!(result.source, CacheSource::Network);
    assert!(result.source.notice().is_none());
    assert!(result.cached_at.is_none());
  }
}
