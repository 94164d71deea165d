//! Cache key normalization.

use std::fmt;

/// Something that identifies a cacheable request.
///
/// Implementations must map semantically identical requests to identical
/// keys, e.g. by trimming and lowercasing.
pub trait QueryKey {
  /// Canonical identity of the request.
  fn cache_key(&self) -> CacheKey;

  /// Human readable label for logs.
  fn description(&self) -> String {
    self.cache_key().to_string()
  }
}

/// A normalized cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
  /// Trim surrounding whitespace and lowercase.
  pub fn normalize(raw: &str) -> Self {
    Self(raw.trim().to_lowercase())
  }

  /// Order-insensitive key for a list of items: each item is normalized,
  /// the list is sorted and joined with newlines.
  pub fn from_list<I, S>(items: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let mut parts: Vec<String> = items
      .into_iter()
      .map(|s| s.as_ref().trim().to_lowercase())
      .collect();
    parts.sort();
    Self(parts.join("\n"))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl QueryKey for CacheKey {
  fn cache_key(&self) -> CacheKey {
    self.clone()
  }
}

impl QueryKey for str {
  fn cache_key(&self) -> CacheKey {
    CacheKey::normalize(self)
  }
}

impl QueryKey for String {
  fn cache_key(&self) -> CacheKey {
    CacheKey::normalize(self)
  }
}

impl QueryKey for [String] {
  fn cache_key(&self) -> CacheKey {
    CacheKey::from_list(self)
  }
}
