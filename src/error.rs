//! Error taxonomy for the cache-backed fetch client.

use thiserror::Error;

/// Errors surfaced by the cache layer.
///
/// `Clone` so that one failed fetch can be handed to every caller waiting on
/// the same in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
  /// The supplied network operation failed (transport error, non-success
  /// status, or a payload that could not be parsed).
  #[error("fetch failed for '{key}': {message}")]
  FetchFailed { key: String, message: String },

  /// A persisted snapshot could not be decoded or failed its checksum.
  #[error("snapshot in collection '{collection}' is corrupt: {message}")]
  CacheCorruption { collection: String, message: String },

  /// The persistent store itself failed (I/O, SQL, lock poisoning).
  #[error("cache storage error: {0}")]
  Storage(String),
}

impl CacheError {
  pub(crate) fn fetch_failed(key: &str, report: &color_eyre::Report) -> Self {
    Self::FetchFailed {
      key: key.to_string(),
      message: format!("{:#}", report),
    }
  }

  pub(crate) fn corruption(collection: &str, message: impl Into<String>) -> Self {
    Self::CacheCorruption {
      collection: collection.to_string(),
      message: message.into(),
    }
  }

  pub fn is_fetch_failed(&self) -> bool {
    matches!(self, Self::FetchFailed { .. })
  }
}

impl From<rusqlite::Error> for CacheError {
  fn from(e: rusqlite::Error) -> Self {
    Self::Storage(e.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::eyre::eyre;

  #[test]
  fn test_fetch_failed_keeps_report_chain() {
    let report = eyre!("connection refused").wrap_err("Failed to fetch weather");
    let err = CacheError::fetch_failed("london", &report);

    assert!(err.is_fetch_failed());
    let text = err.to_string();
    assert!(text.contains("london"));
    assert!(text.contains("Failed to fetch weather"));
    assert!(text.contains("connection refused"));
  }

  #[test]
  fn test_corruption_is_not_fetch_failure() {
    let err = CacheError::corruption("movies", "bad checksum");
    assert!(!err.is_fetch_failed());
    assert_eq!(
      err.to_string(),
      "snapshot in collection 'movies' is corrupt: bad checksum"
    );
  }
}
