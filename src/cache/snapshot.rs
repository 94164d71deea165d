//! Durable last-known-good snapshots used when a refresh fails.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::storage::SnapshotStore;
use super::traits::Cacheable;
use crate::error::CacheError;

/// A value that can be split into records for a snapshot collection and
/// rebuilt from them.
pub trait SnapshotValue: Sized {
  type Record: Cacheable;

  fn to_records(&self) -> Vec<Self::Record>;

  fn from_records(records: Vec<Self::Record>) -> Self;
}

impl<T: Cacheable> SnapshotValue for Vec<T> {
  type Record = T;

  fn to_records(&self) -> Vec<T> {
    self.clone()
  }

  fn from_records(records: Vec<T>) -> Self {
    records
  }
}

/// A snapshot previously written by [`Fallback::save`].
#[derive(Debug, Clone)]
pub struct Snapshot<V> {
  pub value: V,
  pub saved_at: Option<DateTime<Utc>>,
}

/// Type-erased access to a persistent snapshot of `V`.
pub trait Fallback<V>: Send + Sync {
  /// Name of the collection backing this snapshot.
  fn collection(&self) -> &str;

  /// The last saved snapshot, or `None` if nothing was saved.
  fn load(&self) -> Result<Option<Snapshot<V>>, CacheError>;

  /// Replace the stored snapshot with `value`.
  fn save(&self, value: &V) -> Result<(), CacheError>;
}

/// One snapshot collection inside a [`SnapshotStore`].
pub struct PersistentSnapshot<S> {
  store: Arc<S>,
  collection: String,
}

impl<S: SnapshotStore> PersistentSnapshot<S> {
  pub fn new(store: Arc<S>, collection: impl Into<String>) -> Self {
    Self {
      store,
      collection: collection.into(),
    }
  }
}

impl<S, V> Fallback<V> for PersistentSnapshot<S>
where
  S: SnapshotStore,
  V: SnapshotValue,
{
  fn collection(&self) -> &str {
    &self.collection
  }

  fn load(&self) -> Result<Option<Snapshot<V>>, CacheError> {
    let records: Vec<V::Record> = self.store.get_all(&self.collection)?;
    if records.is_empty() {
      return Ok(None);
    }

    let saved_at = self.store.saved_at(&self.collection)?;
    Ok(Some(Snapshot {
      value: V::from_records(records),
      saved_at,
    }))
  }

  fn save(&self, value: &V) -> Result<(), CacheError> {
    self.store.replace(&self.collection, &value.to_records())
  }
}
