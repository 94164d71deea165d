//! End-to-end behavior of the cache-backed fetch client through the public API.

use chrono::Duration;
use color_eyre::eyre::eyre;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use url::Url;

use dashcache::cache::{
  CacheSource, FetchClient, GetOptions, ManualClock, SnapshotStore, SqliteStorage,
};
use dashcache::config::{CacheConfig, Config, NutritionCredentials};
use dashcache::services::{movies::MOVIES_COLLECTION, Dashboard, Film, HttpClient, MoviesService};
use dashcache::CacheError;

fn counter() -> Arc<AtomicUsize> {
  Arc::new(AtomicUsize::new(0))
}

/// A URL nothing listens on.
fn dead_url() -> Url {
  let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
  let port = listener.local_addr().expect("addr").port();
  drop(listener);
  Url::parse(&format!("http://127.0.0.1:{}/films", port)).expect("url")
}

fn offline_config() -> CacheConfig {
  CacheConfig {
    persist_fallback: true,
    ..CacheConfig::default()
  }
}

fn film(id: &str, title: &str) -> Film {
  serde_json::from_value(json!({
    "id": id,
    "title": title,
    "director": "Hayao Miyazaki",
    "release_date": "1988",
    "description": ""
  }))
  .expect("film")
}

#[tokio::test]
async fn test_tokyo_scenario() {
  let clock = ManualClock::default();
  let client: FetchClient<Value> =
    FetchClient::from_config(&CacheConfig::default()).with_clock(clock.clone());
  let calls = counter();

  let first = {
    let calls = Arc::clone(&calls);
    client
      .get(
        "tokyo",
        move || {
          calls.fetch_add(1, Ordering::SeqCst);
          async { Ok::<_, color_eyre::Report>(json!({"temp": 20})) }
        },
        GetOptions::default(),
      )
      .await
      .expect("first")
  };
  assert_eq!(first.data, json!({"temp": 20}));
  assert_eq!(first.source, CacheSource::Network);

  clock.advance(Duration::seconds(1));
  let second = {
    let calls = Arc::clone(&calls);
    client
      .get(
        "Tokyo",
        move || {
          calls.fetch_add(1, Ordering::SeqCst);
          async { Ok::<_, color_eyre::Report>(json!({"temp": 99})) }
        },
        GetOptions::default(),
      )
      .await
      .expect("second")
  };
  assert_eq!(second.data, json!({"temp": 20}));
  assert_eq!(second.source, CacheSource::CacheFresh);
  assert_eq!(calls.load(Ordering::SeqCst), 1);

  client.invalidate("tokyo");
  let third = {
    let calls = Arc::clone(&calls);
    client
      .get(
        "tokyo",
        move || {
          calls.fetch_add(1, Ordering::SeqCst);
          async { Ok::<_, color_eyre::Report>(json!({"temp": 22})) }
        },
        GetOptions::default(),
      )
      .await
      .expect("third")
  };
  assert_eq!(third.data, json!({"temp": 22}));
  assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_ttl_boundary() {
  let clock = ManualClock::default();
  let ttl = Duration::milliseconds(600_000);
  let client: FetchClient<u32> = FetchClient::new(ttl).with_clock(clock.clone());
  let calls = counter();

  let fetch = |value: u32| {
    let calls = Arc::clone(&calls);
    move || {
      calls.fetch_add(1, Ordering::SeqCst);
      async move { Ok::<_, color_eyre::Report>(value) }
    }
  };

  client.get("k", fetch(1), GetOptions::default()).await.expect("store");

  clock.advance(ttl - Duration::milliseconds(1));
  let hit = client.get("k", fetch(2), GetOptions::default()).await.expect("hit");
  assert_eq!(hit.data, 1);
  assert_eq!(calls.load(Ordering::SeqCst), 1);

  clock.advance(Duration::milliseconds(2));
  let miss = client.get("k", fetch(3), GetOptions::default()).await.expect("miss");
  assert_eq!(miss.data, 3);
  assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failure_without_fallback_rejects() {
  let client: FetchClient<Value> = FetchClient::from_config(&CacheConfig::default());

  let err = client
    .get(
      "atlantis",
      || async { Err::<Value, _>(eyre!("Failed to fetch")) },
      GetOptions::default(),
    )
    .await
    .unwrap_err();

  assert!(matches!(err, CacheError::FetchFailed { ref key, .. } if key == "atlantis"));
}

#[tokio::test]
async fn test_movies_fall_back_to_sqlite_snapshot() {
  let temp_dir = TempDir::new().expect("Failed to create temp directory");
  let storage = Arc::new(SqliteStorage::open(&temp_dir.path().join("cache.db")).expect("open"));
  storage
    .replace(MOVIES_COLLECTION, &[film("1", "My Neighbor Totoro")])
    .expect("seed");

  let service = MoviesService::new(
    HttpClient::new().expect("http"),
    &offline_config(),
    Arc::clone(&storage),
  )
  .expect("service")
  .with_url(dead_url());

  let result = service.films().await.expect("fallback");

  assert_eq!(result.source, CacheSource::Fallback);
  assert_eq!(result.data, vec![film("1", "My Neighbor Totoro")]);
  assert!(result.cached_at.is_some());
  assert!(matches!(result.warning, Some(CacheError::FetchFailed { .. })));
  // A fallback is not a refresh: nothing was cached in memory.
  assert_eq!(service.cache_stats().size, 0);
}

#[tokio::test]
async fn test_movies_without_snapshot_fail() {
  let storage = Arc::new(SqliteStorage::open_in_memory().expect("open"));
  let service = MoviesService::new(HttpClient::new().expect("http"), &offline_config(), storage)
    .expect("service")
    .with_url(dead_url());

  let err = service.films().await.unwrap_err();
  assert!(err.is_fetch_failed());
}

#[tokio::test]
async fn test_movies_ignore_snapshot_when_fallback_disabled() {
  let storage = Arc::new(SqliteStorage::open_in_memory().expect("open"));
  storage
    .replace(MOVIES_COLLECTION, &[film("1", "My Neighbor Totoro")])
    .expect("seed");

  let config = CacheConfig {
    persist_fallback: false,
    ..CacheConfig::default()
  };
  let service = MoviesService::new(HttpClient::new().expect("http"), &config, Arc::clone(&storage))
    .expect("service")
    .with_url(dead_url());

  let err = service.films().await.unwrap_err();
  assert!(matches!(err, CacheError::FetchFailed { .. }));

  // The saved list is still there for --offline.
  let saved = service.offline_films().expect("load").expect("present");
  assert_eq!(saved.value, vec![film("1", "My Neighbor Totoro")]);
}

#[tokio::test]
async fn test_dashboard_movies_keep_offline_copy_by_default() {
  let temp_dir = TempDir::new().expect("Failed to create temp directory");
  let storage = Arc::new(SqliteStorage::open(&temp_dir.path().join("cache.db")).expect("open"));
  storage
    .replace(MOVIES_COLLECTION, &[film("1", "My Neighbor Totoro")])
    .expect("seed");

  let dashboard = Dashboard::with_storage(
    &Config::default(),
    Arc::clone(&storage),
    &NutritionCredentials::default(),
  )
  .expect("dashboard");
  let movies = dashboard.movies.with_url(dead_url());

  let result = movies.films().await.expect("fallback");
  assert_eq!(result.source, CacheSource::Fallback);
}
