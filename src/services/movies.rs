//! Studio Ghibli film list with an offline snapshot.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

use crate::cache::{
  CacheResult, CacheStats, Fallback, FetchClient, GetOptions, PersistentSnapshot, Snapshot,
  SnapshotStore,
};
use crate::config::CacheConfig;
use crate::error::CacheError;

use super::cache::DashboardQuery;
use super::http::HttpClient;

pub const GHIBLI_FILMS_URL: &str = "https://ghibliapi.vercel.app/films";

/// Snapshot collection holding the last film list.
pub const MOVIES_COLLECTION: &str = "movies";

/// A film as returned by the Ghibli API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Film {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub original_title: Option<String>,
  #[serde(default)]
  pub director: String,
  #[serde(default)]
  pub producer: Option<String>,
  #[serde(default)]
  pub release_date: String,
  #[serde(default)]
  pub running_time: Option<String>,
  #[serde(default)]
  pub rt_score: Option<String>,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub image: Option<String>,
}

/// Film list client. With `persist_fallback` on, every successful fetch
/// replaces the persisted snapshot and a failed fetch serves that snapshot
/// when one exists.
#[derive(Clone)]
pub struct MoviesService {
  http: HttpClient,
  cache: FetchClient<Vec<Film>>,
  snapshot: Arc<dyn Fallback<Vec<Film>>>,
  url: Url,
}

impl MoviesService {
  pub fn new<S>(http: HttpClient, config: &CacheConfig, store: Arc<S>) -> Result<Self>
  where
    S: SnapshotStore + 'static,
  {
    let url = Url::parse(GHIBLI_FILMS_URL).map_err(|e| eyre!("Invalid films URL: {}", e))?;
    let snapshot: Arc<dyn Fallback<Vec<Film>>> =
      Arc::new(PersistentSnapshot::new(store, MOVIES_COLLECTION));
    let cache = FetchClient::from_config(config).with_fallback(Arc::clone(&snapshot));

    Ok(Self {
      http,
      cache,
      snapshot,
      url,
    })
  }

  pub fn with_url(mut self, url: Url) -> Self {
    self.url = url;
    self
  }

  pub fn with_cache(mut self, cache: FetchClient<Vec<Film>>) -> Self {
    self.cache = cache.with_fallback(Arc::clone(&self.snapshot));
    self
  }

  /// The film list, from cache, network or snapshot in that order.
  pub async fn films(&self) -> Result<CacheResult<Vec<Film>>, CacheError> {
    let http = self.http.clone();
    let url = self.url.clone();

    self
      .cache
      .get(
        &DashboardQuery::Films,
        || async move { http.get_json::<Vec<Film>>(url).await },
        GetOptions::default(),
      )
      .await
  }

  /// The persisted snapshot only, without touching the network.
  pub fn offline_films(&self) -> Result<Option<Snapshot<Vec<Film>>>, CacheError> {
    self.snapshot.load()
  }

  pub fn cache_stats(&self) -> CacheStats {
    self.cache.stats()
  }
}

/// Films whose director contains `filter` (case-insensitive) or whose
/// release year contains it.
pub fn filter_films<'a>(films: &'a [Film], filter: &str) -> Vec<&'a Film> {
  let needle = filter.trim().to_lowercase();
  films
    .iter()
    .filter(|f| f.director.to_lowercase().contains(&needle) || f.release_date.contains(&needle))
    .collect()
}
