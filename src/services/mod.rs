//! Dashboard data sources built on the cache-backed fetch client.

pub mod cache;
pub mod http;
pub mod movies;
pub mod nutrition;
pub mod weather;

use color_eyre::Result;
use std::sync::Arc;

use crate::cache::SqliteStorage;
use crate::config::{Config, NutritionCredentials};

pub use cache::DashboardQuery;
pub use http::HttpClient;
pub use movies::{filter_films, Film, MoviesService};
pub use nutrition::{ingredients_from_meal, NutritionEstimate, NutritionService};
pub use weather::{WeatherService, WeatherSummary};

/// All services, sharing one HTTP client and one snapshot database.
#[derive(Clone)]
pub struct Dashboard {
  pub weather: WeatherService,
  pub movies: MoviesService,
  pub nutrition: NutritionService,
  storage: Arc<SqliteStorage>,
}

impl Dashboard {
  pub fn new(config: &Config) -> Result<Self> {
    let storage = match &config.storage.path {
      Some(path) => SqliteStorage::open(path)?,
      None => SqliteStorage::open_default()?,
    };
    Self::with_storage(config, Arc::new(storage), &NutritionCredentials::from_env())
  }

  pub fn with_storage(
    config: &Config,
    storage: Arc<SqliteStorage>,
    credentials: &NutritionCredentials,
  ) -> Result<Self> {
    let http = HttpClient::new()?;

    Ok(Self {
      weather: WeatherService::new(http.clone(), &config.cache)?,
      movies: MoviesService::new(http.clone(), &config.movies_cache(), Arc::clone(&storage))?,
      nutrition: NutritionService::new(http, &config.nutrition, credentials)?,
      storage,
    })
  }

  pub fn storage(&self) -> &Arc<SqliteStorage> {
    &self.storage
  }
}
