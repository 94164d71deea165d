//! Caching implementations for dashboard types.

use crate::cache::{CacheKey, Cacheable, QueryKey};

use super::movies::Film;

// ============================================================================
// Cacheable implementations
// ============================================================================

impl Cacheable for Film {
  fn cache_key(&self) -> String {
    self.id.clone()
  }
}

// ============================================================================
// Query key types
// ============================================================================

/// Query key types for dashboard API calls.
#[derive(Clone, Debug)]
pub enum DashboardQuery {
  /// Current conditions and forecast for a city
  Weather { city: String },
  /// Nutrition estimate for an ingredient list
  Nutrition { ingredients: Vec<String> },
  /// Full Studio Ghibli film list
  Films,
}

impl QueryKey for DashboardQuery {
  fn cache_key(&self) -> CacheKey {
    match self {
      // City names are the whole key so stats stay readable.
      Self::Weather { city } => CacheKey::normalize(city),
      Self::Nutrition { ingredients } => CacheKey::from_list(ingredients),
      Self::Films => CacheKey::normalize("films"),
    }
  }

  fn description(&self) -> String {
    match self {
      Self::Weather { city } => format!("weather for {}", city.trim()),
      Self::Nutrition { ingredients } => format!("nutrition for {} ingredients", ingredients.len()),
      Self::Films => "ghibli films".to_string(),
    }
  }
}
