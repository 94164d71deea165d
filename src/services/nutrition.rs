//! Nutrition estimates for recipe ingredient lists.
//!
//! Providers are tried in order of preference: RapidAPI (when both key and
//! host are set), then Edamam (when app id and key are set), then a local
//! sample response (when `nutrition.sample_path` is set). Estimates are
//! cached by the order-insensitive ingredient list.

use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use url::Url;

use crate::cache::{CacheResult, CacheStats, FetchClient, GetOptions};
use crate::config::{NutritionConfig, NutritionCredentials};
use crate::error::CacheError;

use super::cache::DashboardQuery;
use super::http::{self, HttpClient};

pub const EDAMAM_BASE_URL: &str = "https://api.edamam.com/";

/// RapidAPI paths, tried in order; a 404 moves on to the next one.
const RAPID_PATHS: [&str; 2] = ["/api/nutrition-details", "/api/nutrition-data"];

/// Highest ingredient index in a TheMealDB meal record.
const MEAL_INGREDIENT_SLOTS: usize = 20;

/// Nutrition totals rounded to whole units.
#[derive(Debug, Clone, PartialEq)]
pub struct NutritionEstimate {
  pub calories: i64,
  pub weight_g: i64,
  pub protein_g: i64,
  pub carbs_g: i64,
  pub fat_g: i64,
  pub sugar_g: i64,
  pub sodium_mg: i64,
  pub fiber_g: i64,
  /// The provider response as received
  pub raw: Value,
}

impl NutritionEstimate {
  /// Normalize an Edamam-style response. Missing figures count as zero.
  pub fn from_response(raw: Value) -> Self {
    let nutrient = |code: &str| -> i64 {
      raw
        .pointer(&format!("/totalNutrients/{}/quantity", code))
        .and_then(Value::as_f64)
        .map_or(0, round)
    };
    let top = |field: &str| raw.get(field).and_then(Value::as_f64).map_or(0, round);

    Self {
      calories: top("calories"),
      weight_g: top("totalWeight"),
      protein_g: nutrient("PROCNT"),
      carbs_g: nutrient("CHOCDF"),
      fat_g: nutrient("FAT"),
      sugar_g: nutrient("SUGAR"),
      sodium_mg: nutrient("NA"),
      fiber_g: nutrient("FIBTG"),
      raw,
    }
  }
}

fn round(v: f64) -> i64 {
  v.round() as i64
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Provider {
  RapidApi { key: String, host: String },
  Edamam { app_id: String, app_key: String },
  Sample { path: PathBuf },
}

impl Provider {
  fn select(creds: &NutritionCredentials, sample_path: Option<&Path>) -> Option<Self> {
    if let (Some(key), Some(host)) = (&creds.rapid_key, &creds.rapid_host) {
      return Some(Self::RapidApi {
        key: key.clone(),
        host: host.clone(),
      });
    }
    if let (Some(app_id), Some(app_key)) = (&creds.edamam_app_id, &creds.edamam_app_key) {
      return Some(Self::Edamam {
        app_id: app_id.clone(),
        app_key: app_key.clone(),
      });
    }
    sample_path.map(|path| Self::Sample {
      path: path.to_path_buf(),
    })
  }
}

#[derive(Clone)]
pub struct NutritionService {
  http: HttpClient,
  cache: FetchClient<NutritionEstimate>,
  provider: Option<Provider>,
  edamam_base: Url,
}

impl NutritionService {
  pub fn new(
    http: HttpClient,
    config: &NutritionConfig,
    credentials: &NutritionCredentials,
  ) -> Result<Self> {
    let edamam_base =
      Url::parse(EDAMAM_BASE_URL).map_err(|e| eyre!("Invalid Edamam URL: {}", e))?;

    Ok(Self {
      http,
      cache: FetchClient::new(Duration::milliseconds(config.ttl_ms)),
      provider: Provider::select(credentials, config.sample_path.as_deref()),
      edamam_base,
    })
  }

  pub fn with_cache(mut self, cache: FetchClient<NutritionEstimate>) -> Self {
    self.cache = cache;
    self
  }

  pub fn has_provider(&self) -> bool {
    self.provider.is_some()
  }

  /// Estimate nutrition for `ingredients`. An empty list yields `None`
  /// without any lookup.
  pub async fn estimate(
    &self,
    ingredients: &[String],
  ) -> Result<Option<CacheResult<NutritionEstimate>>, CacheError> {
    if ingredients.is_empty() {
      return Ok(None);
    }

    let query = DashboardQuery::Nutrition {
      ingredients: ingredients.to_vec(),
    };
    let http = self.http.clone();
    let provider = self.provider.clone();
    let edamam_base = self.edamam_base.clone();
    let ingredients = ingredients.to_vec();

    let result = self
      .cache
      .get(
        &query,
        || async move {
          match provider {
            Some(Provider::RapidApi { key, host }) => {
              fetch_rapid(&http, &key, &host, &ingredients).await
            }
            Some(Provider::Edamam { app_id, app_key }) => {
              fetch_edamam(&http, &edamam_base, &app_id, &app_key, &ingredients).await
            }
            Some(Provider::Sample { path }) => read_sample(&path).await,
            None => Err(eyre!(
              "No nutrition provider configured. Set DASHCACHE_RAPIDAPI_KEY and \
               DASHCACHE_RAPIDAPI_HOST, DASHCACHE_EDAMAM_APP_ID and DASHCACHE_EDAMAM_APP_KEY, \
               or nutrition.sample_path."
            )),
          }
        },
        GetOptions::default(),
      )
      .await?;

    Ok(Some(result))
  }

  pub fn cache_stats(&self) -> CacheStats {
    self.cache.stats()
  }
}

async fn fetch_rapid(
  http: &HttpClient,
  key: &str,
  host: &str,
  ingredients: &[String],
) -> Result<NutritionEstimate> {
  let base = Url::parse(&format!("https://{}", host))
    .map_err(|e| eyre!("Invalid RapidAPI host '{}': {}", host, e))?;

  for path in RAPID_PATHS {
    let url = rapid_url(&base, path, ingredients)?;
    let response = http::send(
      http
        .get(url.clone())
        .header("x-rapidapi-key", key)
        .header("x-rapidapi-host", host),
    )
    .await?;

    if response.status() == StatusCode::NOT_FOUND {
      continue;
    }
    let body: Value = http::decode(response, &url)
      .await
      .map_err(|e| e.wrap_err("Failed to fetch nutrition"))?;
    return Ok(NutritionEstimate::from_response(body));
  }

  Err(eyre!("Nutrition endpoint not found on RapidAPI host {}", host))
}

/// A single ingredient is looked up as a logging entry; several are
/// treated as one cooked dish.
fn rapid_url(base: &Url, path: &str, ingredients: &[String]) -> Result<Url> {
  let (ingr, nutrition_type) = match ingredients {
    [single] => (single.clone(), "logging"),
    many => (many.join(", "), "cooking"),
  };

  let mut url = base
    .join(path)
    .map_err(|e| eyre!("Invalid RapidAPI path {}: {}", path, e))?;
  url
    .query_pairs_mut()
    .append_pair("ingr", &ingr)
    .append_pair("nutrition-type", nutrition_type);
  Ok(url)
}

async fn fetch_edamam(
  http: &HttpClient,
  base: &Url,
  app_id: &str,
  app_key: &str,
  ingredients: &[String],
) -> Result<NutritionEstimate> {
  let mut url = base
    .join("api/nutrition-details")
    .map_err(|e| eyre!("Invalid Edamam URL: {}", e))?;
  url
    .query_pairs_mut()
    .append_pair("app_id", app_id)
    .append_pair("app_key", app_key);

  let response = http::send(
    http
      .post(url.clone())
      .json(&json!({ "title": "Recipe", "ingr": ingredients })),
  )
  .await?;

  let body: Value = http::decode(response, &url)
    .await
    .map_err(|e| e.wrap_err("Failed to fetch nutrition"))?;
  Ok(NutritionEstimate::from_response(body))
}

/// Load a provider-shaped response from disk. The figures do not depend on
/// the ingredients.
async fn read_sample(path: &Path) -> Result<NutritionEstimate> {
  let contents = tokio::fs::read_to_string(path)
    .await
    .map_err(|e| eyre!("Failed to read nutrition sample {}: {}", path.display(), e))?;
  let body: Value = serde_json::from_str(&contents)
    .map_err(|e| eyre!("Failed to parse nutrition sample {}: {}", path.display(), e))?;
  Ok(NutritionEstimate::from_response(body))
}

/// Build "measure ingredient" lines from a TheMealDB meal record.
///
/// Blank ingredients are skipped and runs of whitespace collapse to one
/// space.
pub fn ingredients_from_meal(meal: &Value) -> Vec<String> {
  let text = |field: String| meal.get(&field).and_then(Value::as_str).unwrap_or_default();

  (1..=MEAL_INGREDIENT_SLOTS)
    .filter_map(|i| {
      let ingredient = text(format!("strIngredient{}", i));
      if ingredient.trim().is_empty() {
        return None;
      }
      let measure = text(format!("strMeasure{}", i));
      let line = format!("{} {}", measure, ingredient);
      Some(line.split_whitespace().collect::<Vec<_>>().join(" "))
    })
    .collect()
}
