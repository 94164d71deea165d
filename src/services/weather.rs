//! wttr.in weather lookups.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::cache::{CacheResult, CacheStats, FetchClient, GetOptions};
use crate::config::CacheConfig;
use crate::error::CacheError;

use super::cache::DashboardQuery;
use super::http::HttpClient;

/// Base URL for the wttr.in API
pub const WTTR_BASE_URL: &str = "https://wttr.in/";

/// Weather client with a per-city response cache.
///
/// The raw `format=j1` payload is cached; [`WeatherSummary`] extracts the
/// fields the dashboard shows.
#[derive(Clone)]
pub struct WeatherService {
  http: HttpClient,
  cache: FetchClient<Value>,
  base_url: Url,
}

impl WeatherService {
  pub fn new(http: HttpClient, config: &CacheConfig) -> Result<Self> {
    let base_url = Url::parse(WTTR_BASE_URL).map_err(|e| eyre!("Invalid weather URL: {}", e))?;
    Ok(Self {
      http,
      cache: FetchClient::from_config(config),
      base_url,
    })
  }

  pub fn with_base_url(mut self, base_url: Url) -> Self {
    self.base_url = base_url;
    self
  }

  pub fn with_cache(mut self, cache: FetchClient<Value>) -> Self {
    self.cache = cache;
    self
  }

  /// Weather payload for `city`, served from cache while fresh.
  pub async fn weather(&self, city: &str) -> Result<CacheResult<Value>, CacheError> {
    let query = DashboardQuery::Weather {
      city: city.to_string(),
    };
    let url = self.url_for(city);
    let http = self.http.clone();

    self
      .cache
      .get(
        &query,
        || async move { http.get_json::<Value>(url?).await },
        GetOptions::default(),
      )
      .await
  }

  /// Drop every cached city.
  pub fn clear_cache(&self) {
    self.cache.clear();
  }

  pub fn cache_stats(&self) -> CacheStats {
    self.cache.stats()
  }

  fn url_for(&self, city: &str) -> Result<Url> {
    let mut url = self.base_url.clone();
    url
      .path_segments_mut()
      .map_err(|_| eyre!("Weather base URL cannot take a path: {}", self.base_url))?
      .pop_if_empty()
      .push(city.trim());
    url.query_pairs_mut().append_pair("format", "j1");
    Ok(url)
  }
}

/// The handful of fields shown on the weather card.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSummary {
  pub area: Option<String>,
  pub country: Option<String>,
  pub temperature_c: f64,
  pub feels_like_c: f64,
  pub humidity: u8,
  pub wind_kmph: f64,
  pub description: String,
  pub forecast: Vec<DailyForecast>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyForecast {
  pub date: String,
  pub min_c: f64,
  pub max_c: f64,
}

impl WeatherSummary {
  /// Extract the summary from a wttr.in `format=j1` payload. At most three
  /// forecast days are kept.
  pub fn from_payload(payload: &Value) -> Result<Self> {
    let raw: ApiWeather = serde_json::from_value(payload.clone())
      .map_err(|e| eyre!("Unexpected weather payload: {}", e))?;

    let current = raw
      .current_condition
      .into_iter()
      .next()
      .ok_or_else(|| eyre!("Weather payload has no current conditions"))?;

    let area = raw.nearest_area.into_iter().next();

    let forecast = raw
      .weather
      .into_iter()
      .take(3)
      .map(|day| {
        Ok(DailyForecast {
          min_c: number(&day.min_temp_c, "mintempC")?,
          max_c: number(&day.max_temp_c, "maxtempC")?,
          date: day.date,
        })
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      area: area.as_ref().and_then(|a| first_value(&a.area_name)),
      country: area.as_ref().and_then(|a| first_value(&a.country)),
      temperature_c: number(&current.temp_c, "temp_C")?,
      feels_like_c: number(&current.feels_like_c, "FeelsLikeC")?,
      humidity: current
        .humidity
        .trim()
        .parse()
        .map_err(|e| eyre!("Invalid humidity '{}': {}", current.humidity, e))?,
      wind_kmph: number(&current.windspeed_kmph, "windspeedKmph")?,
      description: first_value(&current.weather_desc).unwrap_or_default(),
      forecast,
    })
  }
}

/// Convert Celsius to whole degrees Fahrenheit.
pub fn celsius_to_fahrenheit(c: f64) -> f64 {
  (c * 9.0 / 5.0 + 32.0).round()
}

fn number(raw: &str, field: &str) -> Result<f64> {
  raw
    .trim()
    .parse()
    .map_err(|e| eyre!("Invalid {} '{}': {}", field, raw, e))
}

fn first_value(values: &[ApiText]) -> Option<String> {
  values.first().map(|v| v.value.clone())
}

// wttr.in reports every number as a string.

#[derive(Debug, Deserialize)]
struct ApiWeather {
  #[serde(default)]
  current_condition: Vec<ApiCurrent>,
  #[serde(default)]
  nearest_area: Vec<ApiArea>,
  #[serde(default)]
  weather: Vec<ApiDay>,
}

#[derive(Debug, Deserialize)]
struct ApiCurrent {
  #[serde(rename = "temp_C")]
  temp_c: String,
  #[serde(rename = "FeelsLikeC")]
  feels_like_c: String,
  humidity: String,
  #[serde(rename = "windspeedKmph", default = "zero")]
  windspeed_kmph: String,
  #[serde(rename = "weatherDesc", default)]
  weather_desc: Vec<ApiText>,
}

#[derive(Debug, Deserialize)]
struct ApiArea {
  #[serde(rename = "areaName", default)]
  area_name: Vec<ApiText>,
  #[serde(default)]
  country: Vec<ApiText>,
}

#[derive(Debug, Deserialize)]
struct ApiDay {
  date: String,
  #[serde(rename = "maxtempC")]
  max_temp_c: String,
  #[serde(rename = "mintempC")]
  min_temp_c: String,
}

#[derive(Debug, Deserialize)]
struct ApiText {
  value: String,
}

fn zero() -> String {
  "0".to_string()
}
