use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default in-memory TTL: ten minutes.
pub const DEFAULT_TTL_MS: i64 = 10 * 60 * 1000;

/// Default TTL for nutrition estimates: one day.
pub const DEFAULT_NUTRITION_TTL_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Config {
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub movies: MoviesConfig,
  #[serde(default)]
  pub nutrition: NutritionConfig,
}

/// Defaults applied by every fetch client.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
  /// Time-to-live of in-memory entries in milliseconds (<= 0 disables hits)
  #[serde(default = "default_ttl_ms")]
  pub ttl_ms: i64,
  /// Consult the persistent snapshot when a fetch fails
  #[serde(default)]
  pub persist_fallback: bool,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_ms: DEFAULT_TTL_MS,
      persist_fallback: false,
    }
  }
}

impl CacheConfig {
  pub fn ttl(&self) -> Duration {
    Duration::milliseconds(self.ttl_ms)
  }
}

fn default_ttl_ms() -> i64 {
  DEFAULT_TTL_MS
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct StorageConfig {
  /// Snapshot database location (defaults to the user data directory)
  pub path: Option<PathBuf>,
}

/// The film list keeps an offline copy unless this is turned off.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct MoviesConfig {
  #[serde(default = "default_true")]
  pub persist_fallback: bool,
}

impl Default for MoviesConfig {
  fn default() -> Self {
    Self {
      persist_fallback: true,
    }
  }
}

fn default_true() -> bool {
  true
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NutritionConfig {
  #[serde(default = "default_nutrition_ttl_ms")]
  pub ttl_ms: i64,
  /// Provider-shaped JSON served when no API credentials are set
  #[serde(default)]
  pub sample_path: Option<PathBuf>,
}

impl Default for NutritionConfig {
  fn default() -> Self {
    Self {
      ttl_ms: DEFAULT_NUTRITION_TTL_MS,
      sample_path: None,
    }
  }
}

fn default_nutrition_ttl_ms() -> i64 {
  DEFAULT_NUTRITION_TTL_MS
}

impl Config {
  /// Client defaults for the film list: the shared cache settings with the
  /// movies fallback switch applied.
  pub fn movies_cache(&self) -> CacheConfig {
    CacheConfig {
      persist_fallback: self.movies.persist_fallback,
      ..self.cache
    }
  }

  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./dashcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/dashcache/config.yaml
  ///
  /// Without any file the defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("dashcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("dashcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    // An empty document deserializes to unit, not to an empty map.
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }
}

/// Credentials for the nutrition providers, read from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NutritionCredentials {
  pub rapid_key: Option<String>,
  pub rapid_host: Option<String>,
  pub edamam_app_id: Option<String>,
  pub edamam_app_key: Option<String>,
}

impl NutritionCredentials {
  /// Checks DASHCACHE_* variables first, then the VITE_* names used by the
  /// web dashboard.
  pub fn from_env() -> Self {
    Self::from_lookup(|name| std::env::var(name).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let var = |suffix: &str| {
      lookup(&format!("DASHCACHE_{}", suffix))
        .or_else(|| lookup(&format!("VITE_{}", suffix)))
        .filter(|v| !v.trim().is_empty())
    };

    Self {
      rapid_key: var("RAPIDAPI_KEY"),
      rapid_host: var("RAPIDAPI_HOST"),
      edamam_app_id: var("EDAMAM_APP_ID"),
      edamam_app_key: var("EDAMAM_APP_KEY"),
    }
  }
}
