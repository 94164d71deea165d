use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use dashcache::cache::{CacheResult, SnapshotStore};
use dashcache::CacheError;
use dashcache::config::Config;
use dashcache::services::{
  filter_films, movies::MOVIES_COLLECTION, weather::celsius_to_fahrenheit, Dashboard, Film,
  WeatherSummary,
};

#[derive(Parser, Debug)]
#[command(name = "dashcache")]
#[command(about = "Dashboard data lookups with response caching and offline fallback")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/dashcache/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Write logs to a daily rolling file in the data directory
  #[arg(long, global = true)]
  log_file: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Current weather for one or more cities
  Weather {
    #[arg(required = true)]
    cities: Vec<String>,
    /// Show temperatures in Fahrenheit
    #[arg(short, long)]
    fahrenheit: bool,
  },
  /// Studio Ghibli films, falling back to the last saved list when offline
  Movies {
    /// Filter by director or release year
    #[arg(short, long)]
    filter: Option<String>,
    /// Only read the saved list, never the network
    #[arg(long)]
    offline: bool,
  },
  /// Nutrition estimate for a list of ingredients
  Nutrition {
    #[arg(required = true)]
    ingredients: Vec<String>,
  },
  /// Delete the saved offline film list
  ClearSnapshots,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging(args.log_file)?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let dashboard = Dashboard::new(&config)?;

  match args.command {
    Command::Weather { cities, fahrenheit } => weather(&dashboard, &cities, fahrenheit).await,
    Command::Movies { filter, offline } => movies(&dashboard, filter.as_deref(), offline).await,
    Command::Nutrition { ingredients } => nutrition(&dashboard, &ingredients).await,
    Command::ClearSnapshots => {
      dashboard.storage().clear(MOVIES_COLLECTION)?;
      println!("Offline film list cleared.");
      Ok(())
    }
  }
}

/// Log to stderr (warnings by default) or to a rolling file (info by default).
fn init_logging(to_file: bool) -> Result<Option<WorkerGuard>> {
  let filter = |default: &str| {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
  };

  if to_file {
    let dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?
      .join("dashcache")
      .join("logs");
    std::fs::create_dir_all(&dir)
      .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

    let (writer, guard) =
      tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "dashcache.log"));
    tracing_subscriber::fmt()
      .with_env_filter(filter("dashcache=info"))
      .with_writer(writer)
      .with_ansi(false)
      .init();
    Ok(Some(guard))
  } else {
    tracing_subscriber::fmt()
      .with_env_filter(filter("dashcache=warn"))
      .with_writer(std::io::stderr)
      .init();
    Ok(None)
  }
}

fn print_notice<T>(result: &CacheResult<T>) {
  if let Some(notice) = result.source.notice() {
    let since = result
      .cached_at
      .map(|t| format!(" (saved {})", t.format("%Y-%m-%d %H:%M UTC")))
      .unwrap_or_default();
    eprintln!("Note: {}{}", notice, since);
  }
}

async fn weather(dashboard: &Dashboard, cities: &[String], fahrenheit: bool) -> Result<()> {
  for city in cities {
    let outcome = dashboard.weather.weather(city).await;
    match city_report(city, outcome, fahrenheit) {
      Ok(lines) => lines.iter().for_each(|line| println!("{}", line)),
      Err(message) => eprintln!("{}", message),
    }
  }

  let stats = dashboard.weather.cache_stats();
  println!("Cached cities ({}): {}", stats.size, stats.keys.join(", "));
  Ok(())
}

/// Lines to print for one city. A failed lookup or an unreadable payload
/// yields the message to report instead, so one bad city does not stop the
/// rest.
fn city_report(
  city: &str,
  outcome: std::result::Result<CacheResult<Value>, CacheError>,
  fahrenheit: bool,
) -> std::result::Result<Vec<String>, String> {
  let unavailable = |e: &dyn std::fmt::Display| {
    format!("{}: no data available, please retry ({})", city.trim(), e)
  };
  let result = outcome.map_err(|e| unavailable(&e))?;
  let summary = WeatherSummary::from_payload(&result.data).map_err(|e| unavailable(&e))?;

  let unit = |c: f64| {
    if fahrenheit {
      format!("{}°F", celsius_to_fahrenheit(c))
    } else {
      format!("{}°C", c)
    }
  };

  let mut lines = vec![
    format!(
      "{} [{:?}]",
      summary.area.as_deref().unwrap_or(city.trim()),
      result.source
    ),
    format!(
      "  {} {} (feels like {}), humidity {}%, wind {} km/h",
      summary.description,
      unit(summary.temperature_c),
      unit(summary.feels_like_c),
      summary.humidity,
      summary.wind_kmph
    ),
  ];
  lines.extend(
    summary
      .forecast
      .iter()
      .map(|day| format!("  {}: {} / {}", day.date, unit(day.min_c), unit(day.max_c))),
  );
  Ok(lines)
}

async fn movies(dashboard: &Dashboard, filter: Option<&str>, offline: bool) -> Result<()> {
  let films: Vec<Film> = if offline {
    match dashboard.movies.offline_films()? {
      Some(snapshot) => snapshot.value,
      None => return Err(eyre!("No saved film list. Run without --offline first.")),
    }
  } else {
    let result = dashboard.movies.films().await?;
    print_notice(&result);
    result.into_data()
  };

  let shown: Vec<&Film> = match filter {
    Some(f) => filter_films(&films, f),
    None => films.iter().collect(),
  };

  for film in shown {
    println!("{} ({}) - {}", film.title, film.release_date, film.director);
  }
  Ok(())
}

async fn nutrition(dashboard: &Dashboard, ingredients: &[String]) -> Result<()> {
  let Some(result) = dashboard.nutrition.estimate(ingredients).await? else {
    return Ok(());
  };
  let estimate = result.data;

  println!("Calories:  {} kcal", estimate.calories);
  println!("Weight:    {} g", estimate.weight_g);
  println!("Protein:   {} g", estimate.protein_g);
  println!("Carbs:     {} g", estimate.carbs_g);
  println!("Fat:       {} g", estimate.fat_g);
  println!("Sugar:     {} g", estimate.sugar_g);
  println!("Sodium:    {} mg", estimate.sodium_mg);
  println!("Fiber:     {} g", estimate.fiber_g);
  Ok(())
}
