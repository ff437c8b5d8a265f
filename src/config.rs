use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Default tracing filter when RUST_LOG is unset
  pub log_level: String,
  pub connectivity: ConnectivityMode,
  /// Address dialled to decide connectivity in `auto` mode
  pub probe_addr: String,
  /// Upper bound on each remote call, in seconds
  pub timeout_secs: u64,
  pub rhymes: RhymesConfig,
  pub weather: WeatherConfig,
  pub chat: ChatConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      log_level: "info".to_string(),
      connectivity: ConnectivityMode::Auto,
      probe_addr: "1.1.1.1:443".to_string(),
      timeout_secs: 10,
      rhymes: RhymesConfig::default(),
      weather: WeatherConfig::default(),
      chat: ChatConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityMode {
  /// Probe `probe_addr` at startup
  #[default]
  Auto,
  Online,
  Offline,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RhymesConfig {
  pub api_url: String,
  /// Bundled rhyme table (`[{ "word": .., "rhymes": [..] }]`)
  pub table: Option<PathBuf>,
  /// Number of trailing letters used to match the table
  pub suffix_len: usize,
  /// Candidates requested from the API before ranking
  pub candidates: usize,
  pub max_results: usize,
  /// Keep only candidates with the same estimated syllable count
  pub match_syllables: bool,
  /// Write API answers back into the table
  pub persist_remote: bool,
  pub fallback: String,
}

impl Default for RhymesConfig {
  fn default() -> Self {
    Self {
      api_url: "https://api.datamuse.com/words".to_string(),
      table: None,
      suffix_len: 3,
      candidates: 50,
      max_results: 10,
      match_syllables: true,
      persist_remote: false,
      fallback: "no matching words found".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
  pub api_url: String,
  /// How long a cached observation stays valid
  pub ttl_minutes: i64,
  pub persist_remote: bool,
  pub fallback: String,
}

impl WeatherConfig {
  /// Lifetime of a cached observation. Errors when `ttl_minutes` is not
  /// positive or too large to represent.
  pub fn ttl(&self) -> Result<chrono::Duration> {
    if self.ttl_minutes <= 0 {
      return Err(eyre!("weather.ttl_minutes must be positive"));
    }
    chrono::Duration::try_minutes(self.ttl_minutes)
      .ok_or_else(|| eyre!("weather.ttl_minutes is out of range: {}", self.ttl_minutes))
  }
}

impl Default for WeatherConfig {
  fn default() -> Self {
    Self {
      api_url: "https://api.weatherbit.io/v2.0/current".to_string(),
      ttl_minutes: 30,
      persist_remote: true,
      fallback: "Error: No weather data available.".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
  pub server_url: String,
  pub history_limit: usize,
}

impl Default for ChatConfig {
  fn default() -> Self {
    Self {
      server_url: "http://localhost:3000/chat".to_string(),
      history_limit: 20,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./localfirst.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/localfirst/config.yaml
  ///
  /// Without a config file every setting takes its default.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("localfirst.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("localfirst").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.rhymes.suffix_len == 0 {
      return Err(eyre!("rhymes.suffix_len must be at least 1"));
    }
    self.weather.ttl()?;
    if self.timeout_secs == 0 {
      return Err(eyre!("timeout_secs must be positive"));
    }
    Ok(())
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }

  /// Get the Weatherbit API key from environment variables.
  ///
  /// Checks LOCALFIRST_WEATHER_KEY first, then WEATHERBIT_API_KEY as fallback.
  pub fn get_weather_key() -> Result<String> {
    std::env::var("LOCALFIRST_WEATHER_KEY")
      .or_else(|_| std::env::var("WEATHERBIT_API_KEY"))
      .map_err(|_| {
        eyre!(
          "Weather API key not found. Set LOCALFIRST_WEATHER_KEY or WEATHERBIT_API_KEY environment variable."
        )
      })
  }
}

/// Directory for the cache database and log files.
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("localfirst"))
}
