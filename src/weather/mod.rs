//! Weather lookup: SQLite entries with a 30 minute lifetime, Weatherbit API
//! on a miss.

pub mod api_types;
pub mod cached_client;
pub mod client;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cache::CacheValue;

pub use cached_client::CachedWeatherClient;
pub use client::WeatherClient;

/// Current conditions for a city
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
  pub city_name: String,
  pub state_code: Option<String>,
  pub country_code: Option<String>,
  /// Celsius
  pub temp: f64,
  /// Feels-like temperature, Celsius
  pub app_temp: f64,
  pub sunrise: Option<String>,
  pub sunset: Option<String>,
  pub description: String,
  /// Metres per second
  pub wind_spd: f64,
  pub wind_dir: Option<String>,
}

/// What a weather lookup produces: an observation, or the fallback message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Conditions {
  Current(Observation),
  Unavailable { message: String },
}

impl CacheValue for Conditions {
  fn namespace() -> &'static str {
    "weather"
  }
}

impl fmt::Display for Conditions {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Conditions::Unavailable { message } => writeln!(f, "{}", message),
      Conditions::Current(obs) => {
        match &obs.state_code {
          Some(state) => writeln!(f, "{}, {}", obs.city_name, state)?,
          None => writeln!(f, "{}", obs.city_name)?,
        }
        writeln!(f, "Temperature: {}°C", obs.temp)?;
        writeln!(f, "Feels like temp: {}°C", obs.app_temp)?;
        if let (Some(rise), Some(set)) = (&obs.sunrise, &obs.sunset) {
          writeln!(f, "Sunrise: {}    Sunset: {}", rise, set)?;
        }
        writeln!(f, "Weather: {}", obs.description)?;
        match &obs.wind_dir {
          Some(dir) => writeln!(f, "Wind: {} m/s, {}", obs.wind_spd, dir),
          None => writeln!(f, "Wind: {} m/s", obs.wind_spd),
        }
      }
    }
  }
}
