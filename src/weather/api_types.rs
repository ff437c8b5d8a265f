//! Wire types for the Weatherbit current-conditions API.

use serde::Deserialize;

use super::Observation;

/// Response from `GET /v2.0/current?city=<city>&key=<key>`
#[derive(Debug, Deserialize)]
pub struct ApiCurrentResponse {
  #[serde(default)]
  pub data: Vec<ApiObservation>,
}

#[derive(Debug, Deserialize)]
pub struct ApiObservation {
  pub city_name: String,
  pub state_code: Option<String>,
  pub country_code: Option<String>,
  pub temp: f64,
  pub app_temp: f64,
  pub sunrise: Option<String>,
  pub sunset: Option<String>,
  pub weather: ApiWeatherDescription,
  pub wind_spd: f64,
  pub wind_cdir_full: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiWeatherDescription {
  pub description: String,
}

impl ApiObservation {
  pub fn into_observation(self) -> Observation {
    Observation {
      city_name: self.city_name,
      state_code: self.state_code,
      country_code: self.country_code,
      temp: self.temp,
      app_temp: self.app_temp,
      sunrise: self.sunrise,
      sunset: self.sunset,
      description: self.weather.description,
      wind_spd: self.wind_spd,
      wind_dir: self.wind_cdir_full,
    }
  }
}
