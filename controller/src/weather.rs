use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{debug, warn};

use comfort_common::{ConfigError, ForecastError, HourlyForecast, WeatherSource};

use crate::host::{env_or, required_env};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";
const FORECAST_COUNT: u32 = 20;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    list: Vec<ForecastEntry>,
}

#[derive(Debug, Deserialize)]
struct ForecastEntry {
    dt: i64,
    main: MainBlock,
    #[serde(default)]
    clouds: Option<Clouds>,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct Clouds {
    all: f64,
}

fn local_time(epoch_seconds: i64, tz: Tz) -> Option<DateTime<FixedOffset>> {
    let local = Utc.timestamp_opt(epoch_seconds, 0).single()?.with_timezone(&tz);
    Some(local.with_timezone(&local.offset().fix()))
}

/// Entries on or after `start`, in the order the API returned them.
fn to_hourly(response: ForecastResponse, tz: Tz, start: NaiveDate) -> Vec<HourlyForecast> {
    response
        .list
        .into_iter()
        .filter_map(|entry| {
            let time = local_time(entry.dt, tz)?;
            (time.date_naive() >= start).then(|| HourlyForecast {
                time,
                temperature: entry.main.temp,
                humidity: entry.main.humidity,
                cloud_fraction: entry.clouds.map(|clouds| clouds.all / 100.0),
            })
        })
        .collect()
}

pub struct OpenWeatherMapClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
    latitude: String,
    longitude: String,
    tz: Tz,
}

impl OpenWeatherMapClient {
    pub fn new(base_url: &str, api_key: String, latitude: String, longitude: String, tz: Tz) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            latitude,
            longitude,
            tz,
        }
    }

    pub fn from_env(tz: Tz) -> Result<Self, ConfigError> {
        Ok(Self::new(
            &env_or("OPENWEATHERMAP_BASE_URL", DEFAULT_BASE_URL),
            required_env("OPENWEATHERMAP_API_KEY")?,
            required_env("LATITUDE")?,
            required_env("LONGITUDE")?,
            tz,
        ))
    }

    /// Keeps the key and the home location out of error text.
    fn scrub(&self, message: String) -> String {
        message
            .replace(&self.api_key, "XXXXX")
            .replace(&self.latitude, "000")
            .replace(&self.longitude, "000")
    }
}

impl WeatherSource for OpenWeatherMapClient {
    fn forecast(&mut self, date: NaiveDate) -> Result<Vec<HourlyForecast>, ForecastError> {
        let url = format!("{}/forecast", self.base_url);
        let response = self
            .agent
            .get(&url)
            .query("lat", &self.latitude)
            .query("lon", &self.longitude)
            .query("appid", &self.api_key)
            .query("units", "metric")
            .query("cnt", &FORECAST_COUNT.to_string())
            .call()
            .map_err(|err| ForecastError(self.scrub(err.to_string())))?
            .into_json::<ForecastResponse>()
            .map_err(|err| ForecastError(format!("unreadable forecast: {err}")))?;

        let hourly = to_hourly(response, self.tz, date);
        debug!("forecast returned {} entries from {date}", hourly.len());
        Ok(hourly)
    }
}

/// The forecast client, or nothing when no API key is configured.
pub enum ForecastSource {
    OpenWeatherMap(OpenWeatherMapClient),
    Unconfigured,
}

impl ForecastSource {
    pub fn from_env(tz: Tz) -> Self {
        match OpenWeatherMapClient::from_env(tz) {
            Ok(client) => Self::OpenWeatherMap(client),
            Err(err) => {
                warn!("forecast disabled: {err}");
                Self::Unconfigured
            }
        }
    }
}

impl WeatherSource for ForecastSource {
    fn forecast(&mut self, date: NaiveDate) -> Result<Vec<HourlyForecast>, ForecastError> {
        match self {
            Self::OpenWeatherMap(client) => client.forecast(date),
            Self::Unconfigured => Err(ForecastError("no forecast provider configured".to_string())),
        }
    }
}
