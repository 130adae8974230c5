use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::sensor::SensorSet;

/// Used when neither an outdoor sensor nor a forecast is available.
pub const FALLBACK_OUTDOOR_TEMPERATURE: f64 = 20.0;

#[derive(Debug, Clone, PartialEq)]
pub struct HourlyForecast {
    pub time: DateTime<FixedOffset>,
    pub temperature: f64,
    pub humidity: f64,
    /// 0.0 (clear) to 1.0 (overcast).
    pub cloud_fraction: Option<f64>,
}

pub fn daily_max_temperature(forecasts: &[HourlyForecast], date: NaiveDate) -> Option<f64> {
    forecasts
        .iter()
        .filter(|forecast| forecast.time.date_naive() == date)
        .map(|forecast| forecast.temperature)
        .reduce(f64::max)
}

pub fn closest_future_forecast(
    forecasts: &[HourlyForecast],
    now: DateTime<FixedOffset>,
) -> Option<&HourlyForecast> {
    forecasts
        .iter()
        .filter(|forecast| forecast.time >= now)
        .min_by_key(|forecast| forecast.time)
}

/// True when the forecast reports less cloud than `threshold_percent`.
pub fn is_clear(forecast: Option<&HourlyForecast>, threshold_percent: u8) -> bool {
    forecast
        .and_then(|forecast| forecast.cloud_fraction)
        .is_some_and(|cloud| cloud < f64::from(threshold_percent) * 0.01)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutdoorSource {
    Sensor,
    Forecast,
    Fallback,
}

impl OutdoorSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sensor => "sensor",
            Self::Forecast => "forecast",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveOutdoorTemperature {
    pub temperature: f64,
    pub source: OutdoorSource,
}

impl EffectiveOutdoorTemperature {
    pub fn resolve(sensors: &SensorSet, forecast_max: Option<f64>) -> Self {
        if let Some(temperature) = sensors.outdoor_temperature() {
            return Self {
                temperature,
                source: OutdoorSource::Sensor,
            };
        }
        match forecast_max {
            Some(temperature) => Self {
                temperature,
                source: OutdoorSource::Forecast,
            },
            None => Self {
                temperature: FALLBACK_OUTDOOR_TEMPERATURE,
                source: OutdoorSource::Fallback,
            },
        }
    }
}
