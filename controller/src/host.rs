use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use chrono_tz::Tz;
use tracing::{error, info};

use comfort_common::{ComfortCycle, ConfigError, Importance, RuntimeConfig};

use crate::{
    notify::NotifierSet, store::JsonFileStore, switchbot::SwitchBotClient, weather::ForecastSource,
};

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = PathBuf::from(env_or("COMFORT_CONFIG", "./comfort.json"));
    let mut config = load_runtime_config(&config_path)?;
    config.sanitize();
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", config_path.display()))?;
    let tz = parse_timezone(&config.timezone)?;

    let mut devices = SwitchBotClient::from_env(&config.sensors, config.retry)
        .context("SwitchBot client is not configured")?;
    let mut weather = ForecastSource::from_env(tz);
    let mut store = JsonFileStore::from_env(config.aircon.min_runtime.clone());
    let notifiers = NotifierSet::from_env();

    let now = now_in_timezone(tz);
    info!("comfort cycle starting at {}", now.to_rfc3339());

    match ComfortCycle::new(&config, &mut devices, &mut weather, &mut store).run(now) {
        Ok(report) => {
            info!(
                "comfort cycle finished: {} ({} degraded step(s))",
                report.applied().summary(),
                report.degradations
            );
            notifiers.send(&report.summary(), Importance::Normal);
            Ok(())
        }
        Err(err) => {
            error!("comfort cycle failed: {err}");
            notifiers.send(&format!("comfort cycle failed: {err}"), Importance::Important);
            Err(err.into())
        }
    }
}

/// Missing file falls back to the built-in defaults.
fn load_runtime_config(path: &Path) -> anyhow::Result<RuntimeConfig> {
    match std::fs::read(path) {
        Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw)
            .with_context(|| format!("failed to parse {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!("{} not found, using default configuration", path.display());
            Ok(RuntimeConfig::default())
        }
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

fn parse_timezone(timezone: &str) -> Result<Tz, ConfigError> {
    timezone
        .parse()
        .map_err(|_| ConfigError::Timezone(timezone.to_string()))
}

fn now_in_timezone(tz: Tz) -> DateTime<FixedOffset> {
    let local = Utc::now().with_timezone(&tz);
    local.with_timezone(&local.offset().fix())
}

/// Unset and blank values are both missing.
pub fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::Env(name.to_string()))
}

pub fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("comfort-host-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let path = std::env::temp_dir().join("comfort-host-does-not-exist.json");
        let config = load_runtime_config(&path).unwrap();
        assert_eq!(config.timezone, RuntimeConfig::default().timezone);
    }

    #[test]
    fn partial_config_file_fills_defaults() {
        let path = temp_file("partial.json", r#"{"timezone": "Europe/Berlin"}"#);

        let config = load_runtime_config(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.timezone, "Europe/Berlin");
        assert_eq!(config.retry, RuntimeConfig::default().retry);
    }

    #[test]
    fn malformed_config_names_the_file() {
        let path = temp_file("malformed.json", "{ timezone:");

        let err = load_runtime_config(&path).unwrap_err();
        std::fs::remove_file(&path).ok();

        assert!(format!("{err:#}").contains("malformed.json"));
    }

    #[test]
    fn unknown_timezone_is_a_config_error() {
        assert_eq!(
            parse_timezone("Mars/Olympus").unwrap_err(),
            ConfigError::Timezone("Mars/Olympus".to_string())
        );
        assert!(parse_timezone("Asia/Tokyo").is_ok());
    }

    #[test]
    fn local_now_carries_the_zone_offset() {
        let now = now_in_timezone(chrono_tz::Asia::Tokyo);
        assert_eq!(now.offset().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn missing_env_is_reported_by_name() {
        assert_eq!(
            required_env("COMFORT_TEST_SURELY_UNSET_VARIABLE").unwrap_err(),
            ConfigError::Env("COMFORT_TEST_SURELY_UNSET_VARIABLE".to_string())
        );
        assert_eq!(env_or("COMFORT_TEST_SURELY_UNSET_VARIABLE", "fallback"), "fallback");
    }
}
