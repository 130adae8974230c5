use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    error::{DeviceCommandError, ForecastError, NotifyError, PersistenceError},
    forecast::HourlyForecast,
    sensor::{Reading, SensorSpec},
    types::{AirconMode, AirconSetting, CirculatorSetting, PowerState, StepDirection},
};

pub type DeviceResult<T> = Result<T, DeviceCommandError>;

/// Vendor acknowledgement for a command that reached the device API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandAck {
    pub accepted: bool,
}

impl CommandAck {
    pub const ACCEPTED: Self = Self { accepted: true };
    pub const REJECTED: Self = Self { accepted: false };
}

/// Which remote the aircon command goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AirconPath {
    /// Full `temperature, mode, fan, power` command.
    Primary,
    /// Learned remote button named after the mode label.
    Support,
}

impl AirconPath {
    pub fn for_mode(mode: AirconMode) -> Self {
        if mode.is_powerful() {
            Self::Support
        } else {
            Self::Primary
        }
    }
}

pub trait AirQualitySource {
    fn read_air_quality(&mut self, sensor: &SensorSpec) -> DeviceResult<Reading>;
}

pub trait AirconDevice {
    fn send_aircon(&mut self, setting: &AirconSetting, path: AirconPath) -> DeviceResult<()>;
}

pub trait CirculatorDevice {
    fn set_power(&mut self, power: PowerState) -> DeviceResult<CommandAck>;
    fn step(&mut self, direction: StepDirection) -> DeviceResult<CommandAck>;
}

pub trait SmartHomeDevice: AirQualitySource + AirconDevice + CirculatorDevice {}

impl<T: AirQualitySource + AirconDevice + CirculatorDevice> SmartHomeDevice for T {}

pub trait WeatherSource {
    fn forecast(&mut self, date: NaiveDate) -> Result<Vec<HourlyForecast>, ForecastError>;
}

/// An aircon setting together with the epoch second it was sent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AppliedAirconSetting {
    pub setting: AirconSetting,
    pub applied_at: i64,
}

pub trait SettingStore {
    fn load_last_aircon(&mut self) -> Result<Option<AppliedAirconSetting>, PersistenceError>;
    /// Records the setting as the latest and appends it to the history.
    fn save_aircon(&mut self, applied: &AppliedAirconSetting) -> Result<(), PersistenceError>;
    /// Applied settings since `since` (epoch seconds), oldest first, led by the one
    /// already in force at `since`.
    fn aircon_history(&mut self, since: i64) -> Result<Vec<AppliedAirconSetting>, PersistenceError>;
    fn load_last_circulator(&mut self) -> Result<Option<CirculatorSetting>, PersistenceError>;
    fn save_circulator(&mut self, setting: &CirculatorSetting) -> Result<(), PersistenceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Importance {
    Normal,
    Important,
}

pub trait Notifier {
    fn name(&self) -> &'static str;
    fn notify(&self, message: &str, importance: Importance) -> Result<(), NotifyError>;
}
