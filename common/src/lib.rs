pub mod boundary;
pub mod circulator;
pub mod codes;
pub mod comfort;
pub mod comfort_factors;
pub mod config;
pub mod cycle;
pub mod decision;
pub mod error;
pub mod forecast;
pub mod intensity;
pub mod schedule;
pub mod sensor;
pub mod surface;
pub mod transition;
pub mod types;

pub use boundary::{
    AirQualitySource, AirconDevice, AirconPath, AppliedAirconSetting, CirculatorDevice,
    CommandAck, DeviceResult, Importance, Notifier, SettingStore, SmartHomeDevice, WeatherSource,
};
pub use config::{RetryPolicy, RuntimeConfig};
pub use cycle::{ComfortCycle, CycleReport};
pub use error::{
    ConfigError, CycleError, DeviceCommandError, ForecastError, NotifyError, PersistenceError,
};
pub use forecast::HourlyForecast;
pub use sensor::{Reading, SensorSet, SensorSpec};
pub use transition::{MinRuntimeStore, MinRuntimeTable, MinRuntimeTracker};
pub use types::{
    AirconMode, AirconSetting, CirculatorSetting, FanSpeed, PmvResult, PowerState, StepDirection,
};
