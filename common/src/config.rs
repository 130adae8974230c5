use serde::{Deserialize, Serialize};

use crate::{
    comfort::{ASSISTED_AIR_SPEED, DEFAULT_AIR_SPEED},
    error::ConfigError,
    schedule::{AwakePeriods, ComfortPeriod, TimeRange},
    sensor::{SensorKind, SensorSpec},
    surface::SurfaceModelConfig,
    transition::MinRuntimeTracker,
    types::{AirconMode, AirconSettingPatch, FanSpeed, PowerState, MAX_MET, MIN_MET},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorLayout {
    pub main: SensorSpec,
    #[serde(default)]
    pub sub: Option<SensorSpec>,
    #[serde(default)]
    pub supplementaries: Vec<SensorSpec>,
    #[serde(default)]
    pub outdoor: Option<SensorSpec>,
}

impl Default for SensorLayout {
    fn default() -> Self {
        Self {
            main: SensorSpec::new("main", "リビング", SensorKind::Co2),
            sub: Some(SensorSpec::new("sub", "寝室", SensorKind::TemperatureHumidity)),
            supplementaries: Vec::new(),
            outdoor: Some(SensorSpec::new(
                "outdoor",
                "屋外",
                SensorKind::TemperatureHumidity,
            )),
        }
    }
}

impl SensorLayout {
    pub fn all(&self) -> impl Iterator<Item = &SensorSpec> {
        std::iter::once(&self.main)
            .chain(self.sub.iter())
            .chain(self.supplementaries.iter())
            .chain(self.outdoor.iter())
    }
}

/// Outdoor temperature bands, °C.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TemperatureThresholds {
    pub high: f64,
    pub low: f64,
}

impl Default for TemperatureThresholds {
    fn default() -> Self {
        Self {
            high: 30.0,
            low: 15.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentThresholds {
    /// Average indoor absolute humidity (g/m³) above which dry mode is forced.
    pub dehumidification_threshold: f64,
}

impl Default for EnvironmentThresholds {
    fn default() -> Self {
        Self {
            dehumidification_threshold: 14.0,
        }
    }
}

/// ppm
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Co2Thresholds {
    pub high: u32,
    pub warning: u32,
}

impl Default for Co2Thresholds {
    fn default() -> Self {
        Self {
            high: 1000,
            warning: 1500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComfortControlConfig {
    #[serde(default)]
    pub environment_control_enabled: bool,
    #[serde(default)]
    pub solar_panel_enabled: bool,
    pub solar_active_hours: TimeRange,
    /// Percent cloud cover below which the solar override applies.
    pub solar_cloud_threshold: u8,
    #[serde(default)]
    pub disabled_periods: Vec<ComfortPeriod>,
}

impl Default for ComfortControlConfig {
    fn default() -> Self {
        Self {
            environment_control_enabled: false,
            solar_panel_enabled: false,
            solar_active_hours: TimeRange::hm(10, 0, 15, 0),
            solar_cloud_threshold: 30,
            disabled_periods: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PmvThreshold {
    /// Upper PMV bound for this entry.
    pub pmv: f64,
    pub setting: AirconSettingPatch,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OutdoorActivation {
    /// Margin subtracted from the mean radiant temperature before comparing with outdoors.
    pub outdoor_temperature_diff: f64,
    pub pmv_threshold: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConditionalAirconConfig {
    pub activation: OutdoorActivation,
    pub off_state: AirconSettingPatch,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CondensationConfig {
    pub dew_point_margin: f64,
    pub pmv_threshold: f64,
    pub cooling_stop: AirconSettingPatch,
    pub condensation_override: AirconSettingPatch,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AirconConfig {
    pub pmv_thresholds: Vec<PmvThreshold>,
    pub dehumidification: AirconSettingPatch,
    pub weakest_cooling: AirconSettingPatch,
    pub weakest_heating: AirconSettingPatch,
    pub cooling: ConditionalAirconConfig,
    pub heating: ConditionalAirconConfig,
    pub summer_condensation: CondensationConfig,
    /// Indoor temperature spread (°C) above which the fan is forced to HIGH.
    pub circulation_temperature_diff: f64,
    #[serde(default = "default_min_runtime")]
    pub min_runtime: Vec<MinRuntimeTracker>,
}

fn default_min_runtime() -> Vec<MinRuntimeTracker> {
    vec![
        MinRuntimeTracker::new(AirconMode::Cooling, 25.0, 45.0, 60),
        MinRuntimeTracker::new(AirconMode::Heating, -10.0, 15.0, 60),
        MinRuntimeTracker::new(AirconMode::Dry, 15.0, 35.0, 30),
    ]
}

impl Default for AirconConfig {
    fn default() -> Self {
        use AirconMode::*;

        let off = AirconSettingPatch::mode(Fan)
            .with_fan(FanSpeed::Auto)
            .with_power(PowerState::Off);

        Self {
            pmv_thresholds: vec![
                PmvThreshold {
                    pmv: -2.0,
                    setting: AirconSettingPatch::mode(PowerfulHeating)
                        .with_temperature(25.0)
                        .with_fan(FanSpeed::High),
                },
                PmvThreshold {
                    pmv: -1.2,
                    setting: AirconSettingPatch::mode(Heating)
                        .with_temperature(23.0)
                        .with_fan(FanSpeed::Auto),
                },
                PmvThreshold {
                    pmv: -0.5,
                    setting: AirconSettingPatch::mode(Heating)
                        .with_temperature(21.0)
                        .with_fan(FanSpeed::Low),
                },
                PmvThreshold {
                    pmv: 0.5,
                    setting: AirconSettingPatch::mode(Fan).with_fan(FanSpeed::Auto),
                },
                PmvThreshold {
                    pmv: 1.0,
                    setting: AirconSettingPatch::mode(Cooling)
                        .with_temperature(27.0)
                        .with_fan(FanSpeed::Low),
                },
                PmvThreshold {
                    pmv: 2.0,
                    setting: AirconSettingPatch::mode(Cooling)
                        .with_temperature(26.0)
                        .with_fan(FanSpeed::Auto),
                },
                PmvThreshold {
                    pmv: 3.0,
                    setting: AirconSettingPatch::mode(PowerfulCooling)
                        .with_temperature(25.0)
                        .with_fan(FanSpeed::High),
                },
            ],
            dehumidification: AirconSettingPatch::mode(Dry)
                .with_temperature(26.0)
                .with_fan(FanSpeed::Auto),
            weakest_cooling: AirconSettingPatch::mode(Cooling)
                .with_temperature(28.0)
                .with_fan(FanSpeed::Low),
            weakest_heating: AirconSettingPatch::mode(Heating)
                .with_temperature(18.0)
                .with_fan(FanSpeed::Low),
            cooling: ConditionalAirconConfig {
                activation: OutdoorActivation {
                    outdoor_temperature_diff: 2.0,
                    pmv_threshold: 0.5,
                },
                off_state: off,
            },
            heating: ConditionalAirconConfig {
                activation: OutdoorActivation {
                    outdoor_temperature_diff: 2.0,
                    pmv_threshold: -0.5,
                },
                off_state: off,
            },
            summer_condensation: CondensationConfig {
                dew_point_margin: 0.5,
                pmv_threshold: 0.5,
                cooling_stop: AirconSettingPatch::mode(Fan).with_fan(FanSpeed::Low),
                condensation_override: AirconSettingPatch::mode(Cooling)
                    .with_temperature(28.0)
                    .with_fan(FanSpeed::High),
            },
            circulation_temperature_diff: 2.0,
            min_runtime: default_min_runtime(),
        }
    }
}

impl AirconConfig {
    pub fn sanitize(&mut self) {
        self.pmv_thresholds.retain(|entry| entry.pmv.is_finite());
        self.pmv_thresholds
            .sort_by(|a, b| a.pmv.total_cmp(&b.pmv));
        self.circulation_temperature_diff = self.circulation_temperature_diff.max(0.0);
        for tracker in &mut self.min_runtime {
            if tracker.temperature_min > tracker.temperature_max {
                std::mem::swap(&mut tracker.temperature_min, &mut tracker.temperature_max);
            }
            tracker.mode = tracker.mode.base();
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SpeedThreshold {
    pub temperature_diff: f64,
    pub fan_speed: u8,
}

impl SpeedThreshold {
    pub const MAX_TEMPERATURE_DIFF: f64 = 5.0;
    pub const MAX_FAN_SPEED: u8 = 5;

    pub fn validate(&self) -> bool {
        (0.0..=Self::MAX_TEMPERATURE_DIFF).contains(&self.temperature_diff)
            && self.fan_speed <= Self::MAX_FAN_SPEED
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HeatAssistConfig {
    pub pmv_threshold: f64,
    pub fan_speed: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CirculatorConfig {
    pub enabled: bool,
    /// Outdoor temperature at or above which the hot table is used.
    pub high_temperature: f64,
    pub hot_thresholds: Vec<SpeedThreshold>,
    pub normal_thresholds: Vec<SpeedThreshold>,
    #[serde(default)]
    pub heat_assist: Option<HeatAssistConfig>,
    #[serde(default = "default_assisted_air_speed")]
    pub assisted_air_speed: f64,
}

fn default_assisted_air_speed() -> f64 {
    ASSISTED_AIR_SPEED
}

impl Default for CirculatorConfig {
    fn default() -> Self {
        let entry = |temperature_diff, fan_speed| SpeedThreshold {
            temperature_diff,
            fan_speed,
        };
        Self {
            enabled: true,
            high_temperature: 30.0,
            hot_thresholds: vec![entry(3.0, 4), entry(2.0, 3), entry(1.0, 2)],
            normal_thresholds: vec![entry(3.0, 3), entry(2.0, 2), entry(1.0, 1)],
            heat_assist: None,
            assisted_air_speed: ASSISTED_AIR_SPEED,
        }
    }
}

impl CirculatorConfig {
    pub fn sanitize(&mut self) {
        for table in [&mut self.hot_thresholds, &mut self.normal_thresholds] {
            table.retain(SpeedThreshold::validate);
            table.sort_by(|a, b| b.temperature_diff.total_cmp(&a.temperature_diff));
        }
        if let Some(assist) = self.heat_assist.as_mut() {
            assist.fan_speed = assist.fan_speed.min(SpeedThreshold::MAX_FAN_SPEED);
        }
        self.assisted_air_speed = self.assisted_air_speed.clamp(0.0, 2.0);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MetPair {
    pub awake: f32,
    pub sleeping: f32,
}

impl MetPair {
    pub fn pick(&self, sleeping: bool) -> f32 {
        if sleeping {
            self.sleeping
        } else {
            self.awake
        }
    }
}

/// MET delta applied inside an inclusive time window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MetAdjustmentPeriod {
    /// Each meal window is switched on its own.
    #[serde(default)]
    pub enabled: bool,
    pub time: TimeRange,
    pub met_adjustment: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MealTimes {
    pub lunch: MetAdjustmentPeriod,
    pub dinner: MetAdjustmentPeriod,
    pub sleep_prep: MetAdjustmentPeriod,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HighTemperatureMetClo {
    pub met: MetPair,
    pub clo: MetPair,
    pub meals: MealTimes,
}

/// Heating tariff window. Gated only by `HeatingCosts::enabled`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HeatingCostPeriod {
    pub time: TimeRange,
    pub met_adjustment: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeatingCosts {
    pub enabled: bool,
    #[serde(default)]
    pub high_costs: Vec<HeatingCostPeriod>,
    #[serde(default)]
    pub low_costs: Vec<HeatingCostPeriod>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LowTemperatureMetClo {
    pub met: MetPair,
    pub clo: MetPair,
    pub heating: HeatingCosts,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SolarHeatingReduction {
    pub enabled: bool,
    pub time: TimeRange,
    /// Percent.
    pub cloudiness_threshold: u8,
    pub met_adjustment: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetCloConfig {
    pub high_temperature: HighTemperatureMetClo,
    pub low_temperature: LowTemperatureMetClo,
    pub solar_heating_reduction: SolarHeatingReduction,
}

impl Default for MetCloConfig {
    fn default() -> Self {
        let period = |time, met_adjustment, enabled| MetAdjustmentPeriod {
            enabled,
            time,
            met_adjustment,
        };
        Self {
            high_temperature: HighTemperatureMetClo {
                met: MetPair {
                    awake: 1.1,
                    sleeping: 0.8,
                },
                clo: MetPair {
                    awake: 0.4,
                    sleeping: 0.8,
                },
                meals: MealTimes {
                    lunch: period(TimeRange::hm(12, 0, 13, 0), 0.2, true),
                    dinner: period(TimeRange::hm(18, 30, 19, 30), 0.2, true),
                    sleep_prep: period(TimeRange::hm(22, 0, 23, 0), -0.1, false),
                },
            },
            low_temperature: LowTemperatureMetClo {
                met: MetPair {
                    awake: 1.0,
                    sleeping: 0.8,
                },
                clo: MetPair {
                    awake: 1.2,
                    sleeping: 2.5,
                },
                heating: HeatingCosts {
                    enabled: false,
                    high_costs: vec![HeatingCostPeriod {
                        time: TimeRange::hm(17, 0, 21, 0),
                        met_adjustment: -0.1,
                    }],
                    low_costs: Vec::new(),
                },
            },
            solar_heating_reduction: SolarHeatingReduction {
                enabled: false,
                time: TimeRange::hm(10, 0, 14, 0),
                cloudiness_threshold: 30,
                met_adjustment: 0.1,
            },
        }
    }
}

impl MetCloConfig {
    pub fn sanitize(&mut self) {
        for pair in [
            &mut self.high_temperature.met,
            &mut self.low_temperature.met,
        ] {
            pair.awake = pair.awake.clamp(MIN_MET, MAX_MET);
            pair.sleeping = pair.sleeping.clamp(MIN_MET, MAX_MET);
        }
        self.solar_heating_reduction.cloudiness_threshold =
            self.solar_heating_reduction.cloudiness_threshold.min(100);
        self.solar_heating_reduction.met_adjustment =
            self.solar_heating_reduction.met_adjustment.clamp(0.0, 1.0);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ComfortModelConfig {
    /// Relative air speed (m/s) assumed with the circulator off.
    pub air_speed: f64,
}

impl Default for ComfortModelConfig {
    fn default() -> Self {
        Self {
            air_speed: DEFAULT_AIR_SPEED,
        }
    }
}

/// Bounded retry for device reads and the pause before each device command.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub command_pause_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 5_000,
            command_pause_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub timezone: String,
    #[serde(default)]
    pub sensors: SensorLayout,
    #[serde(default)]
    pub temperature_thresholds: TemperatureThresholds,
    #[serde(default)]
    pub environment: EnvironmentThresholds,
    #[serde(default)]
    pub co2: Co2Thresholds,
    #[serde(default)]
    pub awake: AwakePeriods,
    #[serde(default)]
    pub comfort_control: ComfortControlConfig,
    #[serde(default)]
    pub aircon: AirconConfig,
    #[serde(default)]
    pub circulator: CirculatorConfig,
    #[serde(default)]
    pub met_clo: MetCloConfig,
    #[serde(default)]
    pub thermal: SurfaceModelConfig,
    #[serde(default)]
    pub comfort: ComfortModelConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timezone: "Asia/Tokyo".to_string(),
            sensors: SensorLayout::default(),
            temperature_thresholds: TemperatureThresholds::default(),
            environment: EnvironmentThresholds::default(),
            co2: Co2Thresholds::default(),
            awake: AwakePeriods::default(),
            comfort_control: ComfortControlConfig::default(),
            aircon: AirconConfig::default(),
            circulator: CirculatorConfig::default(),
            met_clo: MetCloConfig::default(),
            thermal: SurfaceModelConfig::default(),
            comfort: ComfortModelConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.aircon.sanitize();
        self.circulator.sanitize();
        self.met_clo.sanitize();
        self.thermal.home.sanitize();
        self.comfort_control.solar_cloud_threshold =
            self.comfort_control.solar_cloud_threshold.min(100);
        self.comfort.air_speed = self.comfort.air_speed.clamp(0.0, 2.0);
        self.retry.max_attempts = self.retry.max_attempts.max(1);
    }

    /// Checks the settings every pass depends on. Run after `sanitize`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timezone.trim().is_empty() {
            return Err(ConfigError::Missing("timezone"));
        }

        let mut ids: Vec<&str> = Vec::new();
        for sensor in self.sensors.all() {
            if sensor.id.trim().is_empty() {
                return Err(ConfigError::SensorId(sensor.label.clone()));
            }
            if ids.contains(&sensor.id.as_str()) {
                return Err(ConfigError::DuplicateSensor(sensor.id.clone()));
            }
            ids.push(&sensor.id);
        }

        if self.aircon.pmv_thresholds.is_empty() {
            return Err(ConfigError::Missing("aircon.pmv_thresholds"));
        }

        if self.temperature_thresholds.low >= self.temperature_thresholds.high {
            return Err(ConfigError::Invalid {
                field: "temperature_thresholds",
                reason: format!(
                    "low ({}) must be below high ({})",
                    self.temperature_thresholds.low, self.temperature_thresholds.high
                ),
            });
        }

        if self.co2.high > self.co2.warning {
            return Err(ConfigError::Invalid {
                field: "co2",
                reason: format!(
                    "high ({}) must not exceed warning ({})",
                    self.co2.high, self.co2.warning
                ),
            });
        }

        let ranges = std::iter::once(("awake.weekday", &self.awake.weekday))
            .chain(std::iter::once(("awake.weekend", &self.awake.weekend)))
            .chain(std::iter::once((
                "comfort_control.solar_active_hours",
                &self.comfort_control.solar_active_hours,
            )));
        for (field, range) in ranges {
            if !range.validate() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!(
                        "invalid time range {}-{}",
                        range.start_minutes, range.end_minutes
                    ),
                });
            }
        }

        if self
            .comfort_control
            .disabled_periods
            .iter()
            .flat_map(|period| period.times.iter())
            .any(|range| !range.validate())
        {
            return Err(ConfigError::Invalid {
                field: "comfort_control.disabled_periods",
                reason: "contains an invalid time range".to_string(),
            });
        }

        if self.circulator.enabled
            && self.circulator.hot_thresholds.is_empty()
            && self.circulator.normal_thresholds.is_empty()
        {
            return Err(ConfigError::Missing("circulator thresholds"));
        }

        Ok(())
    }
}
