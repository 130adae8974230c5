//! One control pass: read, compute, decide, apply, persist.
//!
//! The pass is synchronous and runs to completion. Sensor and aircon failures end
//! it with [`CycleError`]; forecast and store failures are logged, counted and
//! worked around.

use chrono::{DateTime, FixedOffset};
use tracing::{info, warn};

use crate::{
    boundary::{
        AirQualitySource, AirconDevice, AirconPath, AppliedAirconSetting, DeviceResult,
        SettingStore, SmartHomeDevice, WeatherSource,
    },
    circulator::{choose_target, heat_assist_speed, set_circulator, CirculatorInput},
    comfort::ThermalComfortCalculator,
    comfort_factors::ComfortFactorCalculator,
    config::{RuntimeConfig, SensorLayout},
    decision::{AirconDecisionEngine, Decision, DecisionInput},
    error::CycleError,
    forecast::{closest_future_forecast, daily_max_temperature, EffectiveOutdoorTemperature},
    intensity::{yesterday_start, IntensityScores},
    sensor::SensorSet,
    transition::{AirconTransitionStateMachine, MinRuntimeStore, Transition},
    types::{AirconSetting, CirculatorSetting, ComfortFactors, PmvResult},
};

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub sensors: SensorSet,
    pub outdoor: EffectiveOutdoorTemperature,
    pub sleeping: bool,
    pub factors: ComfortFactors,
    pub pmv: PmvResult,
    pub decision: Decision,
    pub transition: Transition,
    pub circulator: Option<CirculatorSetting>,
    pub intensity: IntensityScores,
    /// Forecast and store failures the pass worked around.
    pub degradations: u32,
}

impl CycleReport {
    pub fn applied(&self) -> &AirconSetting {
        &self.transition.setting
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!(
                "PMV {:.2} / PPD {:.1}% (met {:.2}, clo {:.2})",
                self.pmv.pmv, self.pmv.ppd, self.factors.met, self.factors.clo
            ),
            format!(
                "indoor {:.1}C {:.0}% / outdoor {:.1}C ({})",
                self.sensors.average_indoor_temperature(),
                self.sensors.average_indoor_humidity(),
                self.outdoor.temperature,
                self.outdoor.source.as_str()
            ),
            format!("aircon {}", self.applied().summary()),
        ];
        if let Some(circulator) = self.circulator {
            lines.push(format!(
                "circulator {} speed {}",
                circulator.power.as_str(),
                circulator.fan_speed
            ));
        }
        lines.push(format!(
            "intensity today {} / yesterday {}",
            self.intensity.today, self.intensity.yesterday
        ));
        if self.degradations > 0 {
            lines.push(format!("{} degraded step(s)", self.degradations));
        }
        lines.join("\n")
    }
}

pub fn read_sensors(
    source: &mut dyn AirQualitySource,
    layout: &SensorLayout,
) -> DeviceResult<SensorSet> {
    let mut sensors = SensorSet::new(source.read_air_quality(&layout.main)?);
    if let Some(sub) = &layout.sub {
        sensors.sub = Some(source.read_air_quality(sub)?);
    }
    for supplementary in &layout.supplementaries {
        sensors
            .supplementaries
            .push(source.read_air_quality(supplementary)?);
    }
    if let Some(outdoor) = &layout.outdoor {
        sensors.outdoor = Some(source.read_air_quality(outdoor)?);
    }
    Ok(sensors)
}

/// Sends through the path the mode needs, retrying a failed primary send once via the support device.
pub fn send_aircon(device: &mut dyn AirconDevice, setting: &AirconSetting) -> DeviceResult<AirconPath> {
    let path = AirconPath::for_mode(setting.mode);
    match device.send_aircon(setting, path) {
        Ok(()) => Ok(path),
        Err(err) if path == AirconPath::Primary => {
            warn!("aircon command failed, retrying via support device: {err}");
            device.send_aircon(setting, AirconPath::Support)?;
            Ok(AirconPath::Support)
        }
        Err(err) => Err(err),
    }
}

pub struct ComfortCycle<'a, D, W, S> {
    config: &'a RuntimeConfig,
    devices: &'a mut D,
    weather: &'a mut W,
    store: &'a mut S,
    degradations: u32,
}

impl<'a, D, W, S> ComfortCycle<'a, D, W, S>
where
    D: SmartHomeDevice,
    W: WeatherSource,
    S: SettingStore + MinRuntimeStore,
{
    pub fn new(config: &'a RuntimeConfig, devices: &'a mut D, weather: &'a mut W, store: &'a mut S) -> Self {
        Self {
            config,
            devices,
            weather,
            store,
            degradations: 0,
        }
    }

    fn degrade(&mut self, what: &str, err: &dyn std::fmt::Display) {
        warn!("{what} failed, continuing: {err}");
        self.degradations += 1;
    }

    pub fn run(mut self, now: DateTime<FixedOffset>) -> Result<CycleReport, CycleError> {
        let config = self.config;

        let forecasts = match self.weather.forecast(now.date_naive()) {
            Ok(forecasts) => forecasts,
            Err(err) => {
                self.degrade("forecast", &err);
                Vec::new()
            }
        };
        let forecast_max = daily_max_temperature(&forecasts, now.date_naive());
        let closest_forecast = closest_future_forecast(&forecasts, now);

        let sensors = read_sensors(&mut *self.devices, &config.sensors)?;
        let outdoor = EffectiveOutdoorTemperature::resolve(&sensors, forecast_max);
        let sleeping = config.awake.is_sleeping(now);
        info!(
            "outdoor {:.1}C from {}, sleeping: {sleeping}",
            outdoor.temperature,
            outdoor.source.as_str()
        );

        let factors = ComfortFactorCalculator::new(&config.met_clo, &config.temperature_thresholds)
            .calculate(outdoor.temperature, sleeping, now, closest_forecast);

        let calculator = ThermalComfortCalculator::new(&config.thermal);
        let mut pmv = calculator.calculate(
            &sensors,
            outdoor.temperature,
            &factors,
            config.comfort.air_speed,
            now,
        );
        let heat_assist = if config.circulator.enabled && !sleeping {
            heat_assist_speed(
                &config.circulator,
                &config.environment,
                outdoor.temperature,
                pmv.pmv,
                sensors.average_indoor_absolute_humidity(),
            )
        } else {
            None
        };
        if heat_assist.is_some() {
            pmv = calculator.calculate(
                &sensors,
                outdoor.temperature,
                &factors,
                config.circulator.assisted_air_speed,
                now,
            );
            info!("circulator assist on, pmv recomputed: {:.2}", pmv.pmv);
        }
        info!("pmv {:.2}, ppd {:.1}%", pmv.pmv, pmv.ppd);

        let decision = AirconDecisionEngine::new(config).decide(&DecisionInput {
            pmv: &pmv,
            sensors: &sensors,
            closest_forecast,
            sleeping,
            now,
        });

        let previous = match self.store.load_last_aircon() {
            Ok(previous) => previous,
            Err(err) => {
                self.degrade("loading last aircon setting", &err);
                None
            }
        };
        if let Some(previous) = &previous {
            let elapsed = (now.timestamp() - previous.applied_at).max(0);
            info!(
                "last aircon change {}h {}m ago: {}",
                elapsed / 3600,
                elapsed % 3600 / 60,
                previous.setting.summary()
            );
        }

        let transition = AirconTransitionStateMachine::new(&config.aircon).evaluate(
            decision.setting,
            previous.as_ref().map(|previous| &previous.setting),
            outdoor.temperature,
            now,
            &mut *self.store,
        );
        if transition.degraded {
            self.degradations += 1;
        }
        info!("{:?}: {}", transition.kind, transition.setting.summary());

        send_aircon(&mut *self.devices, &transition.setting)?;

        let applied = AppliedAirconSetting {
            setting: transition.setting,
            applied_at: now.timestamp(),
        };
        if let Err(err) = self.store.save_aircon(&applied) {
            self.degrade("saving aircon setting", &err);
        }
        if transition.restart_dwell {
            if let Err(err) =
                self.store
                    .restart_dwell(transition.setting.mode, outdoor.temperature, now)
            {
                self.degrade("restarting min runtime", &err);
            }
        }

        let circulator = if config.circulator.enabled {
            Some(self.drive_circulator(&sensors, outdoor.temperature, sleeping, heat_assist)?)
        } else {
            None
        };

        let intensity = match self.store.aircon_history(yesterday_start(now)) {
            Ok(history) => IntensityScores::from_history(&history, now),
            Err(err) => {
                self.degrade("loading aircon history", &err);
                IntensityScores::default()
            }
        };
        info!(
            "aircon intensity today {}, yesterday {}",
            intensity.today, intensity.yesterday
        );

        Ok(CycleReport {
            sensors,
            outdoor,
            sleeping,
            factors,
            pmv,
            decision,
            transition,
            circulator,
            intensity,
            degradations: self.degradations,
        })
    }

    fn drive_circulator(
        &mut self,
        sensors: &SensorSet,
        outdoor: f64,
        sleeping: bool,
        heat_assist: Option<u8>,
    ) -> Result<CirculatorSetting, CycleError> {
        let current = match self.store.load_last_circulator() {
            Ok(current) => current.unwrap_or_default(),
            Err(err) => {
                self.degrade("loading circulator setting", &err);
                CirculatorSetting::default()
            }
        };

        let input = CirculatorInput {
            sleeping,
            heat_assist,
            outdoor,
            sub_main_diff: sensors
                .sub
                .map(|sub| sub.temperature - sensors.main.temperature),
        };
        let Some(target) = choose_target(&self.config.circulator, &input) else {
            info!("circulator kept at {current:?}");
            return Ok(current);
        };

        let reached = set_circulator(current, target, &mut *self.devices)?;
        if reached != current {
            if let Err(err) = self.store.save_circulator(&reached) {
                self.degrade("saving circulator setting", &err);
            }
        }
        Ok(reached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        boundary::{CirculatorDevice, CommandAck},
        circulator::CirculatorAction,
        config::{HeatAssistConfig, PmvThreshold},
        error::{DeviceCommandError, ForecastError, PersistenceError},
        forecast::HourlyForecast,
        sensor::{Reading, SensorSpec},
        transition::{MinRuntimeTable, MinRuntimeTracker},
        types::{AirconMode, AirconSettingPatch, FanSpeed, PowerState, StepDirection},
    };
    use chrono::{Duration, NaiveDate, TimeZone};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    // Jul 20, 2026 is a Monday.
    fn fixed_time(hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 7, 20, hour, minute, 0)
            .unwrap()
    }

    #[derive(Default)]
    struct FakeHome {
        readings: HashMap<String, Reading>,
        aircon_calls: Vec<(AirconSetting, AirconPath)>,
        failing_paths: Vec<AirconPath>,
        circulator_calls: Vec<CirculatorAction>,
    }

    impl FakeHome {
        fn hot_afternoon() -> Self {
            let mut readings = HashMap::new();
            readings.insert("main".to_string(), Reading::new(29.0, 55.0).with_co2(800));
            readings.insert("sub".to_string(), Reading::new(31.0, 50.0));
            readings.insert("outdoor".to_string(), Reading::new(34.0, 50.0));
            Self {
                readings,
                ..Self::default()
            }
        }
    }

    impl AirQualitySource for FakeHome {
        fn read_air_quality(&mut self, sensor: &SensorSpec) -> DeviceResult<Reading> {
            self.readings
                .get(&sensor.id)
                .copied()
                .ok_or_else(|| DeviceCommandError::new(sensor.label.clone(), "status", "no response"))
        }
    }

    impl AirconDevice for FakeHome {
        fn send_aircon(&mut self, setting: &AirconSetting, path: AirconPath) -> DeviceResult<()> {
            self.aircon_calls.push((*setting, path));
            if self.failing_paths.contains(&path) {
                return Err(DeviceCommandError::new("aircon", "setAll", "statusCode 161"));
            }
            Ok(())
        }
    }

    impl CirculatorDevice for FakeHome {
        fn set_power(&mut self, power: PowerState) -> DeviceResult<CommandAck> {
            self.circulator_calls.push(match power {
                PowerState::On => CirculatorAction::PowerOn,
                PowerState::Off => CirculatorAction::PowerOff,
            });
            Ok(CommandAck::ACCEPTED)
        }

        fn step(&mut self, direction: StepDirection) -> DeviceResult<CommandAck> {
            self.circulator_calls.push(match direction {
                StepDirection::Up => CirculatorAction::StepUp,
                StepDirection::Down => CirculatorAction::StepDown,
            });
            Ok(CommandAck::ACCEPTED)
        }
    }

    struct FakeWeather(Result<Vec<HourlyForecast>, ForecastError>);

    impl WeatherSource for FakeWeather {
        fn forecast(&mut self, _date: NaiveDate) -> Result<Vec<HourlyForecast>, ForecastError> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        history: Vec<AppliedAirconSetting>,
        circulator: Option<CirculatorSetting>,
        runtime: MinRuntimeTable,
        broken: bool,
    }

    impl MemoryStore {
        fn check(&self, operation: &'static str) -> Result<(), PersistenceError> {
            if self.broken {
                Err(PersistenceError::new(operation, "database is locked"))
            } else {
                Ok(())
            }
        }
    }

    impl SettingStore for MemoryStore {
        fn load_last_aircon(&mut self) -> Result<Option<AppliedAirconSetting>, PersistenceError> {
            self.check("read")?;
            Ok(self.history.last().copied())
        }

        fn save_aircon(&mut self, applied: &AppliedAirconSetting) -> Result<(), PersistenceError> {
            self.check("write")?;
            self.history.push(*applied);
            Ok(())
        }

        fn aircon_history(&mut self, since: i64) -> Result<Vec<AppliedAirconSetting>, PersistenceError> {
            self.check("read")?;
            let first = self
                .history
                .iter()
                .rposition(|entry| entry.applied_at <= since)
                .unwrap_or(0);
            Ok(self.history[first..].to_vec())
        }

        fn load_last_circulator(&mut self) -> Result<Option<CirculatorSetting>, PersistenceError> {
            self.check("read")?;
            Ok(self.circulator)
        }

        fn save_circulator(&mut self, setting: &CirculatorSetting) -> Result<(), PersistenceError> {
            self.check("write")?;
            self.circulator = Some(*setting);
            Ok(())
        }
    }

    impl MinRuntimeStore for MemoryStore {
        fn find_band(
            &mut self,
            mode: AirconMode,
            temperature: f64,
        ) -> Result<Option<MinRuntimeTracker>, PersistenceError> {
            self.check("read")?;
            self.runtime.find_band(mode, temperature)
        }

        fn restart_dwell(
            &mut self,
            mode: AirconMode,
            temperature: f64,
            now: DateTime<FixedOffset>,
        ) -> Result<(), PersistenceError> {
            self.check("write")?;
            self.runtime.restart_dwell(mode, temperature, now)
        }
    }

    fn config_always(setting: AirconSettingPatch) -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.aircon.pmv_thresholds = vec![PmvThreshold { pmv: 3.0, setting }];
        config
    }

    fn cooling_26() -> AirconSettingPatch {
        AirconSettingPatch::mode(AirconMode::Cooling)
            .with_temperature(26.0)
            .with_fan(FanSpeed::Auto)
    }

    fn store_with_runtime(config: &RuntimeConfig) -> MemoryStore {
        MemoryStore {
            runtime: MinRuntimeTable::new(config.aircon.min_runtime.clone()),
            ..MemoryStore::default()
        }
    }

    #[test]
    fn hot_afternoon_cools_and_starts_circulator() {
        let config = config_always(cooling_26());
        let mut home = FakeHome::hot_afternoon();
        let mut weather = FakeWeather(Ok(Vec::new()));
        let mut store = store_with_runtime(&config);
        let now = fixed_time(14, 0);

        let report = ComfortCycle::new(&config, &mut home, &mut weather, &mut store)
            .run(now)
            .unwrap();

        assert_eq!(report.outdoor.temperature, 34.0);
        assert!(!report.sleeping);
        assert!(report.pmv.pmv > 0.0);
        assert_eq!(report.applied().mode, AirconMode::Cooling);
        assert_eq!(report.degradations, 0);
        assert_eq!(home.aircon_calls.len(), 1);
        assert_eq!(home.aircon_calls[0].1, AirconPath::Primary);

        // Hot table, sub − main = 2.0 -> speed 3.
        assert_eq!(
            home.circulator_calls,
            vec![
                CirculatorAction::PowerOn,
                CirculatorAction::StepUp,
                CirculatorAction::StepUp,
                CirculatorAction::StepUp,
            ]
        );
        assert_eq!(store.circulator, Some(CirculatorSetting::on(3)));
        assert_eq!(store.history.len(), 1);
        assert_eq!(store.runtime.trackers[0].start_time, Some(now.timestamp()));
    }

    #[test]
    fn heat_assist_recomputes_pmv_at_assisted_speed() {
        let mut config = config_always(cooling_26());
        config.circulator.heat_assist = Some(HeatAssistConfig {
            pmv_threshold: -3.0,
            fan_speed: 4,
        });
        let mut home = FakeHome::hot_afternoon();
        home.readings.insert("main".to_string(), Reading::new(27.0, 55.0).with_co2(800));
        home.readings.insert("sub".to_string(), Reading::new(28.0, 50.0));
        home.readings.insert("outdoor".to_string(), Reading::new(33.0, 50.0));
        let mut weather = FakeWeather(Ok(Vec::new()));
        let mut store = store_with_runtime(&config);
        let now = fixed_time(14, 0);

        let report = ComfortCycle::new(&config, &mut home, &mut weather, &mut store)
            .run(now)
            .unwrap();

        let calculator = ThermalComfortCalculator::new(&config.thermal);
        let at_speed = |air_speed| {
            calculator.calculate(
                &report.sensors,
                report.outdoor.temperature,
                &report.factors,
                air_speed,
                now,
            )
        };
        let assisted = at_speed(config.circulator.assisted_air_speed);
        let still = at_speed(config.comfort.air_speed);

        assert_eq!(report.pmv, assisted);
        assert!(assisted.pmv < still.pmv);
        assert_eq!(report.circulator, Some(CirculatorSetting::on(4)));
        assert_eq!(
            home.circulator_calls,
            vec![
                CirculatorAction::PowerOn,
                CirculatorAction::StepUp,
                CirculatorAction::StepUp,
                CirculatorAction::StepUp,
                CirculatorAction::StepUp,
            ]
        );
    }

    #[test]
    fn failed_primary_send_retries_via_support() {
        let config = config_always(cooling_26());
        let mut home = FakeHome {
            failing_paths: vec![AirconPath::Primary],
            ..FakeHome::hot_afternoon()
        };
        let mut weather = FakeWeather(Ok(Vec::new()));
        let mut store = store_with_runtime(&config);

        ComfortCycle::new(&config, &mut home, &mut weather, &mut store)
            .run(fixed_time(14, 0))
            .unwrap();

        let paths: Vec<AirconPath> = home.aircon_calls.iter().map(|(_, path)| *path).collect();
        assert_eq!(paths, vec![AirconPath::Primary, AirconPath::Support]);
    }

    #[test]
    fn support_failure_ends_the_cycle() {
        let config = config_always(cooling_26());
        let mut home = FakeHome {
            failing_paths: vec![AirconPath::Primary, AirconPath::Support],
            ..FakeHome::hot_afternoon()
        };
        let mut weather = FakeWeather(Ok(Vec::new()));
        let mut store = store_with_runtime(&config);

        let err = ComfortCycle::new(&config, &mut home, &mut weather, &mut store)
            .run(fixed_time(14, 0))
            .unwrap_err();

        assert!(matches!(err, CycleError::Device(_)));
        assert!(store.history.is_empty());
        assert!(home.circulator_calls.is_empty());
    }

    #[test]
    fn sensor_failure_is_fatal_before_any_command() {
        let config = RuntimeConfig::default();
        let mut home = FakeHome::hot_afternoon();
        home.readings.remove("sub");
        let mut weather = FakeWeather(Ok(Vec::new()));
        let mut store = store_with_runtime(&config);

        let err = ComfortCycle::new(&config, &mut home, &mut weather, &mut store)
            .run(fixed_time(14, 0))
            .unwrap_err();

        assert!(matches!(err, CycleError::Device(ref device) if device.target == "寝室"));
        assert!(home.aircon_calls.is_empty());
    }

    #[test]
    fn broken_store_and_forecast_degrade_but_still_apply() {
        let config = config_always(cooling_26());
        let mut home = FakeHome::hot_afternoon();
        let mut weather = FakeWeather(Err(ForecastError("401 Unauthorized".to_string())));
        let mut store = MemoryStore {
            broken: true,
            ..store_with_runtime(&config)
        };

        let report = ComfortCycle::new(&config, &mut home, &mut weather, &mut store)
            .run(fixed_time(14, 0))
            .unwrap();

        assert_eq!(home.aircon_calls.len(), 1);
        assert_eq!(report.applied().mode, AirconMode::Cooling);
        // forecast, last setting, save, dwell restart, circulator load, circulator save, history
        assert_eq!(report.degradations, 7);
    }

    #[test]
    fn mode_change_inside_dwell_window_falls_back_to_weakest_cooling() {
        let config = config_always(AirconSettingPatch::mode(AirconMode::Fan).with_fan(FanSpeed::Auto));
        let mut home = FakeHome::hot_afternoon();
        let mut weather = FakeWeather(Ok(Vec::new()));
        let mut store = store_with_runtime(&config);
        let now = fixed_time(14, 0);
        let earlier = now - Duration::minutes(10);
        store.history.push(AppliedAirconSetting {
            setting: cooling_26().resolve(),
            applied_at: earlier.timestamp(),
        });
        store
            .runtime
            .restart_dwell(AirconMode::Cooling, 34.0, earlier)
            .unwrap();

        let report = ComfortCycle::new(&config, &mut home, &mut weather, &mut store)
            .run(now)
            .unwrap();

        assert!(!report.decision.setting.mode.is_cooling());
        assert_eq!(report.applied().mode, AirconMode::Cooling);
        assert_eq!(report.applied().temperature, 28.0);
        assert_eq!(home.aircon_calls[0].0, *report.applied());
        assert!(report.intensity.today > 0);
    }

    #[test]
    fn sleeping_turns_circulator_off() {
        let config = config_always(cooling_26());
        let mut home = FakeHome::hot_afternoon();
        let mut weather = FakeWeather(Ok(Vec::new()));
        let mut store = MemoryStore {
            circulator: Some(CirculatorSetting::on(2)),
            ..store_with_runtime(&config)
        };

        let report = ComfortCycle::new(&config, &mut home, &mut weather, &mut store)
            .run(fixed_time(2, 0))
            .unwrap();

        assert!(report.sleeping);
        assert_eq!(report.circulator, Some(CirculatorSetting::default()));
        assert_eq!(
            home.circulator_calls,
            vec![
                CirculatorAction::StepDown,
                CirculatorAction::StepDown,
                CirculatorAction::PowerOff,
            ]
        );
    }

    #[test]
    fn summary_mentions_applied_setting() {
        let config = config_always(cooling_26());
        let mut home = FakeHome::hot_afternoon();
        let mut weather = FakeWeather(Ok(Vec::new()));
        let mut store = store_with_runtime(&config);

        let report = ComfortCycle::new(&config, &mut home, &mut weather, &mut store)
            .run(fixed_time(14, 0))
            .unwrap();

        let summary = report.summary();
        assert!(summary.contains("aircon COOLING 26.0C"));
        assert!(summary.contains("circulator ON speed 3"));
    }
}
