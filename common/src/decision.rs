use chrono::{DateTime, FixedOffset};
use tracing::{debug, info};

use crate::{
    config::{ConditionalAirconConfig, RuntimeConfig},
    forecast::{is_clear, HourlyForecast},
    schedule::is_within_disabled_period,
    sensor::SensorSet,
    types::{AirconSetting, AirconSettingPatch, FanSpeed, PmvResult},
};

/// Overrides applied after the PMV threshold pass, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionRule {
    OutdoorCutoff,
    ComfortControlWindow,
    Humidity,
    Co2,
    Circulation,
    DewPoint,
}

impl DecisionRule {
    pub const ORDER: [DecisionRule; 6] = [
        DecisionRule::OutdoorCutoff,
        DecisionRule::ComfortControlWindow,
        DecisionRule::Humidity,
        DecisionRule::Co2,
        DecisionRule::Circulation,
        DecisionRule::DewPoint,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OutdoorCutoff => "outdoor_cutoff",
            Self::ComfortControlWindow => "comfort_control_window",
            Self::Humidity => "humidity",
            Self::Co2 => "co2",
            Self::Circulation => "circulation",
            Self::DewPoint => "dew_point",
        }
    }

    /// Rules skipped while comfort control is fully blacked out.
    fn is_environmental(self) -> bool {
        matches!(self, Self::Humidity | Self::Co2 | Self::Circulation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleOutcome {
    Idle,
    Fired,
    Blackout,
}

#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub pmv: &'a PmvResult,
    pub sensors: &'a SensorSet,
    pub closest_forecast: Option<&'a HourlyForecast>,
    pub sleeping: bool,
    pub now: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub setting: AirconSetting,
    pub fired: Vec<DecisionRule>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Draft {
    patch: AirconSettingPatch,
    force_fan_below_dew_point: bool,
}

impl Draft {
    fn is_cooling(&self) -> bool {
        self.patch.mode.is_some_and(|mode| mode.is_cooling())
    }

    fn is_heating(&self) -> bool {
        self.patch.mode.is_some_and(|mode| mode.is_heating())
    }

    fn escalate_fan(&mut self, requested: FanSpeed) {
        let current = self.patch.fan_speed.unwrap_or(FanSpeed::Auto);
        self.patch.fan_speed = Some(current.escalate(requested));
    }
}

pub struct AirconDecisionEngine<'a> {
    config: &'a RuntimeConfig,
}

impl<'a> AirconDecisionEngine<'a> {
    pub fn new(config: &'a RuntimeConfig) -> Self {
        Self { config }
    }

    pub fn decide(&self, input: &DecisionInput<'_>) -> Decision {
        let mut draft = Draft::default();
        draft.patch.fill(&self.threshold_setting(input.pmv.pmv));
        debug!("threshold pass for pmv {:.2}: {:?}", input.pmv.pmv, draft.patch);

        let mut fired = Vec::new();
        let mut blackout = false;
        for rule in DecisionRule::ORDER {
            if blackout && rule.is_environmental() {
                continue;
            }
            match self.apply(rule, &mut draft, input) {
                RuleOutcome::Idle => {}
                RuleOutcome::Fired => fired.push(rule),
                RuleOutcome::Blackout => {
                    fired.push(rule);
                    blackout = true;
                }
            }
        }

        let mut setting = draft.patch.resolve();
        setting.force_fan_below_dew_point = draft.force_fan_below_dew_point;
        info!("aircon candidate: {}", setting.summary());

        Decision { setting, fired }
    }

    /// First entry whose bound is at or above `pmv`; the last entry otherwise.
    pub fn threshold_setting(&self, pmv: f64) -> AirconSettingPatch {
        let thresholds = &self.config.aircon.pmv_thresholds;
        thresholds
            .iter()
            .find(|entry| pmv <= entry.pmv)
            .or_else(|| thresholds.last())
            .map(|entry| entry.setting)
            .unwrap_or_default()
    }

    fn apply(&self, rule: DecisionRule, draft: &mut Draft, input: &DecisionInput<'_>) -> RuleOutcome {
        match rule {
            DecisionRule::OutdoorCutoff => self.outdoor_cutoff(draft, input),
            DecisionRule::ComfortControlWindow => self.comfort_control_window(draft, input),
            DecisionRule::Humidity => self.humidity(draft, input),
            DecisionRule::Co2 => self.co2(draft, input),
            DecisionRule::Circulation => self.circulation(draft, input),
            DecisionRule::DewPoint => self.dew_point(draft, input),
        }
    }

    fn outdoor_cutoff(&self, draft: &mut Draft, input: &DecisionInput<'_>) -> RuleOutcome {
        let Some(outdoor) = input.sensors.outdoor_temperature() else {
            return RuleOutcome::Idle;
        };
        let mrt = input.pmv.mean_radiant_temp;
        let pmv = input.pmv.pmv;
        let thresholds = &self.config.temperature_thresholds;
        let aircon = &self.config.aircon;

        if draft.is_cooling() && should_stop_cooling(&aircon.cooling, mrt, pmv, outdoor, thresholds.low) {
            info!("outdoor air {outdoor:.1}C will cool the room, stopping cooling");
            draft.patch.overlay(&aircon.cooling.off_state);
            return RuleOutcome::Fired;
        }

        if draft.is_heating() && should_stop_heating(&aircon.heating, mrt, pmv, outdoor, thresholds.high) {
            info!("outdoor air {outdoor:.1}C will warm the room, stopping heating");
            draft.patch.overlay(&aircon.heating.off_state);
            return RuleOutcome::Fired;
        }

        RuleOutcome::Idle
    }

    fn comfort_control_window(&self, draft: &mut Draft, input: &DecisionInput<'_>) -> RuleOutcome {
        let control = &self.config.comfort_control;
        if !is_within_disabled_period(&control.disabled_periods, input.now) {
            return RuleOutcome::Idle;
        }
        let off_state = &self.config.aircon.cooling.off_state;

        if control.environment_control_enabled {
            info!("comfort control disabled, humidity and co2 control remain active");
            if draft.is_cooling() || draft.is_heating() {
                draft.patch.overlay(off_state);
                return RuleOutcome::Fired;
            }
            return RuleOutcome::Idle;
        }

        if self.solar_override_available(input) {
            info!("comfort control disabled but solar power is available, keeping setting");
            return RuleOutcome::Idle;
        }

        info!("comfort control disabled, switching aircon off");
        draft.patch.overlay(off_state);
        RuleOutcome::Blackout
    }

    fn solar_override_available(&self, input: &DecisionInput<'_>) -> bool {
        let control = &self.config.comfort_control;
        control.solar_panel_enabled
            && control.solar_active_hours.contains_time(input.now)
            && is_clear(input.closest_forecast, control.solar_cloud_threshold)
    }

    fn humidity(&self, draft: &mut Draft, input: &DecisionInput<'_>) -> RuleOutcome {
        if draft.is_cooling() {
            return RuleOutcome::Idle;
        }
        let threshold = self.config.environment.dehumidification_threshold;
        let absolute_humidity = input.sensors.average_indoor_absolute_humidity();
        if absolute_humidity <= threshold {
            return RuleOutcome::Idle;
        }
        info!("absolute humidity {absolute_humidity:.1} g/m3 above {threshold}, dehumidifying");
        draft.patch.overlay(&self.config.aircon.dehumidification);
        RuleOutcome::Fired
    }

    fn co2(&self, draft: &mut Draft, input: &DecisionInput<'_>) -> RuleOutcome {
        let Some(level) = input.sensors.co2_level() else {
            return RuleOutcome::Idle;
        };
        let thresholds = &self.config.co2;
        let requested = if level > thresholds.warning {
            FanSpeed::High
        } else if level > thresholds.high {
            FanSpeed::Medium
        } else {
            return RuleOutcome::Idle;
        };
        info!("co2 at {level} ppm, fan at least {}", requested.as_str());
        draft.escalate_fan(requested);
        RuleOutcome::Fired
    }

    fn circulation(&self, draft: &mut Draft, input: &DecisionInput<'_>) -> RuleOutcome {
        if input.sleeping {
            return RuleOutcome::Idle;
        }
        let diff = input.sensors.max_indoor_temperature_diff();
        let threshold = self.config.aircon.circulation_temperature_diff;
        if diff <= threshold {
            return RuleOutcome::Idle;
        }
        info!("room temperature spread {diff:.1}C above {threshold}C, fan HIGH");
        draft.escalate_fan(FanSpeed::High);
        RuleOutcome::Fired
    }

    fn dew_point(&self, draft: &mut Draft, input: &DecisionInput<'_>) -> RuleOutcome {
        let condensation = &self.config.aircon.summer_condensation;
        let indoor = input.sensors.main.temperature;
        let dew_point = input.sensors.indoor_dew_point();
        if indoor >= dew_point - condensation.dew_point_margin {
            return RuleOutcome::Idle;
        }

        if input.pmv.pmv > condensation.pmv_threshold {
            info!(
                "indoor {indoor:.1}C below dew point {dew_point:.1}C with pmv {:.2}, keep cooling gently",
                input.pmv.pmv
            );
            draft.patch.overlay(&condensation.condensation_override);
        } else {
            info!("indoor {indoor:.1}C below dew point {dew_point:.1}C, stopping cooling");
            draft.patch.overlay(&condensation.cooling_stop);
        }
        draft.force_fan_below_dew_point = true;
        RuleOutcome::Fired
    }
}

fn should_stop_cooling(
    cooling: &ConditionalAirconConfig,
    mean_radiant: f64,
    pmv: f64,
    outdoor: f64,
    low_threshold: f64,
) -> bool {
    let activation = &cooling.activation;
    (mean_radiant - activation.outdoor_temperature_diff > outdoor && pmv < activation.pmv_threshold)
        || outdoor < low_threshold
}

fn should_stop_heating(
    heating: &ConditionalAirconConfig,
    mean_radiant: f64,
    pmv: f64,
    outdoor: f64,
    high_threshold: f64,
) -> bool {
    let activation = &heating.activation;
    (mean_radiant - activation.outdoor_temperature_diff < outdoor && pmv > activation.pmv_threshold)
        || outdoor > high_threshold
}
