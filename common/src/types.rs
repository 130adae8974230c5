use serde::{Deserialize, Serialize};

pub const MIN_SETTING_TEMP_C: f32 = 18.0;
pub const MAX_SETTING_TEMP_C: f32 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AirconMode {
    Auto,
    Cooling,
    Fan,
    Dry,
    Heating,
    PowerfulCooling,
    PowerfulHeating,
}

impl AirconMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Cooling => "COOLING",
            Self::Fan => "FAN",
            Self::Dry => "DRY",
            Self::Heating => "HEATING",
            Self::PowerfulCooling => "POWERFUL_COOLING",
            Self::PowerfulHeating => "POWERFUL_HEATING",
        }
    }

    pub fn is_cooling(self) -> bool {
        matches!(self, Self::Cooling | Self::PowerfulCooling)
    }

    pub fn is_heating(self) -> bool {
        matches!(self, Self::Heating | Self::PowerfulHeating)
    }

    pub fn is_powerful(self) -> bool {
        matches!(self, Self::PowerfulCooling | Self::PowerfulHeating)
    }

    /// Powerful variants share the runtime band of their base mode.
    pub fn base(self) -> Self {
        match self {
            Self::PowerfulCooling => Self::Cooling,
            Self::PowerfulHeating => Self::Heating,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FanSpeed {
    Auto,
    Low,
    Medium,
    High,
}

impl FanSpeed {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Auto => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    /// Returns the stronger of the two speeds; never lowers `self`.
    pub fn escalate(self, requested: FanSpeed) -> FanSpeed {
        if requested.rank() > self.rank() {
            requested
        } else {
            self
        }
    }

    pub fn is_strong(self) -> bool {
        matches!(self, Self::Medium | Self::High)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AirconSetting {
    pub temperature: f32,
    pub mode: AirconMode,
    pub fan_speed: FanSpeed,
    pub power: PowerState,
    #[serde(default)]
    pub force_fan_below_dew_point: bool,
}

impl Default for AirconSetting {
    fn default() -> Self {
        Self {
            temperature: 20.0,
            mode: AirconMode::Fan,
            fan_speed: FanSpeed::Auto,
            power: PowerState::On,
            force_fan_below_dew_point: false,
        }
    }
}

impl AirconSetting {
    /// Replaces every field the patch carries.
    pub fn apply(&mut self, patch: &AirconSettingPatch) {
        if let Some(temperature) = patch.temperature {
            self.temperature = clamp_setting_temperature(temperature);
        }
        if let Some(mode) = patch.mode {
            self.mode = mode;
        }
        if let Some(fan_speed) = patch.fan_speed {
            self.fan_speed = fan_speed;
        }
        if let Some(power) = patch.power {
            self.power = power;
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} {:.1}C fan={} power={}{}",
            self.mode.as_str(),
            self.temperature,
            self.fan_speed.as_str(),
            self.power.as_str(),
            if self.force_fan_below_dew_point {
                " (dew point)"
            } else {
                ""
            }
        )
    }
}

pub fn clamp_setting_temperature(temperature: f32) -> f32 {
    temperature.clamp(MIN_SETTING_TEMP_C, MAX_SETTING_TEMP_C)
}

/// Partial aircon setting used by configuration tables and decision rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirconSettingPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<AirconMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_speed: Option<FanSpeed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<PowerState>,
}

impl AirconSettingPatch {
    pub fn mode(mode: AirconMode) -> Self {
        Self {
            mode: Some(mode),
            ..Self::default()
        }
    }

    pub fn fan(fan_speed: FanSpeed) -> Self {
        Self {
            fan_speed: Some(fan_speed),
            ..Self::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_fan(mut self, fan_speed: FanSpeed) -> Self {
        self.fan_speed = Some(fan_speed);
        self
    }

    pub fn with_power(mut self, power: PowerState) -> Self {
        self.power = Some(power);
        self
    }

    /// Fields present in `other` win.
    pub fn overlay(&mut self, other: &AirconSettingPatch) {
        if other.temperature.is_some() {
            self.temperature = other.temperature;
        }
        if other.mode.is_some() {
            self.mode = other.mode;
        }
        if other.fan_speed.is_some() {
            self.fan_speed = other.fan_speed;
        }
        if other.power.is_some() {
            self.power = other.power;
        }
    }

    /// Only fields still unset here are taken from `other`.
    pub fn fill(&mut self, other: &AirconSettingPatch) {
        self.temperature = self.temperature.or(other.temperature);
        self.mode = self.mode.or(other.mode);
        self.fan_speed = self.fan_speed.or(other.fan_speed);
        self.power = self.power.or(other.power);
    }

    pub fn resolve(&self) -> AirconSetting {
        let mut setting = AirconSetting::default();
        setting.apply(self);
        setting
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CirculatorSetting {
    pub power: PowerState,
    pub fan_speed: u8,
}

impl Default for CirculatorSetting {
    fn default() -> Self {
        Self {
            power: PowerState::Off,
            fan_speed: 0,
        }
    }
}

impl CirculatorSetting {
    pub fn on(fan_speed: u8) -> Self {
        Self {
            power: PowerState::On,
            fan_speed,
        }
    }
}

pub const MIN_MET: f32 = 0.5;
pub const MAX_MET: f32 = 2.0;
pub const MIN_CLO: f32 = 0.0;
pub const MAX_CLO: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComfortFactors {
    pub met: f32,
    pub clo: f32,
}

impl ComfortFactors {
    pub fn new(met: f32, clo: f32) -> Self {
        Self {
            met: met.clamp(MIN_MET, MAX_MET),
            clo: clo.clamp(MIN_CLO, MAX_CLO),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PmvResult {
    pub pmv: f64,
    pub ppd: f64,
    pub clo_dynamic: f64,
    pub relative_air_speed: f64,
    pub wall_temp: f64,
    pub ceiling_temp: f64,
    pub floor_temp: f64,
    pub mean_radiant_temp: f64,
    pub dry_bulb_temp: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_escalation_never_lowers() {
        assert_eq!(FanSpeed::High.escalate(FanSpeed::Medium), FanSpeed::High);
        assert_eq!(FanSpeed::Auto.escalate(FanSpeed::Medium), FanSpeed::Medium);
        assert_eq!(FanSpeed::Low.escalate(FanSpeed::Auto), FanSpeed::Low);
    }

    #[test]
    fn fill_keeps_pinned_fields() {
        let mut patch = AirconSettingPatch::mode(AirconMode::Cooling).with_temperature(26.0);
        patch.fill(&AirconSettingPatch::mode(AirconMode::Dry).with_fan(FanSpeed::Low));

        assert_eq!(patch.mode, Some(AirconMode::Cooling));
        assert_eq!(patch.temperature, Some(26.0));
        assert_eq!(patch.fan_speed, Some(FanSpeed::Low));
        assert_eq!(patch.power, None);
    }

    #[test]
    fn overlay_replaces_present_fields() {
        let mut patch = AirconSettingPatch::mode(AirconMode::Cooling).with_temperature(26.0);
        patch.overlay(&AirconSettingPatch::mode(AirconMode::Fan).with_power(PowerState::Off));

        assert_eq!(patch.mode, Some(AirconMode::Fan));
        assert_eq!(patch.temperature, Some(26.0));
        assert_eq!(patch.power, Some(PowerState::Off));
    }

    #[test]
    fn resolve_fills_defaults_and_clamps_temperature() {
        let setting = AirconSettingPatch::mode(AirconMode::Heating)
            .with_temperature(35.0)
            .resolve();

        assert_eq!(setting.mode, AirconMode::Heating);
        assert_eq!(setting.temperature, MAX_SETTING_TEMP_C);
        assert_eq!(setting.fan_speed, FanSpeed::Auto);
        assert_eq!(setting.power, PowerState::On);
        assert!(!setting.force_fan_below_dew_point);
    }

    #[test]
    fn comfort_factors_are_range_limited() {
        let factors = ComfortFactors::new(3.4, -0.2);
        assert_eq!(factors.met, MAX_MET);
        assert_eq!(factors.clo, MIN_CLO);
    }
}
