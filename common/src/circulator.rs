use tracing::{info, warn};

use crate::{
    boundary::{CirculatorDevice, DeviceResult},
    config::{CirculatorConfig, EnvironmentThresholds, SpeedThreshold},
    types::{CirculatorSetting, PowerState, StepDirection},
};

/// One device call on the way to a target speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CirculatorAction {
    PowerOn,
    StepUp,
    StepDown,
    PowerOff,
}

impl CirculatorAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PowerOn => "power_on",
            Self::StepUp => "step_up",
            Self::StepDown => "step_down",
            Self::PowerOff => "power_off",
        }
    }
}

/// Walks from `current` to `target`; a target of 0 ends powered off.
pub fn plan(current: CirculatorSetting, target: u8) -> Vec<CirculatorAction> {
    let mut actions = Vec::new();
    let powered = current.power == PowerState::On;

    if target == 0 {
        if powered {
            actions.extend(std::iter::repeat(CirculatorAction::StepDown).take(current.fan_speed as usize));
            actions.push(CirculatorAction::PowerOff);
        }
        return actions;
    }

    let mut speed = current.fan_speed;
    if !powered {
        actions.push(CirculatorAction::PowerOn);
        // An off record carries no speed.
        speed = 0;
    }

    if target > speed {
        actions.extend(std::iter::repeat(CirculatorAction::StepUp).take((target - speed) as usize));
    } else {
        actions.extend(std::iter::repeat(CirculatorAction::StepDown).take((speed - target) as usize));
    }
    actions
}

/// Issues `actions` in order and returns the setting actually reached.
pub fn execute(
    current: CirculatorSetting,
    actions: &[CirculatorAction],
    device: &mut dyn CirculatorDevice,
) -> DeviceResult<CirculatorSetting> {
    let mut reached = current;
    if reached.power == PowerState::Off {
        reached.fan_speed = 0;
    }

    for action in actions {
        let ack = match action {
            CirculatorAction::PowerOn => device.set_power(PowerState::On)?,
            CirculatorAction::PowerOff => device.set_power(PowerState::Off)?,
            CirculatorAction::StepUp => device.step(StepDirection::Up)?,
            CirculatorAction::StepDown => device.step(StepDirection::Down)?,
        };
        if !ack.accepted {
            warn!("circulator rejected {}, stopping at {reached:?}", action.as_str());
            break;
        }
        match action {
            CirculatorAction::PowerOn => reached.power = PowerState::On,
            CirculatorAction::PowerOff => {
                reached.power = PowerState::Off;
                reached.fan_speed = 0;
            }
            CirculatorAction::StepUp => reached.fan_speed += 1,
            CirculatorAction::StepDown => reached.fan_speed = reached.fan_speed.saturating_sub(1),
        }
    }

    info!(
        "circulator now {} at speed {}",
        reached.power.as_str(),
        reached.fan_speed
    );
    Ok(reached)
}

pub fn set_circulator(
    current: CirculatorSetting,
    target: u8,
    device: &mut dyn CirculatorDevice,
) -> DeviceResult<CirculatorSetting> {
    execute(current, &plan(current, target), device)
}

/// First entry, in descending differential order, whose bound the differential meets.
pub fn speed_from_table(thresholds: &[SpeedThreshold], temperature_diff: f64) -> u8 {
    thresholds
        .iter()
        .find(|entry| temperature_diff >= entry.temperature_diff)
        .map(|entry| entry.fan_speed)
        .unwrap_or(0)
}

pub fn target_speed(config: &CirculatorConfig, outdoor: f64, temperature_diff: f64) -> u8 {
    let table = if outdoor >= config.high_temperature {
        &config.hot_thresholds
    } else {
        &config.normal_thresholds
    };
    speed_from_table(table, temperature_diff)
}

/// Speed at which the circulator assists the aircon, if heat assist applies now.
pub fn heat_assist_speed(
    config: &CirculatorConfig,
    environment: &EnvironmentThresholds,
    outdoor: f64,
    pmv: f64,
    absolute_humidity: f64,
) -> Option<u8> {
    let assist = config.heat_assist?;
    if outdoor < config.high_temperature {
        return None;
    }
    (pmv >= assist.pmv_threshold || absolute_humidity >= environment.dehumidification_threshold)
        .then_some(assist.fan_speed)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CirculatorInput {
    pub sleeping: bool,
    pub heat_assist: Option<u8>,
    pub outdoor: f64,
    /// `sub − main`, present only when a sub sensor is configured.
    pub sub_main_diff: Option<f64>,
}

/// `None` keeps the previous setting.
pub fn choose_target(config: &CirculatorConfig, input: &CirculatorInput) -> Option<u8> {
    if input.sleeping {
        return Some(0);
    }
    if let Some(speed) = input.heat_assist {
        return Some(speed);
    }
    input
        .sub_main_diff
        .map(|diff| target_speed(config, input.outdoor, diff))
}
