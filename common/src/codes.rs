//! Numeric ids and display labels used on the device wire and in operator messages.

use crate::types::{AirconMode, FanSpeed, PowerState, StepDirection};

pub struct Code<T: 'static> {
    pub value: T,
    pub id: u8,
    pub label: &'static str,
}

pub const AIRCON_MODES: &[Code<AirconMode>] = &[
    Code { value: AirconMode::Auto, id: 1, label: "自動" },
    Code { value: AirconMode::Cooling, id: 2, label: "冷房" },
    Code { value: AirconMode::Fan, id: 3, label: "送風" },
    Code { value: AirconMode::Dry, id: 4, label: "ドライ" },
    Code { value: AirconMode::Heating, id: 5, label: "暖房" },
    Code { value: AirconMode::PowerfulCooling, id: 6, label: "パワフル冷房" },
    Code { value: AirconMode::PowerfulHeating, id: 7, label: "パワフル暖房" },
];

pub const FAN_SPEEDS: &[Code<FanSpeed>] = &[
    Code { value: FanSpeed::Auto, id: 1, label: "自動" },
    Code { value: FanSpeed::Low, id: 2, label: "低" },
    Code { value: FanSpeed::Medium, id: 3, label: "中" },
    Code { value: FanSpeed::High, id: 4, label: "高" },
];

pub const POWER_STATES: &[Code<PowerState>] = &[
    Code { value: PowerState::On, id: 1, label: "オン" },
    Code { value: PowerState::Off, id: 2, label: "オフ" },
];

pub const STEP_DIRECTIONS: &[Code<StepDirection>] = &[
    Code { value: StepDirection::Up, id: 1, label: "風力プラス" },
    Code { value: StepDirection::Down, id: 2, label: "風力マイナス" },
];

fn find<T: PartialEq + Copy>(table: &'static [Code<T>], value: T) -> Option<&'static Code<T>> {
    table.iter().find(|code| code.value == value)
}

fn find_id<T: Copy>(table: &'static [Code<T>], id: u8) -> Option<T> {
    table.iter().find(|code| code.id == id).map(|code| code.value)
}

pub fn mode_id(mode: AirconMode) -> u8 {
    find(AIRCON_MODES, mode).map(|code| code.id).unwrap_or(0)
}

pub fn mode_label(mode: AirconMode) -> &'static str {
    find(AIRCON_MODES, mode).map(|code| code.label).unwrap_or("")
}

pub fn mode_from_id(id: u8) -> Option<AirconMode> {
    find_id(AIRCON_MODES, id)
}

pub fn fan_id(fan_speed: FanSpeed) -> u8 {
    find(FAN_SPEEDS, fan_speed).map(|code| code.id).unwrap_or(0)
}

pub fn fan_label(fan_speed: FanSpeed) -> &'static str {
    find(FAN_SPEEDS, fan_speed).map(|code| code.label).unwrap_or("")
}

pub fn power_id(power: PowerState) -> u8 {
    find(POWER_STATES, power).map(|code| code.id).unwrap_or(0)
}

pub fn power_label(power: PowerState) -> &'static str {
    find(POWER_STATES, power).map(|code| code.label).unwrap_or("")
}

pub fn step_label(direction: StepDirection) -> &'static str {
    find(STEP_DIRECTIONS, direction)
        .map(|code| code.label)
        .unwrap_or("")
}
