use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};

use crate::{
    boundary::AppliedAirconSetting,
    types::{AirconMode, AirconSetting, FanSpeed, PowerState},
};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Relative effort of one aircon setting; 0 when powered off.
pub fn setting_intensity(setting: &AirconSetting) -> u32 {
    if setting.power == PowerState::Off {
        return 0;
    }

    let temperature = setting.temperature.round() as i32;
    let temperature_score = if setting.mode.is_cooling() {
        match temperature {
            t if t <= 24 => 5,
            25 => 4,
            26 => 3,
            27 => 2,
            _ => 1,
        }
    } else if setting.mode.is_heating() {
        match temperature {
            t if t <= 24 => 5,
            25 => 4,
            _ => 3,
        }
    } else {
        0
    };

    let fan_score = match setting.fan_speed {
        FanSpeed::High => 3,
        FanSpeed::Medium | FanSpeed::Auto => 2,
        FanSpeed::Low => 1,
    };

    let mode_score = match setting.mode {
        AirconMode::PowerfulCooling | AirconMode::PowerfulHeating => 4,
        AirconMode::Cooling | AirconMode::Heating => 3,
        AirconMode::Dry => 2,
        AirconMode::Fan | AirconMode::Auto => 0,
    };

    temperature_score + fan_score + mode_score
}

/// Sum of `intensity × seconds active` over `date` in `until`'s offset.
///
/// `history` must be ordered by `applied_at`. The entry in force at midnight
/// counts from midnight; the last entry runs until the end of the day or `until`,
/// whichever comes first.
pub fn daily_intensity(
    history: &[AppliedAirconSetting],
    date: NaiveDate,
    until: DateTime<FixedOffset>,
) -> u64 {
    let Some(day_start) = date
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| until.offset().from_local_datetime(&midnight).single())
    else {
        return 0;
    };
    let day_start = day_start.timestamp();
    let day_end = (day_start + SECONDS_PER_DAY).min(until.timestamp());
    if day_end <= day_start {
        return 0;
    }

    let mut total = 0u64;
    for (index, entry) in history.iter().enumerate() {
        let next = history
            .get(index + 1)
            .map(|next| next.applied_at)
            .unwrap_or(day_end);
        let start = entry.applied_at.max(day_start);
        let end = next.min(day_end);
        if end > start {
            total += u64::from(setting_intensity(&entry.setting)) * (end - start) as u64;
        }
    }
    total
}

/// Epoch second of yesterday's local midnight; history from here covers both scores.
pub fn yesterday_start(now: DateTime<FixedOffset>) -> i64 {
    now.date_naive()
        .pred_opt()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .and_then(|midnight| now.offset().from_local_datetime(&midnight).single())
        .map_or(now.timestamp() - 2 * SECONDS_PER_DAY, |start| start.timestamp())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntensityScores {
    pub today: u64,
    pub yesterday: u64,
}

impl IntensityScores {
    pub fn from_history(history: &[AppliedAirconSetting], now: DateTime<FixedOffset>) -> Self {
        let today = now.date_naive();
        let yesterday = today.pred_opt().map_or(0, |date| daily_intensity(history, date, now));
        Self {
            today: daily_intensity(history, today, now),
            yesterday,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 8, day, hour, minute, 0)
            .unwrap()
    }

    fn setting(mode: AirconMode, temperature: f32, fan_speed: FanSpeed) -> AirconSetting {
        AirconSetting {
            temperature,
            mode,
            fan_speed,
            power: PowerState::On,
            force_fan_below_dew_point: false,
        }
    }

    fn applied(setting: AirconSetting, at: DateTime<FixedOffset>) -> AppliedAirconSetting {
        AppliedAirconSetting {
            setting,
            applied_at: at.timestamp(),
        }
    }

    #[test]
    fn scores_follow_mode_temperature_and_fan() {
        assert_eq!(setting_intensity(&setting(AirconMode::Cooling, 26.0, FanSpeed::Auto)), 8);
        assert_eq!(
            setting_intensity(&setting(AirconMode::PowerfulCooling, 24.0, FanSpeed::High)),
            12
        );
        assert_eq!(setting_intensity(&setting(AirconMode::Heating, 22.0, FanSpeed::Low)), 9);
        assert_eq!(setting_intensity(&setting(AirconMode::Dry, 26.0, FanSpeed::Auto)), 4);
        assert_eq!(setting_intensity(&setting(AirconMode::Fan, 20.0, FanSpeed::Low)), 1);

        let mut off = setting(AirconMode::Cooling, 24.0, FanSpeed::High);
        off.power = PowerState::Off;
        assert_eq!(setting_intensity(&off), 0);
    }

    #[test]
    fn daily_total_weights_by_active_seconds() {
        let cooling = setting(AirconMode::Cooling, 26.0, FanSpeed::Auto);
        let fan = setting(AirconMode::Fan, 20.0, FanSpeed::Low);
        let history = vec![
            applied(cooling, fixed_time(1, 22, 0)),
            applied(fan, fixed_time(2, 1, 0)),
            applied(cooling, fixed_time(2, 10, 0)),
        ];
        let now = fixed_time(2, 12, 0);

        // 1h of cooling from midnight, 9h of fan, then 2h of cooling.
        let expected = 8 * 3600 + 9 * 3600 + 8 * 2 * 3600;
        assert_eq!(daily_intensity(&history, now.date_naive(), now), expected);

        let scores = IntensityScores::from_history(&history, now);
        assert_eq!(scores.today, expected);
        assert_eq!(scores.yesterday, 8 * 2 * 3600);
    }

    #[test]
    fn history_window_starts_at_yesterday_midnight() {
        let now = fixed_time(2, 12, 0);
        assert_eq!(yesterday_start(now), fixed_time(1, 0, 0).timestamp());
    }

    #[test]
    fn empty_history_scores_zero() {
        let now = fixed_time(2, 12, 0);
        assert_eq!(IntensityScores::from_history(&[], now), IntensityScores::default());
    }
}
