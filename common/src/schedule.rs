use chrono::{DateTime, Datelike, FixedOffset, Timelike, Weekday};
use serde::{Deserialize, Serialize};

pub const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl DayOfWeek {
    pub fn index(self) -> usize {
        match self {
            Self::Mon => 0,
            Self::Tue => 1,
            Self::Wed => 2,
            Self::Thu => 3,
            Self::Fri => 4,
            Self::Sat => 5,
            Self::Sun => 6,
        }
    }

    pub fn from_chrono(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => Self::Mon,
            Weekday::Tue => Self::Tue,
            Weekday::Wed => Self::Wed,
            Weekday::Thu => Self::Thu,
            Weekday::Fri => Self::Fri,
            Weekday::Sat => Self::Sat,
            Weekday::Sun => Self::Sun,
        }
    }

    pub fn is_weekend(self) -> bool {
        matches!(self, Self::Sat | Self::Sun)
    }
}

pub fn minutes_of_day(now: DateTime<FixedOffset>) -> u16 {
    now.hour() as u16 * 60 + now.minute() as u16
}

/// Wall-clock window in minutes after local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_minutes: u16,
    pub end_minutes: u16,
}

impl TimeRange {
    pub const fn new(start_minutes: u16, end_minutes: u16) -> Self {
        Self {
            start_minutes,
            end_minutes,
        }
    }

    pub const fn hm(start_hour: u16, start_minute: u16, end_hour: u16, end_minute: u16) -> Self {
        Self::new(start_hour * 60 + start_minute, end_hour * 60 + end_minute)
    }

    pub fn validate(&self) -> bool {
        self.start_minutes < MINUTES_PER_DAY
            && self.end_minutes <= MINUTES_PER_DAY
            && self.start_minutes <= self.end_minutes
    }

    /// `start <= t < end`
    pub fn contains_half_open(&self, minutes: u16) -> bool {
        self.start_minutes <= minutes && minutes < self.end_minutes
    }

    /// `start <= t <= end`
    pub fn contains(&self, minutes: u16) -> bool {
        self.start_minutes <= minutes && minutes <= self.end_minutes
    }

    pub fn contains_time(&self, now: DateTime<FixedOffset>) -> bool {
        self.contains(minutes_of_day(now))
    }
}

/// A weekday on which comfort control is switched off, either all day or in the listed ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComfortPeriod {
    pub day: DayOfWeek,
    #[serde(default)]
    pub times: Vec<TimeRange>,
}

impl ComfortPeriod {
    pub fn whole_day(day: DayOfWeek) -> Self {
        Self {
            day,
            times: Vec::new(),
        }
    }
}

pub fn is_within_disabled_period(periods: &[ComfortPeriod], now: DateTime<FixedOffset>) -> bool {
    let day = DayOfWeek::from_chrono(now.weekday());
    let minutes = minutes_of_day(now);

    let Some(period) = periods.iter().find(|period| period.day == day) else {
        return false;
    };

    period.times.is_empty()
        || period
            .times
            .iter()
            .any(|range| range.contains_half_open(minutes))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwakePeriods {
    pub weekday: TimeRange,
    pub weekend: TimeRange,
}

impl Default for AwakePeriods {
    fn default() -> Self {
        Self {
            weekday: TimeRange::hm(6, 30, 23, 0),
            weekend: TimeRange::hm(8, 0, 23, 30),
        }
    }
}

impl AwakePeriods {
    pub fn is_sleeping(&self, now: DateTime<FixedOffset>) -> bool {
        let day = DayOfWeek::from_chrono(now.weekday());
        let awake = if day.is_weekend() {
            self.weekend
        } else {
            self.weekday
        };
        !awake.contains(minutes_of_day(now))
    }
}
