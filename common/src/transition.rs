use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    config::AirconConfig,
    error::PersistenceError,
    types::{AirconMode, AirconSetting, AirconSettingPatch},
};

/// Minimum dwell time for one mode within an outdoor temperature band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinRuntimeTracker {
    pub mode: AirconMode,
    pub temperature_min: f64,
    pub temperature_max: f64,
    pub duration_minutes: u32,
    /// Epoch seconds at which the current dwell began.
    #[serde(default)]
    pub start_time: Option<i64>,
}

impl MinRuntimeTracker {
    pub fn new(mode: AirconMode, temperature_min: f64, temperature_max: f64, duration_minutes: u32) -> Self {
        Self {
            mode,
            temperature_min,
            temperature_max,
            duration_minutes,
            start_time: None,
        }
    }

    pub fn matches(&self, mode: AirconMode, temperature: f64) -> bool {
        self.mode.base() == mode.base()
            && self.temperature_min <= temperature
            && temperature <= self.temperature_max
    }

    pub fn elapsed_minutes(&self, now: DateTime<FixedOffset>) -> Option<i64> {
        self.start_time
            .map(|start| (now.timestamp() - start).max(0) / 60)
    }

    pub fn has_elapsed(&self, now: DateTime<FixedOffset>) -> bool {
        self.elapsed_minutes(now)
            .map(|elapsed| elapsed >= i64::from(self.duration_minutes))
            .unwrap_or(true)
    }
}

pub trait MinRuntimeStore {
    fn find_band(
        &mut self,
        mode: AirconMode,
        temperature: f64,
    ) -> Result<Option<MinRuntimeTracker>, PersistenceError>;

    /// Clears every start time, then stamps the band matching `(mode, temperature)`.
    fn restart_dwell(
        &mut self,
        mode: AirconMode,
        temperature: f64,
        now: DateTime<FixedOffset>,
    ) -> Result<(), PersistenceError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinRuntimeTable {
    pub trackers: Vec<MinRuntimeTracker>,
}

impl MinRuntimeTable {
    pub fn new(trackers: Vec<MinRuntimeTracker>) -> Self {
        Self { trackers }
    }
}

impl MinRuntimeStore for MinRuntimeTable {
    fn find_band(
        &mut self,
        mode: AirconMode,
        temperature: f64,
    ) -> Result<Option<MinRuntimeTracker>, PersistenceError> {
        Ok(self
            .trackers
            .iter()
            .find(|tracker| tracker.matches(mode, temperature))
            .copied())
    }

    fn restart_dwell(
        &mut self,
        mode: AirconMode,
        temperature: f64,
        now: DateTime<FixedOffset>,
    ) -> Result<(), PersistenceError> {
        for tracker in &mut self.trackers {
            tracker.start_time = None;
        }
        if let Some(tracker) = self
            .trackers
            .iter_mut()
            .find(|tracker| tracker.matches(mode, temperature))
        {
            tracker.start_time = Some(now.timestamp());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// No previous setting is known.
    Initial,
    /// Dew-point protection bypasses the dwell window.
    Forced,
    /// Outside the dwell window or no band applies.
    Permitted,
    /// Same mode; other fields follow the candidate.
    MicroAdjustment,
    /// Cooling to cooling, or heating to heating.
    SameFamily,
    /// Leaving cooling or heating early; replaced by the weakest setting of that family.
    WeakestFallback,
    /// Previous mode kept; other fields follow the candidate.
    ModeHeld,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub setting: AirconSetting,
    pub kind: TransitionKind,
    /// Whether the dwell timer restarts once the setting is sent.
    pub restart_dwell: bool,
    /// Tracker lookup failed and the change was permitted without it.
    pub degraded: bool,
}

impl Transition {
    fn new(setting: AirconSetting, kind: TransitionKind) -> Self {
        let restart_dwell = !matches!(
            kind,
            TransitionKind::MicroAdjustment | TransitionKind::ModeHeld
        );
        Self {
            setting,
            kind,
            restart_dwell,
            degraded: false,
        }
    }
}

pub struct AirconTransitionStateMachine<'a> {
    config: &'a AirconConfig,
}

impl<'a> AirconTransitionStateMachine<'a> {
    pub fn new(config: &'a AirconConfig) -> Self {
        Self { config }
    }

    /// `temperature` is the effective outdoor temperature used to pick the runtime band.
    pub fn evaluate(
        &self,
        candidate: AirconSetting,
        previous: Option<&AirconSetting>,
        temperature: f64,
        now: DateTime<FixedOffset>,
        store: &mut dyn MinRuntimeStore,
    ) -> Transition {
        let Some(previous) = previous else {
            return Transition::new(candidate, TransitionKind::Initial);
        };

        if candidate.force_fan_below_dew_point {
            info!("dew point protection overrides minimum runtime");
            return Transition::new(candidate, TransitionKind::Forced);
        }

        let tracker = match store.find_band(previous.mode, temperature) {
            Ok(tracker) => tracker,
            Err(err) => {
                warn!("min runtime lookup failed, permitting change: {err:#}");
                let mut transition = Transition::new(candidate, TransitionKind::Permitted);
                transition.degraded = true;
                return transition;
            }
        };

        let Some(tracker) = tracker.filter(|tracker| !tracker.has_elapsed(now)) else {
            return Transition::new(candidate, TransitionKind::Permitted);
        };

        if let Some(elapsed) = tracker.elapsed_minutes(now) {
            info!(
                "{} minimum runtime active: {elapsed}/{} min",
                tracker.mode.as_str(),
                tracker.duration_minutes
            );
        }

        if candidate.mode == previous.mode {
            return Transition::new(candidate, TransitionKind::MicroAdjustment);
        }

        if previous.mode.is_cooling() {
            return if candidate.mode.is_cooling() {
                Transition::new(candidate, TransitionKind::SameFamily)
            } else {
                self.weakest(candidate, &self.config.weakest_cooling)
            };
        }

        if previous.mode.is_heating() {
            return if candidate.mode.is_heating() {
                Transition::new(candidate, TransitionKind::SameFamily)
            } else {
                self.weakest(candidate, &self.config.weakest_heating)
            };
        }

        let mut held = candidate;
        held.mode = previous.mode;
        Transition::new(held, TransitionKind::ModeHeld)
    }

    fn weakest(&self, candidate: AirconSetting, weakest: &AirconSettingPatch) -> Transition {
        let mut setting = candidate;
        let mut patch = AirconSettingPatch {
            temperature: weakest.temperature,
            mode: weakest.mode,
            ..AirconSettingPatch::default()
        };
        if !candidate.fan_speed.is_strong() {
            patch.fan_speed = weakest.fan_speed;
        }
        setting.apply(&patch);
        info!("falling back to weakest setting: {}", setting.summary());
        Transition::new(setting, TransitionKind::WeakestFallback)
    }
}
