use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::schedule::{minutes_of_day, TimeRange};

/// Afternoon window in which the west wall is driven by its solar-loaded band value.
pub const WEST_WALL_SOLAR_WINDOW: TimeRange = TimeRange::hm(13, 0, 18, 0);

/// Thermal conductivities (W/m·K) and surface heat-transfer resistances (m²K/W) of the home.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HomeThermalSpec {
    pub wall_conductivity: f64,
    pub ceiling_conductivity: f64,
    pub floor_conductivity: f64,
    pub window_conductivity: f64,
    pub window_to_wall_ratio: f64,
    pub wall_surface_resistance: f64,
    pub ceiling_surface_resistance: f64,
    pub floor_surface_resistance: f64,
    pub under_floor_temperature_coefficient: f64,
}

impl Default for HomeThermalSpec {
    fn default() -> Self {
        Self {
            wall_conductivity: 0.35,
            ceiling_conductivity: 0.24,
            floor_conductivity: 0.34,
            window_conductivity: 2.33,
            window_to_wall_ratio: 0.3,
            wall_surface_resistance: 0.11,
            ceiling_surface_resistance: 0.09,
            floor_surface_resistance: 0.15,
            under_floor_temperature_coefficient: 0.55,
        }
    }
}

impl HomeThermalSpec {
    pub fn sanitize(&mut self) {
        self.window_to_wall_ratio = self.window_to_wall_ratio.clamp(0.0, 1.0);
        self.under_floor_temperature_coefficient =
            self.under_floor_temperature_coefficient.clamp(0.0, 1.0);
    }

    pub fn composite_wall_conductivity(&self) -> f64 {
        self.window_to_wall_ratio * self.window_conductivity
            + (1.0 - self.window_to_wall_ratio) * self.wall_conductivity
    }
}

/// Empirical exterior surface temperatures for outdoor temperature bands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SurfaceTemperatureBands {
    pub over_25: f64,
    pub over_30: f64,
    pub over_35: f64,
    pub over_40: f64,
}

impl SurfaceTemperatureBands {
    pub fn lookup(&self, outdoor: f64) -> Option<f64> {
        if outdoor >= 40.0 {
            Some(self.over_40)
        } else if outdoor >= 35.0 {
            Some(self.over_35)
        } else if outdoor >= 30.0 {
            Some(self.over_30)
        } else if outdoor >= 25.0 {
            Some(self.over_25)
        } else {
            None
        }
    }

    pub fn equivalent_temperature(&self, outdoor: f64) -> f64 {
        self.lookup(outdoor).unwrap_or(outdoor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SurfaceModelConfig {
    pub home: HomeThermalSpec,
    pub roof_surface: SurfaceTemperatureBands,
    pub west_wall_surface: SurfaceTemperatureBands,
}

impl Default for SurfaceModelConfig {
    fn default() -> Self {
        Self {
            home: HomeThermalSpec::default(),
            roof_surface: SurfaceTemperatureBands {
                over_25: 40.0,
                over_30: 50.0,
                over_35: 60.0,
                over_40: 70.0,
            },
            west_wall_surface: SurfaceTemperatureBands {
                over_25: 30.0,
                over_30: 38.0,
                over_35: 45.0,
                over_40: 50.0,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceTemperatures {
    pub wall: f64,
    pub ceiling: f64,
    pub floor: f64,
}

impl SurfaceTemperatures {
    pub fn mean_radiant(&self) -> f64 {
        (self.wall + self.ceiling + self.floor) / 3.0
    }
}

pub fn interior_surface_temperature(
    outdoor_equivalent: f64,
    indoor: f64,
    conductivity: f64,
    surface_resistance: f64,
) -> f64 {
    indoor - surface_resistance * (indoor - outdoor_equivalent) / (1.0 / conductivity)
}

pub struct SurfaceTemperatureModel<'a> {
    config: &'a SurfaceModelConfig,
}

impl<'a> SurfaceTemperatureModel<'a> {
    pub fn new(config: &'a SurfaceModelConfig) -> Self {
        Self { config }
    }

    pub fn west_wall_temperature(&self, outdoor: f64, now: DateTime<FixedOffset>) -> f64 {
        if WEST_WALL_SOLAR_WINDOW.contains_half_open(minutes_of_day(now)) {
            self.config.west_wall_surface.equivalent_temperature(outdoor)
        } else {
            outdoor
        }
    }

    pub fn roof_temperature(&self, outdoor: f64) -> f64 {
        self.config.roof_surface.equivalent_temperature(outdoor)
    }

    pub fn wall(&self, outdoor: f64, indoor: f64, now: DateTime<FixedOffset>) -> f64 {
        let home = &self.config.home;
        interior_surface_temperature(
            self.west_wall_temperature(outdoor, now),
            indoor,
            home.composite_wall_conductivity(),
            home.wall_surface_resistance,
        )
    }

    pub fn ceiling(&self, outdoor: f64, upstairs_indoor: f64) -> f64 {
        let home = &self.config.home;
        interior_surface_temperature(
            self.roof_temperature(outdoor),
            upstairs_indoor,
            home.ceiling_conductivity,
            home.ceiling_surface_resistance,
        )
    }

    pub fn floor(&self, outdoor: f64, indoor: f64) -> f64 {
        let home = &self.config.home;
        let under_floor =
            (indoor + outdoor) * (1.0 - home.under_floor_temperature_coefficient);
        interior_surface_temperature(
            under_floor,
            indoor,
            home.floor_conductivity,
            home.floor_surface_resistance,
        )
    }

    /// `indoor` drives wall and floor; `upstairs_indoor` drives the ceiling.
    pub fn surfaces(
        &self,
        outdoor: f64,
        indoor: f64,
        upstairs_indoor: f64,
        now: DateTime<FixedOffset>,
    ) -> SurfaceTemperatures {
        SurfaceTemperatures {
            wall: self.wall(outdoor, indoor, now),
            ceiling: self.ceiling(outdoor, upstairs_indoor),
            floor: self.floor(outdoor, indoor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 7, 20, hour, minute, 0)
            .unwrap()
    }

    fn reference_config() -> SurfaceModelConfig {
        SurfaceModelConfig {
            home: HomeThermalSpec {
                wall_conductivity: 0.8,
                ceiling_conductivity: 0.6,
                floor_conductivity: 0.9,
                window_conductivity: 1.2,
                window_to_wall_ratio: 0.4,
                wall_surface_resistance: 0.25,
                ceiling_surface_resistance: 0.25,
                floor_surface_resistance: 0.25,
                under_floor_temperature_coefficient: 0.2,
            },
            ..SurfaceModelConfig::default()
        }
    }

    #[test]
    fn interior_surface_sits_between_indoor_and_outdoor() {
        let temperature = interior_surface_temperature(30.0, 25.0, 0.8, 0.25);
        assert!((25.0..=30.0).contains(&temperature));
        assert!((temperature - 26.0).abs() < 1e-9);
    }

    #[test]
    fn composite_wall_blends_window_area() {
        let config = reference_config();
        assert!((config.home.composite_wall_conductivity() - 0.96).abs() < 1e-9);
    }

    #[test]
    fn bands_fall_back_to_raw_outdoor_temperature() {
        let bands = SurfaceModelConfig::default().roof_surface;

        assert_eq!(bands.equivalent_temperature(41.0), 70.0);
        assert_eq!(bands.equivalent_temperature(35.0), 60.0);
        assert_eq!(bands.equivalent_temperature(31.5), 50.0);
        assert_eq!(bands.equivalent_temperature(25.0), 40.0);
        assert_eq!(bands.equivalent_temperature(24.9), 24.9);
    }

    #[test]
    fn west_wall_band_only_applies_in_the_afternoon() {
        let config = reference_config();
        let model = SurfaceTemperatureModel::new(&config);

        assert_eq!(model.west_wall_temperature(36.0, at(12, 59)), 36.0);
        assert_eq!(model.west_wall_temperature(36.0, at(13, 0)), 45.0);
        assert_eq!(model.west_wall_temperature(36.0, at(17, 59)), 45.0);
        assert_eq!(model.west_wall_temperature(36.0, at(18, 0)), 36.0);
    }

    #[test]
    fn hot_afternoon_warms_every_surface() {
        let config = reference_config();
        let model = SurfaceTemperatureModel::new(&config);
        let surfaces = model.surfaces(33.0, 26.0, 27.0, at(15, 0));

        assert!(surfaces.wall > 26.0);
        assert!(surfaces.ceiling > 27.0);
        assert!(surfaces.floor > 26.0);
        let mrt = surfaces.mean_radiant();
        assert!(mrt > 26.0 && mrt < 40.0);
    }
}
