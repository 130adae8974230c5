use chrono::{DateTime, Datelike, FixedOffset};
use tracing::info;

use crate::{
    config::{HeatingCostPeriod, MetCloConfig, TemperatureThresholds},
    forecast::{is_clear, HourlyForecast},
    schedule::{minutes_of_day, DayOfWeek},
    types::ComfortFactors,
};

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

pub struct ComfortFactorCalculator<'a> {
    config: &'a MetCloConfig,
    thresholds: &'a TemperatureThresholds,
}

impl<'a> ComfortFactorCalculator<'a> {
    pub fn new(config: &'a MetCloConfig, thresholds: &'a TemperatureThresholds) -> Self {
        Self { config, thresholds }
    }

    /// `temperature` is the effective outdoor temperature for this pass.
    pub fn calculate(
        &self,
        temperature: f64,
        sleeping: bool,
        now: DateTime<FixedOffset>,
        closest_forecast: Option<&HourlyForecast>,
    ) -> ComfortFactors {
        let (met, clo) = if temperature >= self.thresholds.high {
            self.high_temperature(sleeping, now)
        } else if temperature <= self.thresholds.low {
            self.low_temperature(sleeping, now, closest_forecast)
        } else {
            self.mid_temperature(temperature, sleeping)
        };
        ComfortFactors::new(met, clo)
    }

    fn high_temperature(&self, sleeping: bool, now: DateTime<FixedOffset>) -> (f32, f32) {
        let high = &self.config.high_temperature;
        let mut met = high.met.pick(sleeping);
        let minutes = minutes_of_day(now);

        for (name, meal) in [
            ("lunch", &high.meals.lunch),
            ("dinner", &high.meals.dinner),
            ("sleep_prep", &high.meals.sleep_prep),
        ] {
            if meal.enabled && meal.time.contains(minutes) {
                met = round2(met + meal.met_adjustment);
                info!("met adjusted for {name}: {met}");
            }
        }

        (met, high.clo.pick(sleeping))
    }

    fn low_temperature(
        &self,
        sleeping: bool,
        now: DateTime<FixedOffset>,
        closest_forecast: Option<&HourlyForecast>,
    ) -> (f32, f32) {
        let low = &self.config.low_temperature;
        let mut met = low.met.pick(sleeping);
        let minutes = minutes_of_day(now);
        let weekday = !DayOfWeek::from_chrono(now.weekday()).is_weekend();

        if low.heating.enabled && weekday {
            let active = |period: &&HeatingCostPeriod| period.time.contains(minutes);
            for period in low.heating.high_costs.iter().filter(active) {
                met += period.met_adjustment;
                info!("met adjusted for high heating cost window: {met}");
            }
            for period in low.heating.low_costs.iter().filter(active) {
                met += period.met_adjustment;
                info!("met adjusted for low heating cost window: {met}");
            }
        }

        let solar = &self.config.solar_heating_reduction;
        if solar.enabled
            && solar.time.contains(minutes)
            && is_clear(closest_forecast, solar.cloudiness_threshold)
        {
            met += solar.met_adjustment;
            info!("met adjusted for solar heating: {met}");
        }

        (met, low.clo.pick(sleeping))
    }

    fn mid_temperature(&self, temperature: f64, sleeping: bool) -> (f32, f32) {
        let met = self.config.low_temperature.met.pick(sleeping);
        let t = temperature as f32;
        let clo = if sleeping {
            (2.0 - 0.10 * (t.min(15.0) - 9.0).max(0.0)).max(1.2)
        } else {
            (1.0 - 0.025 * (t.min(40.0) - 10.0).max(0.0)).max(0.7)
        };
        (met, clo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::TimeRange;
    use chrono::TimeZone;

    // Jan 5, 2026 is Monday; Jan 10 is Saturday.
    fn at(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 1, day, hour, minute, 0)
            .unwrap()
    }

    fn forecast(cloud: f64) -> HourlyForecast {
        HourlyForecast {
            time: at(5, 12, 0),
            temperature: 8.0,
            humidity: 40.0,
            cloud_fraction: Some(cloud),
        }
    }

    #[test]
    fn lunch_raises_met_on_hot_days() {
        let config = MetCloConfig::default();
        let thresholds = TemperatureThresholds::default();
        let calculator = ComfortFactorCalculator::new(&config, &thresholds);

        let lunch = calculator.calculate(32.0, false, at(5, 12, 30), None);
        let afternoon = calculator.calculate(32.0, false, at(5, 15, 0), None);

        assert!((lunch.met - 1.3).abs() < 1e-6);
        assert!((afternoon.met - 1.1).abs() < 1e-6);
        assert_eq!(afternoon.clo, 0.4);
    }

    #[test]
    fn sleeping_uses_sleep_values() {
        let config = MetCloConfig::default();
        let thresholds = TemperatureThresholds::default();
        let calculator = ComfortFactorCalculator::new(&config, &thresholds);

        let factors = calculator.calculate(32.0, true, at(5, 2, 0), None);
        assert_eq!(factors.met, 0.8);
        assert_eq!(factors.clo, 0.8);
    }

    #[test]
    fn mid_band_clothing_follows_temperature() {
        let config = MetCloConfig::default();
        let thresholds = TemperatureThresholds::default();
        let calculator = ComfortFactorCalculator::new(&config, &thresholds);

        let awake = calculator.calculate(20.0, false, at(5, 10, 0), None);
        assert!((awake.clo - 0.75).abs() < 1e-6);
        assert_eq!(awake.met, 1.0);

        let asleep = calculator.calculate(20.0, true, at(5, 2, 0), None);
        assert!((asleep.clo - 1.4).abs() < 1e-6);
    }

    #[test]
    fn heating_costs_only_adjust_on_weekdays() {
        let mut config = MetCloConfig::default();
        config.low_temperature.heating.enabled = true;
        config.low_temperature.heating.high_costs = vec![HeatingCostPeriod {
            time: TimeRange::hm(17, 0, 21, 0),
            met_adjustment: -0.2,
        }];
        let thresholds = TemperatureThresholds::default();
        let calculator = ComfortFactorCalculator::new(&config, &thresholds);

        let weekday = calculator.calculate(5.0, false, at(5, 18, 0), None);
        let weekend = calculator.calculate(5.0, false, at(10, 18, 0), None);

        assert!((weekday.met - 0.8).abs() < 1e-6);
        assert!((weekend.met - 1.0).abs() < 1e-6);
    }

    #[test]
    fn heating_windows_apply_without_a_per_window_flag() {
        let raw = r#"{
            "enabled": true,
            "high_costs": [{ "time": { "start_minutes": 1020, "end_minutes": 1260 }, "met_adjustment": -0.2 }],
            "low_costs": [{ "time": { "start_minutes": 60, "end_minutes": 360 }, "met_adjustment": 0.1 }]
        }"#;
        let mut config = MetCloConfig::default();
        config.low_temperature.heating = serde_json::from_str(raw).unwrap();
        let thresholds = TemperatureThresholds::default();
        let calculator = ComfortFactorCalculator::new(&config, &thresholds);

        let evening = calculator.calculate(5.0, false, at(5, 18, 0), None);
        let night = calculator.calculate(5.0, true, at(5, 3, 0), None);
        let noon = calculator.calculate(5.0, false, at(5, 12, 0), None);

        assert!((evening.met - 0.8).abs() < 1e-6);
        assert!((night.met - (config.low_temperature.met.sleeping + 0.1)).abs() < 1e-6);
        assert!((noon.met - 1.0).abs() < 1e-6);
    }

    #[test]
    fn clear_sky_applies_solar_reduction() {
        let mut config = MetCloConfig::default();
        config.solar_heating_reduction.enabled = true;
        let thresholds = TemperatureThresholds::default();
        let calculator = ComfortFactorCalculator::new(&config, &thresholds);

        let clear = calculator.calculate(5.0, false, at(5, 11, 0), Some(&forecast(0.1)));
        let cloudy = calculator.calculate(5.0, false, at(5, 11, 0), Some(&forecast(0.8)));
        let evening = calculator.calculate(5.0, false, at(5, 19, 0), Some(&forecast(0.1)));

        assert!((clear.met - 1.1).abs() < 1e-6);
        assert!((cloudy.met - 1.0).abs() < 1e-6);
        assert!((evening.met - 1.0).abs() < 1e-6);
    }
}
