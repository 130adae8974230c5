use serde::{Deserialize, Serialize};

/// One sensor sample. Humidity is relative humidity in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub temperature: f64,
    pub humidity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co2: Option<u32>,
}

impl Reading {
    pub fn new(temperature: f64, humidity: f64) -> Self {
        Self {
            temperature,
            humidity,
            co2: None,
        }
    }

    pub fn with_co2(mut self, co2: u32) -> Self {
        self.co2 = Some(co2);
        self
    }

    /// g/m³
    pub fn absolute_humidity(&self) -> f64 {
        absolute_humidity(self.temperature, self.humidity)
    }

    pub fn dew_point(&self) -> f64 {
        dew_point(self.temperature, self.humidity)
    }
}

pub fn absolute_humidity(temperature: f64, humidity: f64) -> f64 {
    let saturation_hpa = 6.1078 * 10f64.powf(7.5 * temperature / (temperature + 237.3));
    217.0 * (humidity / 100.0) * saturation_hpa / (temperature + 273.15)
}

/// Magnus approximation, rounded up to 0.1 °C.
pub fn dew_point(temperature: f64, humidity: f64) -> f64 {
    const A: f64 = 17.27;
    const B: f64 = 237.7;

    let alpha = (A * temperature) / (B + temperature) + (humidity.max(0.1) / 100.0).ln();
    let dew_point = (B * alpha) / (A - alpha);
    (dew_point * 10.0).ceil() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SensorKind {
    TemperatureHumidity,
    Co2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSpec {
    pub id: String,
    pub label: String,
    pub kind: SensorKind,
}

impl SensorSpec {
    pub fn new(id: &str, label: &str, kind: SensorKind) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSet {
    pub main: Reading,
    pub sub: Option<Reading>,
    pub supplementaries: Vec<Reading>,
    pub outdoor: Option<Reading>,
}

impl SensorSet {
    pub fn new(main: Reading) -> Self {
        Self {
            main,
            sub: None,
            supplementaries: Vec::new(),
            outdoor: None,
        }
    }

    pub fn indoor(&self) -> impl Iterator<Item = &Reading> {
        std::iter::once(&self.main)
            .chain(self.sub.iter())
            .chain(self.supplementaries.iter())
    }

    fn indoor_average(&self, value: impl Fn(&Reading) -> f64) -> f64 {
        let (sum, count) = self
            .indoor()
            .fold((0.0, 0usize), |(sum, count), reading| {
                (sum + value(reading), count + 1)
            });
        sum / count as f64
    }

    pub fn average_indoor_temperature(&self) -> f64 {
        self.indoor_average(|reading| reading.temperature)
    }

    pub fn average_indoor_humidity(&self) -> f64 {
        self.indoor_average(|reading| reading.humidity)
    }

    pub fn average_indoor_absolute_humidity(&self) -> f64 {
        self.indoor_average(Reading::absolute_humidity)
    }

    pub fn indoor_dew_point(&self) -> f64 {
        dew_point(
            self.average_indoor_temperature(),
            self.average_indoor_humidity(),
        )
    }

    /// Largest temperature spread between any two indoor sensors.
    pub fn max_indoor_temperature_diff(&self) -> f64 {
        let temps: Vec<f64> = self.indoor().map(|reading| reading.temperature).collect();
        let mut max_diff: f64 = 0.0;
        for (index, a) in temps.iter().enumerate() {
            for b in &temps[index + 1..] {
                max_diff = max_diff.max((a - b).abs());
            }
        }
        max_diff
    }

    pub fn co2_level(&self) -> Option<u32> {
        self.indoor().find_map(|reading| reading.co2)
    }

    pub fn outdoor_temperature(&self) -> Option<f64> {
        self.outdoor.map(|reading| reading.temperature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn psychrometrics_at_reference_point() {
        let reading = Reading::new(25.0, 60.0);

        assert!((reading.absolute_humidity() - 13.8).abs() < 0.2);
        assert!((reading.dew_point() - 16.7).abs() < 0.2);
    }

    #[test]
    fn dew_point_rounds_up_to_tenths() {
        let value = dew_point(25.0, 60.0);
        assert_eq!(value, 16.7);
    }

    #[test]
    fn aggregates_cover_every_indoor_sensor() {
        let mut sensors = SensorSet::new(Reading::new(24.0, 50.0));
        sensors.sub = Some(Reading::new(26.0, 60.0).with_co2(900));
        sensors.supplementaries = vec![Reading::new(22.0, 40.0)];
        sensors.outdoor = Some(Reading::new(35.0, 70.0));

        assert!((sensors.average_indoor_temperature() - 24.0).abs() < 1e-9);
        assert!((sensors.average_indoor_humidity() - 50.0).abs() < 1e-9);
        assert!((sensors.max_indoor_temperature_diff() - 4.0).abs() < 1e-9);
        assert_eq!(sensors.co2_level(), Some(900));
        assert_eq!(sensors.outdoor_temperature(), Some(35.0));
    }

    #[test]
    fn co2_prefers_main_over_later_sensors() {
        let mut sensors = SensorSet::new(Reading::new(24.0, 50.0).with_co2(650));
        sensors.supplementaries = vec![Reading::new(22.0, 40.0).with_co2(1200)];

        assert_eq!(sensors.co2_level(), Some(650));
    }

    #[test]
    fn single_sensor_has_no_differential() {
        let sensors = SensorSet::new(Reading::new(24.0, 50.0));
        assert_eq!(sensors.max_indoor_temperature_diff(), 0.0);
        assert_eq!(sensors.co2_level(), None);
    }
}
