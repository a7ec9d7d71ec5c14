//! Plant-health scoring.
//!
//! Each axis (temperature, humidity, light) is scored from the mean of its
//! valid readings: 100 inside the optimal band, 50 inside the acceptable band,
//! 0 outside. The overall score is the mean of the axes that had data, so a
//! missing sensor neither helps nor hurts.

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sensors::SensorReading;

/// Optimal and acceptable range for one axis, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub optimal_min: f32,
    pub optimal_max: f32,
    pub acceptable_min: f32,
    pub acceptable_max: f32,
}

impl Band {
    pub const fn new(optimal: (f32, f32), acceptable: (f32, f32)) -> Self {
        Self {
            optimal_min: optimal.0,
            optimal_max: optimal.1,
            acceptable_min: acceptable.0,
            acceptable_max: acceptable.1,
        }
    }

    pub fn score(&self, value: f32) -> u8 {
        if (self.optimal_min..=self.optimal_max).contains(&value) {
            100
        } else if (self.acceptable_min..=self.acceptable_max).contains(&value) {
            50
        } else {
            0
        }
    }

    /// The optimal band must be ordered and lie inside the acceptable band.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ordered = self.acceptable_min <= self.optimal_min
            && self.optimal_min <= self.optimal_max
            && self.optimal_max <= self.acceptable_max;
        if ordered {
            Ok(())
        } else {
            Err(ConfigError::InvalidArgument("health band bounds out of order"))
        }
    }
}

/// Bands for every scored axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthBands {
    /// Degrees Celsius.
    pub temperature: Band,
    /// Percent relative humidity.
    pub humidity: Band,
    pub lux: Band,
}

impl Default for HealthBands {
    fn default() -> Self {
        Self {
            temperature: Band::new((18.0, 28.0), (10.0, 35.0)),
            humidity: Band::new((40.0, 70.0), (30.0, 80.0)),
            lux: Band::new((1000.0, 10_000.0), (100.0, 50_000.0)),
        }
    }
}

impl HealthBands {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.temperature.validate()?;
        self.humidity.validate()?;
        self.lux.validate()
    }
}

/// Classification of an overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthLevel {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
    /// No axis had a valid reading.
    Unknown,
}

impl HealthLevel {
    /// Level for a score from an assessment with at least one axis.
    pub const fn from_score(score: u8) -> Self {
        match score {
            90.. => Self::Excellent,
            70..=89 => Self::Good,
            50..=69 => Self::Fair,
            30..=49 => Self::Poor,
            _ => Self::Critical,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Poor => "Poor",
            Self::Critical => "Critical",
            Self::Unknown => "No sensor data",
        }
    }

    pub const fn recommendation(self) -> &'static str {
        match self {
            Self::Excellent => "Perfect conditions! Keep it up.",
            Self::Good => "Good conditions. Monitor regularly.",
            Self::Fair => "Conditions are acceptable but could be better.",
            Self::Poor => "Conditions need improvement. Check temperature and humidity.",
            Self::Critical => "Immediate attention required! Check all conditions.",
            Self::Unknown => "Check sensor connections.",
        }
    }
}

/// Score of one axis and the mean it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisScore {
    pub mean: f32,
    pub samples: usize,
    pub score: u8,
}

/// Outcome of scoring one batch of readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HealthAssessment {
    /// Integer mean of the scored axes, 0..=100. The fraction is dropped:
    /// scores of 100, 100 and 50 give 83.
    pub score: u8,
    pub level: HealthLevel,
    pub text: &'static str,
    pub recommendation: &'static str,
    pub temperature: Option<AxisScore>,
    pub humidity: Option<AxisScore>,
    pub light: Option<AxisScore>,
}

impl HealthAssessment {
    pub const fn scored_axes(&self) -> usize {
        self.temperature.is_some() as usize
            + self.humidity.is_some() as usize
            + self.light.is_some() as usize
    }
}

/// Running mean of one axis.
#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    sum: f32,
    count: usize,
}

impl Accumulator {
    fn add(&mut self, value: Option<f32>) {
        if let Some(value) = value {
            self.sum += value;
            self.count += 1;
        }
    }

    fn mean(&self) -> Option<(f32, usize)> {
        (self.count > 0).then(|| (self.sum / self.count as f32, self.count))
    }
}

/// Per-axis means of the valid readings in a batch.
///
/// Returns `(temperature, humidity, lux)`, each `None` when no valid reading
/// contributed. Raw analog counts are not part of any axis.
pub fn axis_means(readings: &[SensorReading]) -> (Option<f32>, Option<f32>, Option<f32>) {
    let (t, h, l) = accumulate(readings);
    (
        t.mean().map(|(m, _)| m),
        h.mean().map(|(m, _)| m),
        l.mean().map(|(m, _)| m),
    )
}

fn accumulate(readings: &[SensorReading]) -> (Accumulator, Accumulator, Accumulator) {
    let mut temperature = Accumulator::default();
    let mut humidity = Accumulator::default();
    let mut light = Accumulator::default();

    for reading in readings.iter().filter(|r| r.is_valid()) {
        temperature.add(reading.temperature());
        humidity.add(reading.humidity());
        light.add(reading.lux());
    }
    (temperature, humidity, light)
}

/// Scores batches of readings against a set of bands.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthScorer {
    bands: HealthBands,
}

impl HealthScorer {
    pub const fn new(bands: HealthBands) -> Self {
        Self { bands }
    }

    pub const fn bands(&self) -> &HealthBands {
        &self.bands
    }

    pub fn assess(&self, readings: &[SensorReading]) -> HealthAssessment {
        let (temperature, humidity, light) = accumulate(readings);

        let axis = |acc: Accumulator, band: &Band| {
            acc.mean().map(|(mean, samples)| AxisScore {
                mean,
                samples,
                score: band.score(mean),
            })
        };
        let temperature = axis(temperature, &self.bands.temperature);
        let humidity = axis(humidity, &self.bands.humidity);
        let light = axis(light, &self.bands.lux);

        let scores = [temperature, humidity, light];
        let (sum, count) = scores
            .iter()
            .flatten()
            .fold((0u32, 0u32), |(sum, count), a| (sum + u32::from(a.score), count + 1));

        let (score, level) = if count == 0 {
            (0, HealthLevel::Unknown)
        } else {
            let score = (sum / count) as u8;
            (score, HealthLevel::from_score(score))
        };

        info!(
            "Plant health: {} (score {}) - {}",
            level.label(),
            score,
            level.recommendation()
        );

        HealthAssessment {
            score,
            level,
            text: level.label(),
            recommendation: level.recommendation(),
            temperature,
            humidity,
            light,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BusError;
    use crate::sensors::SensorKind;

    fn combo(t: f32, h: f32) -> SensorReading {
        SensorReading::valid(SensorKind::ComboTH)
            .with_temperature(t)
            .with_humidity(h)
    }

    fn light(lux: f32) -> SensorReading {
        SensorReading::valid(SensorKind::LightSensor).with_lux(lux)
    }

    #[test]
    fn test_optimal_without_light() {
        let assessment = HealthScorer::default().assess(&[combo(23.0, 55.0)]);

        assert_eq!(assessment.score, 100);
        assert_eq!(assessment.level, HealthLevel::Excellent);
        assert!(assessment.light.is_none());
        assert_eq!(assessment.scored_axes(), 2);
    }

    #[test]
    fn test_critical_is_distinct_from_unknown() {
        let critical = HealthScorer::default().assess(&[combo(8.0, 25.0)]);
        let unknown = HealthScorer::default().assess(&[]);

        assert_eq!(critical.score, 0);
        assert_eq!(critical.level, HealthLevel::Critical);
        assert_eq!(unknown.score, 0);
        assert_eq!(unknown.level, HealthLevel::Unknown);
        assert_ne!(critical.text, unknown.text);
        assert_ne!(critical.recommendation, unknown.recommendation);
    }

    #[test]
    fn test_invalid_readings_are_ignored() {
        let readings = [
            combo(23.0, 55.0),
            SensorReading::failed(SensorKind::LightSensor, BusError::Timeout.into()),
        ];
        let assessment = HealthScorer::default().assess(&readings);

        assert_eq!(assessment.score, 100);
        assert!(assessment.light.is_none());
    }

    #[test]
    fn test_all_invalid_is_unknown() {
        let readings = [SensorReading::failed(SensorKind::ComboTH, BusError::Nack.into())];
        assert_eq!(HealthScorer::default().assess(&readings).level, HealthLevel::Unknown);
    }

    #[test]
    fn test_axis_contributors_are_averaged() {
        // Probe and combo average to 20 C; two combos average to 50 %.
        let readings = [
            combo(14.0, 45.0),
            SensorReading::valid(SensorKind::Probe).with_temperature(26.0),
            combo(20.0, 55.0),
        ];
        let assessment = HealthScorer::default().assess(&readings);
        let temperature = assessment.temperature.unwrap();

        assert_eq!(temperature.samples, 3);
        assert!((temperature.mean - 20.0).abs() < 0.001);
        assert_eq!(assessment.humidity.unwrap().samples, 2);
        assert_eq!(assessment.score, 100);
    }

    #[test]
    fn test_levels_and_mixed_axes() {
        // Temperature acceptable (50), humidity optimal (100), light optimal (100):
        // 250 / 3 truncates to 83.
        let readings = [combo(30.0, 50.0), light(5000.0)];
        let assessment = HealthScorer::default().assess(&readings);
        assert_eq!(assessment.score, 83);
        assert_eq!(assessment.level, HealthLevel::Good);

        // Temperature acceptable, humidity acceptable, no light
        let assessment = HealthScorer::default().assess(&[combo(30.0, 75.0)]);
        assert_eq!(assessment.score, 50);
        assert_eq!(assessment.level, HealthLevel::Fair);

        assert_eq!(HealthLevel::from_score(30), HealthLevel::Poor);
        assert_eq!(HealthLevel::from_score(29), HealthLevel::Critical);
    }

    #[test]
    fn test_band_boundaries_inclusive() {
        let band = HealthBands::default().temperature;
        assert_eq!(band.score(18.0), 100);
        assert_eq!(band.score(28.0), 100);
        assert_eq!(band.score(35.0), 50);
        assert_eq!(band.score(35.1), 0);
    }

    #[test]
    fn test_band_validation() {
        assert!(HealthBands::default().validate().is_ok());
        let inverted = Band::new((30.0, 20.0), (10.0, 35.0));
        assert!(inverted.validate().is_err());
    }
}
