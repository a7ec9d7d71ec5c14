//! Transmission payload built from one read cycle.
//!
//! Only the record is produced here; encoding and upload belong to the host.

use serde::Serialize;

use crate::error::SensorError;
use crate::health::{HealthAssessment, axis_means};
use crate::registry::MAX_SENSORS;
use crate::sensors::{SensorKind, SensorReading};

/// Per-sensor line of a [`TelemetryRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorEntry {
    pub kind: SensorKind,
    /// Position in the batch, starting at 1.
    pub id: u8,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lux: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HealthSummary {
    pub health: &'static str,
    pub recommendation: &'static str,
    pub score: u8,
}

/// One upload's worth of data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord<'a> {
    pub device_id: &'a str,
    /// Milliseconds since boot.
    pub timestamp: u64,
    /// Mean over all valid temperature readings.
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub lux: Option<f32>,
    pub soil_moisture: Option<u16>,
    pub light_level: Option<u16>,
    pub sensors: heapless::Vec<SensorEntry, MAX_SENSORS>,
    pub health: HealthSummary,
}

impl<'a> TelemetryRecord<'a> {
    pub fn from_batch(
        readings: &[SensorReading],
        assessment: &HealthAssessment,
        timestamp: u64,
        device_id: &'a str,
    ) -> Self {
        let (temperature, humidity, lux) = axis_means(readings);

        let first_valid = |f: fn(&SensorReading) -> Option<u16>| {
            readings.iter().filter(|r| r.is_valid()).find_map(f)
        };

        let sensors = readings
            .iter()
            .take(MAX_SENSORS)
            .zip(1u8..)
            .map(|(r, id)| SensorEntry {
                kind: r.kind(),
                id,
                valid: r.is_valid(),
                temperature: r.temperature(),
                humidity: r.humidity(),
                lux: r.lux(),
                error: r.error().map(SensorError::code),
            })
            .collect();

        Self {
            device_id,
            timestamp,
            temperature,
            humidity,
            lux,
            soil_moisture: first_valid(SensorReading::soil_moisture),
            light_level: first_valid(SensorReading::light_level),
            sensors,
            health: HealthSummary {
                health: assessment.text,
                recommendation: assessment.recommendation,
                score: assessment.score,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BusError;
    use crate::health::{HealthLevel, HealthScorer};

    #[test]
    fn test_record_from_batch() {
        let readings = [
            SensorReading::valid(SensorKind::ComboTH)
                .with_temperature(22.0)
                .with_humidity(50.0),
            SensorReading::valid(SensorKind::ComboTH)
                .with_temperature(24.0)
                .with_humidity(60.0),
            SensorReading::failed(SensorKind::LightSensor, BusError::Timeout.into()),
            SensorReading::valid(SensorKind::AnalogSoil).with_soil_moisture(2100),
        ];
        let assessment = HealthScorer::default().assess(&readings);
        let record = TelemetryRecord::from_batch(&readings, &assessment, 90_000, "bench");

        assert_eq!(record.device_id, "bench");
        assert_eq!(record.temperature, Some(23.0));
        assert_eq!(record.humidity, Some(55.0));
        assert_eq!(record.lux, None);
        assert_eq!(record.soil_moisture, Some(2100));
        assert_eq!(record.light_level, None);
        assert_eq!(record.sensors.len(), 4);
        assert_eq!(record.sensors[2].error, Some("bus.timeout"));
        assert_eq!(record.sensors[3].id, 4);
        assert_eq!(record.health.health, HealthLevel::Excellent.label());
        assert_eq!(record.health.score, 100);
    }
}
