//! Monitor configuration.
//!
//! Deserialized from whatever the host loads (JSON in the simulator). Every
//! field has a default, so a partial document only overrides what it names.

use serde::{Deserialize, Serialize};

use crate::bus::DEFAULT_SCAN_RANGE;
use crate::error::ConfigError;
use crate::health::HealthBands;
use crate::registry::MAX_SENSORS;
use crate::sensors::ds18b20::Resolution;
use crate::sensors::{MeasurementMode, SensorDescriptor, SensorKind, SensorLocation, aht10, bh1750};

/// Slowest and fastest supported I2C clock.
pub const MIN_BUS_FREQUENCY_HZ: u32 = 10_000;
pub const MAX_BUS_FREQUENCY_HZ: u32 = 400_000;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    pub device_id: heapless::String<32>,
    /// Time between read cycles.
    pub poll_interval_ms: u32,
    pub bus: BusConfig,
    pub sensors: heapless::Vec<SensorDescriptor, MAX_SENSORS>,
    pub probe_resolution_bits: u8,
    pub light_mode: MeasurementMode,
    pub health: HealthBands,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct BusConfig {
    pub frequency_hz: u32,
    pub timeout_ms: u32,
    pub scan_start: u8,
    pub scan_end: u8,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 100_000,
            timeout_ms: 1000,
            scan_start: *DEFAULT_SCAN_RANGE.start(),
            scan_end: *DEFAULT_SCAN_RANGE.end(),
        }
    }
}

impl Default for MonitorConfig {
    /// Two combo sensors on the default addresses, a probe, a light sensor
    /// and the soil/light analog inputs.
    fn default() -> Self {
        let mut sensors = heapless::Vec::new();
        let defaults = [
            (SensorKind::ComboTH, SensorLocation::I2c { address: aht10::ADDRESS_PRIMARY }, "AHT10 #1"),
            (SensorKind::ComboTH, SensorLocation::I2c { address: aht10::ADDRESS_SECONDARY }, "AHT10 #2"),
            (SensorKind::Probe, SensorLocation::Pin(4), "Soil probe"),
            (SensorKind::LightSensor, SensorLocation::I2c { address: bh1750::ADDRESS_LOW }, "Light"),
            (SensorKind::AnalogSoil, SensorLocation::Pin(34), "Soil moisture"),
            (SensorKind::AnalogLight, SensorLocation::Pin(35), "Light level"),
        ];
        for (kind, location, name) in defaults {
            if let Ok(descriptor) = SensorDescriptor::new(kind, location, name) {
                let _ = sensors.push(descriptor);
            }
        }

        Self {
            device_id: heapless::String::try_from("esp32_plant_monitor").unwrap_or_default(),
            poll_interval_ms: 30_000,
            bus: BusConfig::default(),
            sensors,
            probe_resolution_bits: Resolution::Bits12.bits(),
            light_mode: MeasurementMode::default(),
            health: HealthBands::default(),
        }
    }
}

impl MonitorConfig {
    /// Check ranges and cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_BUS_FREQUENCY_HZ..=MAX_BUS_FREQUENCY_HZ).contains(&self.bus.frequency_hz) {
            return Err(ConfigError::InvalidArgument("bus frequency must be 10 kHz to 400 kHz"));
        }
        if self.bus.timeout_ms == 0 {
            return Err(ConfigError::InvalidArgument("bus timeout must be non-zero"));
        }
        if self.bus.scan_start > self.bus.scan_end || self.bus.scan_end > 0x7F {
            return Err(ConfigError::InvalidArgument("scan range must be ordered 7-bit addresses"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidArgument("poll interval must be non-zero"));
        }
        Resolution::from_bits(self.probe_resolution_bits)?;
        self.health.validate()?;

        for (i, sensor) in self.sensors.iter().enumerate() {
            sensor.validate()?;
            let Some(address) = sensor.i2c_address().filter(|_| sensor.is_enabled()) else {
                continue;
            };
            let duplicate = self.sensors[..i]
                .iter()
                .any(|s| s.is_enabled() && s.i2c_address() == Some(address));
            if duplicate {
                return Err(ConfigError::InvalidArgument("two enabled sensors share an I2C address"));
            }
        }
        Ok(())
    }

    pub fn scan_range(&self) -> core::ops::RangeInclusive<u8> {
        self.bus.scan_start..=self.bus.scan_end
    }

    /// Resolution the probe is configured for. Falls back to 12 bits when
    /// the configured value is invalid; [`MonitorConfig::validate`] reports it.
    pub fn probe_resolution(&self) -> Resolution {
        Resolution::from_bits(self.probe_resolution_bits).unwrap_or_default()
    }
}
