//! Sensor descriptors, readings and the driver capability trait.
//!
//! Each driver module exposes a typed `measure` for direct use and implements
//! [`Sensor`] so the registry can dispatch over all of them uniformly.

pub mod aht10;
pub mod analog;
pub mod bh1750;
pub mod ds18b20;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SensorError};

pub use aht10::{Aht10, Aht10Readings};
pub use analog::{AdcChannel, AnalogSensor};
pub use bh1750::{Bh1750, Bh1750Readings, MeasurementMode};
pub use ds18b20::{Ds18b20, Ds18b20Readings, Resolution};

/// Maximum length of a descriptor's display name.
pub const NAME_LEN: usize = 32;

/// Capability tag of a configured sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Temperature and humidity on I2C.
    ComboTH,
    /// Waterproof temperature probe on a single-wire pin.
    Probe,
    /// Digital lux sensor on I2C.
    LightSensor,
    AnalogSoil,
    AnalogLight,
}

impl SensorKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::ComboTH => "Temp/Humidity",
            Self::Probe => "Probe",
            Self::LightSensor => "Light",
            Self::AnalogSoil => "Soil",
            Self::AnalogLight => "Light (analog)",
        }
    }

    /// Whether this kind is addressed on the I2C bus rather than a pin.
    pub const fn is_i2c(self) -> bool {
        matches!(self, Self::ComboTH | Self::LightSensor)
    }
}

/// Where a sensor is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorLocation {
    I2c { address: u8 },
    Pin(u8),
}

/// Static description of one configured sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    kind: SensorKind,
    location: SensorLocation,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    name: heapless::String<NAME_LEN>,
}

const fn enabled_by_default() -> bool {
    true
}

impl SensorDescriptor {
    pub fn new(kind: SensorKind, location: SensorLocation, name: &str) -> Result<Self, ConfigError> {
        let name = heapless::String::try_from(name)
            .map_err(|_| ConfigError::InvalidArgument("sensor name longer than 32 bytes"))?;
        let descriptor = Self {
            kind,
            location,
            enabled: true,
            name,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Check that the location suits the kind.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (self.kind.is_i2c(), self.location) {
            (true, SensorLocation::I2c { address }) if address <= 0x7F => Ok(()),
            (true, SensorLocation::I2c { .. }) => {
                Err(ConfigError::InvalidArgument("I2C address outside the 7-bit range"))
            }
            (true, SensorLocation::Pin(_)) => {
                Err(ConfigError::InvalidArgument("I2C sensor configured on a pin"))
            }
            (false, SensorLocation::Pin(_)) => Ok(()),
            (false, SensorLocation::I2c { .. }) => {
                Err(ConfigError::InvalidArgument("pin sensor configured with an I2C address"))
            }
        }
    }

    pub const fn kind(&self) -> SensorKind {
        self.kind
    }

    pub const fn location(&self) -> SensorLocation {
        self.location
    }

    pub const fn i2c_address(&self) -> Option<u8> {
        match self.location {
            SensorLocation::I2c { address } => Some(address),
            SensorLocation::Pin(_) => None,
        }
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Result of reading one sensor.
///
/// Built either valid, carrying only the values its kind produces, or failed,
/// carrying no values and the error that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorReading {
    kind: SensorKind,
    temperature: Option<f32>,
    humidity: Option<f32>,
    soil_moisture: Option<u16>,
    light_level: Option<u16>,
    lux: Option<f32>,
    valid: bool,
    error: Option<SensorError>,
}

impl SensorReading {
    pub const fn valid(kind: SensorKind) -> Self {
        Self {
            kind,
            temperature: None,
            humidity: None,
            soil_moisture: None,
            light_level: None,
            lux: None,
            valid: true,
            error: None,
        }
    }

    pub const fn failed(kind: SensorKind, error: SensorError) -> Self {
        Self {
            valid: false,
            error: Some(error),
            ..Self::valid(kind)
        }
    }

    #[must_use]
    pub const fn with_temperature(mut self, celsius: f32) -> Self {
        self.temperature = Some(celsius);
        self
    }

    #[must_use]
    pub const fn with_humidity(mut self, percent: f32) -> Self {
        self.humidity = Some(percent);
        self
    }

    #[must_use]
    pub const fn with_lux(mut self, lux: f32) -> Self {
        self.lux = Some(lux);
        self
    }

    #[must_use]
    pub const fn with_soil_moisture(mut self, raw: u16) -> Self {
        self.soil_moisture = Some(raw);
        self
    }

    #[must_use]
    pub const fn with_light_level(mut self, raw: u16) -> Self {
        self.light_level = Some(raw);
        self
    }

    pub const fn kind(&self) -> SensorKind {
        self.kind
    }

    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    pub const fn error(&self) -> Option<SensorError> {
        self.error
    }

    /// Degrees Celsius.
    pub const fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    /// Relative humidity in percent.
    pub const fn humidity(&self) -> Option<f32> {
        self.humidity
    }

    pub const fn lux(&self) -> Option<f32> {
        self.lux
    }

    /// Raw 12-bit ADC count.
    pub const fn soil_moisture(&self) -> Option<u16> {
        self.soil_moisture
    }

    /// Raw 12-bit ADC count.
    pub const fn light_level(&self) -> Option<u16> {
        self.light_level
    }
}

/// Capability every driver exposes to the registry.
///
/// `D` is the blocking delay (an `embedded_hal::delay::DelayNs`) used for
/// conversion waits. Implementations must re-derive device state from the
/// hardware on each call rather than trusting flags cached by an earlier call.
pub trait Sensor<D> {
    fn kind(&self) -> SensorKind;

    /// Where the driver talks to its device, when the driver knows it.
    ///
    /// Pin-driven drivers own an already-configured pin and return `None`.
    fn location(&self) -> Option<SensorLocation> {
        None
    }

    /// Bring the device into a state where [`Sensor::read`] can succeed.
    fn initialize(&mut self, delay: &mut D) -> Result<(), SensorError>;

    /// Take one measurement.
    fn read(&mut self, delay: &mut D) -> Result<SensorReading, SensorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BusError;

    #[test]
    fn test_descriptor_location_must_match_kind() {
        assert!(SensorDescriptor::new(SensorKind::ComboTH, SensorLocation::I2c { address: 0x38 }, "air").is_ok());
        assert!(SensorDescriptor::new(SensorKind::Probe, SensorLocation::Pin(4), "soil temp").is_ok());
        assert_eq!(
            SensorDescriptor::new(SensorKind::Probe, SensorLocation::I2c { address: 0x38 }, "x"),
            Err(ConfigError::InvalidArgument("pin sensor configured with an I2C address"))
        );
        assert!(SensorDescriptor::new(SensorKind::LightSensor, SensorLocation::I2c { address: 0x80 }, "x").is_err());
    }

    #[test]
    fn test_descriptor_name_length() {
        let long = "a name that is definitely longer than thirty-two bytes";
        assert!(SensorDescriptor::new(SensorKind::AnalogSoil, SensorLocation::Pin(34), long).is_err());
    }

    #[test]
    fn test_failed_reading_has_no_values() {
        let reading = SensorReading::failed(SensorKind::ComboTH, BusError::Timeout.into());

        assert!(!reading.is_valid());
        assert_eq!(reading.error(), Some(SensorError::Bus(BusError::Timeout)));
        assert_eq!(reading.temperature(), None);
        assert_eq!(reading.humidity(), None);
    }

    #[test]
    fn test_valid_reading_builder() {
        let reading = SensorReading::valid(SensorKind::ComboTH)
            .with_temperature(21.5)
            .with_humidity(48.0);

        assert!(reading.is_valid());
        assert_eq!(reading.error(), None);
        assert_eq!(reading.temperature(), Some(21.5));
        assert_eq!(reading.lux(), None);
    }
}
