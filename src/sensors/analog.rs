//! Analog soil-moisture and light-level sensors.
//!
//! embedded-hal 1.0 has no ADC trait, so conversions go through
//! [`AdcChannel`], implemented by the board support code.

use embedded_hal::delay::DelayNs;
use log::debug;

use super::{Sensor, SensorKind, SensorReading};
use crate::error::{ProtocolError, SensorError};

/// Largest value a 12-bit conversion can produce.
pub const ADC_MAX: u16 = 4095;

/// One ADC input.
pub trait AdcChannel {
    /// Take a single 12-bit conversion.
    fn read_raw(&mut self) -> Result<u16, SensorError>;
}

impl<A: AdcChannel + ?Sized> AdcChannel for &mut A {
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        (**self).read_raw()
    }
}

/// Raw-count sensor on an ADC channel.
pub struct AnalogSensor<A> {
    channel: A,
    kind: SensorKind,
}

impl<A: AdcChannel> AnalogSensor<A> {
    pub const fn new_soil(channel: A) -> Self {
        Self {
            channel,
            kind: SensorKind::AnalogSoil,
        }
    }

    pub const fn new_light(channel: A) -> Self {
        Self {
            channel,
            kind: SensorKind::AnalogLight,
        }
    }

    pub fn measure(&mut self) -> Result<SensorReading, SensorError> {
        let raw = self.channel.read_raw()?;
        if raw > ADC_MAX {
            return Err(ProtocolError::InvalidReading.into());
        }
        debug!("{}: raw {}", self.kind.label(), raw);

        let reading = SensorReading::valid(self.kind);
        Ok(match self.kind {
            SensorKind::AnalogSoil => reading.with_soil_moisture(raw),
            _ => reading.with_light_level(raw),
        })
    }
}

impl<A: AdcChannel, D: DelayNs> Sensor<D> for AnalogSensor<A> {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    fn initialize(&mut self, _delay: &mut D) -> Result<(), SensorError> {
        Ok(())
    }

    fn read(&mut self, _delay: &mut D) -> Result<SensorReading, SensorError> {
        self.measure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BusError;
    use crate::sim::SimAdc;

    #[test]
    fn test_soil_and_light_fields() {
        let soil_adc = SimAdc::new(1800);
        let light_adc = SimAdc::new(3000);
        let mut soil = AnalogSensor::new_soil(&soil_adc);
        let mut light = AnalogSensor::new_light(&light_adc);

        let soil = soil.measure().unwrap();
        assert_eq!(soil.soil_moisture(), Some(1800));
        assert_eq!(soil.light_level(), None);

        let light = light.measure().unwrap();
        assert_eq!(light.light_level(), Some(3000));
        assert_eq!(light.lux(), None);
    }

    #[test]
    fn test_out_of_range_conversion() {
        let adc = SimAdc::new(4096);
        let mut soil = AnalogSensor::new_soil(&adc);

        assert_eq!(
            soil.measure(),
            Err(SensorError::Protocol(ProtocolError::InvalidReading))
        );
    }

    #[test]
    fn test_channel_fault() {
        let adc = SimAdc::new(100);
        adc.set_failing(true);
        let mut soil = AnalogSensor::new_soil(&adc);

        assert_eq!(soil.measure(), Err(SensorError::Bus(BusError::Io)));
    }
}
