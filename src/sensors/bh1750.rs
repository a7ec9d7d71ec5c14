//! BH1750 ambient light sensor.

use embedded_hal::delay::DelayNs;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{Sensor, SensorKind, SensorLocation, SensorReading};
use crate::bus::I2cBus;
use crate::error::{ConfigError, ProtocolError, SensorError};

/// Address with the ADDR pin low.
pub const ADDRESS_LOW: u8 = 0x23;
/// Address with the ADDR pin high.
pub const ADDRESS_HIGH: u8 = 0x5C;

pub(crate) const CMD_POWER_DOWN: u8 = 0x00;
pub(crate) const CMD_POWER_ON: u8 = 0x01;
pub(crate) const CMD_RESET: u8 = 0x07;

/// Measurement-time register default and limits.
pub const MTREG_DEFAULT: u8 = 69;
pub const MTREG_MIN: u8 = 31;
pub const MTREG_MAX: u8 = 254;

const MAX_LUX: f32 = 100_000.0;

/// Measurement mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementMode {
    /// 1 lx resolution, continuous.
    ContinuousHigh,
    /// 0.5 lx resolution, continuous.
    ContinuousHigh2,
    /// 4 lx resolution, continuous.
    ContinuousLow,
    /// 1 lx resolution, single conversion then power down.
    #[default]
    OneTimeHigh,
    OneTimeHigh2,
    OneTimeLow,
}

impl MeasurementMode {
    pub const fn opcode(self) -> u8 {
        match self {
            Self::ContinuousHigh => 0x10,
            Self::ContinuousHigh2 => 0x11,
            Self::ContinuousLow => 0x13,
            Self::OneTimeHigh => 0x20,
            Self::OneTimeHigh2 => 0x21,
            Self::OneTimeLow => 0x23,
        }
    }

    pub const fn from_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            0x10 => Some(Self::ContinuousHigh),
            0x11 => Some(Self::ContinuousHigh2),
            0x13 => Some(Self::ContinuousLow),
            0x20 => Some(Self::OneTimeHigh),
            0x21 => Some(Self::OneTimeHigh2),
            0x23 => Some(Self::OneTimeLow),
            _ => None,
        }
    }

    pub const fn is_one_shot(self) -> bool {
        matches!(self, Self::OneTimeHigh | Self::OneTimeHigh2 | Self::OneTimeLow)
    }

    const fn is_low_resolution(self) -> bool {
        matches!(self, Self::ContinuousLow | Self::OneTimeLow)
    }

    /// Maximum conversion time at the given MTreg value.
    pub const fn measurement_time_ms(self, mtreg: u8) -> u32 {
        let base = if self.is_low_resolution() { 24 } else { 180 };
        (base * mtreg as u32).div_ceil(MTREG_DEFAULT as u32)
    }

    /// Counts per lux at the default MTreg.
    ///
    /// High-resolution mode 2 halves the step size, so it reports twice as
    /// many counts for the same illuminance.
    pub const fn counts_per_lux(self) -> f32 {
        match self {
            Self::ContinuousHigh2 | Self::OneTimeHigh2 => 2.4,
            _ => 1.2,
        }
    }
}

/// Convert a raw result register value to lux.
pub fn raw_to_lux(raw: u16, mode: MeasurementMode, mtreg: u8) -> f32 {
    f32::from(raw) / mode.counts_per_lux() * f32::from(MTREG_DEFAULT) / f32::from(mtreg)
}

/// Driver lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bh1750State {
    PoweredDown,
    PoweredOn,
    ModeSet,
}

/// Typed readings from the BH1750.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bh1750Readings {
    pub raw: u16,
    pub lux: f32,
}

impl From<Bh1750Readings> for SensorReading {
    fn from(value: Bh1750Readings) -> Self {
        SensorReading::valid(SensorKind::LightSensor).with_lux(value.lux)
    }
}

pub struct Bh1750<B> {
    bus: B,
    address: u8,
    mode: MeasurementMode,
    mtreg: u8,
    state: Bh1750State,
    initialized: bool,
}

impl<B: I2cBus> Bh1750<B> {
    pub const fn new(bus: B, address: u8, mode: MeasurementMode) -> Self {
        Self {
            bus,
            address,
            mode,
            mtreg: MTREG_DEFAULT,
            state: Bh1750State::PoweredDown,
            initialized: false,
        }
    }

    pub const fn address(&self) -> u8 {
        self.address
    }

    pub const fn mode(&self) -> MeasurementMode {
        self.mode
    }

    pub const fn state(&self) -> Bh1750State {
        self.state
    }

    pub const fn measurement_time(&self) -> u8 {
        self.mtreg
    }

    fn command(&mut self, opcode: u8) -> Result<(), SensorError> {
        self.bus.write(self.address, &[opcode])?;
        Ok(())
    }

    /// Power on, clear the data register and select the configured mode.
    pub fn initialize(&mut self) -> Result<(), SensorError> {
        self.initialized = false;
        self.power_on()?;
        self.reset()?;
        self.set_mode(self.mode)?;
        self.initialized = true;
        info!("BH1750 0x{:02X} initialized in {:?}", self.address, self.mode);
        Ok(())
    }

    pub fn power_on(&mut self) -> Result<(), SensorError> {
        self.command(CMD_POWER_ON)?;
        self.state = Bh1750State::PoweredOn;
        Ok(())
    }

    pub fn power_down(&mut self) -> Result<(), SensorError> {
        self.command(CMD_POWER_DOWN)?;
        self.state = Bh1750State::PoweredDown;
        Ok(())
    }

    /// Clear the data register. Only accepted while powered.
    pub fn reset(&mut self) -> Result<(), SensorError> {
        if self.state == Bh1750State::PoweredDown {
            return Err(ConfigError::InvalidState("BH1750 reset while powered down").into());
        }
        self.command(CMD_RESET)
    }

    /// Select a mode, starting a conversion.
    pub fn set_mode(&mut self, mode: MeasurementMode) -> Result<(), SensorError> {
        self.command(mode.opcode())?;
        self.mode = mode;
        self.state = Bh1750State::ModeSet;
        Ok(())
    }

    /// Change the measurement-time register (sensitivity).
    ///
    /// Larger values integrate longer: more counts per lux, longer waits.
    pub fn set_measurement_time(&mut self, mtreg: u8) -> Result<(), SensorError> {
        if !(MTREG_MIN..=MTREG_MAX).contains(&mtreg) {
            return Err(ConfigError::InvalidArgument("MTreg must be within 31..=254").into());
        }
        self.command(0x40 | (mtreg >> 5))?;
        self.command(0x60 | (mtreg & 0x1F))?;
        self.mtreg = mtreg;
        Ok(())
    }

    /// Read the result register and convert it.
    ///
    /// One-shot modes trigger a fresh conversion first. Continuous modes read
    /// the latest result directly, so the first read right after
    /// [`Bh1750::initialize`] may still be zero. A continuous device that was
    /// powered down is restarted and waited out like a one-shot.
    pub fn measure(&mut self, delay: &mut impl DelayNs) -> Result<Bh1750Readings, SensorError> {
        if !self.initialized {
            return Err(ConfigError::InvalidState("BH1750 not initialized").into());
        }

        if self.mode.is_one_shot() || self.state == Bh1750State::PoweredDown {
            // The previous one-shot or power_down left the device powered down.
            self.power_on()?;
            self.set_mode(self.mode)?;
            delay.delay_ms(self.mode.measurement_time_ms(self.mtreg));
        }

        let mut data = [0u8; 2];
        self.bus.read(self.address, &mut data)?;
        if self.mode.is_one_shot() {
            // The device powers itself down after a single conversion.
            self.state = Bh1750State::PoweredDown;
        }

        let raw = u16::from_be_bytes(data);
        let lux = raw_to_lux(raw, self.mode, self.mtreg);
        if !(0.0..=MAX_LUX).contains(&lux) {
            return Err(ProtocolError::InvalidReading.into());
        }

        debug!("BH1750 0x{:02X}: raw {} -> {:.1} lx", self.address, raw, lux);
        Ok(Bh1750Readings { raw, lux })
    }
}

impl<B: I2cBus, D: DelayNs> Sensor<D> for Bh1750<B> {
    fn kind(&self) -> SensorKind {
        SensorKind::LightSensor
    }

    fn location(&self) -> Option<SensorLocation> {
        Some(SensorLocation::I2c {
            address: self.address,
        })
    }

    fn initialize(&mut self, _delay: &mut D) -> Result<(), SensorError> {
        Bh1750::initialize(self)
    }

    fn read(&mut self, delay: &mut D) -> Result<SensorReading, SensorError> {
        self.measure(delay).map(SensorReading::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testing::ScriptedBus;
    use crate::bus::{I2cExecutor, i2c::shared_bus};
    use crate::sim::{SimBh1750, SimClock, SimDelay, SimI2cBus};
    use core::cell::RefCell;

    #[test]
    fn test_raw_to_lux_reference() {
        let lux = raw_to_lux(0x2328, MeasurementMode::OneTimeHigh, MTREG_DEFAULT);
        assert!((lux - 7500.0).abs() < 0.1);
    }

    #[test]
    fn test_raw_to_lux_mode_and_mtreg() {
        // Mode 2 reports twice the counts for the same light.
        let h2 = raw_to_lux(0x2328, MeasurementMode::ContinuousHigh2, MTREG_DEFAULT);
        assert!((h2 - 3750.0).abs() < 0.1);

        // Doubling MTreg doubles the counts.
        let long = raw_to_lux(2400, MeasurementMode::OneTimeHigh, 138);
        assert!((long - 1000.0).abs() < 0.1);
    }

    #[test]
    fn test_measurement_times() {
        assert_eq!(MeasurementMode::OneTimeHigh.measurement_time_ms(MTREG_DEFAULT), 180);
        assert_eq!(MeasurementMode::OneTimeLow.measurement_time_ms(MTREG_DEFAULT), 24);
        assert_eq!(MeasurementMode::OneTimeHigh.measurement_time_ms(MTREG_MAX), 663);
    }

    #[test]
    fn test_initialize_command_sequence() {
        let mut bus = ScriptedBus::new();
        bus.ok().ok().ok();
        let mut sensor = Bh1750::new(&mut bus, ADDRESS_LOW, MeasurementMode::ContinuousHigh);

        sensor.initialize().unwrap();
        assert_eq!(sensor.state(), Bh1750State::ModeSet);
        drop(sensor);

        let writes: heapless::Vec<&[u8], 4> = bus.writes().collect();
        assert_eq!(writes.as_slice(), &[&[0x01][..], &[0x07], &[0x10]]);
    }

    #[test]
    fn test_reset_requires_power() {
        let mut bus = ScriptedBus::new();
        let mut sensor = Bh1750::new(&mut bus, ADDRESS_LOW, MeasurementMode::OneTimeHigh);

        assert!(matches!(
            sensor.reset(),
            Err(SensorError::Config(ConfigError::InvalidState(_)))
        ));
    }

    #[test]
    fn test_measurement_time_range() {
        let mut bus = ScriptedBus::new();
        bus.ok().ok();
        let mut sensor = Bh1750::new(&mut bus, ADDRESS_LOW, MeasurementMode::OneTimeHigh);

        assert!(sensor.set_measurement_time(30).is_err());
        sensor.set_measurement_time(138).unwrap();
        assert_eq!(sensor.measurement_time(), 138);
        drop(sensor);

        let writes: heapless::Vec<&[u8], 4> = bus.writes().collect();
        assert_eq!(writes.as_slice(), &[&[0x44][..], &[0x6A]]);
    }

    #[test]
    fn test_one_shot_against_simulated_device() {
        let clock = SimClock::new();
        let device = RefCell::new(SimBh1750::new(ADDRESS_LOW).with_lux(7500.0));
        let mut sim = SimI2cBus::new(&clock);
        sim.attach(&device);
        let bus = shared_bus(sim);
        let mut delay = SimDelay::new(&clock);
        let mut sensor = Bh1750::new(
            I2cExecutor::new(&bus, &clock),
            ADDRESS_LOW,
            MeasurementMode::OneTimeHigh,
        );

        sensor.initialize().unwrap();
        let first = sensor.measure(&mut delay).unwrap();
        assert!((first.lux - 7500.0).abs() < 1.0);
        assert_eq!(sensor.state(), Bh1750State::PoweredDown);
        assert!(!device.borrow().is_powered());

        // The next one-shot powers the device back on by itself.
        device.borrow_mut().set_lux(120.0);
        let second = sensor.measure(&mut delay).unwrap();
        assert!((second.lux - 120.0).abs() < 1.0);
    }

    #[test]
    fn test_continuous_mode_with_longer_integration() {
        let clock = SimClock::new();
        let device = RefCell::new(SimBh1750::new(ADDRESS_HIGH).with_lux(300.0));
        let mut sim = SimI2cBus::new(&clock);
        sim.attach(&device);
        let bus = shared_bus(sim);
        let mut delay = SimDelay::new(&clock);
        let mut sensor = Bh1750::new(
            I2cExecutor::new(&bus, &clock),
            ADDRESS_HIGH,
            MeasurementMode::ContinuousHigh,
        );

        sensor.initialize().unwrap();
        sensor.set_measurement_time(138).unwrap();
        assert_eq!(device.borrow().mtreg(), 138);
        clock.advance_ms(400);

        let readings = sensor.measure(&mut delay).unwrap();
        assert!((readings.lux - 300.0).abs() < 1.0);
        assert_eq!(device.borrow().mode(), Some(MeasurementMode::ContinuousHigh));
    }

    #[test]
    fn test_power_down_then_measure_restarts_conversion() {
        let clock = SimClock::new();
        let device = RefCell::new(SimBh1750::new(ADDRESS_LOW).with_lux(2000.0));
        let mut sim = SimI2cBus::new(&clock);
        sim.attach(&device);
        let bus = shared_bus(sim);
        let mut delay = SimDelay::new(&clock);
        let mut sensor = Bh1750::new(
            I2cExecutor::new(&bus, &clock),
            ADDRESS_LOW,
            MeasurementMode::ContinuousHigh,
        );

        sensor.initialize().unwrap();
        clock.advance_ms(200);
        assert!((sensor.measure(&mut delay).unwrap().lux - 2000.0).abs() < 1.0);

        sensor.power_down().unwrap();
        assert_eq!(sensor.state(), Bh1750State::PoweredDown);
        assert!(!device.borrow().is_powered());

        device.borrow_mut().set_lux(900.0);
        let readings = sensor.measure(&mut delay).unwrap();
        assert!((readings.lux - 900.0).abs() < 1.0);
        assert!(device.borrow().is_powered());
        assert_eq!(sensor.state(), Bh1750State::ModeSet);
    }
}
