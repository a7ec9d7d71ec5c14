//! AHT10 temperature and humidity sensor.
//!
//! Lifecycle: soft reset, calibration check, then triggered measurements.
//! Every measurement frame carries a fresh status byte, and the busy and
//! calibration bits are checked on each one.

use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};

use super::{Sensor, SensorKind, SensorLocation, SensorReading};
use crate::bus::I2cBus;
use crate::error::{ConfigError, ProtocolError, SensorError};

/// Address with the ADR pin low.
pub const ADDRESS_PRIMARY: u8 = 0x38;
/// Address with the ADR pin high.
pub const ADDRESS_SECONDARY: u8 = 0x39;

pub(crate) const CMD_SOFT_RESET: u8 = 0xBA;
pub(crate) const CMD_CALIBRATE: [u8; 3] = [0xE1, 0x08, 0x00];
pub(crate) const CMD_MEASURE: [u8; 3] = [0xAC, 0x33, 0x00];

pub(crate) const STATUS_BUSY: u8 = 1 << 7;
pub(crate) const STATUS_CALIBRATED: u8 = 1 << 3;

const RESET_DELAY_MS: u32 = 20;
const CALIBRATION_DELAY_MS: u32 = 10;
const MEASUREMENT_DELAY_MS: u32 = 80;

const FULL_SCALE: f32 = 1_048_576.0; // 2^20

const HUMIDITY_RANGE: (f32, f32) = (0.0, 100.0);
const TEMPERATURE_RANGE: (f32, f32) = (-50.0, 150.0);

/// Driver lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aht10State {
    Uninitialized,
    Reset,
    Calibrating,
    Ready,
    Measuring,
    DataReady,
}

/// Decoded status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aht10Status(pub u8);

impl Aht10Status {
    pub const fn busy(self) -> bool {
        self.0 & STATUS_BUSY != 0
    }

    pub const fn calibrated(self) -> bool {
        self.0 & STATUS_CALIBRATED != 0
    }
}

/// Typed readings from the AHT10.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aht10Readings {
    pub temperature_celsius: f32,
    pub humidity_percent: f32,
}

impl From<Aht10Readings> for SensorReading {
    fn from(value: Aht10Readings) -> Self {
        SensorReading::valid(SensorKind::ComboTH)
            .with_temperature(value.temperature_celsius)
            .with_humidity(value.humidity_percent)
    }
}

/// Decode a six-byte measurement frame.
///
/// Humidity is the 20 bits spanning bytes 1..=3 (high nibble of byte 3),
/// temperature the 20 bits spanning bytes 3..=5 (low nibble of byte 3).
pub fn decode_measurement(frame: &[u8; 6]) -> Result<Aht10Readings, ProtocolError> {
    let status = Aht10Status(frame[0]);
    if status.busy() {
        return Err(ProtocolError::Busy);
    }
    if !status.calibrated() {
        return Err(ProtocolError::NotCalibrated);
    }

    let raw_humidity =
        (u32::from(frame[1]) << 12) | (u32::from(frame[2]) << 4) | (u32::from(frame[3]) >> 4);
    let raw_temperature =
        ((u32::from(frame[3]) & 0x0F) << 16) | (u32::from(frame[4]) << 8) | u32::from(frame[5]);

    let humidity_percent = raw_humidity as f32 / FULL_SCALE * 100.0;
    let temperature_celsius = raw_temperature as f32 / FULL_SCALE * 200.0 - 50.0;

    if !(HUMIDITY_RANGE.0..=HUMIDITY_RANGE.1).contains(&humidity_percent)
        || !(TEMPERATURE_RANGE.0..=TEMPERATURE_RANGE.1).contains(&temperature_celsius)
    {
        return Err(ProtocolError::InvalidReading);
    }

    Ok(Aht10Readings {
        temperature_celsius,
        humidity_percent,
    })
}

pub struct Aht10<B> {
    bus: B,
    address: u8,
    state: Aht10State,
}

impl<B: I2cBus> Aht10<B> {
    pub const fn new(bus: B, address: u8) -> Self {
        Self {
            bus,
            address,
            state: Aht10State::Uninitialized,
        }
    }

    pub const fn address(&self) -> u8 {
        self.address
    }

    pub const fn state(&self) -> Aht10State {
        self.state
    }

    /// Send the soft-reset command. The device needs ~20 ms afterwards.
    pub fn soft_reset(&mut self) -> Result<(), SensorError> {
        self.bus.write(self.address, &[CMD_SOFT_RESET])?;
        self.state = Aht10State::Reset;
        Ok(())
    }

    pub fn read_status(&mut self) -> Result<Aht10Status, SensorError> {
        let mut status = [0u8; 1];
        self.bus.read(self.address, &mut status)?;
        Ok(Aht10Status(status[0]))
    }

    /// Reset the device and make sure it reports calibration.
    pub fn initialize(&mut self, delay: &mut impl DelayNs) -> Result<(), SensorError> {
        self.state = Aht10State::Uninitialized;

        self.soft_reset().inspect_err(|e| {
            error!("AHT10 0x{:02X} soft reset failed: {}", self.address, e);
        })?;
        delay.delay_ms(RESET_DELAY_MS);

        if !self.read_status()?.calibrated() {
            info!("AHT10 0x{:02X} not calibrated, sending calibrate command", self.address);
            self.state = Aht10State::Calibrating;
            self.bus.write(self.address, &CMD_CALIBRATE)?;
            delay.delay_ms(CALIBRATION_DELAY_MS);

            if !self.read_status()?.calibrated() {
                error!("AHT10 0x{:02X} did not accept calibration", self.address);
                self.state = Aht10State::Uninitialized;
                return Err(ProtocolError::NotCalibrated.into());
            }
        }

        self.state = Aht10State::Ready;
        info!("AHT10 0x{:02X} initialized", self.address);
        Ok(())
    }

    /// Trigger a measurement, wait for it and decode the frame.
    pub fn measure(&mut self, delay: &mut impl DelayNs) -> Result<Aht10Readings, SensorError> {
        if !matches!(self.state, Aht10State::Ready | Aht10State::DataReady) {
            return Err(ConfigError::InvalidState("AHT10 not initialized").into());
        }

        self.bus.write(self.address, &CMD_MEASURE)?;
        self.state = Aht10State::Measuring;
        delay.delay_ms(MEASUREMENT_DELAY_MS);

        let mut frame = [0u8; 6];
        let result = self.bus.read(self.address, &mut frame);
        // Whatever happens the device is idle again for the next trigger.
        self.state = Aht10State::Ready;
        result?;

        let readings = decode_measurement(&frame).map_err(|e| {
            warn!("AHT10 0x{:02X} rejected frame {:02X?}: {}", self.address, frame, e);
            if e == ProtocolError::NotCalibrated {
                self.state = Aht10State::Uninitialized;
            }
            e
        })?;

        self.state = Aht10State::DataReady;
        debug!(
            "AHT10 0x{:02X}: {:.2} C, {:.2} %",
            self.address, readings.temperature_celsius, readings.humidity_percent
        );
        Ok(readings)
    }
}

impl<B: I2cBus, D: DelayNs> Sensor<D> for Aht10<B> {
    fn kind(&self) -> SensorKind {
        SensorKind::ComboTH
    }

    fn location(&self) -> Option<SensorLocation> {
        Some(SensorLocation::I2c {
            address: self.address,
        })
    }

    fn initialize(&mut self, delay: &mut D) -> Result<(), SensorError> {
        Aht10::initialize(self, delay)
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
    use crate::error::BusError;
    use crate::sim::{SimAht10, SimClock, SimDelay, SimI2cBus};
    use core::cell::RefCell;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn test_decode_reference_frame() {
        // Status 0x08: idle and calibrated. Humidity raw 0, temperature raw 0x08000.
        let frame = [0x08, 0x00, 0x00, 0x00, 0x80, 0x00];
        let readings = decode_measurement(&frame).unwrap();

        assert!(close(readings.humidity_percent, 0.0));
        assert!(close(readings.temperature_celsius, -43.75));
    }

    #[test]
    fn test_decode_status_bits() {
        assert_eq!(
            decode_measurement(&[0x88, 0x80, 0x00, 0x05, 0x00, 0x00]),
            Err(ProtocolError::Busy)
        );
        assert_eq!(
            decode_measurement(&[0x00, 0x80, 0x00, 0x05, 0x00, 0x00]),
            Err(ProtocolError::NotCalibrated)
        );
    }

    #[test]
    fn test_decode_full_scale_stays_in_range() {
        let readings = decode_measurement(&[0x08, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]).unwrap();

        assert!(readings.humidity_percent < 100.0);
        assert!(readings.temperature_celsius < 150.0);
    }

    #[test]
    fn test_initialize_sends_calibration_when_needed() {
        let mut bus = ScriptedBus::new();
        bus.ok() // reset
            .respond(&[0x00]) // not calibrated
            .ok() // calibrate
            .respond(&[0x08]); // calibrated
        let clock = SimClock::new();
        let mut delay = SimDelay::new(&clock);
        let mut sensor = Aht10::new(&mut bus, ADDRESS_PRIMARY);

        sensor.initialize(&mut delay).unwrap();
        assert_eq!(sensor.state(), Aht10State::Ready);
        drop(sensor);

        let writes: heapless::Vec<&[u8], 4> = bus.writes().collect();
        assert_eq!(writes.as_slice(), &[&[CMD_SOFT_RESET][..], &CMD_CALIBRATE[..]]);
        assert_eq!(clock.now_micros(), 30_000);
    }

    #[test]
    fn test_initialize_fails_when_calibration_refused() {
        let mut bus = ScriptedBus::new();
        bus.ok().respond(&[0x00]).ok().respond(&[0x00]);
        let clock = SimClock::new();
        let mut delay = SimDelay::new(&clock);
        let mut sensor = Aht10::new(&mut bus, ADDRESS_PRIMARY);

        assert_eq!(
            sensor.initialize(&mut delay),
            Err(SensorError::Protocol(ProtocolError::NotCalibrated))
        );
        assert_eq!(sensor.state(), Aht10State::Uninitialized);
    }

    #[test]
    fn test_measure_requires_initialization() {
        let mut bus = ScriptedBus::new();
        let clock = SimClock::new();
        let mut delay = SimDelay::new(&clock);
        let mut sensor = Aht10::new(&mut bus, ADDRESS_PRIMARY);

        assert!(matches!(
            sensor.measure(&mut delay),
            Err(SensorError::Config(ConfigError::InvalidState(_)))
        ));
    }

    #[test]
    fn test_measure_propagates_bus_timeout() {
        let mut bus = ScriptedBus::new();
        bus.ok().respond(&[0x08]).fail(BusError::Timeout);
        let clock = SimClock::new();
        let mut delay = SimDelay::new(&clock);
        let mut sensor = Aht10::new(&mut bus, ADDRESS_PRIMARY);

        sensor.initialize(&mut delay).unwrap();
        assert_eq!(
            sensor.measure(&mut delay),
            Err(SensorError::Bus(BusError::Timeout))
        );
        assert_eq!(sensor.state(), Aht10State::Ready);
    }

    #[test]
    fn test_measure_against_simulated_device() {
        let clock = SimClock::new();
        let device = RefCell::new(
            SimAht10::new(ADDRESS_PRIMARY)
                .uncalibrated()
                .with_conditions(23.4, 61.0),
        );
        let mut sim = SimI2cBus::new(&clock);
        sim.attach(&device);
        let bus = shared_bus(sim);
        let mut delay = SimDelay::new(&clock);
        let mut sensor = Aht10::new(I2cExecutor::new(&bus, &clock), ADDRESS_PRIMARY);

        sensor.initialize(&mut delay).unwrap();
        assert!(device.borrow().is_calibrated());

        let readings = sensor.measure(&mut delay).unwrap();
        assert!(close(readings.temperature_celsius, 23.4));
        assert!(close(readings.humidity_percent, 61.0));
        assert_eq!(sensor.state(), Aht10State::DataReady);
    }

    #[test]
    fn test_refused_calibration_against_simulated_device() {
        let clock = SimClock::new();
        let device = RefCell::new(
            SimAht10::new(ADDRESS_PRIMARY)
                .uncalibrated()
                .refusing_calibration(),
        );
        let mut sim = SimI2cBus::new(&clock);
        sim.attach(&device);
        let bus = shared_bus(sim);
        let mut delay = SimDelay::new(&clock);
        let mut sensor = Aht10::new(I2cExecutor::new(&bus, &clock), ADDRESS_PRIMARY);

        assert_eq!(
            sensor.initialize(&mut delay),
            Err(SensorError::Protocol(ProtocolError::NotCalibrated))
        );
        assert!(!device.borrow().is_calibrated());
        assert_eq!(sensor.state(), Aht10State::Uninitialized);
    }

    #[test]
    fn test_stuck_busy_device_reports_busy() {
        let clock = SimClock::new();
        let device = RefCell::new(SimAht10::new(ADDRESS_SECONDARY));
        let mut sim = SimI2cBus::new(&clock);
        sim.attach(&device);
        let bus = shared_bus(sim);
        let mut delay = SimDelay::new(&clock);
        let mut sensor = Aht10::new(I2cExecutor::new(&bus, &clock), ADDRESS_SECONDARY);

        sensor.initialize(&mut delay).unwrap();
        device.borrow_mut().set_stuck_busy(true);

        assert_eq!(
            Sensor::read(&mut sensor, &mut delay),
            Err(SensorError::Protocol(ProtocolError::Busy))
        );
    }
}
