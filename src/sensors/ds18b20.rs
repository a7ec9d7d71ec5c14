//! DS18B20 waterproof temperature probe on a single-wire line.
//!
//! One probe per line, addressed with skip-ROM. Every scratchpad read is
//! CRC-checked before any value is decoded.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use log::{debug, info, warn};

use super::{Sensor, SensorKind, SensorReading};
use crate::bus::{OneWire, crc8};
use crate::error::{ConfigError, ProtocolError, SensorError};

pub(crate) const CMD_SKIP_ROM: u8 = 0xCC;
pub(crate) const CMD_READ_ROM: u8 = 0x33;
pub(crate) const CMD_CONVERT: u8 = 0x44;
pub(crate) const CMD_READ_SCRATCHPAD: u8 = 0xBE;
pub(crate) const CMD_WRITE_SCRATCHPAD: u8 = 0x4E;
pub(crate) const CMD_COPY_SCRATCHPAD: u8 = 0x48;
pub(crate) const CMD_RECALL_EEPROM: u8 = 0xB8;

/// Family code every DS18B20 ROM starts with.
pub const FAMILY_CODE: u8 = 0x28;

const EEPROM_WRITE_MS: u32 = 10;
/// Reserved configuration bits, always read back as 1.
const CONFIG_RESERVED: u8 = 0x1F;
const TEMPERATURE_RANGE: (f32, f32) = (-55.0, 125.0);

/// Conversion resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    Bits9,
    Bits10,
    Bits11,
    #[default]
    Bits12,
}

impl Resolution {
    pub const fn from_bits(bits: u8) -> Result<Self, ConfigError> {
        match bits {
            9 => Ok(Self::Bits9),
            10 => Ok(Self::Bits10),
            11 => Ok(Self::Bits11),
            12 => Ok(Self::Bits12),
            _ => Err(ConfigError::InvalidArgument("resolution must be 9 to 12 bits")),
        }
    }

    /// Decode bits 5..=6 of the configuration register.
    pub const fn from_config(config: u8) -> Self {
        match (config >> 5) & 0x03 {
            0 => Self::Bits9,
            1 => Self::Bits10,
            2 => Self::Bits11,
            _ => Self::Bits12,
        }
    }

    pub const fn bits(self) -> u8 {
        match self {
            Self::Bits9 => 9,
            Self::Bits10 => 10,
            Self::Bits11 => 11,
            Self::Bits12 => 12,
        }
    }

    /// Configuration register value; the low five bits always read as 1.
    pub const fn config_byte(self) -> u8 {
        ((self.bits() - 9) << 5) | 0x1F
    }

    /// Maximum conversion time.
    pub const fn conversion_time_ms(self) -> u32 {
        match self {
            Self::Bits9 => 94,
            Self::Bits10 => 188,
            Self::Bits11 => 375,
            Self::Bits12 => 750,
        }
    }

    /// Mask clearing the low bits that are undefined at this resolution.
    pub const fn raw_mask(self) -> i16 {
        match self {
            Self::Bits9 => !0x07,
            Self::Bits10 => !0x03,
            Self::Bits11 => !0x01,
            Self::Bits12 => !0x00,
        }
    }
}

/// Typed readings from the DS18B20.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ds18b20Readings {
    pub temperature_celsius: f32,
}

impl From<Ds18b20Readings> for SensorReading {
    fn from(value: Ds18b20Readings) -> Self {
        SensorReading::valid(SensorKind::Probe).with_temperature(value.temperature_celsius)
    }
}

/// Check the CRC and the reserved configuration bits of a scratchpad.
///
/// A line held low reads as all zeros, which the CRC alone accepts; the
/// reserved bits catch it.
fn check_scratchpad(scratchpad: &[u8; 9]) -> Result<(), ProtocolError> {
    if crc8(&scratchpad[..8]) != scratchpad[8] {
        return Err(ProtocolError::CrcMismatch);
    }
    if scratchpad[4] & CONFIG_RESERVED != CONFIG_RESERVED {
        return Err(ProtocolError::InvalidReading);
    }
    Ok(())
}

/// Validate and decode a nine-byte scratchpad.
///
/// Bytes 0..8 are covered by the CRC in byte 8. Bytes 0 and 1 hold the
/// temperature as a signed little-endian count of 1/16 °C.
pub fn decode_scratchpad(
    scratchpad: &[u8; 9],
    resolution: Resolution,
) -> Result<Ds18b20Readings, ProtocolError> {
    check_scratchpad(scratchpad)?;

    let raw = i16::from_le_bytes([scratchpad[0], scratchpad[1]]) & resolution.raw_mask();
    let temperature_celsius = f32::from(raw) * 0.0625;

    if !(TEMPERATURE_RANGE.0..=TEMPERATURE_RANGE.1).contains(&temperature_celsius) {
        return Err(ProtocolError::InvalidReading);
    }

    Ok(Ds18b20Readings {
        temperature_celsius,
    })
}

pub struct Ds18b20<P, D> {
    wire: OneWire<P, D>,
    resolution: Resolution,
    initialized: bool,
}

impl<P, D> Ds18b20<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    pub const fn new(wire: OneWire<P, D>) -> Self {
        Self {
            wire,
            resolution: Resolution::Bits12,
            initialized: false,
        }
    }

    /// Resolution assumed when decoding and waiting for conversions.
    pub const fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Release the line and check that a probe answers the reset.
    pub fn initialize(&mut self) -> Result<(), SensorError> {
        self.initialized = false;
        self.wire.release()?;
        if !self.wire.reset()? {
            warn!("DS18B20: no presence pulse");
            return Err(ProtocolError::DeviceNotFound.into());
        }

        // Pick up whatever resolution the probe restored from EEPROM.
        self.resolution = self.read_resolution()?;
        self.initialized = true;
        info!("DS18B20 initialized, {}-bit resolution", self.resolution.bits());
        Ok(())
    }

    /// Whether a probe currently answers on the line.
    pub fn is_present(&mut self) -> bool {
        self.wire.reset().unwrap_or(false)
    }

    fn select(&mut self) -> Result<(), SensorError> {
        if !self.wire.reset()? {
            return Err(ProtocolError::DeviceNotFound.into());
        }
        self.wire.write_byte(CMD_SKIP_ROM)?;
        Ok(())
    }

    /// Read the 64-bit ROM code: family, 48-bit serial, CRC.
    pub fn read_rom(&mut self) -> Result<[u8; 8], SensorError> {
        if !self.wire.reset()? {
            return Err(ProtocolError::DeviceNotFound.into());
        }
        self.wire.write_byte(CMD_READ_ROM)?;
        let mut rom = [0u8; 8];
        self.wire.read_bytes(&mut rom)?;
        if crc8(&rom[..7]) != rom[7] {
            return Err(ProtocolError::CrcMismatch.into());
        }
        Ok(rom)
    }

    /// Read and validate the scratchpad.
    pub fn read_scratchpad(&mut self) -> Result<[u8; 9], SensorError> {
        self.select()?;
        self.wire.write_byte(CMD_READ_SCRATCHPAD)?;
        let mut scratchpad = [0u8; 9];
        self.wire.read_bytes(&mut scratchpad)?;
        check_scratchpad(&scratchpad).inspect_err(|e| {
            warn!("DS18B20 rejected scratchpad {:02X?}: {}", scratchpad, e);
        })?;
        Ok(scratchpad)
    }

    /// Resolution from the probe's configuration register.
    pub fn read_resolution(&mut self) -> Result<Resolution, SensorError> {
        let scratchpad = self.read_scratchpad()?;
        Ok(Resolution::from_config(scratchpad[4]))
    }

    /// Start a conversion, wait it out and decode the result.
    ///
    /// `delay` only covers the conversion wait and may yield; slot timing
    /// uses the line's own busy-wait delay.
    pub fn measure(&mut self, delay: &mut impl DelayNs) -> Result<Ds18b20Readings, SensorError> {
        if !self.initialized {
            return Err(ConfigError::InvalidState("DS18B20 not initialized").into());
        }

        self.select()?;
        self.wire.write_byte(CMD_CONVERT)?;
        delay.delay_ms(self.resolution.conversion_time_ms());

        let scratchpad = self.read_scratchpad()?;
        let readings = decode_scratchpad(&scratchpad, self.resolution)?;
        debug!("DS18B20: {:.4} C", readings.temperature_celsius);
        Ok(readings)
    }

    /// Change the resolution and persist it to EEPROM.
    ///
    /// The alarm registers are read back first so they survive the write.
    pub fn set_resolution(&mut self, bits: u8, delay: &mut impl DelayNs) -> Result<(), SensorError> {
        let resolution = Resolution::from_bits(bits)?;
        let scratchpad = self.read_scratchpad()?;

        self.select()?;
        self.wire.write_bytes(&[
            CMD_WRITE_SCRATCHPAD,
            scratchpad[2],
            scratchpad[3],
            resolution.config_byte(),
        ])?;

        self.select()?;
        self.wire.write_byte(CMD_COPY_SCRATCHPAD)?;
        delay.delay_ms(EEPROM_WRITE_MS);

        self.resolution = resolution;
        info!("DS18B20 resolution set to {} bits", bits);
        Ok(())
    }

    /// Reload the alarm and configuration registers from EEPROM.
    pub fn recall_eeprom(&mut self) -> Result<(), SensorError> {
        self.select()?;
        self.wire.write_byte(CMD_RECALL_EEPROM)?;
        self.resolution = self.read_resolution()?;
        Ok(())
    }
}

impl<P, DL, D> Sensor<D> for Ds18b20<P, DL>
where
    P: InputPin + OutputPin,
    DL: DelayNs,
    D: DelayNs,
{
    fn kind(&self) -> SensorKind {
        SensorKind::Probe
    }

    fn initialize(&mut self, _delay: &mut D) -> Result<(), SensorError> {
        Ds18b20::initialize(self)
    }

    fn read(&mut self, delay: &mut D) -> Result<SensorReading, SensorError> {
        let result = self.measure(delay);
        if let Err(SensorError::Protocol(ProtocolError::DeviceNotFound)) = result {
            self.initialized = false;
        }
        result.map(SensorReading::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimClock, SimDelay, SimDs18b20, SimProbeLine};
    use core::cell::RefCell;

    fn probe_on<'a>(
        clock: &'a SimClock,
        device: &'a RefCell<SimDs18b20>,
    ) -> Ds18b20<SimProbeLine<'a>, SimDelay<'a>> {
        Ds18b20::new(OneWire::new(SimProbeLine::new(clock, device), SimDelay::new(clock)))
    }

    fn scratchpad_with(lsb: u8, msb: u8) -> [u8; 9] {
        let mut bytes = [lsb, msb, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10, 0];
        bytes[8] = crc8(&bytes[..8]);
        bytes
    }

    #[test]
    fn test_decode_reference_value() {
        let readings = decode_scratchpad(&scratchpad_with(0x91, 0x01), Resolution::Bits12).unwrap();
        assert_eq!(readings.temperature_celsius, 25.0625);
    }

    #[test]
    fn test_decode_negative_value() {
        // 0xFF5E is -10.125 C
        let readings = decode_scratchpad(&scratchpad_with(0x5E, 0xFF), Resolution::Bits12).unwrap();
        assert_eq!(readings.temperature_celsius, -10.125);
    }

    #[test]
    fn test_decode_tampered_crc() {
        let mut bytes = scratchpad_with(0x91, 0x01);
        bytes[8] ^= 0x01;
        assert_eq!(
            decode_scratchpad(&bytes, Resolution::Bits12),
            Err(ProtocolError::CrcMismatch)
        );
    }

    #[test]
    fn test_decode_rejects_stuck_low_frame() {
        // All zeros passes the CRC but has the reserved config bits clear.
        assert_eq!(
            decode_scratchpad(&[0u8; 9], Resolution::Bits12),
            Err(ProtocolError::InvalidReading)
        );
    }

    #[test]
    fn test_decode_masks_undefined_bits() {
        // At 9 bits the three low bits are undefined.
        let readings = decode_scratchpad(&scratchpad_with(0x97, 0x01), Resolution::Bits9).unwrap();
        assert_eq!(readings.temperature_celsius, 25.0);
    }

    #[test]
    fn test_resolution_encoding() {
        assert_eq!(Resolution::Bits9.config_byte(), 0x1F);
        assert_eq!(Resolution::Bits12.config_byte(), 0x7F);
        assert_eq!(Resolution::from_config(0x3F), Resolution::Bits10);
        assert!(Resolution::from_bits(13).is_err());
        assert_eq!(Resolution::Bits10.conversion_time_ms(), 188);
    }

    #[test]
    fn test_initialize_without_probe() {
        let clock = SimClock::new();
        let device = RefCell::new(SimDs18b20::disconnected());
        let mut probe = probe_on(&clock, &device);

        assert_eq!(
            probe.initialize(),
            Err(SensorError::Protocol(ProtocolError::DeviceNotFound))
        );
        assert!(!probe.is_present());
    }

    #[test]
    fn test_measure_waits_for_conversion() {
        let clock = SimClock::new();
        let device = RefCell::new(SimDs18b20::new());
        device.borrow_mut().set_temperature(18.5);
        let mut delay = SimDelay::new(&clock);
        let mut probe = probe_on(&clock, &device);

        probe.initialize().unwrap();
        let before = clock.now_micros();
        let readings = probe.measure(&mut delay).unwrap();

        assert_eq!(readings.temperature_celsius, 18.5);
        assert!(clock.now_micros() - before >= 750_000);
    }

    #[test]
    fn test_measure_reports_corrupted_scratchpad() {
        let clock = SimClock::new();
        let device = RefCell::new(SimDs18b20::new());
        let mut delay = SimDelay::new(&clock);
        let mut probe = probe_on(&clock, &device);

        probe.initialize().unwrap();
        device.borrow_mut().set_corrupt_crc(true);

        assert_eq!(
            probe.measure(&mut delay),
            Err(SensorError::Protocol(ProtocolError::CrcMismatch))
        );
    }

    #[test]
    fn test_set_resolution_preserves_alarm_bytes() {
        let clock = SimClock::new();
        let device = RefCell::new(SimDs18b20::new());
        let mut delay = SimDelay::new(&clock);
        let mut probe = probe_on(&clock, &device);

        probe.initialize().unwrap();
        probe.set_resolution(10, &mut delay).unwrap();

        assert_eq!(device.borrow().eeprom(), [0x4B, 0x46, 0x3F]);
        assert_eq!(probe.read_resolution(), Ok(Resolution::Bits10));

        // A 10-bit conversion only needs 188 ms.
        device.borrow_mut().set_temperature(21.3);
        let before = clock.now_micros();
        let readings = probe.measure(&mut delay).unwrap();
        assert!(clock.now_micros() - before < 250_000);
        assert_eq!(readings.temperature_celsius, 21.25);
    }

    #[test]
    fn test_recall_eeprom_discards_unsaved_write() {
        let clock = SimClock::new();
        let device = RefCell::new(SimDs18b20::new());
        let mut probe = probe_on(&clock, &device);

        probe.initialize().unwrap();
        probe.select().unwrap();
        probe
            .wire
            .write_bytes(&[CMD_WRITE_SCRATCHPAD, 0x11, 0x22, Resolution::Bits9.config_byte()])
            .unwrap();
        assert_eq!(probe.read_resolution(), Ok(Resolution::Bits9));
        assert_eq!(device.borrow().eeprom(), [0x4B, 0x46, 0x7F]);

        probe.recall_eeprom().unwrap();
        assert_eq!(probe.resolution(), Resolution::Bits12);
        assert_eq!(&device.borrow().scratchpad()[2..5], &[0x4B, 0x46, 0x7F]);
    }

    #[test]
    fn test_read_rom() {
        let clock = SimClock::new();
        let device = RefCell::new(SimDs18b20::new());
        let mut probe = probe_on(&clock, &device);

        let rom = probe.read_rom().unwrap();
        assert_eq!(rom[0], FAMILY_CODE);
        assert_eq!(rom, device.borrow().rom());
    }
}
