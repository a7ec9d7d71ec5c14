//! Bit-banged single-wire bus.
//!
//! Drives an open-drain line with a pull-up: "low" actively pulls the line
//! down, "high" releases it. Slot timings are the standard-speed values from
//! Maxim application note 126. Each slot runs inside a critical section so an
//! interrupt cannot stretch it; the gap between slots may be interrupted
//! freely since the protocol has no maximum recovery time.
//!
//! Exactly one responder per line is assumed. There is no ROM search.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use log::trace;

use crate::error::BusError;

// Standard-speed slot timings in microseconds (AN126 A..J)
const WRITE_ONE_LOW_US: u32 = 6; // A
const WRITE_ONE_RELEASE_US: u32 = 64; // B
const WRITE_ZERO_LOW_US: u32 = 60; // C
const WRITE_ZERO_RELEASE_US: u32 = 10; // D
const READ_LOW_US: u32 = 6; // A
const READ_SAMPLE_US: u32 = 9; // E
const READ_RELEASE_US: u32 = 55; // F
const RESET_LOW_US: u32 = 480; // H
const PRESENCE_SAMPLE_US: u32 = 70; // I
const RESET_RELEASE_US: u32 = 410; // J

/// Single-wire master on one open-drain pin.
///
/// `D` must be a busy-waiting delay: a scheduler sleep cannot hold
/// microsecond slots.
pub struct OneWire<P, D> {
    pin: P,
    delay: D,
}

impl<P, D> OneWire<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    pub const fn new(pin: P, delay: D) -> Self {
        Self { pin, delay }
    }

    /// Release the line so the pull-up brings it to idle.
    pub fn release(&mut self) -> Result<(), BusError> {
        self.pin.set_high().map_err(|_| BusError::Io)
    }

    /// Issue a reset pulse and sample for a presence pulse.
    ///
    /// Returns `Ok(false)` when nothing answered. A line already held low
    /// before the reset is reported as [`BusError::BusBusy`].
    pub fn reset(&mut self) -> Result<bool, BusError> {
        let Self { pin, delay } = self;

        critical_section::with(|_| {
            if pin.is_low().map_err(|_| BusError::Io)? {
                return Err(BusError::BusBusy);
            }

            pin.set_low().map_err(|_| BusError::Io)?;
            delay.delay_us(RESET_LOW_US);
            pin.set_high().map_err(|_| BusError::Io)?;
            delay.delay_us(PRESENCE_SAMPLE_US);
            let present = pin.is_low().map_err(|_| BusError::Io)?;
            delay.delay_us(RESET_RELEASE_US);

            trace!("1-Wire reset, presence = {}", present);
            Ok(present)
        })
    }

    pub fn write_bit(&mut self, bit: bool) -> Result<(), BusError> {
        let Self { pin, delay } = self;

        critical_section::with(|_| {
            pin.set_low().map_err(|_| BusError::Io)?;
            if bit {
                delay.delay_us(WRITE_ONE_LOW_US);
                pin.set_high().map_err(|_| BusError::Io)?;
                delay.delay_us(WRITE_ONE_RELEASE_US);
            } else {
                delay.delay_us(WRITE_ZERO_LOW_US);
                pin.set_high().map_err(|_| BusError::Io)?;
                delay.delay_us(WRITE_ZERO_RELEASE_US);
            }
            Ok(())
        })
    }

    pub fn read_bit(&mut self) -> Result<bool, BusError> {
        let Self { pin, delay } = self;

        critical_section::with(|_| {
            pin.set_low().map_err(|_| BusError::Io)?;
            delay.delay_us(READ_LOW_US);
            pin.set_high().map_err(|_| BusError::Io)?;
            delay.delay_us(READ_SAMPLE_US);
            let bit = pin.is_high().map_err(|_| BusError::Io)?;
            delay.delay_us(READ_RELEASE_US);
            Ok(bit)
        })
    }

    /// Write a byte, least significant bit first.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), BusError> {
        for i in 0..8 {
            self.write_bit(byte & (1 << i) != 0)?;
        }
        Ok(())
    }

    /// Read a byte, least significant bit first.
    pub fn read_byte(&mut self) -> Result<u8, BusError> {
        let mut byte = 0u8;
        for i in 0..8 {
            if self.read_bit()? {
                byte |= 1 << i;
            }
        }
        Ok(byte)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        bytes.iter().try_for_each(|&b| self.write_byte(b))
    }

    pub fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<(), BusError> {
        for byte in buffer.iter_mut() {
            *byte = self.read_byte()?;
        }
        Ok(())
    }
}

/// Maxim/Dallas CRC-8 (polynomial x^8 + x^5 + x^4 + 1, reflected, init 0).
///
/// Running it over data followed by its own CRC yields zero.
pub fn crc8(bytes: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in bytes {
        let mut b = byte;
        for _ in 0..8 {
            let mix = (crc ^ b) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            b >>= 1;
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimClock, SimDelay, SimDs18b20, SimProbeLine};
    use core::cell::RefCell;

    #[test]
    fn test_crc8_reference_rom() {
        // Example ROM from Maxim AN27: family 0x02, serial 0x0000_0001_B81C
        let rom = [0x02, 0x1C, 0xB8, 0x01, 0x00, 0x00, 0x00];
        assert_eq!(crc8(&rom), 0xA2);
    }

    #[test]
    fn test_crc8_residue_is_zero() {
        let data = [0x91, 0x01, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10];
        let crc = crc8(&data);
        let mut framed = [0u8; 9];
        framed[..8].copy_from_slice(&data);
        framed[8] = crc;
        assert_eq!(crc8(&framed), 0);
    }

    #[test]
    fn test_reset_detects_presence() {
        let clock = SimClock::new();
        let device = RefCell::new(SimDs18b20::new());
        let mut wire = OneWire::new(SimProbeLine::new(&clock, &device), SimDelay::new(&clock));

        assert_eq!(wire.reset(), Ok(true));
        // Reset slot is 480 + 70 + 410 us
        assert_eq!(clock.now_micros(), 960);
    }

    #[test]
    fn test_reset_without_device() {
        let clock = SimClock::new();
        let device = RefCell::new(SimDs18b20::disconnected());
        let mut wire = OneWire::new(SimProbeLine::new(&clock, &device), SimDelay::new(&clock));

        assert_eq!(wire.reset(), Ok(false));
    }

    #[test]
    fn test_bytes_reach_device_lsb_first() {
        let clock = SimClock::new();
        let device = RefCell::new(SimDs18b20::new());
        let mut wire = OneWire::new(SimProbeLine::new(&clock, &device), SimDelay::new(&clock));

        assert_eq!(wire.reset(), Ok(true));
        wire.write_bytes(&[0xCC, 0x4E, 0x11, 0x22, 0x5F]).unwrap();

        let scratchpad = device.borrow().scratchpad();
        assert_eq!(&scratchpad[2..5], &[0x11, 0x22, 0x5F]);
    }

    #[test]
    fn test_read_scratchpad_bytes() {
        let clock = SimClock::new();
        let device = RefCell::new(SimDs18b20::new());
        device.borrow_mut().set_temperature(25.0625);
        let mut wire = OneWire::new(SimProbeLine::new(&clock, &device), SimDelay::new(&clock));

        wire.reset().unwrap();
        wire.write_bytes(&[0xCC, 0x44]).unwrap();
        clock.advance_ms(750);
        wire.reset().unwrap();
        wire.write_bytes(&[0xCC, 0xBE]).unwrap();
        let mut scratchpad = [0u8; 9];
        wire.read_bytes(&mut scratchpad).unwrap();

        assert_eq!(&scratchpad[..2], &[0x91, 0x01]);
        assert_eq!(crc8(&scratchpad), 0);
    }

    #[test]
    fn test_slot_timing() {
        let clock = SimClock::new();
        let device = RefCell::new(SimDs18b20::new());
        let mut wire = OneWire::new(SimProbeLine::new(&clock, &device), SimDelay::new(&clock));

        wire.write_bit(true).unwrap();
        assert_eq!(clock.now_micros(), 70);
        wire.write_bit(false).unwrap();
        assert_eq!(clock.now_micros(), 140);
        wire.read_bit().unwrap();
        assert_eq!(clock.now_micros(), 210);
    }
}
