//! Simulated single-wire line with one temperature probe attached.
//!
//! The probe decodes master slots purely from edge timing, the way the real
//! part samples the line: a low pulse of 480 us or more is a reset, a short
//! low pulse is a 1 bit and a long one a 0 bit. When transmitting, each
//! falling edge starts a read slot and the probe holds the line low for a 0.

use core::cell::RefCell;
use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use super::SimClock;
use crate::bus::crc8;
use crate::sensors::ds18b20::{self, Resolution};

const PRESENCE_DELAY_US: u64 = 15;
const PRESENCE_WIDTH_US: u64 = 120;
const RESET_MIN_US: u64 = 480;
const WRITE_ONE_MAX_US: u64 = 15;
const READ_ZERO_HOLD_US: u64 = 30;

const FAMILY_CODE: u8 = 0x28;
const SERIAL: [u8; 6] = [0x8A, 0x2F, 0x41, 0x0B, 0x00, 0x00];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Rom,
    Function,
    WriteScratchpad(usize),
    Transmit,
}

/// Temperature probe model.
#[derive(Debug)]
pub struct SimDs18b20 {
    connected: bool,
    temperature: f32,
    corrupt_crc: bool,
    /// Bytes 0..8; the CRC is computed when transmitted.
    scratchpad: [u8; 8],
    /// TH, TL and configuration.
    eeprom: [u8; 3],
    pending: Option<(u64, i16)>,

    phase: Phase,
    rx_byte: u8,
    rx_bits: u8,
    tx: heapless::Vec<u8, 9>,
    tx_bit: usize,

    master_low: bool,
    fell_at: u64,
    presence: Option<(u64, u64)>,
    hold_low_until: u64,
}

impl Default for SimDs18b20 {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDs18b20 {
    /// Probe in its power-on state: 85 °C in the scratchpad, 12-bit.
    pub fn new() -> Self {
        Self {
            connected: true,
            temperature: 21.0,
            corrupt_crc: false,
            scratchpad: [0x50, 0x05, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10],
            eeprom: [0x4B, 0x46, 0x7F],
            pending: None,
            phase: Phase::Idle,
            rx_byte: 0,
            rx_bits: 0,
            tx: heapless::Vec::new(),
            tx_bit: 0,
            master_low: false,
            fell_at: 0,
            presence: None,
            hold_low_until: 0,
        }
    }

    /// A line with nothing attached.
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            ..Self::new()
        }
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn set_temperature(&mut self, celsius: f32) {
        self.temperature = celsius;
    }

    /// Flip the CRC byte of every scratchpad transmitted from now on.
    pub fn set_corrupt_crc(&mut self, corrupt: bool) {
        self.corrupt_crc = corrupt;
    }

    /// Current scratchpad including a valid CRC.
    pub fn scratchpad(&self) -> [u8; 9] {
        let mut bytes = [0u8; 9];
        bytes[..8].copy_from_slice(&self.scratchpad);
        bytes[8] = crc8(&self.scratchpad);
        bytes
    }

    /// TH, TL and configuration as last copied to EEPROM.
    pub const fn eeprom(&self) -> [u8; 3] {
        self.eeprom
    }

    pub fn rom(&self) -> [u8; 8] {
        let mut rom = [0u8; 8];
        rom[0] = FAMILY_CODE;
        rom[1..7].copy_from_slice(&SERIAL);
        rom[7] = crc8(&rom[..7]);
        rom
    }

    fn resolution(&self) -> Resolution {
        Resolution::from_config(self.scratchpad[4])
    }

    fn encode(&self) -> i16 {
        let scaled = self.temperature * 16.0;
        let rounded = if scaled >= 0.0 { scaled + 0.5 } else { scaled - 0.5 };
        let raw = rounded as i16;
        raw & self.resolution().raw_mask()
    }

    fn falling_edge(&mut self, now: u64) {
        self.master_low = true;
        self.fell_at = now;

        if self.phase == Phase::Transmit {
            let byte = self.tx.get(self.tx_bit / 8).copied().unwrap_or(0xFF);
            let bit = (byte >> (self.tx_bit % 8)) & 1;
            if bit == 0 {
                self.hold_low_until = now + READ_ZERO_HOLD_US;
            }
            self.tx_bit += 1;
            if self.tx_bit >= self.tx.len() * 8 {
                self.phase = Phase::Idle;
            }
        }
    }

    fn rising_edge(&mut self, now: u64) {
        if !self.master_low {
            return;
        }
        self.master_low = false;
        let low_for = now.saturating_sub(self.fell_at);

        if low_for >= RESET_MIN_US {
            self.rx_bits = 0;
            self.rx_byte = 0;
            self.tx.clear();
            if self.connected {
                let from = now + PRESENCE_DELAY_US;
                self.presence = Some((from, from + PRESENCE_WIDTH_US));
                self.phase = Phase::Rom;
            } else {
                self.phase = Phase::Idle;
            }
            return;
        }

        if matches!(self.phase, Phase::Idle | Phase::Transmit) {
            return;
        }
        if low_for < WRITE_ONE_MAX_US {
            self.rx_byte |= 1 << self.rx_bits;
        }
        self.rx_bits += 1;
        if self.rx_bits == 8 {
            let byte = self.rx_byte;
            self.rx_byte = 0;
            self.rx_bits = 0;
            self.receive(byte, now);
        }
    }

    fn line_low(&self, now: u64) -> bool {
        if self.master_low || now < self.hold_low_until {
            return true;
        }
        matches!(self.presence, Some((from, until)) if (from..until).contains(&now))
    }

    fn receive(&mut self, byte: u8, now: u64) {
        self.phase = match self.phase {
            Phase::Rom => match byte {
                ds18b20::CMD_SKIP_ROM => Phase::Function,
                ds18b20::CMD_READ_ROM => {
                    let rom = self.rom();
                    self.start_transmit(&rom)
                }
                _ => Phase::Idle,
            },
            Phase::Function => match byte {
                ds18b20::CMD_CONVERT => {
                    let ready = now + u64::from(self.resolution().conversion_time_ms()) * 1000;
                    self.pending = Some((ready, self.encode()));
                    Phase::Idle
                }
                ds18b20::CMD_READ_SCRATCHPAD => {
                    self.commit_conversion(now);
                    let mut bytes = self.scratchpad();
                    if self.corrupt_crc {
                        bytes[8] ^= 0xFF;
                    }
                    self.start_transmit(&bytes)
                }
                ds18b20::CMD_WRITE_SCRATCHPAD => Phase::WriteScratchpad(0),
                ds18b20::CMD_COPY_SCRATCHPAD => {
                    self.eeprom.copy_from_slice(&self.scratchpad[2..5]);
                    Phase::Idle
                }
                ds18b20::CMD_RECALL_EEPROM => {
                    self.scratchpad[2..5].copy_from_slice(&self.eeprom);
                    Phase::Idle
                }
                _ => Phase::Idle,
            },
            Phase::WriteScratchpad(index) => {
                self.scratchpad[2 + index] = if index == 2 {
                    // Only the resolution bits of the config register are writable.
                    (byte & 0x60) | 0x1F
                } else {
                    byte
                };
                if index == 2 { Phase::Idle } else { Phase::WriteScratchpad(index + 1) }
            }
            Phase::Idle | Phase::Transmit => Phase::Idle,
        };
    }

    fn commit_conversion(&mut self, now: u64) {
        if let Some((ready, raw)) = self.pending {
            if now >= ready {
                self.scratchpad[..2].copy_from_slice(&raw.to_le_bytes());
                self.pending = None;
            }
        }
    }

    fn start_transmit(&mut self, bytes: &[u8]) -> Phase {
        self.tx.clear();
        let _ = self.tx.extend_from_slice(bytes);
        self.tx_bit = 0;
        Phase::Transmit
    }
}

/// Open-drain pin wired to a [`SimDs18b20`].
pub struct SimProbeLine<'a> {
    clock: &'a SimClock,
    device: &'a RefCell<SimDs18b20>,
}

impl<'a> SimProbeLine<'a> {
    pub const fn new(clock: &'a SimClock, device: &'a RefCell<SimDs18b20>) -> Self {
        Self { clock, device }
    }
}

impl ErrorType for SimProbeLine<'_> {
    type Error = Infallible;
}

impl OutputPin for SimProbeLine<'_> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let now = self.clock.now_micros();
        let mut device = self.device.borrow_mut();
        if !device.master_low {
            device.falling_edge(now);
        }
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let now = self.clock.now_micros();
        self.device.borrow_mut().rising_edge(now);
        Ok(())
    }
}

impl InputPin for SimProbeLine<'_> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.device.borrow().line_low(self.clock.now_micros()))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.device.borrow().line_low(self.clock.now_micros()))
    }
}
