//! Bus transaction primitives.
//!
//! [`I2cBus`] is the seam every I2C driver talks through. The production
//! implementation is [`i2c::I2cExecutor`], which serializes transactions over a
//! shared embedded-hal bus; tests inject scripted buses instead.
//! The single-wire executor lives in [`onewire`].

pub mod i2c;
pub mod onewire;

use core::ops::RangeInclusive;

use crate::error::BusError;

pub use i2c::{I2cExecutor, SharedI2cBus};
pub use onewire::{OneWire, crc8};

/// Addresses a scan can report. Sized for the whole 7-bit space.
pub type ScanResult = heapless::Vec<u8, 128>;

/// Non-reserved 7-bit addresses.
pub const DEFAULT_SCAN_RANGE: RangeInclusive<u8> = 0x08..=0x77;

/// Direction of a [`BusTransaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Write,
    Read,
    WriteRead,
}

/// Data phase of a [`BusTransaction`].
#[derive(Debug)]
pub enum Transfer<'b> {
    Write(&'b [u8]),
    Read(&'b mut [u8]),
    /// Write phase, repeated start, then read phase.
    WriteRead(&'b [u8], &'b mut [u8]),
}

/// One addressed transaction: start, address, data, stop.
///
/// Created and consumed within a single driver call.
#[derive(Debug)]
pub struct BusTransaction<'b> {
    pub address: u8,
    pub transfer: Transfer<'b>,
    /// Overrides the executor's default timeout when set.
    pub timeout_ms: Option<u32>,
}

impl<'b> BusTransaction<'b> {
    pub const fn write(address: u8, bytes: &'b [u8]) -> Self {
        Self {
            address,
            transfer: Transfer::Write(bytes),
            timeout_ms: None,
        }
    }

    pub const fn read(address: u8, buffer: &'b mut [u8]) -> Self {
        Self {
            address,
            transfer: Transfer::Read(buffer),
            timeout_ms: None,
        }
    }

    pub const fn write_read(address: u8, bytes: &'b [u8], buffer: &'b mut [u8]) -> Self {
        Self {
            address,
            transfer: Transfer::WriteRead(bytes, buffer),
            timeout_ms: None,
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub const fn direction(&self) -> Direction {
        match self.transfer {
            Transfer::Write(_) => Direction::Write,
            Transfer::Read(_) => Direction::Read,
            Transfer::WriteRead(..) => Direction::WriteRead,
        }
    }
}

/// Synchronous addressed bus.
///
/// Implementors only provide [`I2cBus::execute`]; the convenience operations
/// and the scan are built on top of it.
pub trait I2cBus {
    /// Run one transaction to completion.
    fn execute(&mut self, transaction: BusTransaction<'_>) -> Result<(), BusError>;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        self.execute(BusTransaction::write(address, bytes))
    }

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), BusError> {
        self.execute(BusTransaction::read(address, buffer))
    }

    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), BusError> {
        self.execute(BusTransaction::write_read(address, bytes, buffer))
    }

    /// Probe one address with a zero-length write.
    ///
    /// `Ok(false)` means the address was not acknowledged; any other bus
    /// failure is returned so callers can decide whether to retry.
    fn probe(&mut self, address: u8) -> Result<bool, BusError> {
        match self.write(address, &[]) {
            Ok(()) => Ok(true),
            Err(BusError::Nack) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Probe every address in `range` exactly once.
    ///
    /// Failed probes count as absent; retrying is left to the caller.
    fn scan(&mut self, range: RangeInclusive<u8>) -> ScanResult {
        let mut found = ScanResult::new();
        for address in range {
            if let Ok(true) = self.probe(address) {
                // Capacity covers the full address space.
                let _ = found.push(address);
            }
        }
        found
    }
}

impl<B: I2cBus + ?Sized> I2cBus for &mut B {
    fn execute(&mut self, transaction: BusTransaction<'_>) -> Result<(), BusError> {
        (**self).execute(transaction)
    }
}
