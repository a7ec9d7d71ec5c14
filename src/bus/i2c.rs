//! Shared blocking I2C executor.
//!
//! Provides a blocking counterpart to the async bus-sharing device: the bus
//! lives behind an Embassy blocking mutex, and every [`I2cExecutor`] handle
//! locks it for exactly one transaction.
//!
//! Framing (start, address + R/W, per-byte ACK, repeated start for combined
//! transfers, NACK on the final read byte, stop) is the embedded-hal `I2c`
//! contract, so the executor hands each [`BusTransaction`] to the HAL as a
//! single call and maps its outcome onto [`BusError`].

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal::i2c::I2c;
use log::trace;

use super::{BusTransaction, I2cBus, Transfer};
use crate::error::BusError;
use crate::time::Clock;

/// An I2C peripheral shared between every executor handle on one bus.
pub type SharedI2cBus<T> = Mutex<CriticalSectionRawMutex, RefCell<T>>;

/// Wrap a HAL I2C peripheral so it can be shared.
pub fn shared_bus<T>(i2c: T) -> SharedI2cBus<T> {
    Mutex::new(RefCell::new(i2c))
}

/// Handle to a shared I2C bus.
///
/// Handles are cheap to clone; each driver gets its own. Only one transaction
/// is in flight per bus: the mutex serializes callers, and a nested
/// transaction started while the bus is borrowed fails with
/// [`BusError::BusBusy`] instead of deadlocking.
///
/// # Example
///
/// ```no_run
/// use plantmon::bus::i2c::{I2cExecutor, shared_bus};
/// use plantmon::time::NoClock;
///
/// # fn demo<T: embedded_hal::i2c::I2c>(i2c: T) {
/// let bus = shared_bus(i2c);
/// let for_combo = I2cExecutor::new(&bus, NoClock);
/// let for_light = for_combo.clone().with_timeout(200);
/// # }
/// ```
pub struct I2cExecutor<'a, T, C> {
    bus: &'a SharedI2cBus<T>,
    clock: C,
    timeout_ms: u32,
}

impl<T, C: Clone> Clone for I2cExecutor<'_, T, C> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus,
            clock: self.clock.clone(),
            timeout_ms: self.timeout_ms,
        }
    }
}

impl<'a, T, C> I2cExecutor<'a, T, C> {
    pub const DEFAULT_TIMEOUT_MS: u32 = 1000;

    #[inline]
    pub const fn new(bus: &'a SharedI2cBus<T>, clock: C) -> Self {
        Self {
            bus,
            clock,
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
        }
    }

    /// Set the default timeout applied to transactions without their own.
    pub fn with_timeout(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub const fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }
}

impl<T, C> I2cBus for I2cExecutor<'_, T, C>
where
    T: I2c,
    C: Clock,
{
    fn execute(&mut self, transaction: BusTransaction<'_>) -> Result<(), BusError> {
        let BusTransaction {
            address,
            transfer,
            timeout_ms,
        } = transaction;

        // No 7-bit device can acknowledge this.
        if address > 0x7F {
            return Err(BusError::Nack);
        }

        let limit_us = u64::from(timeout_ms.unwrap_or(self.timeout_ms)) * 1000;
        let clock = &self.clock;

        self.bus.lock(|cell| {
            let mut i2c = cell.try_borrow_mut().map_err(|_| BusError::BusBusy)?;

            let start = clock.now_micros();
            let result = match transfer {
                Transfer::Write(bytes) => i2c.write(address, bytes),
                Transfer::Read(buffer) => i2c.read(address, buffer),
                Transfer::WriteRead(bytes, buffer) => i2c.write_read(address, bytes, buffer),
            };
            let elapsed_us = clock.elapsed_micros(start);

            match result {
                Err(e) => {
                    let error = BusError::from_i2c(&e);
                    trace!("I2C 0x{:02X} failed after {}us: {:?}", address, elapsed_us, error);
                    Err(error)
                }
                Ok(()) if elapsed_us > limit_us => {
                    trace!(
                        "I2C 0x{:02X} exceeded {}us timeout ({}us)",
                        address, limit_us, elapsed_us
                    );
                    Err(BusError::Timeout)
                }
                Ok(()) => Ok(()),
            }
        })
    }
}
