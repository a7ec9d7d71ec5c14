//! Simulated I2C bus implementing the embedded-hal `I2c` trait.

use core::cell::RefCell;

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

use super::SimClock;

/// One observable event on the simulated wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireEvent {
    Start,
    RepeatedStart,
    Address { address: u8, read: bool },
    Ack,
    Nack,
    Byte(u8),
    Stop,
}

/// Fault injected for every transaction to one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFault {
    /// The device stretches the clock for this long before completing.
    Stall { micros: u64 },
    /// The transfer fails with this HAL error after the address phase.
    Error(ErrorKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimI2cError(pub ErrorKind);

impl embedded_hal::i2c::Error for SimI2cError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

/// A device model answering on one address.
pub trait SimI2cDevice {
    fn address(&self) -> u8;

    /// Bytes written in one write phase. Empty for an address probe.
    fn on_write(&mut self, bytes: &[u8], now_us: u64);

    /// Fill one read phase.
    fn on_read(&mut self, buffer: &mut [u8], now_us: u64);
}

const MAX_DEVICES: usize = 8;
const TRACE_CAPACITY: usize = 64;

/// Bus with attached device models and a wire trace.
///
/// The trace keeps the first 64 events; later events are dropped.
pub struct SimI2cBus<'a> {
    clock: &'a SimClock,
    devices: heapless::Vec<&'a RefCell<dyn SimI2cDevice + 'a>, MAX_DEVICES>,
    faults: heapless::Vec<(u8, SimFault), MAX_DEVICES>,
    trace: heapless::Vec<WireEvent, TRACE_CAPACITY>,
}

impl<'a> SimI2cBus<'a> {
    pub fn new(clock: &'a SimClock) -> Self {
        Self {
            clock,
            devices: heapless::Vec::new(),
            faults: heapless::Vec::new(),
            trace: heapless::Vec::new(),
        }
    }

    pub fn attach(&mut self, device: &'a RefCell<dyn SimI2cDevice + 'a>) {
        let address = device.borrow().address();
        if self.devices.push(device).is_err() {
            log::warn!("Simulated bus full, device 0x{:02X} not attached", address);
        }
    }

    /// Apply `fault` to every later transaction addressed to `address`.
    pub fn inject(&mut self, address: u8, fault: SimFault) {
        self.clear_fault(address);
        if self.faults.push((address, fault)).is_err() {
            log::warn!("Fault table full, fault for 0x{:02X} dropped", address);
        }
    }

    pub fn clear_fault(&mut self, address: u8) {
        self.faults.retain(|(a, _)| *a != address);
    }

    pub fn trace(&self) -> &[WireEvent] {
        &self.trace
    }

    fn record(&mut self, event: WireEvent) {
        let _ = self.trace.push(event);
    }

    fn fault_for(&self, address: u8) -> Option<SimFault> {
        self.faults
            .iter()
            .find(|(a, _)| *a == address)
            .map(|(_, fault)| *fault)
    }
}

impl ErrorType for SimI2cBus<'_> {
    type Error = SimI2cError;
}

impl I2c for SimI2cBus<'_> {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let fault = self.fault_for(address);
        if let Some(SimFault::Stall { micros }) = fault {
            self.clock.advance_micros(micros);
        }

        let first_is_read = matches!(operations.first(), Some(Operation::Read(_)));
        let device = self
            .devices
            .iter()
            .copied()
            .find(|d| d.borrow().address() == address);

        let Some(device) = device else {
            self.record(WireEvent::Start);
            self.record(WireEvent::Address { address, read: first_is_read });
            self.record(WireEvent::Nack);
            self.record(WireEvent::Stop);
            return Err(SimI2cError(ErrorKind::NoAcknowledge(
                NoAcknowledgeSource::Address,
            )));
        };

        if let Some(SimFault::Error(kind)) = fault {
            self.record(WireEvent::Start);
            self.record(WireEvent::Address { address, read: first_is_read });
            self.record(WireEvent::Stop);
            return Err(SimI2cError(kind));
        }

        let mut previous_read: Option<bool> = None;
        for i in 0..operations.len() {
            let read = matches!(operations[i], Operation::Read(_));
            if previous_read != Some(read) {
                // Direction change means a new address phase.
                self.record(match previous_read {
                    None => WireEvent::Start,
                    Some(_) => WireEvent::RepeatedStart,
                });
                self.record(WireEvent::Address { address, read });
                self.record(WireEvent::Ack);
            }
            let next_is_read = matches!(operations.get(i + 1), Some(Operation::Read(_)));
            let now = self.clock.now_micros();

            match &mut operations[i] {
                Operation::Write(bytes) => {
                    let bytes: &[u8] = bytes;
                    for &b in bytes {
                        self.record(WireEvent::Byte(b));
                        self.record(WireEvent::Ack);
                    }
                    device.borrow_mut().on_write(bytes, now);
                }
                Operation::Read(buffer) => {
                    device.borrow_mut().on_read(&mut buffer[..], now);
                    let last = buffer.len().saturating_sub(1);
                    for (j, &b) in buffer.iter().enumerate() {
                        self.record(WireEvent::Byte(b));
                        // The master NACKs only the final byte of a read run.
                        if j == last && !next_is_read {
                            self.record(WireEvent::Nack);
                        } else {
                            self.record(WireEvent::Ack);
                        }
                    }
                }
            }
            previous_read = Some(read);
        }

        self.record(WireEvent::Stop);
        Ok(())
    }
}
