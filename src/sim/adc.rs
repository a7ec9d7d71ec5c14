use core::cell::Cell;

use crate::error::{BusError, SensorError};
use crate::sensors::analog::AdcChannel;

/// ADC channel returning a settable raw value.
#[derive(Debug, Default)]
pub struct SimAdc {
    value: Cell<u16>,
    failing: Cell<bool>,
}

impl SimAdc {
    pub const fn new(value: u16) -> Self {
        Self {
            value: Cell::new(value),
            failing: Cell::new(false),
        }
    }

    pub fn set(&self, value: u16) {
        self.value.set(value);
    }

    /// Make every conversion fail with an I/O fault.
    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }
}

impl AdcChannel for &SimAdc {
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        if self.failing.get() {
            return Err(BusError::Io.into());
        }
        Ok(self.value.get())
    }
}
