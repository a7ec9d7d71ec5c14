//! Host-side simulation of the monitor's hardware.
//!
//! Everything here implements the same embedded-hal traits as the real
//! peripherals, so drivers run unmodified against it. Time only moves when a
//! delay or injected stall moves the shared [`SimClock`].

mod adc;
mod clock;
mod devices;
mod i2c;
mod onewire;

pub use adc::SimAdc;
pub use clock::{SimClock, SimDelay};
pub use devices::{SimAht10, SimBh1750};
pub use i2c::{SimFault, SimI2cBus, SimI2cDevice, SimI2cError, WireEvent};
pub use onewire::{SimDs18b20, SimProbeLine};
