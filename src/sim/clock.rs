use core::cell::Cell;

use embedded_hal::delay::DelayNs;

use crate::time::Clock;

/// Simulated monotonic time, advanced only by delays and injected stalls.
#[derive(Debug, Default)]
pub struct SimClock {
    now: Cell<u64>,
}

impl SimClock {
    pub const fn new() -> Self {
        Self { now: Cell::new(0) }
    }

    pub fn now_micros(&self) -> u64 {
        self.now.get()
    }

    pub fn advance_micros(&self, micros: u64) {
        self.now.set(self.now.get().saturating_add(micros));
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance_micros(ms.saturating_mul(1000));
    }
}

impl Clock for SimClock {
    fn now_micros(&self) -> u64 {
        self.now.get()
    }
}

/// Delay that returns immediately and moves the simulated clock instead.
#[derive(Debug, Clone, Copy)]
pub struct SimDelay<'a> {
    clock: &'a SimClock,
}

impl<'a> SimDelay<'a> {
    pub const fn new(clock: &'a SimClock) -> Self {
        Self { clock }
    }
}

impl DelayNs for SimDelay<'_> {
    fn delay_ns(&mut self, ns: u32) {
        // Round up so short waits never collapse to zero.
        self.clock.advance_micros(u64::from(ns).div_ceil(1000));
    }

    fn delay_us(&mut self, us: u32) {
        self.clock.advance_micros(u64::from(us));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.clock.advance_ms(u64::from(ms));
    }
}
