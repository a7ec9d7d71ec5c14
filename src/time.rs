//! Time sources used to bound bus transactions.
//!
//! Waits go through `embedded_hal::delay::DelayNs`; elapsed-time checks go
//! through [`Clock`]. Both are injected, so every timing path can run against
//! the simulated clock of the `sim` module.

pub use embedded_hal::delay::DelayNs;

/// Monotonic microsecond clock.
pub trait Clock {
    fn now_micros(&self) -> u64;

    /// Microseconds elapsed since `start`, saturating on wrap.
    fn elapsed_micros(&self, start: u64) -> u64 {
        self.now_micros().saturating_sub(start)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_micros(&self) -> u64 {
        (**self).now_micros()
    }
}

/// Clock for targets whose HAL enforces transaction timeouts itself.
///
/// Always reports zero elapsed time, so only HAL-reported errors surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClock;

impl Clock for NoClock {
    fn now_micros(&self) -> u64 {
        0
    }
}
