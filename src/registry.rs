//! Sensor registry: ordered descriptors bound to their drivers.
//!
//! The registry owns the configured [`SensorDescriptor`]s and dispatches over
//! the [`Sensor`] capability trait. A batch read returns one reading per
//! enabled sensor and never aborts: a failing sensor only marks its own
//! reading invalid.

use core::ops::RangeInclusive;

use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::bus::{DEFAULT_SCAN_RANGE, I2cBus, ScanResult};
use crate::error::{ConfigError, ProtocolError, SensorError};
use crate::sensors::{Sensor, SensorDescriptor, SensorKind, SensorReading};
use crate::sensors::{aht10, bh1750};

/// Maximum number of configured sensors.
pub const MAX_SENSORS: usize = 8;

/// One reading per enabled sensor, in registration order.
pub type ReadingBatch = heapless::Vec<SensorReading, MAX_SENSORS>;

/// Attempts per address during a scan.
const SCAN_ATTEMPTS: u32 = 3;

/// Counts reported by [`SensorRegistry::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RegistryStatus {
    pub total: usize,
    pub enabled: usize,
    /// Enabled sensors whose last initialization or read succeeded.
    pub working: usize,
}

struct Entry<'a, D> {
    descriptor: SensorDescriptor,
    driver: &'a mut (dyn Sensor<D> + 'a),
    initialized: bool,
    last_ok: bool,
}

impl<D: DelayNs> Entry<'_, D> {
    fn initialize(&mut self, delay: &mut D) -> Result<(), SensorError> {
        match self.driver.initialize(delay) {
            Ok(()) => {
                self.initialized = true;
                self.last_ok = true;
                Ok(())
            }
            Err(e) => {
                self.initialized = false;
                self.last_ok = false;
                Err(e)
            }
        }
    }

    fn read(&mut self, delay: &mut D) -> SensorReading {
        let kind = self.descriptor.kind();
        let ready = if self.initialized { Ok(()) } else { self.initialize(delay) };
        let result = ready.and_then(|()| self.driver.read(delay));

        match result {
            Ok(reading) => {
                self.last_ok = true;
                reading
            }
            Err(e) => {
                warn!("{} ({}) read failed: {}", self.descriptor.name(), kind.label(), e);
                self.last_ok = false;
                if needs_reinitialization(e) {
                    self.initialized = false;
                }
                SensorReading::failed(kind, e)
            }
        }
    }
}

/// Errors after which the device has to go through initialization again.
const fn needs_reinitialization(error: SensorError) -> bool {
    matches!(
        error,
        SensorError::Protocol(ProtocolError::NotCalibrated | ProtocolError::DeviceNotFound)
            | SensorError::Config(ConfigError::InvalidState(_))
    )
}

/// Name of the device usually found at `address`, for scan diagnostics.
pub const fn known_device(address: u8) -> Option<&'static str> {
    match address {
        aht10::ADDRESS_PRIMARY | aht10::ADDRESS_SECONDARY => Some("AHT10"),
        bh1750::ADDRESS_LOW | bh1750::ADDRESS_HIGH => Some("BH1750"),
        _ => None,
    }
}

pub struct SensorRegistry<'a, B, D> {
    entries: heapless::Vec<Entry<'a, D>, MAX_SENSORS>,
    bus: B,
    delay: D,
    scan_range: RangeInclusive<u8>,
}

impl<'a, B, D> SensorRegistry<'a, B, D>
where
    B: I2cBus,
    D: DelayNs,
{
    /// `bus` is only used for diagnostics scans; drivers own their own handles.
    pub fn new(bus: B, delay: D) -> Self {
        Self {
            entries: heapless::Vec::new(),
            bus,
            delay,
            scan_range: DEFAULT_SCAN_RANGE,
        }
    }

    #[must_use]
    pub fn with_scan_range(mut self, range: RangeInclusive<u8>) -> Self {
        self.scan_range = range;
        self
    }

    /// Bind a driver to its descriptor. Order of registration is read order.
    pub fn register(
        &mut self,
        descriptor: SensorDescriptor,
        driver: &'a mut (dyn Sensor<D> + 'a),
    ) -> Result<(), ConfigError> {
        if driver.kind() != descriptor.kind() {
            return Err(ConfigError::InvalidArgument("driver kind does not match descriptor"));
        }
        if driver
            .location()
            .is_some_and(|location| location != descriptor.location())
        {
            return Err(ConfigError::InvalidArgument("driver location does not match descriptor"));
        }
        descriptor.validate()?;

        debug!("Registering {} as {}", descriptor.name(), descriptor.kind().label());
        self.entries
            .push(Entry {
                descriptor,
                driver,
                initialized: false,
                last_ok: false,
            })
            .map_err(|_| ConfigError::InvalidArgument("too many sensors"))
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &SensorDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Initialize every enabled sensor. Failures are logged and retried
    /// lazily on the next read. Returns how many succeeded.
    pub fn initialize_all(&mut self) -> usize {
        let Self { entries, delay, .. } = self;

        let mut ready = 0;
        for entry in entries.iter_mut().filter(|e| e.descriptor.is_enabled()) {
            match entry.initialize(delay) {
                Ok(()) => {
                    info!("{} ready", entry.descriptor.name());
                    ready += 1;
                }
                Err(e) => error!("{} failed to initialize: {}", entry.descriptor.name(), e),
            }
        }
        ready
    }

    /// Read every enabled sensor once.
    pub fn read_all(&mut self) -> ReadingBatch {
        let Self { entries, delay, .. } = self;

        let mut batch = ReadingBatch::new();
        for entry in entries.iter_mut().filter(|e| e.descriptor.is_enabled()) {
            // Capacity equals the number of entries.
            let _ = batch.push(entry.read(delay));
        }

        let valid = batch.iter().filter(|r| r.is_valid()).count();
        debug!("Read cycle: {}/{} valid", valid, batch.len());
        batch
    }

    /// Read the first enabled sensor of `kind`.
    ///
    /// Errors only when no such sensor exists; a failed read comes back as an
    /// invalid reading like in [`SensorRegistry::read_all`].
    pub fn read_one(&mut self, kind: SensorKind) -> Result<SensorReading, SensorError> {
        let Self { entries, delay, .. } = self;

        entries
            .iter_mut()
            .find(|e| e.descriptor.is_enabled() && e.descriptor.kind() == kind)
            .map(|entry| entry.read(delay))
            .ok_or(ConfigError::NotFound.into())
    }

    /// Probe the configured address range for responders.
    ///
    /// Each address is retried up to three times, with a short backoff, when
    /// the probe fails for a transient reason.
    pub fn scan_bus(&mut self) -> ScanResult {
        let mut found = ScanResult::new();

        for address in self.scan_range.clone() {
            for attempt in 1..=SCAN_ATTEMPTS {
                match self.bus.probe(address) {
                    Ok(true) => {
                        let _ = found.push(address);
                        match known_device(address) {
                            Some(name) => info!("Found I2C device at 0x{:02X} ({})", address, name),
                            None => info!("Found I2C device at 0x{:02X}", address),
                        }
                        break;
                    }
                    Ok(false) => break,
                    Err(e) if SensorError::from(e).is_transient() && attempt < SCAN_ATTEMPTS => {
                        debug!("Probe 0x{:02X} attempt {} failed: {}", address, attempt, e);
                        self.delay.delay_ms(attempt);
                    }
                    Err(e) => {
                        warn!("Probe 0x{:02X} failed: {}", address, e);
                        break;
                    }
                }
            }
        }

        info!("I2C scan found {} device(s)", found.len());
        found
    }

    pub fn status(&self) -> RegistryStatus {
        let enabled = self.entries.iter().filter(|e| e.descriptor.is_enabled());
        RegistryStatus {
            total: self.entries.len(),
            enabled: enabled.clone().count(),
            working: enabled.filter(|e| e.last_ok).count(),
        }
    }
}
