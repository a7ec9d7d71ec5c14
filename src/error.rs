//! Error taxonomy shared by the bus executors, drivers and registry.
//!
//! Every error is `Copy` so it can be stored inside a [`SensorReading`] and
//! carried through a batch read without allocation.
//!
//! [`SensorReading`]: crate::sensors::SensorReading

use serde::Serialize;
use thiserror_no_std::Error;

/// Failures of a single bus transaction.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BusError {
    #[error("bus transaction timed out")]
    Timeout,
    #[error("device did not acknowledge")]
    Nack,
    #[error("bus is busy")]
    BusBusy,
    #[error("bus line I/O fault")]
    Io,
}

impl BusError {
    /// Map an embedded-hal I2C error onto the bus taxonomy.
    ///
    /// HALs report a stuck or clock-stretched transfer through `Other`, so
    /// anything without a more specific kind is treated as a timeout.
    pub fn from_i2c<E: embedded_hal::i2c::Error>(error: &E) -> Self {
        use embedded_hal::i2c::ErrorKind;

        match error.kind() {
            ErrorKind::NoAcknowledge(_) => Self::Nack,
            ErrorKind::ArbitrationLoss | ErrorKind::Bus => Self::BusBusy,
            _ => Self::Timeout,
        }
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::Timeout => "bus.timeout",
            Self::Nack => "bus.nack",
            Self::BusBusy => "bus.busy",
            Self::Io => "bus.io",
        }
    }
}

/// Device-level protocol failures detected while decoding a reply.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProtocolError {
    #[error("no device responded")]
    DeviceNotFound,
    #[error("device is busy")]
    Busy,
    #[error("device is not calibrated")]
    NotCalibrated,
    #[error("checksum mismatch")]
    CrcMismatch,
    #[error("decoded value outside the device's physical range")]
    InvalidReading,
}

impl ProtocolError {
    pub const fn code(self) -> &'static str {
        match self {
            Self::DeviceNotFound => "protocol.device_not_found",
            Self::Busy => "protocol.busy",
            Self::NotCalibrated => "protocol.not_calibrated",
            Self::CrcMismatch => "protocol.crc_mismatch",
            Self::InvalidReading => "protocol.invalid_reading",
        }
    }
}

/// Caller mistakes: bad arguments, wrong lifecycle state, missing entries.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConfigError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("no enabled sensor of the requested kind")]
    NotFound,
}

impl ConfigError {
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "config.invalid_argument",
            Self::InvalidState(_) => "config.invalid_state",
            Self::NotFound => "config.not_found",
        }
    }
}

/// Umbrella error returned by drivers and the registry.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SensorError {
    #[error("bus error: {0}")]
    Bus(BusError),
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),
    #[error("configuration error: {0}")]
    Config(ConfigError),
}

impl SensorError {
    /// Stable dotted code used in diagnostics and telemetry.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Bus(e) => e.code(),
            Self::Protocol(e) => e.code(),
            Self::Config(e) => e.code(),
        }
    }

    /// Whether retrying the same operation could plausibly succeed.
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Bus(BusError::Timeout | BusError::BusBusy) | Self::Protocol(ProtocolError::Busy)
        )
    }
}

impl From<BusError> for SensorError {
    fn from(value: BusError) -> Self {
        Self::Bus(value)
    }
}

impl From<ProtocolError> for SensorError {
    fn from(value: ProtocolError) -> Self {
        Self::Protocol(value)
    }
}

impl From<ConfigError> for SensorError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}
