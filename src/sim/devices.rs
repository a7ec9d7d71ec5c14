//! Register-level models of the I2C sensors.

use super::i2c::SimI2cDevice;
use crate::sensors::aht10;
use crate::sensors::bh1750::{self, MeasurementMode};

/// Combo temperature/humidity sensor model.
#[derive(Debug)]
pub struct SimAht10 {
    address: u8,
    temperature: f32,
    humidity: f32,
    factory_calibrated: bool,
    accepts_calibration: bool,
    calibrated: bool,
    stuck_busy: bool,
    busy_until: u64,
}

impl SimAht10 {
    /// Conversion time of the model, shorter than the driver's wait.
    pub const MEASUREMENT_US: u64 = 75_000;

    /// Factory-calibrated device at 22.5 °C and 50 %.
    pub const fn new(address: u8) -> Self {
        Self {
            address,
            temperature: 22.5,
            humidity: 50.0,
            factory_calibrated: true,
            accepts_calibration: true,
            calibrated: true,
            stuck_busy: false,
            busy_until: 0,
        }
    }

    /// Device that boots without its calibration bit set.
    pub const fn uncalibrated(mut self) -> Self {
        self.factory_calibrated = false;
        self.calibrated = false;
        self
    }

    /// Device that ignores the calibrate command.
    pub const fn refusing_calibration(mut self) -> Self {
        self.accepts_calibration = false;
        self
    }

    pub const fn with_conditions(mut self, temperature: f32, humidity: f32) -> Self {
        self.temperature = temperature;
        self.humidity = humidity;
        self
    }

    pub fn set_conditions(&mut self, temperature: f32, humidity: f32) {
        self.temperature = temperature;
        self.humidity = humidity;
    }

    /// Keep the busy bit set regardless of timing.
    pub fn set_stuck_busy(&mut self, stuck: bool) {
        self.stuck_busy = stuck;
    }

    pub const fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    fn status(&self, now_us: u64) -> u8 {
        let mut status = 0;
        if self.stuck_busy || now_us < self.busy_until {
            status |= aht10::STATUS_BUSY;
        }
        if self.calibrated {
            status |= aht10::STATUS_CALIBRATED;
        }
        status
    }

    fn frame(&self, now_us: u64) -> [u8; 6] {
        const FULL_SCALE: f32 = 1_048_576.0;

        let humidity = ((self.humidity / 100.0) * FULL_SCALE) as u32;
        let temperature = (((self.temperature + 50.0) / 200.0) * FULL_SCALE) as u32;
        let humidity = humidity.min(0xF_FFFF);
        let temperature = temperature.min(0xF_FFFF);

        [
            self.status(now_us),
            (humidity >> 12) as u8,
            (humidity >> 4) as u8,
            (((humidity & 0x0F) << 4) | ((temperature >> 16) & 0x0F)) as u8,
            (temperature >> 8) as u8,
            temperature as u8,
        ]
    }
}

impl SimI2cDevice for SimAht10 {
    fn address(&self) -> u8 {
        self.address
    }

    fn on_write(&mut self, bytes: &[u8], now_us: u64) {
        match bytes.first() {
            Some(&aht10::CMD_SOFT_RESET) => {
                self.calibrated = self.factory_calibrated;
                self.busy_until = 0;
            }
            Some(&cmd) if cmd == aht10::CMD_CALIBRATE[0] => {
                if self.accepts_calibration {
                    self.calibrated = true;
                }
            }
            Some(&cmd) if cmd == aht10::CMD_MEASURE[0] => {
                self.busy_until = now_us + Self::MEASUREMENT_US;
            }
            // Probes and unknown commands are acknowledged and ignored.
            _ => {}
        }
    }

    fn on_read(&mut self, buffer: &mut [u8], now_us: u64) {
        let frame = self.frame(now_us);
        for (dst, src) in buffer.iter_mut().zip(frame.iter()) {
            *dst = *src;
        }
    }
}

/// Digital light sensor model.
#[derive(Debug)]
pub struct SimBh1750 {
    address: u8,
    lux: f32,
    powered: bool,
    mode: Option<MeasurementMode>,
    mtreg: u8,
    data: u16,
    pending: u16,
    ready_at: u64,
}

impl SimBh1750 {
    pub const fn new(address: u8) -> Self {
        Self {
            address,
            lux: 500.0,
            powered: false,
            mode: None,
            mtreg: bh1750::MTREG_DEFAULT,
            data: 0,
            pending: 0,
            ready_at: 0,
        }
    }

    pub const fn with_lux(mut self, lux: f32) -> Self {
        self.lux = lux;
        self
    }

    pub fn set_lux(&mut self, lux: f32) {
        self.lux = lux;
    }

    pub const fn is_powered(&self) -> bool {
        self.powered
    }

    pub const fn mode(&self) -> Option<MeasurementMode> {
        self.mode
    }

    pub const fn mtreg(&self) -> u8 {
        self.mtreg
    }

    fn counts(&self, mode: MeasurementMode) -> u16 {
        let counts = self.lux * mode.counts_per_lux() * f32::from(self.mtreg)
            / f32::from(bh1750::MTREG_DEFAULT);
        counts.clamp(0.0, f32::from(u16::MAX)) as u16
    }

    fn start_measurement(&mut self, mode: MeasurementMode, now_us: u64) {
        self.pending = self.counts(mode);
        self.ready_at = now_us + u64::from(mode.measurement_time_ms(self.mtreg)) * 750;
        self.mode = Some(mode);
        if mode.is_one_shot() {
            // One-shot modes power down once the result is latched.
            self.powered = false;
        }
    }
}

impl SimI2cDevice for SimBh1750 {
    fn address(&self) -> u8 {
        self.address
    }

    fn on_write(&mut self, bytes: &[u8], now_us: u64) {
        for &byte in bytes {
            match byte {
                bh1750::CMD_POWER_DOWN => self.powered = false,
                bh1750::CMD_POWER_ON => self.powered = true,
                bh1750::CMD_RESET if self.powered => {
                    self.data = 0;
                    self.pending = 0;
                }
                0x40..=0x47 => self.mtreg = (self.mtreg & 0x1F) | ((byte & 0x07) << 5),
                0x60..=0x7F => self.mtreg = (self.mtreg & 0xE0) | (byte & 0x1F),
                _ => {
                    if let Some(mode) = MeasurementMode::from_opcode(byte) {
                        if self.powered {
                            self.start_measurement(mode, now_us);
                        }
                    }
                }
            }
        }
    }

    fn on_read(&mut self, buffer: &mut [u8], now_us: u64) {
        // Until a conversion completes the register keeps its previous value.
        if now_us >= self.ready_at {
            self.data = match self.mode {
                Some(mode) if !mode.is_one_shot() && self.powered => self.counts(mode),
                _ => self.pending,
            };
        }
        for (dst, src) in buffer.iter_mut().zip(self.data.to_be_bytes()) {
            *dst = src;
        }
    }
}
