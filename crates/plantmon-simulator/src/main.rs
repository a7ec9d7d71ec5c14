//! Desktop simulator for the plantmon plant-health monitor.
//!
//! Builds simulated devices for every configured sensor, drives them through
//! the real drivers and registry, and prints the console display and the JSON
//! telemetry record for each poll cycle. Sensor conditions drift over
//! simulated time so the health assessment moves.
//!
//! ```text
//! RUST_LOG=debug plantmon-simulator --cycles 5 --scan --stall 0x39
//! ```

use std::cell::RefCell;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};

use plantmon::bus::{I2cExecutor, OneWire, i2c::shared_bus};
use plantmon::config::MonitorConfig;
use plantmon::error::SensorError;
use plantmon::health::HealthScorer;
use plantmon::registry::SensorRegistry;
use plantmon::sensors::{
    Aht10, AnalogSensor, Bh1750, Ds18b20, Resolution, Sensor, SensorDescriptor, SensorKind,
    SensorLocation, analog::ADC_MAX,
};
use plantmon::sim::{
    SimAdc, SimAht10, SimBh1750, SimClock, SimDelay, SimDs18b20, SimFault, SimI2cBus, SimProbeLine,
};
use plantmon::telemetry::TelemetryRecord;

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "plantmon-simulator")]
#[command(about = "Run the plant monitor against simulated sensors")]
struct Args {
    /// JSON configuration file. Built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of poll cycles to run.
    #[arg(long, default_value_t = 3)]
    cycles: u32,

    /// Override the configured poll interval (simulated milliseconds).
    #[arg(long)]
    interval_ms: Option<u32>,

    /// Scan the I2C bus before polling.
    #[arg(long)]
    scan: bool,

    /// Make the device at this address stretch the clock past the bus timeout.
    #[arg(long, value_parser = parse_address)]
    stall: Option<u8>,

    /// Disconnect the temperature probe from this cycle on.
    #[arg(long)]
    unplug_probe_at: Option<u32>,

    /// Sleep for the poll interval in wall-clock time between cycles.
    #[arg(long)]
    realtime: bool,
}

fn parse_address(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    match parsed {
        Ok(address) if address <= 0x7F => Ok(address),
        _ => Err(format!("`{s}` is not a 7-bit I2C address")),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<MonitorConfig, Box<dyn Error>> {
    let config: MonitorConfig = match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            serde_json::from_str(&std::fs::read_to_string(path)?)?
        }
        None => MonitorConfig::default(),
    };
    config
        .validate()
        .map_err(|e| format!("invalid configuration: {e}"))?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Simulated environment
// ---------------------------------------------------------------------------

/// Conditions seen by every sensor at one instant.
struct Conditions {
    air_temperature: f32,
    humidity: f32,
    soil_temperature: f32,
    lux: f32,
    soil_raw: u16,
}

/// Slowly varying greenhouse conditions.
struct Environment {
    elapsed_secs: f64,
}

impl Environment {
    fn new() -> Self {
        Self { elapsed_secs: 0.0 }
    }

    fn next(&mut self, dt_secs: f64) -> Conditions {
        self.elapsed_secs += dt_secs;
        let t = self.elapsed_secs;

        // Air: 20-26 C with slow drift, humidity 40-60 % on another period
        let air_temperature = 23.0 + 3.0 * (t / 120.0).sin() + 0.5 * (t / 37.0).cos();
        let humidity = 50.0 + 10.0 * (t / 180.0).sin() + 2.0 * (t / 23.0).cos();

        // Soil lags the air and dries out slowly
        let soil_temperature = air_temperature - 2.0 + 0.3 * (t / 300.0).sin();
        let soil_raw = 2200.0 - 400.0 * (t / 600.0).sin();

        // Daylight cycle, never negative
        let lux = (4000.0 + 3500.0 * (t / 240.0).sin()).max(0.0);

        Conditions {
            air_temperature: air_temperature as f32,
            humidity: humidity as f32,
            soil_temperature: soil_temperature as f32,
            lux: lux as f32,
            soil_raw: soil_raw.clamp(0.0, f64::from(ADC_MAX)) as u16,
        }
    }
}

/// Device model behind one configured sensor.
enum Model {
    Combo(RefCell<SimAht10>),
    Light(RefCell<SimBh1750>),
    Probe(RefCell<SimDs18b20>),
    Soil(SimAdc),
    LightLevel(SimAdc),
    Unwired,
}

impl Model {
    fn for_descriptor(descriptor: &SensorDescriptor) -> Self {
        match (descriptor.kind(), descriptor.location()) {
            (SensorKind::ComboTH, SensorLocation::I2c { address }) => {
                Self::Combo(RefCell::new(SimAht10::new(address)))
            }
            (SensorKind::LightSensor, SensorLocation::I2c { address }) => {
                Self::Light(RefCell::new(SimBh1750::new(address)))
            }
            (SensorKind::Probe, SensorLocation::Pin(_)) => Self::Probe(RefCell::new(SimDs18b20::new())),
            (SensorKind::AnalogSoil, SensorLocation::Pin(_)) => Self::Soil(SimAdc::new(0)),
            (SensorKind::AnalogLight, SensorLocation::Pin(_)) => Self::LightLevel(SimAdc::new(0)),
            _ => Self::Unwired,
        }
    }

    /// Push the current conditions into the model. `index` staggers
    /// duplicate sensors slightly so averaging is visible.
    fn apply(&self, conditions: &Conditions, index: usize) {
        let offset = index as f32 * 0.2;
        match self {
            Self::Combo(device) => device
                .borrow_mut()
                .set_conditions(conditions.air_temperature + offset, conditions.humidity - offset),
            Self::Light(device) => device.borrow_mut().set_lux(conditions.lux),
            Self::Probe(device) => device.borrow_mut().set_temperature(conditions.soil_temperature),
            Self::Soil(adc) => adc.set(conditions.soil_raw),
            Self::LightLevel(adc) => {
                let scaled = conditions.lux / 10_000.0 * f32::from(ADC_MAX);
                adc.set(scaled.clamp(0.0, f32::from(ADC_MAX)) as u16);
            }
            Self::Unwired => {}
        }
    }
}

fn configure_probe(
    probe: &mut Ds18b20<SimProbeLine<'_>, SimDelay<'_>>,
    resolution: Resolution,
    delay: &mut SimDelay<'_>,
) -> Result<(), SensorError> {
    probe.initialize()?;
    if probe.resolution() != resolution {
        probe.set_resolution(resolution.bits(), delay)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Console display
// ---------------------------------------------------------------------------

fn render(record: &TelemetryRecord<'_>) {
    let value = |v: Option<f32>, unit: &str| match v {
        Some(v) => format!("{v:.1}{unit}"),
        None => "--".to_string(),
    };
    let raw = |v: Option<u16>| v.map_or_else(|| "--".to_string(), |v| v.to_string());

    let lines = [
        format!("{} ({})", record.health.health, record.health.score),
        format!(
            "T: {}  H: {}",
            value(record.temperature, "°C"),
            value(record.humidity, "%")
        ),
        format!(
            "Soil: {}  Light: {}",
            raw(record.soil_moisture),
            raw(record.light_level)
        ),
        format!("Lux: {}", value(record.lux, "")),
    ];

    println!("┌{}┐", "─".repeat(30));
    for line in &lines {
        println!("│ {line:<28} │");
    }
    println!("└{}┘", "─".repeat(30));
    println!("Recommendation: {}", record.health.recommendation);
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    let interval_ms = args.interval_ms.unwrap_or(config.poll_interval_ms);

    info!("Starting plantmon simulator as {}", config.device_id);
    info!(
        "{} sensor(s), poll every {} ms, bus {} Hz",
        config.sensors.len(),
        interval_ms,
        config.bus.frequency_hz
    );

    let clock = SimClock::new();
    let models: Vec<Model> = config.sensors.iter().map(Model::for_descriptor).collect();

    // I2C bus with every addressed device attached
    let mut sim_bus = SimI2cBus::new(&clock);
    for model in &models {
        match model {
            Model::Combo(device) => sim_bus.attach(device),
            Model::Light(device) => sim_bus.attach(device),
            _ => {}
        }
    }
    if let Some(address) = args.stall {
        let micros = (u64::from(config.bus.timeout_ms) + 50) * 1000;
        warn!("Device 0x{:02X} will stall for {} us", address, micros);
        sim_bus.inject(address, SimFault::Stall { micros });
    }
    let bus = shared_bus(sim_bus);
    let executor = I2cExecutor::new(&bus, &clock).with_timeout(config.bus.timeout_ms);

    // Drivers, one per descriptor
    let mut drivers: Vec<(SensorDescriptor, Box<dyn Sensor<SimDelay<'_>> + '_>)> = Vec::new();
    for (descriptor, model) in config.sensors.iter().zip(&models) {
        let driver: Box<dyn Sensor<SimDelay<'_>> + '_> = match (model, descriptor.location()) {
            (Model::Combo(_), SensorLocation::I2c { address }) => {
                Box::new(Aht10::new(executor.clone(), address))
            }
            (Model::Light(_), SensorLocation::I2c { address }) => {
                Box::new(Bh1750::new(executor.clone(), address, config.light_mode))
            }
            (Model::Probe(device), _) => {
                let wire = OneWire::new(SimProbeLine::new(&clock, device), SimDelay::new(&clock));
                let mut probe = Ds18b20::new(wire);
                if descriptor.is_enabled()
                    && let Err(e) =
                        configure_probe(&mut probe, config.probe_resolution(), &mut SimDelay::new(&clock))
                {
                    error!("{}: probe setup failed: {}", descriptor.name(), e);
                }
                Box::new(probe)
            }
            (Model::Soil(adc), _) => Box::new(AnalogSensor::new_soil(adc)),
            (Model::LightLevel(adc), _) => Box::new(AnalogSensor::new_light(adc)),
            _ => {
                warn!("{}: no simulated device for this sensor", descriptor.name());
                continue;
            }
        };
        drivers.push((descriptor.clone(), driver));
    }

    let mut registry = SensorRegistry::new(executor.clone(), SimDelay::new(&clock))
        .with_scan_range(config.scan_range());
    for (descriptor, driver) in &mut drivers {
        if let Err(e) = registry.register(descriptor.clone(), driver.as_mut()) {
            error!("{}: not registered: {}", descriptor.name(), e);
        }
    }

    let ready = registry.initialize_all();
    info!("{} of {} sensor(s) initialized", ready, registry.len());

    if args.scan {
        let found = registry.scan_bus();
        let addresses: Vec<String> = found.iter().map(|a| format!("0x{a:02X}")).collect();
        println!("I2C devices: [{}]", addresses.join(", "));
    }

    let scorer = HealthScorer::new(config.health);
    let mut environment = Environment::new();

    for cycle in 1..=args.cycles {
        let conditions = environment.next(f64::from(interval_ms) / 1000.0);
        for (index, model) in models.iter().enumerate() {
            model.apply(&conditions, index);
        }
        if args.unplug_probe_at == Some(cycle) {
            warn!("Unplugging temperature probe");
            for model in &models {
                if let Model::Probe(device) = model {
                    device.borrow_mut().set_connected(false);
                }
            }
        }

        let batch = registry.read_all();
        let assessment = scorer.assess(&batch);
        let timestamp = clock.now_micros() / 1000;
        let record =
            TelemetryRecord::from_batch(&batch, &assessment, timestamp, config.device_id.as_str());

        println!("Cycle {cycle} at {timestamp} ms");
        render(&record);
        println!("{}", serde_json::to_string(&record)?);

        let status = registry.status();
        info!(
            "Sensors: {} working, {} enabled, {} total",
            status.working, status.enabled, status.total
        );

        clock.advance_ms(u64::from(interval_ms));
        if args.realtime && cycle < args.cycles {
            std::thread::sleep(Duration::from_millis(u64::from(interval_ms)));
        }
    }

    info!("Simulator exiting");
    Ok(())
}
