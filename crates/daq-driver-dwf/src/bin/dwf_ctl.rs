//! Operator CLI for WaveForms instruments.
//!
//! # Usage
//!
//! Power a board from V+ and watch the readback:
//! ```bash
//! dwf-ctl power --voltage 3.3 --current 0.5 --samples 10
//! ```
//!
//! Read an ST sensor's WHO_AM_I over SPI:
//! ```bash
//! dwf-ctl spi --write 8f00 --read 2
//! ```
//!
//! Read a BMA456 chip ID over I2C against the simulated instrument:
//! ```bash
//! dwf-ctl --mock i2c --address 0x18 --write 00 --read 1
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use daq_driver_dwf::{
    load_session_config, ClockPhase, DeviceProfile, DwfDevice, I2cConfig, InstrumentDriver,
    MockDriver, Polarity, SessionConfig, SupplyChannel,
};

#[derive(Parser)]
#[command(name = "dwf-ctl")]
#[command(about = "Drive the power supplies, SPI and I2C of a WaveForms instrument", long_about = None)]
struct Cli {
    /// Session file (TOML); DWF_* environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the simulated instrument instead of hardware
    #[arg(long, global = true)]
    mock: bool,

    /// Resource preset index (0-6)
    #[arg(long, global = true)]
    profile: Option<i32>,

    /// Device enumeration index (-1 = first available)
    #[arg(long, global = true, allow_negative_numbers = true)]
    device_index: Option<i32>,

    /// Device name or serial number
    #[arg(long, global = true)]
    device_name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set V+ and print readbacks
    Power {
        /// Output voltage in volts
        #[arg(long)]
        voltage: f64,
        /// Current limit in amperes
        #[arg(long, default_value = "0.5")]
        current: f64,
        /// Number of readbacks to print
        #[arg(long, default_value = "5")]
        samples: u32,
        /// Delay between readbacks
        #[arg(long, default_value = "500")]
        interval_ms: u64,
        /// Leave the outputs on when done
        #[arg(long)]
        keep_on: bool,
    },

    /// One framed SPI transfer
    Spi(SpiArgs),

    /// One combined I2C write/read
    I2c(I2cArgs),
}

#[derive(Args)]
struct SpiArgs {
    /// Bytes to send, hex (e.g. "8f00" or "0x8f,0x00")
    #[arg(long, default_value = "")]
    write: String,
    /// Number of bytes to capture
    #[arg(long, default_value = "0")]
    read: usize,
    /// Chip-select pin
    #[arg(long)]
    cs: Option<u8>,
    /// Clock pin
    #[arg(long)]
    sclk: Option<u8>,
    /// Controller-out pin
    #[arg(long)]
    mosi: Option<u8>,
    /// Controller-in pin
    #[arg(long)]
    miso: Option<u8>,
    /// Clock frequency in Hz
    #[arg(long)]
    rate: Option<f64>,
    /// SPI mode (0-3)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=3))]
    mode: Option<u8>,
    /// Chip-select is active high
    #[arg(long)]
    cs_active_high: bool,
}

#[derive(Args)]
struct I2cArgs {
    /// 7-bit slave address (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_address)]
    address: Option<u8>,
    /// Bytes to send, hex
    #[arg(long, default_value = "")]
    write: String,
    /// Number of bytes to capture
    #[arg(long, default_value = "0")]
    read: usize,
    /// Clock rate in Hz
    #[arg(long)]
    rate: Option<f64>,
    /// SCL pin
    #[arg(long)]
    scl: Option<u8>,
    /// SDA pin
    #[arg(long)]
    sda: Option<u8>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let session = session_from_cli(&cli)?;
    let driver = select_driver(cli.mock)?;

    let device = DwfDevice::open_with(driver, &session.device).context("Failed to open device")?;
    info!(profile = ?device.profile(), "Session started");

    let outcome = apply_session_supplies(&device, &session).and_then(|()| match &cli.command {
        Commands::Power {
            voltage,
            current,
            samples,
            interval_ms,
            keep_on,
        } => run_power(&device, *voltage, *current, *samples, *interval_ms, *keep_on),
        Commands::Spi(args) => run_spi(&device, &session, args),
        Commands::I2c(args) => run_i2c(&device, &session, args),
    });

    device.release().context("Failed to release device")?;
    outcome
}

/// Session file (if any) with the global flags applied on top.
fn session_from_cli(cli: &Cli) -> Result<SessionConfig> {
    let mut session = match &cli.config {
        Some(path) => load_session_config(path)?,
        None => SessionConfig::default(),
    };

    if let Some(raw) = cli.profile {
        session.device.profile = DeviceProfile::from_raw(raw)
            .with_context(|| format!("Unknown profile {}, expected 0-6", raw))?;
    }
    if let Some(index) = cli.device_index {
        session.device.device_index = index;
    }
    if let Some(name) = &cli.device_name {
        session.device.device_name = Some(name.clone());
    }
    Ok(session)
}

/// Push the session's `[power_supply]` section, if it sets anything.
fn apply_session_supplies(device: &DwfDevice, session: &SessionConfig) -> Result<()> {
    if session.power_supply.is_empty() {
        return Ok(());
    }
    device
        .acquire_power_supply()?
        .apply(&session.power_supply)
        .context("Failed to apply session power supply settings")?;
    info!(
        enable_outputs = session.power_supply.enable_outputs,
        "Applied session power supply settings"
    );
    Ok(())
}

fn select_driver(mock: bool) -> Result<Arc<dyn InstrumentDriver>> {
    if mock {
        return Ok(Arc::new(MockDriver::with_demo_peripherals()));
    }
    native_driver()
}

#[cfg(feature = "hardware")]
fn native_driver() -> Result<Arc<dyn InstrumentDriver>> {
    Ok(Arc::new(daq_driver_dwf::NativeDriver::new()))
}

#[cfg(not(feature = "hardware"))]
fn native_driver() -> Result<Arc<dyn InstrumentDriver>> {
    bail!("dwf-ctl was built without the `hardware` feature; pass --mock or rebuild with --features hardware")
}

fn run_power(
    device: &DwfDevice,
    voltage: f64,
    current: f64,
    samples: u32,
    interval_ms: u64,
    keep_on: bool,
) -> Result<()> {
    if !SupplyChannel::Positive.accepts(voltage) {
        bail!("V+ takes a non-negative voltage, got {}", voltage);
    }

    let mut supply = device.acquire_power_supply()?;
    supply.configure_positive_supply(voltage, current)?;
    supply.enable_all_outputs(true)?;

    for sample in 0..samples {
        if sample > 0 {
            thread::sleep(Duration::from_millis(interval_ms));
        }
        let reading = supply.read_positive_supply()?;
        println!(
            "V+ {:>3}: {:.3} V  {:.3} A",
            sample, reading.voltage, reading.current
        );
    }

    if !keep_on {
        supply.enable_all_outputs(false)?;
    }
    Ok(())
}

fn run_spi(device: &DwfDevice, session: &SessionConfig, args: &SpiArgs) -> Result<()> {
    let mut config = session.spi.unwrap_or_default();
    if let Some(pin) = args.cs {
        config.chip_select = pin.into();
    }
    if let Some(pin) = args.sclk {
        config.clock = pin.into();
    }
    if let Some(pin) = args.mosi {
        config.mosi = pin.into();
    }
    if let Some(pin) = args.miso {
        config.miso = pin.into();
    }
    if let Some(rate) = args.rate {
        config.clock_rate = rate;
    }
    if let Some(mode) = args.mode {
        let (polarity, phase) = mode_to_clock(mode);
        config = config.with_clock_polarity(polarity).with_clock_phase(phase);
    }
    if args.cs_active_high {
        config = config.with_cs_polarity(Polarity::IdleLow);
    }

    let tx = parse_hex(&args.write)?;
    let mut spi = device.acquire_spi_bus(true)?;
    spi.configure_bus(config)?;
    let rx = spi.write_read(&tx, args.read)?;
    println!("{}", format_hex(&rx));
    Ok(())
}

fn run_i2c(device: &DwfDevice, session: &SessionConfig, args: &I2cArgs) -> Result<()> {
    let mut config: I2cConfig = session.i2c.unwrap_or_default();
    if let Some(address) = args.address {
        config.address = address;
    }
    if let Some(rate) = args.rate {
        config.clock_rate = rate;
    }
    if let Some(pin) = args.scl {
        config.scl = pin.into();
    }
    if let Some(pin) = args.sda {
        config.sda = pin.into();
    }

    let tx = parse_hex(&args.write)?;
    let mut i2c = device.acquire_i2c_bus(true)?;
    i2c.configure_bus(config)?;
    let transfer = i2c.write_read(&tx, args.read)?;
    if transfer.is_acked() {
        println!("{}", format_hex(&transfer.data));
    } else {
        println!("{} (NAK {})", format_hex(&transfer.data), transfer.nak);
    }
    Ok(())
}

fn mode_to_clock(mode: u8) -> (Polarity, ClockPhase) {
    let polarity = if mode & 0b10 == 0 {
        Polarity::IdleLow
    } else {
        Polarity::IdleHigh
    };
    let phase = if mode & 0b01 == 0 {
        ClockPhase::FirstEdge
    } else {
        ClockPhase::SecondEdge
    };
    (polarity, phase)
}

fn parse_address(text: &str) -> std::result::Result<u8, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => text.parse(),
    };
    match parsed {
        Ok(address) if address <= 0x7F => Ok(address),
        Ok(address) => Err(format!("0x{:02x} is not a 7-bit address", address)),
        Err(e) => Err(e.to_string()),
    }
}

/// Parse hex bytes separated by spaces, commas or colons, with optional `0x`.
fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for token in text.split(|c: char| c.is_whitespace() || c == ',' || c == ':') {
        let digits = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        if digits.is_empty() {
            continue;
        }
        let decoded = hex::decode(digits)
            .with_context(|| format!("'{}' is not a whole number of hex bytes", token))?;
        bytes.extend(decoded);
    }
    Ok(bytes)
}

fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| hex::encode([*b]))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_driver_dwf::{session_config_from_str, DriverCall, SpiMode};

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("8f00").unwrap(), vec![0x8F, 0x00]);
        assert_eq!(parse_hex("0x8f, 0x00").unwrap(), vec![0x8F, 0x00]);
        assert_eq!(parse_hex("de:ad be").unwrap(), vec![0xDE, 0xAD, 0xBE]);
        assert!(parse_hex("").unwrap().is_empty());
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
        assert!(parse_hex("0x8").is_err());
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0x6C, 0x00, 0xFF]), "6c 00 ff");
        assert_eq!(format_hex(&[]), "");
    }

    #[test]
    fn test_power_rejects_nan_voltage() {
        let device = DwfDevice::open(
            select_driver(true).unwrap(),
            DeviceProfile::default(),
        )
        .unwrap();
        assert!(run_power(&device, f64::NAN, 0.5, 1, 0, false).is_err());
        device.release().unwrap();
    }

    #[test]
    fn test_session_supplies_applied() {
        let driver = Arc::new(MockDriver::new());
        let device = DwfDevice::open(driver.clone(), DeviceProfile::default()).unwrap();
        let session = session_config_from_str(
            "[power_supply]\npositive = { voltage = 3.3, current = 0.5 }\nenable_outputs = true\n",
        )
        .unwrap();
        driver.clear_calls();

        apply_session_supplies(&device, &session).unwrap();

        let calls = driver.calls();
        assert!(calls.contains(&DriverCall::AnalogIoChannelNodeSet {
            channel: 0,
            node: 1,
            value: 3.3
        }));
        assert_eq!(
            calls.last(),
            Some(&DriverCall::AnalogIoEnableSet { enable: true })
        );
        device.release().unwrap();
    }

    #[test]
    fn test_empty_supply_section_makes_no_calls() {
        let driver = Arc::new(MockDriver::new());
        let device = DwfDevice::open(driver.clone(), DeviceProfile::default()).unwrap();
        driver.clear_calls();

        apply_session_supplies(&device, &SessionConfig::default()).unwrap();

        assert!(driver.calls().is_empty());
        device.release().unwrap();
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x18"), Ok(0x18));
        assert_eq!(parse_address("24"), Ok(24));
        assert!(parse_address("0x80").is_err());
        assert!(parse_address("x").is_err());
    }

    #[test]
    fn test_mode_to_clock_matches_spi_mode() {
        for (mode, expected) in [
            (0, SpiMode::Mode0),
            (1, SpiMode::Mode1),
            (2, SpiMode::Mode2),
            (3, SpiMode::Mode3),
        ] {
            let (polarity, phase) = mode_to_clock(mode);
            assert_eq!(SpiMode::new(polarity, phase), expected);
        }
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "dwf-ctl",
            "--mock",
            "--device-index",
            "-1",
            "i2c",
            "--address",
            "0x18",
            "--write",
            "00",
            "--read",
            "1",
        ])
        .unwrap();
        assert!(cli.mock);
        assert_eq!(cli.device_index, Some(-1));
        assert!(matches!(cli.command, Commands::I2c(_)));
    }

    #[test]
    fn test_mock_session_reads_chip_id() {
        let device = DwfDevice::open(
            select_driver(true).unwrap(),
            DeviceProfile::default(),
        )
        .unwrap();
        let args = I2cArgs {
            address: Some(0x18),
            write: "00".to_string(),
            read: 1,
            rate: None,
            scl: None,
            sda: None,
        };
        run_i2c(&device, &SessionConfig::default(), &args).unwrap();
        device.release().unwrap();
    }
}
