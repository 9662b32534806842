//! Safe Rust driver for Digilent WaveForms instruments.
//!
//! This crate drives the programmable power supplies and the SPI and I2C
//! masters of Analog Discovery class instruments through the WaveForms
//! runtime. The runtime is reached through the [`InstrumentDriver`] trait,
//! so the same code runs against real hardware (`NativeDriver`, feature
//! `hardware`) or the in-process [`MockDriver`].
//!
//! # Architecture
//!
//! ## Device Access
//! - [`DwfDevice`] - Device handle; closes the connection on release or drop
//! - [`DeviceProfile`] / [`OpenOptions`] - Resource preset and device selection
//!
//! ## Subsystems
//! - [`PowerSupply`] - V+ / V- set-points, master enable and readback
//! - [`SpiBus`] - SPI master with chip-select framing
//! - [`I2cBus`] - I2C master with NAK reporting
//!
//! ## Configuration
//! - [`SessionConfig`] - TOML session files with `DWF_` environment overrides
//!
//! # Examples
//!
//! ## Reading a sensor ID over I2C
//!
//! ```
//! use std::sync::Arc;
//! use daq_driver_dwf::{DeviceProfile, DwfDevice, I2cConfig, MockDriver};
//!
//! # fn example() -> daq_driver_dwf::Result<()> {
//! let driver = Arc::new(MockDriver::with_demo_peripherals());
//! let device = DwfDevice::open(driver, DeviceProfile::default())?;
//!
//! let mut i2c = device.acquire_i2c_bus(true)?;
//! i2c.configure_bus(I2cConfig::new(0x18))?;
//! let chip_id = i2c.write_read(&[0x00], 1)?;
//! assert_eq!(chip_id.data, vec![0x16]);
//!
//! device.release()?;
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Powering a board from V+
//!
//! ```no_run
//! # #[cfg(feature = "hardware")]
//! # fn example() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use daq_driver_dwf::{DeviceProfile, DwfDevice, NativeDriver};
//!
//! let device = DwfDevice::open(Arc::new(NativeDriver::new()), DeviceProfile::default())?;
//! let mut supply = device.acquire_power_supply()?;
//! supply.configure_positive_supply(3.3, 0.5)?;
//! supply.enable_all_outputs(true)?;
//! let reading = supply.read_positive_supply()?;
//! println!("V+ = {:.3} V, {:.3} A", reading.voltage, reading.current);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod mock;
#[cfg(feature = "hardware")]
pub mod native;
pub mod subsystem;

pub use config::{load_session_config, session_config_from_str, SessionConfig};
pub use device::{DeviceProfile, DwfDevice, OpenOptions};
pub use driver::{Hdwf, InstrumentDriver, HDWF_NONE};
pub use error::{DwfError, Result};
pub use mock::{DriverCall, MockDriver};
#[cfg(feature = "hardware")]
pub use native::NativeDriver;
pub use subsystem::i2c::{I2cBus, I2cClockRate, I2cConfig, I2cTransfer};
pub use subsystem::power_supply::{
    ChannelNode, PowerSupply, PowerSupplyConfig, SupplyChannel, SupplyReading, SupplySetpoint,
};
pub use subsystem::spi::{SpiBus, SpiConfig, SpiMode};
pub use subsystem::{ClockPhase, DioPin, Polarity};
