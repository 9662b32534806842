//! I2C master.
//!
//! Transactions address a single 7-bit slave stored in the bus settings.
//! A NAK is not an error: the captured bytes are returned together with the
//! NAK indicator and the caller decides what to do.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::device::DwfDevice;
use crate::error::{DwfError, Result};
use crate::subsystem::DioPin;

/// Highest valid 7-bit address.
pub const MAX_ADDRESS: u8 = 0x7F;

/// Standard I2C clock rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum I2cClockRate {
    /// 100 kHz
    Standard,
    /// 400 kHz
    Fast,
    /// 1 MHz
    FastPlus,
}

impl I2cClockRate {
    /// Rate in Hz.
    pub fn hz(self) -> f64 {
        match self {
            Self::Standard => 100e3,
            Self::Fast => 400e3,
            Self::FastPlus => 1e6,
        }
    }
}

/// I2C bus settings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct I2cConfig {
    /// Clock rate in Hz; any positive rate is accepted
    pub clock_rate: f64,
    /// 7-bit slave address
    pub address: u8,
    /// Clock pin
    pub scl: DioPin,
    /// Data pin
    pub sda: DioPin,
    /// Allow the slave to hold SCL low
    pub clock_stretching: bool,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self {
            clock_rate: I2cClockRate::Standard.hz(),
            address: 0,
            scl: DioPin(0),
            sda: DioPin(1),
            clock_stretching: true,
        }
    }
}

impl I2cConfig {
    /// Settings for a slave at `address` with the default pins and rate.
    pub fn new(address: u8) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }

    /// Set the clock rate in Hz.
    pub fn with_clock_rate(mut self, hz: f64) -> Self {
        self.clock_rate = hz;
        self
    }

    /// Set the SCL and SDA pins.
    pub fn with_pins(mut self, scl: impl Into<DioPin>, sda: impl Into<DioPin>) -> Self {
        self.scl = scl.into();
        self.sda = sda.into();
        self
    }

    /// Enable or disable clock stretching.
    pub fn with_clock_stretching(mut self, enabled: bool) -> Self {
        self.clock_stretching = enabled;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.address > MAX_ADDRESS {
            return Err(DwfError::InvalidAddress {
                address: self.address,
            });
        }
        if !(self.clock_rate.is_finite() && self.clock_rate > 0.0) {
            return Err(DwfError::InvalidConfig {
                message: format!("I2C clock rate must be positive, got {}", self.clock_rate),
            });
        }
        Ok(())
    }
}

/// Result of one combined write/read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cTransfer {
    /// Captured bytes, always as many as requested
    pub data: Vec<u8>,
    /// Native NAK indicator; 0 when every byte was acknowledged
    pub nak: i32,
}

impl I2cTransfer {
    /// Whether the slave acknowledged the whole transaction.
    pub fn is_acked(&self) -> bool {
        self.nak == 0
    }

    /// Take the captured bytes regardless of acknowledgement.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// I2C master accessor.
#[derive(Debug, Clone)]
pub struct I2cBus {
    device: DwfDevice,
    config: I2cConfig,
}

impl I2cBus {
    pub(crate) fn new(device: DwfDevice, reset: bool) -> Result<Self> {
        let bus = Self {
            device,
            config: I2cConfig::default(),
        };
        if reset {
            bus.reset_instrument()?;
        } else {
            bus.device.ensure_open()?;
        }
        debug!(reset, "Created I2C accessor");
        Ok(bus)
    }

    /// The stored bus settings.
    pub fn config(&self) -> &I2cConfig {
        &self.config
    }

    /// Restore the I2C engine to its power-on defaults. Stored settings are kept.
    pub fn reset_instrument(&self) -> Result<()> {
        self.device.with_handle(|driver, hdwf| {
            let ok = driver.i2c_reset(hdwf);
            DwfError::check(driver, ok, "FDwfDigitalI2cReset")
        })
    }

    /// Push `config` to the instrument and clear the bus.
    ///
    /// The settings are stored only once the bus clear succeeds.
    ///
    /// # Errors
    ///
    /// - [`DwfError::InvalidAddress`] before any driver call when the
    ///   address does not fit in 7 bits
    /// - [`DwfError::I2cBusFault`] when SCL or SDA is held low after the
    ///   clear, usually missing pull-up resistors
    pub fn configure_bus(&mut self, config: I2cConfig) -> Result<()> {
        config.validate()?;

        self.device.with_handle(|driver, hdwf| {
            let ok = driver.i2c_rate_set(hdwf, config.clock_rate);
            DwfError::check(driver, ok, "FDwfDigitalI2cRateSet")?;

            let ok = driver.i2c_scl_set(hdwf, config.scl.index());
            DwfError::check(driver, ok, "FDwfDigitalI2cSclSet")?;

            let ok = driver.i2c_sda_set(hdwf, config.sda.index());
            DwfError::check(driver, ok, "FDwfDigitalI2cSdaSet")?;

            let ok = driver.i2c_stretch_set(hdwf, config.clock_stretching);
            DwfError::check(driver, ok, "FDwfDigitalI2cStretchSet")?;

            let free = driver
                .i2c_clear(hdwf)
                .ok_or_else(|| DwfError::driver(driver, "FDwfDigitalI2cClear"))?;
            if free == 0 {
                return Err(DwfError::I2cBusFault {
                    message: format!("bus not free after clear (SCL {}, SDA {})", config.scl, config.sda),
                });
            }
            Ok(())
        })?;

        self.config = config;
        debug!(
            address = config.address,
            clock_rate = config.clock_rate,
            scl = %config.scl,
            sda = %config.sda,
            clock_stretching = config.clock_stretching,
            "Configured I2C bus"
        );
        Ok(())
    }

    /// One combined transaction: write `write`, repeated start, read
    /// `read_len` bytes.
    ///
    /// A NAK is logged and reported in [`I2cTransfer::nak`]; the captured
    /// bytes are returned either way.
    pub fn write_read(&self, write: &[u8], read_len: usize) -> Result<I2cTransfer> {
        let address = self.config.address;
        let address8 = address << 1;

        let transfer = self.device.with_handle(|driver, hdwf| {
            let mut data = vec![0u8; read_len];
            let nak = driver
                .i2c_write_read(hdwf, address8, write, &mut data)
                .ok_or_else(|| DwfError::driver(driver, "FDwfDigitalI2cWriteRead"))?;
            Ok(I2cTransfer { data, nak })
        })?;

        if transfer.is_acked() {
            debug!(address, written = write.len(), read = read_len, "I2C transfer");
        } else {
            warn!(address, nak = transfer.nak, "I2C transaction NAK");
        }
        Ok(transfer)
    }
}
