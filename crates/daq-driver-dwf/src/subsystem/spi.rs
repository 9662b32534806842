//! SPI master.
//!
//! The instrument's SPI engine runs on four digital I/O pins. Transfers are
//! full duplex with 8-bit words on a single data line, MSB first; the
//! chip-select line is driven by this accessor around every transfer.

use serde::Deserialize;
use tracing::debug;

use crate::device::DwfDevice;
use crate::error::{DwfError, Result};
use crate::subsystem::{ClockPhase, DioPin, Polarity};

const SINGLE_DATA_LINE: i32 = 1;
const BITS_PER_WORD: i32 = 8;

/// Standard SPI mode, derived from clock polarity and phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum SpiMode {
    /// CPOL=0, CPHA=0
    Mode0 = 0,
    /// CPOL=0, CPHA=1
    Mode1 = 1,
    /// CPOL=1, CPHA=0
    Mode2 = 2,
    /// CPOL=1, CPHA=1
    Mode3 = 3,
}

impl SpiMode {
    /// Mode for a clock polarity and sampling phase.
    pub fn new(polarity: Polarity, phase: ClockPhase) -> Self {
        match (polarity, phase) {
            (Polarity::IdleLow, ClockPhase::FirstEdge) => Self::Mode0,
            (Polarity::IdleLow, ClockPhase::SecondEdge) => Self::Mode1,
            (Polarity::IdleHigh, ClockPhase::FirstEdge) => Self::Mode2,
            (Polarity::IdleHigh, ClockPhase::SecondEdge) => Self::Mode3,
        }
    }

    /// Native mode value.
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// SPI bus settings.
///
/// Pins must be distinct; the instrument decides what happens otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpiConfig {
    /// Chip-select pin
    pub chip_select: DioPin,
    /// Clock pin
    pub clock: DioPin,
    /// Controller-out data pin
    pub mosi: DioPin,
    /// Controller-in data pin
    pub miso: DioPin,
    /// Clock frequency in Hz
    pub clock_rate: f64,
    /// Clock level at rest
    pub clock_polarity: Polarity,
    /// Sampling edge
    pub clock_phase: ClockPhase,
    /// Chip-select level at rest
    pub cs_polarity: Polarity,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            chip_select: DioPin(0),
            clock: DioPin(1),
            mosi: DioPin(2),
            miso: DioPin(3),
            clock_rate: 10e6,
            clock_polarity: Polarity::IdleLow,
            clock_phase: ClockPhase::FirstEdge,
            cs_polarity: Polarity::IdleHigh,
        }
    }
}

impl SpiConfig {
    /// Settings with explicit pins and rate, mode 0 and an active-low chip-select.
    pub fn new(
        chip_select: impl Into<DioPin>,
        clock: impl Into<DioPin>,
        mosi: impl Into<DioPin>,
        miso: impl Into<DioPin>,
        clock_rate: f64,
    ) -> Self {
        Self {
            chip_select: chip_select.into(),
            clock: clock.into(),
            mosi: mosi.into(),
            miso: miso.into(),
            clock_rate,
            ..Self::default()
        }
    }

    /// Set the clock polarity.
    pub fn with_clock_polarity(mut self, polarity: Polarity) -> Self {
        self.clock_polarity = polarity;
        self
    }

    /// Set the clock phase.
    pub fn with_clock_phase(mut self, phase: ClockPhase) -> Self {
        self.clock_phase = phase;
        self
    }

    /// Set the chip-select idle level.
    pub fn with_cs_polarity(mut self, polarity: Polarity) -> Self {
        self.cs_polarity = polarity;
        self
    }

    /// The SPI mode these settings select.
    pub fn mode(&self) -> SpiMode {
        SpiMode::new(self.clock_polarity, self.clock_phase)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.clock_rate.is_finite() && self.clock_rate > 0.0) {
            return Err(DwfError::InvalidConfig {
                message: format!("SPI clock rate must be positive, got {}", self.clock_rate),
            });
        }
        Ok(())
    }
}

/// SPI master accessor.
#[derive(Debug, Clone)]
pub struct SpiBus {
    device: DwfDevice,
    config: SpiConfig,
}

impl SpiBus {
    pub(crate) fn new(device: DwfDevice, reset: bool) -> Result<Self> {
        let bus = Self {
            device,
            config: SpiConfig::default(),
        };
        if reset {
            bus.reset_instrument()?;
        } else {
            bus.device.ensure_open()?;
        }
        debug!(reset, "Created SPI accessor");
        Ok(bus)
    }

    /// The stored bus settings.
    pub fn config(&self) -> &SpiConfig {
        &self.config
    }

    /// Restore the SPI engine to its power-on defaults.
    ///
    /// The stored settings are kept; call [`configure_bus`](Self::configure_bus)
    /// again to push them.
    pub fn reset_instrument(&self) -> Result<()> {
        self.device.with_handle(|driver, hdwf| {
            let ok = driver.spi_reset(hdwf);
            DwfError::check(driver, ok, "FDwfDigitalSpiReset")
        })
    }

    /// Store `config` and push it to the instrument.
    ///
    /// Pushes the frequency, clock pin, data pins, mode and bit order, then
    /// parks chip-select at its idle level.
    pub fn configure_bus(&mut self, config: SpiConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        let mode = config.mode();

        self.device.with_handle(|driver, hdwf| {
            let ok = driver.spi_frequency_set(hdwf, config.clock_rate);
            DwfError::check(driver, ok, "FDwfDigitalSpiFrequencySet")?;

            let ok = driver.spi_clock_set(hdwf, config.clock.index());
            DwfError::check(driver, ok, "FDwfDigitalSpiClockSet")?;

            for (role, pin) in [
                (dwf_sys::SPI_DQ0_MOSI_SISO, config.mosi),
                (dwf_sys::SPI_DQ1_MISO, config.miso),
            ] {
                let ok = driver.spi_data_set(hdwf, role, pin.index());
                DwfError::check(driver, ok, "FDwfDigitalSpiDataSet")?;
            }

            let ok = driver.spi_mode_set(hdwf, mode.as_raw());
            DwfError::check(driver, ok, "FDwfDigitalSpiModeSet")?;

            let ok = driver.spi_order_set(hdwf, dwf_sys::SPI_ORDER_MSB_FIRST);
            DwfError::check(driver, ok, "FDwfDigitalSpiOrderSet")?;

            let ok = driver.spi_select(
                hdwf,
                config.chip_select.index(),
                config.cs_polarity.idle_level(),
            );
            DwfError::check(driver, ok, "FDwfDigitalSpiSelect")
        })?;

        debug!(
            cs = %config.chip_select,
            sclk = %config.clock,
            mosi = %config.mosi,
            miso = %config.miso,
            clock_rate = config.clock_rate,
            ?mode,
            "Configured SPI bus"
        );
        Ok(())
    }

    /// Assert chip-select, clock out `write` while capturing `read_len`
    /// bytes, then release chip-select.
    ///
    /// Always returns exactly `read_len` bytes. Chip-select is returned to
    /// idle even when the transfer fails, and the whole sequence runs under
    /// the device lock.
    ///
    /// # Errors
    ///
    /// [`DwfError::SpiTransfer`] if the transfer itself failed, or
    /// [`DwfError::Driver`] if chip-select could not be driven.
    pub fn write_read(&self, write: &[u8], read_len: usize) -> Result<Vec<u8>> {
        let cs = self.config.chip_select.index();
        let active = self.config.cs_polarity.active_level();
        let idle = self.config.cs_polarity.idle_level();

        let data = self.device.with_handle(|driver, hdwf| {
            let mut read = vec![0u8; read_len];

            let selected = if driver.spi_select(hdwf, cs, active) {
                Ok(())
            } else {
                Err(DwfError::driver(driver, "FDwfDigitalSpiSelect"))
            };
            let transferred = selected.and_then(|()| {
                if driver.spi_write_read(hdwf, SINGLE_DATA_LINE, BITS_PER_WORD, write, &mut read) {
                    Ok(())
                } else {
                    Err(DwfError::SpiTransfer {
                        message: DwfError::diagnostic(driver),
                    })
                }
            });
            let restored = driver.spi_select(hdwf, cs, idle);

            transferred?;
            if !restored {
                return Err(DwfError::driver(driver, "FDwfDigitalSpiSelect"));
            }
            Ok(read)
        })?;

        debug!(written = write.len(), read = read_len, "SPI transfer");
        Ok(data)
    }
}
