//! Core device abstraction for WaveForms instruments.
//!
//! This module provides [`DwfDevice`], which owns the single native
//! connection to an instrument and hands out the power supply, SPI and I2C
//! subsystem accessors that share it.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::driver::{Hdwf, InstrumentDriver, HDWF_NONE};
use crate::error::{DwfError, Result};
use crate::subsystem::i2c::I2cBus;
use crate::subsystem::power_supply::PowerSupply;
use crate::subsystem::spi::SpiBus;

/// Resource allocation preset applied when the device is opened.
///
/// Each preset divides the instrument's buffer memory between the scope,
/// waveform generator, logic analyzer and pattern generator. The two `1v8`
/// presets also switch the digital I/O rail to 1.8 V.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum DeviceProfile {
    /// Scope 8k, wavegen 4k, logic 4k, patterns 1k
    #[default]
    Scope8kWavegen4kLogic4kPatterns1k = 0,
    /// Scope 16k, wavegen 1k, logic 1k, no patterns
    Scope16kWavegen1kLogic1k = 1,
    /// Scope 2k, wavegen 16k, no logic, no patterns
    Scope2kWavegen16k = 2,
    /// Scope 512, wavegen 256, logic 16k, patterns 16k
    Scope512Wavegen256Logic16kPatterns16k = 3,
    /// As the default preset, with 1.8 V digital I/O
    Scope8kWavegen4kLogic4kPatterns1k1v8 = 4,
    /// Scope 8k, wavegen 4k, logic 2k, patterns 256, power supply optimised
    Scope8kWavegen4kLogic2kPatterns256Power = 5,
    /// Scope 512, wavegen 256, logic 16k, patterns 16k, with 1.8 V digital I/O
    Scope512Wavegen256Logic16kPatterns16k1v8 = 6,
}

impl DeviceProfile {
    /// Convert from the raw configuration index.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Scope8kWavegen4kLogic4kPatterns1k),
            1 => Some(Self::Scope16kWavegen1kLogic1k),
            2 => Some(Self::Scope2kWavegen16k),
            3 => Some(Self::Scope512Wavegen256Logic16kPatterns16k),
            4 => Some(Self::Scope8kWavegen4kLogic4kPatterns1k1v8),
            5 => Some(Self::Scope8kWavegen4kLogic2kPatterns256Power),
            6 => Some(Self::Scope512Wavegen256Logic16kPatterns16k1v8),
            _ => None,
        }
    }

    /// Raw configuration index passed to the driver.
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Whether this preset runs the digital I/O at 1.8 V.
    pub fn is_1v8(self) -> bool {
        matches!(
            self,
            Self::Scope8kWavegen4kLogic4kPatterns1k1v8 | Self::Scope512Wavegen256Logic16kPatterns16k1v8
        )
    }
}

/// Which device to open and how.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OpenOptions {
    /// Resource preset
    pub profile: DeviceProfile,
    /// Enumeration index, `-1` for the first available device
    pub device_index: i32,
    /// Device name or serial number; takes precedence over the index
    pub device_name: Option<String>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            profile: DeviceProfile::default(),
            device_index: -1,
            device_name: None,
        }
    }
}

impl OpenOptions {
    /// Open the first available device with `profile`.
    pub fn new(profile: DeviceProfile) -> Self {
        Self {
            profile,
            ..Self::default()
        }
    }

    /// Select a device by enumeration index.
    pub fn device_index(mut self, index: i32) -> Self {
        self.device_index = index;
        self
    }

    /// Select a device by product name or serial number.
    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    fn requested_name(&self) -> Option<&str> {
        self.device_name.as_deref().filter(|name| !name.is_empty())
    }

    fn describe(&self) -> String {
        match (self.requested_name(), self.device_index) {
            (Some(name), _) => name.to_string(),
            (None, -1) => "first available".to_string(),
            (None, index) => format!("index {}", index),
        }
    }
}

/// Internal state shared between the device and its subsystems.
struct DeviceInner {
    driver: Arc<dyn InstrumentDriver>,
    /// Native handle, [`HDWF_NONE`] once released.
    /// The lock also serializes every driver call made through this device.
    hdwf: Mutex<Hdwf>,
    profile: DeviceProfile,
    device_index: i32,
    device_name: Option<String>,
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        let hdwf = *self.hdwf.get_mut();
        if hdwf == HDWF_NONE {
            return;
        }
        debug!(hdwf, "Closing unreleased WaveForms device");
        if !self.driver.device_close(hdwf) {
            warn!(hdwf, "Error closing WaveForms device");
        }
    }
}

/// A handle to one opened WaveForms instrument.
///
/// Cloning is cheap and shares the connection. Subsystem accessors hold a
/// clone; after [`release`](Self::release) every clone and accessor fails
/// with [`DwfError::DeviceReleased`]. A handle that is never released is
/// closed when its last clone is dropped.
///
/// # Thread Safety
///
/// `DwfDevice` is `Send` and `Sync`. Each driver call, and each framed SPI
/// transaction, runs under one lock, so accessors used from different threads
/// never interleave inside a call. Pin assignments are still shared: keep two
/// buses off the same pins.
#[derive(Clone)]
pub struct DwfDevice {
    inner: Arc<DeviceInner>,
}

impl DwfDevice {
    /// Open the first available device with `profile`.
    ///
    /// # Errors
    ///
    /// Returns [`DwfError::DeviceOpen`] if the driver hands back no handle.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use daq_driver_dwf::{DeviceProfile, DwfDevice, MockDriver};
    ///
    /// let device = DwfDevice::open(Arc::new(MockDriver::new()), DeviceProfile::default())?;
    /// device.release()?;
    /// # Ok::<(), daq_driver_dwf::DwfError>(())
    /// ```
    pub fn open(driver: Arc<dyn InstrumentDriver>, profile: DeviceProfile) -> Result<Self> {
        Self::open_with(driver, &OpenOptions::new(profile))
    }

    /// Open a device selected by index or name.
    pub fn open_with(driver: Arc<dyn InstrumentDriver>, options: &OpenOptions) -> Result<Self> {
        let device_index = match options.requested_name() {
            Some(name) => find_device(driver.as_ref(), name)?,
            None => options.device_index,
        };

        let hdwf = driver.device_config_open(device_index, options.profile.as_raw());
        if hdwf == HDWF_NONE {
            return Err(DwfError::DeviceOpen {
                device: options.describe(),
                message: DwfError::diagnostic(driver.as_ref()),
            });
        }

        info!(
            hdwf,
            device_index,
            profile = ?options.profile,
            "Opened WaveForms device"
        );

        Ok(Self {
            inner: Arc::new(DeviceInner {
                driver,
                hdwf: Mutex::new(hdwf),
                profile: options.profile,
                device_index,
                device_name: options.requested_name().map(str::to_string),
            }),
        })
    }

    /// Close the native connection.
    ///
    /// The handle is invalid afterwards even if the driver reports an error
    /// while closing.
    ///
    /// # Errors
    ///
    /// Returns [`DwfError::DeviceReleased`] if the handle was already
    /// released, or [`DwfError::Driver`] if the close call failed.
    pub fn release(&self) -> Result<()> {
        let mut hdwf = self.inner.hdwf.lock();
        if *hdwf == HDWF_NONE {
            return Err(DwfError::DeviceReleased);
        }
        let closing = std::mem::replace(&mut *hdwf, HDWF_NONE);
        let driver = self.inner.driver.as_ref();

        if !driver.device_close(closing) {
            let err = DwfError::driver(driver, "FDwfDeviceClose");
            warn!(hdwf = closing, error = %err, "Error closing WaveForms device");
            return Err(err);
        }

        info!(hdwf = closing, "Released WaveForms device");
        Ok(())
    }

    /// Run `f` with exclusive access to the driver and the live handle.
    ///
    /// The closure must not call back into this device.
    pub(crate) fn with_handle<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&dyn InstrumentDriver, Hdwf) -> Result<R>,
    {
        let hdwf = self.inner.hdwf.lock();
        if *hdwf == HDWF_NONE {
            return Err(DwfError::DeviceReleased);
        }
        f(self.inner.driver.as_ref(), *hdwf)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        self.with_handle(|_, _| Ok(()))
    }

    /// Whether the handle is still open.
    pub fn is_open(&self) -> bool {
        *self.inner.hdwf.lock() != HDWF_NONE
    }

    /// The native handle, or `None` after release.
    pub fn hdwf(&self) -> Option<Hdwf> {
        let hdwf = *self.inner.hdwf.lock();
        (hdwf != HDWF_NONE).then_some(hdwf)
    }

    /// The resource preset the device was opened with.
    pub fn profile(&self) -> DeviceProfile {
        self.inner.profile
    }

    /// Enumeration index used at open time (`-1` = first available).
    pub fn device_index(&self) -> i32 {
        self.inner.device_index
    }

    /// Name or serial number the device was opened by, if any.
    pub fn device_name(&self) -> Option<&str> {
        self.inner.device_name.as_deref()
    }

    /// Get a power supply accessor.
    pub fn acquire_power_supply(&self) -> Result<PowerSupply> {
        PowerSupply::new(self.clone())
    }

    /// Get a SPI bus accessor, optionally resetting the SPI engine first.
    pub fn acquire_spi_bus(&self, reset: bool) -> Result<SpiBus> {
        SpiBus::new(self.clone(), reset)
    }

    /// Get an I2C bus accessor, optionally resetting the I2C engine first.
    pub fn acquire_i2c_bus(&self, reset: bool) -> Result<I2cBus> {
        I2cBus::new(self.clone(), reset)
    }
}

/// Find the enumeration index of a device by product name or serial number.
fn find_device(driver: &dyn InstrumentDriver, name: &str) -> Result<i32> {
    let open_error = |message: String| DwfError::DeviceOpen {
        device: name.to_string(),
        message,
    };

    let count = driver
        .enumerate_devices()
        .ok_or_else(|| open_error(DwfError::diagnostic(driver)))?;

    let wanted = name.trim();
    for index in 0..count {
        let product = driver.enum_device_name(index);
        let serial = driver.enum_serial_number(index);
        let serial_matches = serial.as_deref().is_some_and(|sn| {
            sn == wanted || sn.strip_prefix("SN:") == Some(wanted)
        });
        if product.as_deref() == Some(wanted) || serial_matches {
            debug!(index, name = wanted, "Resolved device name");
            return Ok(index);
        }
    }

    Err(open_error(format!(
        "no attached device matches (searched {} devices)",
        count
    )))
}

impl std::fmt::Debug for DwfDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DwfDevice")
            .field("hdwf", &self.hdwf())
            .field("profile", &self.inner.profile)
            .field("device_index", &self.inner.device_index)
            .field("device_name", &self.inner.device_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{DriverCall, MockDriver};

    fn mock() -> Arc<MockDriver> {
        Arc::new(MockDriver::new())
    }

    #[test]
    fn test_profile_raw_roundtrip() {
        for raw in 0..7 {
            let profile = DeviceProfile::from_raw(raw).unwrap();
            assert_eq!(profile.as_raw(), raw);
        }
        assert_eq!(DeviceProfile::from_raw(7), None);
        assert!(DeviceProfile::Scope8kWavegen4kLogic4kPatterns1k1v8.is_1v8());
        assert!(!DeviceProfile::default().is_1v8());
    }

    #[test]
    fn test_open_passes_index_and_profile() {
        let driver = mock();
        let device = DwfDevice::open_with(
            driver.clone(),
            &OpenOptions::new(DeviceProfile::Scope512Wavegen256Logic16kPatterns16k),
        )
        .unwrap();

        assert!(device.is_open());
        assert_eq!(device.device_index(), -1);
        assert_eq!(
            driver.calls(),
            vec![DriverCall::DeviceConfigOpen {
                device_index: -1,
                config: 3
            }]
        );
    }

    #[test]
    fn test_open_failure_carries_diagnostic() {
        let driver = mock();
        driver.set_open_fails(true);
        driver.set_last_error(Some("Device is being used by another application."));

        let err = DwfDevice::open(driver, DeviceProfile::default()).unwrap_err();
        assert!(err.is_open_failure());
        assert!(err.to_string().contains("another application"));
    }

    #[test]
    fn test_open_failure_without_diagnostic() {
        let driver = mock();
        driver.set_open_fails(true);

        let err = DwfDevice::open(driver, DeviceProfile::default()).unwrap_err();
        assert_eq!(
            err,
            DwfError::DeviceOpen {
                device: "first available".to_string(),
                message: "Unknown error".to_string(),
            }
        );
    }

    #[test]
    fn test_open_by_name_and_serial() {
        let driver = mock();
        driver.add_device("Digital Discovery", "SN:210321B00011");

        let by_name = DwfDevice::open_with(
            driver.clone(),
            &OpenOptions::default().device_name("Digital Discovery"),
        )
        .unwrap();
        assert_eq!(by_name.device_index(), 1);
        assert_eq!(by_name.device_name(), Some("Digital Discovery"));

        let by_serial =
            DwfDevice::open_with(driver.clone(), &OpenOptions::default().device_name("210321B00011"))
                .unwrap();
        assert_eq!(by_serial.device_index(), 1);
    }

    #[test]
    fn test_open_unknown_name_fails() {
        let err = DwfDevice::open_with(mock(), &OpenOptions::default().device_name("Nope"))
            .unwrap_err();
        assert!(err.is_open_failure());
    }

    #[test]
    fn test_empty_name_uses_index() {
        let driver = mock();
        let device =
            DwfDevice::open_with(driver, &OpenOptions::default().device_index(0).device_name(""))
                .unwrap();
        assert_eq!(device.device_index(), 0);
        assert_eq!(device.device_name(), None);
    }

    #[test]
    fn test_release_invalidates_clones() {
        let driver = mock();
        let device = DwfDevice::open(driver.clone(), DeviceProfile::default()).unwrap();
        let hdwf = device.hdwf().unwrap();
        let clone = device.clone();

        device.release().unwrap();
        assert!(!driver.is_open(hdwf));
        assert!(!clone.is_open());
        assert_eq!(clone.hdwf(), None);
        assert_eq!(clone.ensure_open(), Err(DwfError::DeviceReleased));
    }

    #[test]
    fn test_double_release_is_error() {
        let device = DwfDevice::open(mock(), DeviceProfile::default()).unwrap();
        device.release().unwrap();
        assert_eq!(device.release(), Err(DwfError::DeviceReleased));
    }

    #[test]
    fn test_drop_closes_unreleased_handle() {
        let driver = mock();
        let device = DwfDevice::open(driver.clone(), DeviceProfile::default()).unwrap();
        let hdwf = device.hdwf().unwrap();
        let bus = device.acquire_power_supply().unwrap();

        drop(device);
        assert!(driver.is_open(hdwf));
        drop(bus);
        assert!(!driver.is_open(hdwf));
    }

    #[test]
    fn test_release_reports_close_failure() {
        let driver = mock();
        let device = DwfDevice::open(driver.clone(), DeviceProfile::default()).unwrap();
        driver.fail_call("FDwfDeviceClose");

        let err = device.release().unwrap_err();
        assert!(matches!(
            err,
            DwfError::Driver {
                function: "FDwfDeviceClose",
                ..
            }
        ));
        assert!(!device.is_open());
    }

    #[test]
    fn test_acquire_after_release_fails() {
        let device = DwfDevice::open(mock(), DeviceProfile::default()).unwrap();
        device.release().unwrap();
        assert!(device.acquire_power_supply().unwrap_err().is_released());
        assert!(device.acquire_spi_bus(true).unwrap_err().is_released());
        assert!(device.acquire_i2c_bus(false).unwrap_err().is_released());
    }
}
