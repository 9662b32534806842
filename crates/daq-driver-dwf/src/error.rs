//! Error types for WaveForms device operations.
//!
//! Diagnostics are captured from the native driver at the point of failure,
//! so an error value stays meaningful after later calls overwrite the
//! driver's last-error buffer.

use thiserror::Error;

use crate::driver::InstrumentDriver;

/// Result type alias for WaveForms operations.
pub type Result<T> = std::result::Result<T, DwfError>;

/// Errors that can occur when working with a WaveForms device.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DwfError {
    /// The driver returned no connection token, or no device matched the
    /// requested name.
    #[error("Failed to open device '{device}': {message}")]
    DeviceOpen {
        /// Requested name or index
        device: String,
        /// Driver diagnostic
        message: String,
    },

    /// The device handle was released; no further calls are possible.
    #[error("Device handle has been released")]
    DeviceReleased,

    /// The I2C bus could not be cleared after configuration.
    #[error("I2C bus error, check the pull-ups on SCL and SDA: {message}")]
    I2cBusFault {
        /// Driver diagnostic
        message: String,
    },

    /// The SPI write/read primitive reported failure.
    #[error("SPI transfer failed: {message}")]
    SpiTransfer {
        /// Driver diagnostic
        message: String,
    },

    /// I2C slave address outside the 7-bit range.
    #[error("Invalid I2C address 0x{address:02x}: must be in 0x00..=0x7f")]
    InvalidAddress {
        /// Rejected address
        address: u8,
    },

    /// Any other driver call that reported failure.
    #[error("{function} failed: {message}")]
    Driver {
        /// Native function that failed
        function: &'static str,
        /// Driver diagnostic
        message: String,
    },

    /// Invalid configuration or parameter
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// What was wrong
        message: String,
    },
}

const UNKNOWN_ERROR: &str = "Unknown error";

impl DwfError {
    /// Fetch the driver's last diagnostic, falling back to a generic message.
    pub(crate) fn diagnostic(driver: &dyn InstrumentDriver) -> String {
        driver
            .last_error_message()
            .filter(|msg| !msg.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
    }

    /// Build a [`DwfError::Driver`] for a failed call.
    pub(crate) fn driver(driver: &dyn InstrumentDriver, function: &'static str) -> Self {
        Self::Driver {
            function,
            message: Self::diagnostic(driver),
        }
    }

    /// Turn a native `BOOL` result into a `Result`, capturing the diagnostic
    /// on failure.
    pub(crate) fn check(
        driver: &dyn InstrumentDriver,
        succeeded: bool,
        function: &'static str,
    ) -> Result<()> {
        if succeeded {
            Ok(())
        } else {
            Err(Self::driver(driver, function))
        }
    }

    /// Check if this is an open failure.
    pub fn is_open_failure(&self) -> bool {
        matches!(self, Self::DeviceOpen { .. })
    }

    /// Check if the handle was already released.
    pub fn is_released(&self) -> bool {
        matches!(self, Self::DeviceReleased)
    }

    /// Check if this is the stuck-bus condition reported after I2C setup.
    pub fn is_bus_fault(&self) -> bool {
        matches!(self, Self::I2cBusFault { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDriver;

    #[test]
    fn test_error_display() {
        let err = DwfError::InvalidAddress { address: 0x80 };
        assert!(err.to_string().contains("0x80"));

        let err = DwfError::Driver {
            function: "FDwfDigitalSpiModeSet",
            message: "Invalid mode".to_string(),
        };
        assert_eq!(err.to_string(), "FDwfDigitalSpiModeSet failed: Invalid mode");
    }

    #[test]
    fn test_diagnostic_falls_back() {
        let driver = MockDriver::new();
        assert_eq!(DwfError::diagnostic(&driver), UNKNOWN_ERROR);

        driver.set_last_error(Some("   "));
        assert_eq!(DwfError::diagnostic(&driver), UNKNOWN_ERROR);

        driver.set_last_error(Some("Device programming failed."));
        assert_eq!(DwfError::diagnostic(&driver), "Device programming failed.");
    }

    #[test]
    fn test_predicates() {
        assert!(DwfError::DeviceReleased.is_released());
        assert!(DwfError::I2cBusFault {
            message: String::new()
        }
        .is_bus_fault());
        assert!(!DwfError::DeviceReleased.is_open_failure());
    }
}
