//! The native driver surface consumed by this crate.
//!
//! [`InstrumentDriver`] mirrors the handful of WaveForms runtime calls needed
//! for the power supplies, SPI and I2C. Methods report the native `BOOL`
//! result as `bool` (or `None` where the call also produces an output value);
//! interpreting failures is left to the device and subsystem types.
//!
//! Implementations:
//! - [`NativeDriver`](crate::native::NativeDriver) calls `dwf-sys` (feature `hardware`)
//! - [`MockDriver`](crate::mock::MockDriver) simulates an instrument in-process

/// Native connection token. Zero is never a valid handle.
pub type Hdwf = i32;

/// The token value meaning "no device".
pub const HDWF_NONE: Hdwf = 0;

/// Native call surface of a WaveForms-compatible instrument runtime.
///
/// Implementations must be callable from any thread; the device handle
/// serializes all calls made through it.
pub trait InstrumentDriver: Send + Sync {
    /// Diagnostic text for the most recent failed call, if any.
    fn last_error_message(&self) -> Option<String>;

    /// Number of attached devices, or `None` if enumeration failed.
    fn enumerate_devices(&self) -> Option<i32>;

    /// Product name of an enumerated device.
    fn enum_device_name(&self, index: i32) -> Option<String>;

    /// Serial number of an enumerated device.
    fn enum_serial_number(&self, index: i32) -> Option<String>;

    /// Open a device with a resource configuration. Returns [`HDWF_NONE`] on failure.
    fn device_config_open(&self, device_index: i32, config: i32) -> Hdwf;

    /// Close a device handle.
    fn device_close(&self, hdwf: Hdwf) -> bool;

    /// Set one node (enable, voltage, current) of an analog I/O channel.
    fn analog_io_channel_node_set(&self, hdwf: Hdwf, channel: i32, node: i32, value: f64) -> bool;

    /// Master enable for all analog I/O outputs.
    fn analog_io_enable_set(&self, hdwf: Hdwf, enable: bool) -> bool;

    /// Refresh the analog I/O status. `false` means no fresh readings.
    fn analog_io_status(&self, hdwf: Hdwf) -> bool;

    /// Read one node of an analog I/O channel from the last status.
    fn analog_io_channel_node_status(&self, hdwf: Hdwf, channel: i32, node: i32) -> Option<f64>;

    /// Reset the SPI engine to its defaults.
    fn spi_reset(&self, hdwf: Hdwf) -> bool;

    /// Set the SPI clock frequency in Hz.
    fn spi_frequency_set(&self, hdwf: Hdwf, hz: f64) -> bool;

    /// Assign the SPI clock pin.
    fn spi_clock_set(&self, hdwf: Hdwf, pin: i32) -> bool;

    /// Assign a SPI data role (0 = MOSI/SISO, 1 = MISO) to a pin.
    fn spi_data_set(&self, hdwf: Hdwf, role: i32, pin: i32) -> bool;

    /// Set the SPI mode (0..=3).
    fn spi_mode_set(&self, hdwf: Hdwf, mode: i32) -> bool;

    /// Set the SPI bit order (1 = MSB first).
    fn spi_order_set(&self, hdwf: Hdwf, order: i32) -> bool;

    /// Drive the chip-select pin to a level (0 = low, 1 = high).
    fn spi_select(&self, hdwf: Hdwf, pin: i32, level: i32) -> bool;

    /// Transmit `tx` and capture `rx.len()` words.
    fn spi_write_read(
        &self,
        hdwf: Hdwf,
        data_lines: i32,
        bits_per_word: i32,
        tx: &[u8],
        rx: &mut [u8],
    ) -> bool;

    /// Reset the I2C engine to its defaults.
    fn i2c_reset(&self, hdwf: Hdwf) -> bool;

    /// Set the I2C clock rate in Hz.
    fn i2c_rate_set(&self, hdwf: Hdwf, hz: f64) -> bool;

    /// Assign the SCL pin.
    fn i2c_scl_set(&self, hdwf: Hdwf, pin: i32) -> bool;

    /// Assign the SDA pin.
    fn i2c_sda_set(&self, hdwf: Hdwf, pin: i32) -> bool;

    /// Enable or disable clock stretching.
    fn i2c_stretch_set(&self, hdwf: Hdwf, enable: bool) -> bool;

    /// Clear the bus. Returns the bus-free indicator (0 = a line is held low).
    fn i2c_clear(&self, hdwf: Hdwf) -> Option<i32>;

    /// Combined write/read to an 8-bit (already shifted) address.
    /// Returns the NAK indicator (0 = every byte acknowledged).
    fn i2c_write_read(&self, hdwf: Hdwf, address: u8, tx: &[u8], rx: &mut [u8]) -> Option<i32>;
}
