//! In-process simulation of a WaveForms instrument.
//!
//! [`MockDriver`] implements [`InstrumentDriver`] without hardware. It keeps
//! a log of every call (see [`DriverCall`]) so tests can check exactly which
//! native calls were made and in which order, and it simulates:
//!
//! - a device list for open-by-name
//! - the analog I/O supplies (readback follows the set-points while the
//!   channel and the master enable are on)
//! - one SPI peripheral with a 128-byte register file, addressed the way
//!   ST sensors are (bit 7 of the first byte = read, bits 6..0 = register)
//! - any number of I2C peripherals, each with a 256-byte register file and an
//!   auto-incrementing register pointer
//!
//! Calls can be made to fail with [`MockDriver::fail_call`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use daq_driver_dwf::{DeviceProfile, DwfDevice, MockDriver};
//!
//! let driver = Arc::new(MockDriver::with_demo_peripherals());
//! let device = DwfDevice::open(driver.clone(), DeviceProfile::default())?;
//! assert!(device.is_open());
//! device.release()?;
//! assert!(!driver.calls().is_empty());
//! # Ok::<(), daq_driver_dwf::DwfError>(())
//! ```

use std::collections::{BTreeMap, HashSet};

use parking_lot::Mutex;

use crate::driver::{Hdwf, InstrumentDriver, HDWF_NONE};

/// Register read back from the simulated SPI sensor's WHO_AM_I register (LSM6DSO).
pub const LSM6DSO_WHO_AM_I_REG: u8 = 0x0F;
/// Identity value of the simulated SPI sensor.
pub const LSM6DSO_WHO_AM_I: u8 = 0x6C;
/// 7-bit I2C address of the simulated accelerometer (BMA456, SDO to GND).
pub const BMA456_ADDRESS: u8 = 0x18;
/// CHIP_ID register of the simulated accelerometer.
pub const BMA456_CHIP_ID_REG: u8 = 0x00;
/// Identity value of the simulated accelerometer.
pub const BMA456_CHIP_ID: u8 = 0x16;

/// One recorded call into the driver.
///
/// Each variant mirrors one native function (see [`DriverCall::function`])
/// and carries its arguments under the native parameter names.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    EnumerateDevices,
    EnumDeviceName { index: i32 },
    EnumSerialNumber { index: i32 },
    DeviceConfigOpen { device_index: i32, config: i32 },
    DeviceClose { hdwf: Hdwf },
    AnalogIoChannelNodeSet { channel: i32, node: i32, value: f64 },
    AnalogIoEnableSet { enable: bool },
    AnalogIoStatus,
    AnalogIoChannelNodeStatus { channel: i32, node: i32 },
    SpiReset,
    SpiFrequencySet { hz: f64 },
    SpiClockSet { pin: i32 },
    SpiDataSet { role: i32, pin: i32 },
    SpiModeSet { mode: i32 },
    SpiOrderSet { order: i32 },
    SpiSelect { pin: i32, level: i32 },
    SpiWriteRead {
        data_lines: i32,
        bits_per_word: i32,
        tx: Vec<u8>,
        rx_len: usize,
    },
    I2cReset,
    I2cRateSet { hz: f64 },
    I2cSclSet { pin: i32 },
    I2cSdaSet { pin: i32 },
    I2cStretchSet { enable: bool },
    I2cClear,
    I2cWriteRead {
        address: u8,
        tx: Vec<u8>,
        rx_len: usize,
    },
}

impl DriverCall {
    /// Name of the native function this call corresponds to.
    pub fn function(&self) -> &'static str {
        match self {
            Self::EnumerateDevices => "FDwfEnum",
            Self::EnumDeviceName { .. } => "FDwfEnumDeviceName",
            Self::EnumSerialNumber { .. } => "FDwfEnumSN",
            Self::DeviceConfigOpen { .. } => "FDwfDeviceConfigOpen",
            Self::DeviceClose { .. } => "FDwfDeviceClose",
            Self::AnalogIoChannelNodeSet { .. } => "FDwfAnalogIOChannelNodeSet",
            Self::AnalogIoEnableSet { .. } => "FDwfAnalogIOEnableSet",
            Self::AnalogIoStatus => "FDwfAnalogIOStatus",
            Self::AnalogIoChannelNodeStatus { .. } => "FDwfAnalogIOChannelNodeStatus",
            Self::SpiReset => "FDwfDigitalSpiReset",
            Self::SpiFrequencySet { .. } => "FDwfDigitalSpiFrequencySet",
            Self::SpiClockSet { .. } => "FDwfDigitalSpiClockSet",
            Self::SpiDataSet { .. } => "FDwfDigitalSpiDataSet",
            Self::SpiModeSet { .. } => "FDwfDigitalSpiModeSet",
            Self::SpiOrderSet { .. } => "FDwfDigitalSpiOrderSet",
            Self::SpiSelect { .. } => "FDwfDigitalSpiSelect",
            Self::SpiWriteRead { .. } => "FDwfDigitalSpiWriteRead",
            Self::I2cReset => "FDwfDigitalI2cReset",
            Self::I2cRateSet { .. } => "FDwfDigitalI2cRateSet",
            Self::I2cSclSet { .. } => "FDwfDigitalI2cSclSet",
            Self::I2cSdaSet { .. } => "FDwfDigitalI2cSdaSet",
            Self::I2cStretchSet { .. } => "FDwfDigitalI2cStretchSet",
            Self::I2cClear => "FDwfDigitalI2cClear",
            Self::I2cWriteRead { .. } => "FDwfDigitalI2cWriteRead",
        }
    }
}

#[derive(Debug, Clone)]
struct MockDeviceEntry {
    name: String,
    serial: String,
}

#[derive(Debug)]
struct MockState {
    calls: Vec<DriverCall>,
    devices: Vec<MockDeviceEntry>,
    next_token: Hdwf,
    open_handles: HashSet<Hdwf>,
    open_fails: bool,
    last_error: Option<String>,
    failing: HashSet<&'static str>,

    analog_status_ready: bool,
    master_enable: bool,
    /// Per channel: [enable, voltage, current]
    supplies: [[f64; 3]; 2],

    spi_registers: [u8; 128],
    spi_cs_active_high: bool,
    spi_cs_level: Option<i32>,

    i2c_bus_free: bool,
    i2c_devices: BTreeMap<u8, [u8; 256]>,
    i2c_nak_override: Option<i32>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            devices: vec![MockDeviceEntry {
                name: "Analog Discovery 2".to_string(),
                serial: "SN:210321A5F3C2".to_string(),
            }],
            next_token: 1,
            open_handles: HashSet::new(),
            open_fails: false,
            last_error: None,
            failing: HashSet::new(),
            analog_status_ready: true,
            master_enable: false,
            supplies: [[0.0; 3]; 2],
            spi_registers: [0; 128],
            spi_cs_active_high: false,
            spi_cs_level: None,
            i2c_bus_free: true,
            i2c_devices: BTreeMap::new(),
            i2c_nak_override: None,
        }
    }
}

impl MockState {
    /// Record a call and report whether it was configured to fail.
    fn record(&mut self, call: DriverCall) -> bool {
        let function = call.function();
        self.calls.push(call);
        if self.failing.contains(function) {
            self.last_error = Some(format!("{} rejected by mock driver", function));
            false
        } else {
            true
        }
    }

    fn spi_peripheral_selected(&self) -> bool {
        let active = if self.spi_cs_active_high { 1 } else { 0 };
        self.spi_cs_level == Some(active)
    }
}

/// Simulated instrument runtime for tests and `--mock` sessions.
#[derive(Debug, Default)]
pub struct MockDriver {
    state: Mutex<MockState>,
}

impl MockDriver {
    /// Create a mock with one attached device, a free I2C bus, a ready
    /// analog I/O status and no bus peripherals.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock preloaded with an LSM6DSO on SPI and a BMA456 on I2C.
    pub fn with_demo_peripherals() -> Self {
        let mock = Self::new();
        mock.set_spi_register(LSM6DSO_WHO_AM_I_REG, LSM6DSO_WHO_AM_I);
        mock.add_i2c_device(BMA456_ADDRESS, &[(BMA456_CHIP_ID_REG, BMA456_CHIP_ID)]);
        mock
    }

    /// All calls recorded so far, oldest first.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().calls.clone()
    }

    /// Forget the recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Make every call to the named native function fail.
    pub fn fail_call(&self, function: &'static str) {
        self.state.lock().failing.insert(function);
    }

    /// Undo all [`fail_call`](Self::fail_call) settings.
    pub fn clear_failures(&self) {
        self.state.lock().failing.clear();
    }

    /// Set the text returned by `last_error_message`.
    pub fn set_last_error(&self, message: Option<&str>) {
        self.state.lock().last_error = message.map(str::to_string);
    }

    /// Make `device_config_open` return no handle.
    pub fn set_open_fails(&self, fails: bool) {
        self.state.lock().open_fails = fails;
    }

    /// Append a device to the enumeration list.
    pub fn add_device(&self, name: &str, serial: &str) {
        self.state.lock().devices.push(MockDeviceEntry {
            name: name.to_string(),
            serial: serial.to_string(),
        });
    }

    /// Whether `hdwf` is currently open.
    pub fn is_open(&self, hdwf: Hdwf) -> bool {
        self.state.lock().open_handles.contains(&hdwf)
    }

    /// Number of handles currently open.
    pub fn open_handle_count(&self) -> usize {
        self.state.lock().open_handles.len()
    }

    /// Control whether `analog_io_status` reports fresh data.
    pub fn set_analog_status_ready(&self, ready: bool) {
        self.state.lock().analog_status_ready = ready;
    }

    /// Current master enable of the supplies.
    pub fn outputs_enabled(&self) -> bool {
        self.state.lock().master_enable
    }

    /// Write one register of the simulated SPI peripheral.
    pub fn set_spi_register(&self, register: u8, value: u8) {
        self.state.lock().spi_registers[usize::from(register & 0x7F)] = value;
    }

    /// Read one register of the simulated SPI peripheral.
    pub fn spi_register(&self, register: u8) -> u8 {
        self.state.lock().spi_registers[usize::from(register & 0x7F)]
    }

    /// Chip-select polarity expected by the simulated SPI peripheral.
    pub fn set_spi_chip_select_active_high(&self, active_high: bool) {
        self.state.lock().spi_cs_active_high = active_high;
    }

    /// Last level driven on the chip-select pin, if any.
    pub fn spi_chip_select_level(&self) -> Option<i32> {
        self.state.lock().spi_cs_level
    }

    /// Attach an I2C peripheral at a 7-bit address with initial registers.
    pub fn add_i2c_device(&self, address: u8, registers: &[(u8, u8)]) {
        let mut state = self.state.lock();
        let file = state.i2c_devices.entry(address).or_insert([0; 256]);
        for &(register, value) in registers {
            file[usize::from(register)] = value;
        }
    }

    /// Read one register of an attached I2C peripheral.
    pub fn i2c_register(&self, address: u8, register: u8) -> Option<u8> {
        self.state
            .lock()
            .i2c_devices
            .get(&address)
            .map(|file| file[usize::from(register)])
    }

    /// Simulate missing pull-ups (`false`) or a healthy bus (`true`).
    pub fn set_i2c_bus_free(&self, free: bool) {
        self.state.lock().i2c_bus_free = free;
    }

    /// Force the NAK indicator returned by transfers to attached devices.
    pub fn set_i2c_nak_override(&self, nak: Option<i32>) {
        self.state.lock().i2c_nak_override = nak;
    }
}

fn clamp_node(node: i32) -> Option<usize> {
    usize::try_from(node).ok().filter(|&n| n < 3)
}

fn clamp_channel(channel: i32) -> Option<usize> {
    usize::try_from(channel).ok().filter(|&c| c < 2)
}

impl InstrumentDriver for MockDriver {
    fn last_error_message(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    fn enumerate_devices(&self) -> Option<i32> {
        let mut state = self.state.lock();
        if !state.record(DriverCall::EnumerateDevices) {
            return None;
        }
        i32::try_from(state.devices.len()).ok()
    }

    fn enum_device_name(&self, index: i32) -> Option<String> {
        let mut state = self.state.lock();
        if !state.record(DriverCall::EnumDeviceName { index }) {
            return None;
        }
        let index = usize::try_from(index).ok()?;
        state.devices.get(index).map(|d| d.name.clone())
    }

    fn enum_serial_number(&self, index: i32) -> Option<String> {
        let mut state = self.state.lock();
        if !state.record(DriverCall::EnumSerialNumber { index }) {
            return None;
        }
        let index = usize::try_from(index).ok()?;
        state.devices.get(index).map(|d| d.serial.clone())
    }

    fn device_config_open(&self, device_index: i32, config: i32) -> Hdwf {
        let mut state = self.state.lock();
        if !state.record(DriverCall::DeviceConfigOpen {
            device_index,
            config,
        }) {
            return HDWF_NONE;
        }
        if state.open_fails {
            return HDWF_NONE;
        }
        let index_valid = device_index == -1
            || usize::try_from(device_index).is_ok_and(|i| i < state.devices.len());
        if !index_valid || state.devices.is_empty() {
            state.last_error = Some("Device not found".to_string());
            return HDWF_NONE;
        }
        if !(0..=6).contains(&config) {
            state.last_error = Some(format!("Invalid device configuration {}", config));
            return HDWF_NONE;
        }

        let token = state.next_token;
        state.next_token += 1;
        state.open_handles.insert(token);
        token
    }

    fn device_close(&self, hdwf: Hdwf) -> bool {
        let mut state = self.state.lock();
        if !state.record(DriverCall::DeviceClose { hdwf }) {
            return false;
        }
        state.open_handles.remove(&hdwf)
    }

    fn analog_io_channel_node_set(&self, _hdwf: Hdwf, channel: i32, node: i32, value: f64) -> bool {
        let mut state = self.state.lock();
        if !state.record(DriverCall::AnalogIoChannelNodeSet {
            channel,
            node,
            value,
        }) {
            return false;
        }
        match (clamp_channel(channel), clamp_node(node)) {
            (Some(c), Some(n)) => {
                state.supplies[c][n] = value;
                true
            }
            _ => false,
        }
    }

    fn analog_io_enable_set(&self, _hdwf: Hdwf, enable: bool) -> bool {
        let mut state = self.state.lock();
        if !state.record(DriverCall::AnalogIoEnableSet { enable }) {
            return false;
        }
        state.master_enable = enable;
        true
    }

    fn analog_io_status(&self, _hdwf: Hdwf) -> bool {
        let mut state = self.state.lock();
        state.record(DriverCall::AnalogIoStatus) && state.analog_status_ready
    }

    fn analog_io_channel_node_status(&self, _hdwf: Hdwf, channel: i32, node: i32) -> Option<f64> {
        let mut state = self.state.lock();
        if !state.record(DriverCall::AnalogIoChannelNodeStatus { channel, node }) {
            return None;
        }
        let (c, n) = (clamp_channel(channel)?, clamp_node(node)?);
        let supply = state.supplies[c];
        let live = state.master_enable && supply[0] != 0.0;
        Some(if live { supply[n] } else { 0.0 })
    }

    fn spi_reset(&self, _hdwf: Hdwf) -> bool {
        let mut state = self.state.lock();
        if !state.record(DriverCall::SpiReset) {
            return false;
        }
        state.spi_cs_level = None;
        true
    }

    fn spi_frequency_set(&self, _hdwf: Hdwf, hz: f64) -> bool {
        self.state.lock().record(DriverCall::SpiFrequencySet { hz })
    }

    fn spi_clock_set(&self, _hdwf: Hdwf, pin: i32) -> bool {
        self.state.lock().record(DriverCall::SpiClockSet { pin })
    }

    fn spi_data_set(&self, _hdwf: Hdwf, role: i32, pin: i32) -> bool {
        self.state.lock().record(DriverCall::SpiDataSet { role, pin })
    }

    fn spi_mode_set(&self, _hdwf: Hdwf, mode: i32) -> bool {
        self.state.lock().record(DriverCall::SpiModeSet { mode }) && (0..=3).contains(&mode)
    }

    fn spi_order_set(&self, _hdwf: Hdwf, order: i32) -> bool {
        self.state.lock().record(DriverCall::SpiOrderSet { order })
    }

    fn spi_select(&self, _hdwf: Hdwf, pin: i32, level: i32) -> bool {
        let mut state = self.state.lock();
        if !state.record(DriverCall::SpiSelect { pin, level }) {
            return false;
        }
        state.spi_cs_level = Some(level);
        true
    }

    fn spi_write_read(
        &self,
        _hdwf: Hdwf,
        data_lines: i32,
        bits_per_word: i32,
        tx: &[u8],
        rx: &mut [u8],
    ) -> bool {
        let mut state = self.state.lock();
        if !state.record(DriverCall::SpiWriteRead {
            data_lines,
            bits_per_word,
            tx: tx.to_vec(),
            rx_len: rx.len(),
        }) {
            return false;
        }

        if !state.spi_peripheral_selected() {
            // Nobody drives MISO.
            rx.fill(0xFF);
            return true;
        }

        rx.fill(0x00);
        let Some(&command) = tx.first() else {
            return true;
        };
        let register = usize::from(command & 0x7F);
        if command & 0x80 != 0 {
            // Full duplex: the byte clocked out during the command byte is 0,
            // then consecutive registers follow.
            for (i, slot) in rx.iter_mut().enumerate().skip(1) {
                *slot = state.spi_registers[(register + i - 1) & 0x7F];
            }
        } else {
            for (i, &value) in tx.iter().enumerate().skip(1) {
                state.spi_registers[(register + i - 1) & 0x7F] = value;
            }
        }
        true
    }

    fn i2c_reset(&self, _hdwf: Hdwf) -> bool {
        self.state.lock().record(DriverCall::I2cReset)
    }

    fn i2c_rate_set(&self, _hdwf: Hdwf, hz: f64) -> bool {
        self.state.lock().record(DriverCall::I2cRateSet { hz })
    }

    fn i2c_scl_set(&self, _hdwf: Hdwf, pin: i32) -> bool {
        self.state.lock().record(DriverCall::I2cSclSet { pin })
    }

    fn i2c_sda_set(&self, _hdwf: Hdwf, pin: i32) -> bool {
        self.state.lock().record(DriverCall::I2cSdaSet { pin })
    }

    fn i2c_stretch_set(&self, _hdwf: Hdwf, enable: bool) -> bool {
        self.state.lock().record(DriverCall::I2cStretchSet { enable })
    }

    fn i2c_clear(&self, _hdwf: Hdwf) -> Option<i32> {
        let mut state = self.state.lock();
        if !state.record(DriverCall::I2cClear) {
            return None;
        }
        Some(i32::from(state.i2c_bus_free))
    }

    fn i2c_write_read(&self, _hdwf: Hdwf, address: u8, tx: &[u8], rx: &mut [u8]) -> Option<i32> {
        let mut state = self.state.lock();
        if !state.record(DriverCall::I2cWriteRead {
            address,
            tx: tx.to_vec(),
            rx_len: rx.len(),
        }) {
            return None;
        }

        rx.fill(0x00);
        let nak_override = state.i2c_nak_override;
        let Some(file) = state.i2c_devices.get_mut(&(address >> 1)) else {
            // Address byte not acknowledged.
            return Some(1);
        };

        let mut pointer = tx.first().copied().unwrap_or(0);
        for &value in tx.iter().skip(1) {
            file[usize::from(pointer)] = value;
            pointer = pointer.wrapping_add(1);
        }
        let mut pointer = tx.first().copied().unwrap_or(0);
        for slot in rx.iter_mut() {
            *slot = file[usize::from(pointer)];
            pointer = pointer.wrapping_add(1);
        }
        Some(nak_override.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_close_tokens() {
        let mock = MockDriver::new();
        let a = mock.device_config_open(-1, 0);
        let b = mock.device_config_open(0, 3);
        assert_ne!(a, HDWF_NONE);
        assert_ne!(a, b);
        assert_eq!(mock.open_handle_count(), 2);
        assert!(mock.device_close(a));
        assert!(!mock.device_close(a));
        assert!(mock.is_open(b));
    }

    #[test]
    fn test_open_rejects_bad_index_and_config() {
        let mock = MockDriver::new();
        assert_eq!(mock.device_config_open(5, 0), HDWF_NONE);
        assert_eq!(mock.last_error_message().as_deref(), Some("Device not found"));
        assert_eq!(mock.device_config_open(0, 9), HDWF_NONE);
    }

    #[test]
    fn test_fail_call_sets_last_error() {
        let mock = MockDriver::new();
        mock.fail_call("FDwfDigitalSpiModeSet");
        assert!(!mock.spi_mode_set(1, 0));
        assert!(mock
            .last_error_message()
            .is_some_and(|m| m.contains("FDwfDigitalSpiModeSet")));
        mock.clear_failures();
        assert!(mock.spi_mode_set(1, 0));
    }

    #[test]
    fn test_spi_register_read_requires_select() {
        let mock = MockDriver::with_demo_peripherals();
        let mut rx = [0u8; 2];

        assert!(mock.spi_write_read(1, 1, 8, &[0x8F, 0x00], &mut rx));
        assert_eq!(rx, [0xFF, 0xFF]);

        mock.spi_select(1, 0, 0);
        assert!(mock.spi_write_read(1, 1, 8, &[0x8F, 0x00], &mut rx));
        assert_eq!(rx, [0x00, LSM6DSO_WHO_AM_I]);
    }

    #[test]
    fn test_spi_register_write() {
        let mock = MockDriver::new();
        mock.spi_select(1, 0, 0);
        let mut rx = [0u8; 0];
        assert!(mock.spi_write_read(1, 1, 8, &[0x10, 0xAA, 0xBB], &mut rx));
        assert_eq!(mock.spi_register(0x10), 0xAA);
        assert_eq!(mock.spi_register(0x11), 0xBB);
    }

    #[test]
    fn test_i2c_missing_device_naks() {
        let mock = MockDriver::new();
        let mut rx = [0u8; 1];
        assert_eq!(mock.i2c_write_read(1, 0x50 << 1, &[0x00], &mut rx), Some(1));
    }

    #[test]
    fn test_i2c_register_pointer() {
        let mock = MockDriver::new();
        mock.add_i2c_device(0x40, &[(0x02, 0x11), (0x03, 0x22)]);
        let mut rx = [0u8; 2];
        assert_eq!(mock.i2c_write_read(1, 0x80, &[0x02], &mut rx), Some(0));
        assert_eq!(rx, [0x11, 0x22]);

        assert_eq!(mock.i2c_write_read(1, 0x80, &[0x05, 0x7E], &mut []), Some(0));
        assert_eq!(mock.i2c_register(0x40, 0x05), Some(0x7E));
    }

    #[test]
    fn test_supply_readback_follows_enable() {
        let mock = MockDriver::new();
        mock.analog_io_channel_node_set(1, 0, 0, 1.0);
        mock.analog_io_channel_node_set(1, 0, 1, 3.3);
        assert_eq!(mock.analog_io_channel_node_status(1, 0, 1), Some(0.0));
        mock.analog_io_enable_set(1, true);
        assert_eq!(mock.analog_io_channel_node_status(1, 0, 1), Some(3.3));
        assert_eq!(mock.analog_io_channel_node_status(1, 2, 1), None);
    }
}
