//! [`InstrumentDriver`] backed by the installed WaveForms runtime.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};

use dwf_sys::{DWF_ENUM_STRING_LEN, DWF_ERROR_MSG_LEN};

use crate::driver::{Hdwf, InstrumentDriver};

/// Driver that forwards every call to `dwf-sys`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeDriver;

impl NativeDriver {
    /// Create the native driver.
    pub fn new() -> Self {
        Self
    }
}

fn ok(result: c_int) -> bool {
    result != 0
}

fn buffer_to_string(buf: &[c_char]) -> Option<String> {
    if !buf.contains(&0) {
        return None;
    }
    // SAFETY: the buffer is NUL-terminated (checked above)
    let text = unsafe { CStr::from_ptr(buf.as_ptr()) }
        .to_string_lossy()
        .trim()
        .to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn len_as_c_int(len: usize) -> c_int {
    c_int::try_from(len).unwrap_or(c_int::MAX)
}

impl InstrumentDriver for NativeDriver {
    fn last_error_message(&self) -> Option<String> {
        let mut buf = [0 as c_char; DWF_ERROR_MSG_LEN];
        // SAFETY: buf has the size the API requires
        if !ok(unsafe { dwf_sys::FDwfGetLastErrorMsg(buf.as_mut_ptr()) }) {
            return None;
        }
        buffer_to_string(&buf)
    }

    fn enumerate_devices(&self) -> Option<i32> {
        let mut count: c_int = 0;
        // SAFETY: count is a valid out pointer
        ok(unsafe { dwf_sys::FDwfEnum(dwf_sys::enumfilterAll, &mut count) }).then_some(count)
    }

    fn enum_device_name(&self, index: i32) -> Option<String> {
        let mut buf = [0 as c_char; DWF_ENUM_STRING_LEN];
        // SAFETY: buf has the size the API requires
        if !ok(unsafe { dwf_sys::FDwfEnumDeviceName(index, buf.as_mut_ptr()) }) {
            return None;
        }
        buffer_to_string(&buf)
    }

    fn enum_serial_number(&self, index: i32) -> Option<String> {
        let mut buf = [0 as c_char; DWF_ENUM_STRING_LEN];
        // SAFETY: buf has the size the API requires
        if !ok(unsafe { dwf_sys::FDwfEnumSN(index, buf.as_mut_ptr()) }) {
            return None;
        }
        buffer_to_string(&buf)
    }

    fn device_config_open(&self, device_index: i32, config: i32) -> Hdwf {
        let mut hdwf = dwf_sys::hdwfNone;
        // SAFETY: hdwf is a valid out pointer; it stays hdwfNone on failure
        unsafe { dwf_sys::FDwfDeviceConfigOpen(device_index, config, &mut hdwf) };
        hdwf
    }

    fn device_close(&self, hdwf: Hdwf) -> bool {
        // SAFETY: plain value arguments
        ok(unsafe { dwf_sys::FDwfDeviceClose(hdwf) })
    }

    fn analog_io_channel_node_set(&self, hdwf: Hdwf, channel: i32, node: i32, value: f64) -> bool {
        // SAFETY: plain value arguments
        ok(unsafe { dwf_sys::FDwfAnalogIOChannelNodeSet(hdwf, channel, node, value) })
    }

    fn analog_io_enable_set(&self, hdwf: Hdwf, enable: bool) -> bool {
        // SAFETY: plain value arguments
        ok(unsafe { dwf_sys::FDwfAnalogIOEnableSet(hdwf, c_int::from(enable)) })
    }

    fn analog_io_status(&self, hdwf: Hdwf) -> bool {
        // SAFETY: plain value arguments
        ok(unsafe { dwf_sys::FDwfAnalogIOStatus(hdwf) })
    }

    fn analog_io_channel_node_status(&self, hdwf: Hdwf, channel: i32, node: i32) -> Option<f64> {
        let mut value = 0.0;
        // SAFETY: value is a valid out pointer
        ok(unsafe { dwf_sys::FDwfAnalogIOChannelNodeStatus(hdwf, channel, node, &mut value) })
            .then_some(value)
    }

    fn spi_reset(&self, hdwf: Hdwf) -> bool {
        // SAFETY: plain value arguments
        ok(unsafe { dwf_sys::FDwfDigitalSpiReset(hdwf) })
    }

    fn spi_frequency_set(&self, hdwf: Hdwf, hz: f64) -> bool {
        // SAFETY: plain value arguments
        ok(unsafe { dwf_sys::FDwfDigitalSpiFrequencySet(hdwf, hz) })
    }

    fn spi_clock_set(&self, hdwf: Hdwf, pin: i32) -> bool {
        // SAFETY: plain value arguments
        ok(unsafe { dwf_sys::FDwfDigitalSpiClockSet(hdwf, pin) })
    }

    fn spi_data_set(&self, hdwf: Hdwf, role: i32, pin: i32) -> bool {
        // SAFETY: plain value arguments
        ok(unsafe { dwf_sys::FDwfDigitalSpiDataSet(hdwf, role, pin) })
    }

    fn spi_mode_set(&self, hdwf: Hdwf, mode: i32) -> bool {
        // SAFETY: plain value arguments
        ok(unsafe { dwf_sys::FDwfDigitalSpiModeSet(hdwf, mode) })
    }

    fn spi_order_set(&self, hdwf: Hdwf, order: i32) -> bool {
        // SAFETY: plain value arguments
        ok(unsafe { dwf_sys::FDwfDigitalSpiOrderSet(hdwf, order) })
    }

    fn spi_select(&self, hdwf: Hdwf, pin: i32, level: i32) -> bool {
        // SAFETY: plain value arguments
        ok(unsafe { dwf_sys::FDwfDigitalSpiSelect(hdwf, pin, level) })
    }

    fn spi_write_read(
        &self,
        hdwf: Hdwf,
        data_lines: i32,
        bits_per_word: i32,
        tx: &[u8],
        rx: &mut [u8],
    ) -> bool {
        // SAFETY: pointer/length pairs come from live slices
        ok(unsafe {
            dwf_sys::FDwfDigitalSpiWriteRead(
                hdwf,
                data_lines,
                bits_per_word,
                tx.as_ptr(),
                len_as_c_int(tx.len()),
                rx.as_mut_ptr(),
                len_as_c_int(rx.len()),
            )
        })
    }

    fn i2c_reset(&self, hdwf: Hdwf) -> bool {
        // SAFETY: plain value arguments
        ok(unsafe { dwf_sys::FDwfDigitalI2cReset(hdwf) })
    }

    fn i2c_rate_set(&self, hdwf: Hdwf, hz: f64) -> bool {
        // SAFETY: plain value arguments
        ok(unsafe { dwf_sys::FDwfDigitalI2cRateSet(hdwf, hz) })
    }

    fn i2c_scl_set(&self, hdwf: Hdwf, pin: i32) -> bool {
        // SAFETY: plain value arguments
        ok(unsafe { dwf_sys::FDwfDigitalI2cSclSet(hdwf, pin) })
    }

    fn i2c_sda_set(&self, hdwf: Hdwf, pin: i32) -> bool {
        // SAFETY: plain value arguments
        ok(unsafe { dwf_sys::FDwfDigitalI2cSdaSet(hdwf, pin) })
    }

    fn i2c_stretch_set(&self, hdwf: Hdwf, enable: bool) -> bool {
        // SAFETY: plain value arguments
        ok(unsafe { dwf_sys::FDwfDigitalI2cStretchSet(hdwf, c_int::from(enable)) })
    }

    fn i2c_clear(&self, hdwf: Hdwf) -> Option<i32> {
        let mut free: c_int = 0;
        // SAFETY: free is a valid out pointer
        ok(unsafe { dwf_sys::FDwfDigitalI2cClear(hdwf, &mut free) }).then_some(free)
    }

    fn i2c_write_read(&self, hdwf: Hdwf, address: u8, tx: &[u8], rx: &mut [u8]) -> Option<i32> {
        let mut nak: c_int = 0;
        // SAFETY: pointer/length pairs come from live slices; nak is a valid out pointer
        ok(unsafe {
            dwf_sys::FDwfDigitalI2cWriteRead(
                hdwf,
                address,
                tx.as_ptr(),
                len_as_c_int(tx.len()),
                rx.as_mut_ptr(),
                len_as_c_int(rx.len()),
                &mut nak,
            )
        })
        .then_some(nak)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_to_string() {
        let mut buf = [0 as c_char; 8];
        assert_eq!(buffer_to_string(&buf), None);

        for (slot, byte) in buf.iter_mut().zip(b"AD2 ") {
            *slot = *byte as c_char;
        }
        assert_eq!(buffer_to_string(&buf), Some("AD2".to_string()));

        let unterminated = [b'x' as c_char; 4];
        assert_eq!(buffer_to_string(&unterminated), None);
    }
}
