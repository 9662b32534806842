//! Low-level FFI bindings for the Digilent WaveForms runtime (`dwf`).
//!
//! This crate declares the subset of `dwf.h` needed to drive the analog I/O
//! (programmable supplies), SPI and I2C engines of an Analog Discovery class
//! instrument. Every function returns a C `BOOL` (`0` = failure); call
//! [`FDwfGetLastErrorMsg`] right after a failure to fetch the diagnostic.
//!
//! # Safety
//!
//! All functions in this crate are `unsafe` as they are direct FFI bindings.
//! For a safe wrapper, use the `daq-driver-dwf` crate instead.
//!
//! # Features
//!
//! - `dwf-sdk`: link against the installed WaveForms runtime. Without this
//!   feature the declarations compile but no library is linked, so calling
//!   any of them fails at link time.
//!
//! # Example (unsafe)
//!
//! ```ignore
//! use dwf_sys::*;
//!
//! unsafe {
//!     let mut hdwf: HDWF = hdwfNone;
//!     FDwfDeviceConfigOpen(-1, 0, &mut hdwf);
//!     if hdwf != hdwfNone {
//!         FDwfDeviceClose(hdwf);
//!     }
//! }
//! ```

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(missing_docs)]

use std::os::raw::{c_char, c_int, c_uchar};

/// Device handle returned by `FDwfDeviceOpen`/`FDwfDeviceConfigOpen`.
pub type HDWF = c_int;

/// C `BOOL` as used by the WaveForms API.
pub type BOOL = c_int;

/// Device enumeration filter.
pub type ENUMFILTER = c_int;

/// The invalid device handle.
pub const hdwfNone: HDWF = 0;

pub const enumfilterAll: ENUMFILTER = 0;
pub const enumfilterEExplorer: ENUMFILTER = 1;
pub const enumfilterDiscovery: ENUMFILTER = 2;
pub const enumfilterDiscovery2: ENUMFILTER = 3;
pub const enumfilterDDiscovery: ENUMFILTER = 4;

/// Buffer size required by [`FDwfGetLastErrorMsg`].
pub const DWF_ERROR_MSG_LEN: usize = 512;

/// Buffer size required by [`FDwfEnumDeviceName`] and [`FDwfEnumSN`].
pub const DWF_ENUM_STRING_LEN: usize = 32;

// Analog I/O channel node indices for the Analog Discovery 2 supplies.
pub const ANALOG_IO_NODE_ENABLE: c_int = 0;
pub const ANALOG_IO_NODE_VOLTAGE: c_int = 1;
pub const ANALOG_IO_NODE_CURRENT: c_int = 2;

// SPI data line roles for FDwfDigitalSpiDataSet.
pub const SPI_DQ0_MOSI_SISO: c_int = 0;
pub const SPI_DQ1_MISO: c_int = 1;

// Bit order for FDwfDigitalSpiOrderSet.
pub const SPI_ORDER_LSB_FIRST: c_int = 0;
pub const SPI_ORDER_MSB_FIRST: c_int = 1;

extern "C" {
    // Error and enumeration
    pub fn FDwfGetLastErrorMsg(szError: *mut c_char) -> BOOL;
    pub fn FDwfEnum(enumfilter: ENUMFILTER, pcDevice: *mut c_int) -> BOOL;
    pub fn FDwfEnumDeviceName(idxDevice: c_int, szDeviceName: *mut c_char) -> BOOL;
    pub fn FDwfEnumSN(idxDevice: c_int, szSN: *mut c_char) -> BOOL;

    // Device lifecycle
    pub fn FDwfDeviceConfigOpen(idxDev: c_int, idxCfg: c_int, phdwf: *mut HDWF) -> BOOL;
    pub fn FDwfDeviceClose(hdwf: HDWF) -> BOOL;

    // Analog I/O (power supplies)
    pub fn FDwfAnalogIOEnableSet(hdwf: HDWF, fMasterEnable: c_int) -> BOOL;
    pub fn FDwfAnalogIOStatus(hdwf: HDWF) -> BOOL;
    pub fn FDwfAnalogIOChannelNodeSet(
        hdwf: HDWF,
        idxChannel: c_int,
        idxNode: c_int,
        value: f64,
    ) -> BOOL;
    pub fn FDwfAnalogIOChannelNodeStatus(
        hdwf: HDWF,
        idxChannel: c_int,
        idxNode: c_int,
        pvalue: *mut f64,
    ) -> BOOL;

    // SPI
    pub fn FDwfDigitalSpiReset(hdwf: HDWF) -> BOOL;
    pub fn FDwfDigitalSpiFrequencySet(hdwf: HDWF, hz: f64) -> BOOL;
    pub fn FDwfDigitalSpiClockSet(hdwf: HDWF, idxChannel: c_int) -> BOOL;
    pub fn FDwfDigitalSpiDataSet(hdwf: HDWF, idxDQ: c_int, idxChannel: c_int) -> BOOL;
    pub fn FDwfDigitalSpiModeSet(hdwf: HDWF, iMode: c_int) -> BOOL;
    pub fn FDwfDigitalSpiOrderSet(hdwf: HDWF, fMSBLSB: c_int) -> BOOL;
    pub fn FDwfDigitalSpiSelect(hdwf: HDWF, idxChannel: c_int, level: c_int) -> BOOL;
    pub fn FDwfDigitalSpiWriteRead(
        hdwf: HDWF,
        cDQ: c_int,
        cBitPerWord: c_int,
        rgTX: *const c_uchar,
        cTX: c_int,
        rgRX: *mut c_uchar,
        cRX: c_int,
    ) -> BOOL;

    // I2C
    pub fn FDwfDigitalI2cReset(hdwf: HDWF) -> BOOL;
    pub fn FDwfDigitalI2cClear(hdwf: HDWF, pfFree: *mut c_int) -> BOOL;
    pub fn FDwfDigitalI2cStretchSet(hdwf: HDWF, fEnable: c_int) -> BOOL;
    pub fn FDwfDigitalI2cRateSet(hdwf: HDWF, freq: f64) -> BOOL;
    pub fn FDwfDigitalI2cSclSet(hdwf: HDWF, idxChannel: c_int) -> BOOL;
    pub fn FDwfDigitalI2cSdaSet(hdwf: HDWF, idxChannel: c_int) -> BOOL;
    pub fn FDwfDigitalI2cWriteRead(
        hdwf: HDWF,
        adr8bits: c_uchar,
        rgbTx: *const c_uchar,
        cTx: c_int,
        rgRx: *mut c_uchar,
        cRx: c_int,
        pNak: *mut c_int,
    ) -> BOOL;
}
