//! Programmable power supplies.
//!
//! The Analog Discovery family exposes two adjustable rails through the
//! analog I/O instrument: V+ on channel 0 and V- on channel 1. Each channel
//! has an enable, a voltage and a current node, and a master switch gates
//! every output at once.

use serde::Deserialize;
use tracing::debug;

use crate::device::DwfDevice;
use crate::error::{DwfError, Result};

/// One of the two supply rails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum SupplyChannel {
    /// V+ rail
    Positive = 0,
    /// V- rail
    Negative = 1,
}

impl SupplyChannel {
    /// Native channel index.
    pub fn index(self) -> i32 {
        self as i32
    }

    /// Whether the rail can produce `voltage`. NaN is accepted by neither.
    pub fn accepts(self, voltage: f64) -> bool {
        match self {
            Self::Positive => voltage >= 0.0,
            Self::Negative => voltage <= 0.0,
        }
    }
}

/// Property of a supply channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ChannelNode {
    /// Channel enable (non-zero = on)
    Enable = dwf_sys::ANALOG_IO_NODE_ENABLE,
    /// Output voltage in volts
    Voltage = dwf_sys::ANALOG_IO_NODE_VOLTAGE,
    /// Current limit in amperes
    Current = dwf_sys::ANALOG_IO_NODE_CURRENT,
}

impl ChannelNode {
    /// Native node index.
    pub fn index(self) -> i32 {
        self as i32
    }
}

/// Voltage and current read back from a rail.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SupplyReading {
    /// Volts
    pub voltage: f64,
    /// Amperes
    pub current: f64,
}

/// Requested output for one rail.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SupplySetpoint {
    /// Volts; the sign must match the rail
    pub voltage: f64,
    /// Current limit in amperes
    pub current: f64,
}

/// Power supply section of a session file.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct PowerSupplyConfig {
    /// V+ set-point
    pub positive: Option<SupplySetpoint>,
    /// V- set-point
    pub negative: Option<SupplySetpoint>,
    /// Master output enable applied after the set-points
    pub enable_outputs: bool,
}

impl SupplySetpoint {
    fn validate(&self, channel: SupplyChannel) -> Result<()> {
        if !channel.accepts(self.voltage) {
            return Err(DwfError::InvalidConfig {
                message: format!("{} V is not a valid {:?} set-point", self.voltage, channel),
            });
        }
        if !(self.current.is_finite() && self.current >= 0.0) {
            return Err(DwfError::InvalidConfig {
                message: format!("current limit {} A is not valid", self.current),
            });
        }
        Ok(())
    }
}

impl PowerSupplyConfig {
    /// Whether applying this config would change anything on the instrument.
    pub fn is_empty(&self) -> bool {
        self.positive.is_none() && self.negative.is_none() && !self.enable_outputs
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(setpoint) = &self.positive {
            setpoint.validate(SupplyChannel::Positive)?;
        }
        if let Some(setpoint) = &self.negative {
            setpoint.validate(SupplyChannel::Negative)?;
        }
        Ok(())
    }
}

/// Power supply accessor.
///
/// Reading a rail refreshes the instrument status first. If the instrument
/// reports no fresh status, the previous reading of that rail is returned
/// unchanged (zero before the first successful read).
#[derive(Debug, Clone)]
pub struct PowerSupply {
    device: DwfDevice,
    last_positive: SupplyReading,
    last_negative: SupplyReading,
}

impl PowerSupply {
    pub(crate) fn new(device: DwfDevice) -> Result<Self> {
        device.ensure_open()?;
        debug!("Created power supply accessor");
        Ok(Self {
            device,
            last_positive: SupplyReading::default(),
            last_negative: SupplyReading::default(),
        })
    }

    /// Configure V+. Does nothing unless `voltage >= 0`.
    ///
    /// The channel is enabled before the voltage and current are written;
    /// the instrument ignores set-points on a disabled channel.
    pub fn configure_positive_supply(&self, voltage: f64, current_limit: f64) -> Result<()> {
        if !SupplyChannel::Positive.accepts(voltage) {
            debug!(voltage, "Ignoring set-point outside V+ range");
            return Ok(());
        }
        self.configure_channel(SupplyChannel::Positive, voltage, current_limit)
    }

    /// Configure V-. Does nothing unless `voltage <= 0`.
    pub fn configure_negative_supply(&self, voltage: f64, current_limit: f64) -> Result<()> {
        if !SupplyChannel::Negative.accepts(voltage) {
            debug!(voltage, "Ignoring set-point outside V- range");
            return Ok(());
        }
        self.configure_channel(SupplyChannel::Negative, voltage, current_limit)
    }

    fn configure_channel(&self, channel: SupplyChannel, voltage: f64, current: f64) -> Result<()> {
        self.device.with_handle(|driver, hdwf| {
            for (node, value) in [
                (ChannelNode::Enable, 1.0),
                (ChannelNode::Voltage, voltage),
                (ChannelNode::Current, current),
            ] {
                let ok =
                    driver.analog_io_channel_node_set(hdwf, channel.index(), node.index(), value);
                DwfError::check(driver, ok, "FDwfAnalogIOChannelNodeSet")?;
            }
            Ok(())
        })?;

        debug!(?channel, voltage, current, "Configured supply channel");
        Ok(())
    }

    /// Switch every supply output on or off.
    pub fn enable_all_outputs(&self, enabled: bool) -> Result<()> {
        self.device.with_handle(|driver, hdwf| {
            let ok = driver.analog_io_enable_set(hdwf, enabled);
            DwfError::check(driver, ok, "FDwfAnalogIOEnableSet")
        })?;
        debug!(enabled, "Set master supply enable");
        Ok(())
    }

    /// Read back V+.
    pub fn read_positive_supply(&mut self) -> Result<SupplyReading> {
        if let Some(reading) = self.read_channel(SupplyChannel::Positive)? {
            self.last_positive = reading;
        }
        Ok(self.last_positive)
    }

    /// Read back V-.
    pub fn read_negative_supply(&mut self) -> Result<SupplyReading> {
        if let Some(reading) = self.read_channel(SupplyChannel::Negative)? {
            self.last_negative = reading;
        }
        Ok(self.last_negative)
    }

    /// `Ok(None)` when the instrument had no fresh status.
    fn read_channel(&self, channel: SupplyChannel) -> Result<Option<SupplyReading>> {
        self.device.with_handle(|driver, hdwf| {
            if !driver.analog_io_status(hdwf) {
                debug!(?channel, "Supply status not ready, keeping last reading");
                return Ok(None);
            }
            let node = |node: ChannelNode| {
                driver
                    .analog_io_channel_node_status(hdwf, channel.index(), node.index())
                    .ok_or_else(|| DwfError::driver(driver, "FDwfAnalogIOChannelNodeStatus"))
            };
            Ok(Some(SupplyReading {
                voltage: node(ChannelNode::Voltage)?,
                current: node(ChannelNode::Current)?,
            }))
        })
    }

    /// Apply a session's supply settings: V+, then V-, then the master enable.
    ///
    /// The whole config is checked before anything is pushed.
    pub fn apply(&self, config: &PowerSupplyConfig) -> Result<()> {
        config.validate()?;
        if let Some(setpoint) = config.positive {
            self.configure_positive_supply(setpoint.voltage, setpoint.current)?;
        }
        if let Some(setpoint) = config.negative {
            self.configure_negative_supply(setpoint.voltage, setpoint.current)?;
        }
        self.enable_all_outputs(config.enable_outputs)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::device::DeviceProfile;
    use crate::mock::{DriverCall, MockDriver};

    fn setup() -> (Arc<MockDriver>, PowerSupply) {
        let driver = Arc::new(MockDriver::new());
        let device = DwfDevice::open(driver.clone(), DeviceProfile::default()).unwrap();
        let supply = device.acquire_power_supply().unwrap();
        driver.clear_calls();
        (driver, supply)
    }

    #[test]
    fn test_enable_before_setpoints() {
        let (driver, supply) = setup();
        supply.configure_positive_supply(3.3, 0.2).unwrap();

        assert_eq!(
            driver.calls(),
            vec![
                DriverCall::AnalogIoChannelNodeSet {
                    channel: 0,
                    node: 0,
                    value: 1.0
                },
                DriverCall::AnalogIoChannelNodeSet {
                    channel: 0,
                    node: 1,
                    value: 3.3
                },
                DriverCall::AnalogIoChannelNodeSet {
                    channel: 0,
                    node: 2,
                    value: 0.2
                },
            ]
        );
    }

    #[test]
    fn test_zero_volts_accepted_on_both_rails() {
        let (driver, supply) = setup();
        supply.configure_positive_supply(0.0, 0.1).unwrap();
        supply.configure_negative_supply(0.0, 0.1).unwrap();
        assert_eq!(driver.calls().len(), 6);
    }

    #[test]
    fn test_stale_reading_when_not_ready() {
        let (driver, mut supply) = setup();
        supply.configure_positive_supply(2.5, 0.3).unwrap();
        supply.enable_all_outputs(true).unwrap();

        let first = supply.read_positive_supply().unwrap();
        assert_eq!(first, SupplyReading { voltage: 2.5, current: 0.3 });

        supply.configure_positive_supply(1.0, 0.1).unwrap();
        driver.set_analog_status_ready(false);
        assert_eq!(supply.read_positive_supply().unwrap(), first);
    }

    #[test]
    fn test_first_read_not_ready_is_zero() {
        let (driver, mut supply) = setup();
        driver.set_analog_status_ready(false);
        assert_eq!(
            supply.read_negative_supply().unwrap(),
            SupplyReading::default()
        );
    }

    #[test]
    fn test_node_set_failure() {
        let (driver, supply) = setup();
        driver.fail_call("FDwfAnalogIOChannelNodeSet");

        let err = supply.configure_negative_supply(-5.0, 0.1).unwrap_err();
        assert!(matches!(
            err,
            DwfError::Driver {
                function: "FDwfAnalogIOChannelNodeSet",
                ..
            }
        ));
        // Stops at the first failing push
        assert_eq!(driver.calls().len(), 1);
    }

    #[test]
    fn test_rail_ranges_reject_nan() {
        assert!(SupplyChannel::Positive.accepts(0.0));
        assert!(SupplyChannel::Negative.accepts(0.0));
        assert!(!SupplyChannel::Positive.accepts(-0.1));
        assert!(!SupplyChannel::Negative.accepts(0.1));
        assert!(!SupplyChannel::Positive.accepts(f64::NAN));
        assert!(!SupplyChannel::Negative.accepts(f64::NAN));
    }

    #[test]
    fn test_apply_rejects_nan_before_any_call() {
        let (driver, supply) = setup();
        let config = PowerSupplyConfig {
            positive: Some(SupplySetpoint {
                voltage: 3.3,
                current: 0.1,
            }),
            negative: Some(SupplySetpoint {
                voltage: f64::NAN,
                current: 0.1,
            }),
            enable_outputs: true,
        };
        assert!(matches!(
            supply.apply(&config),
            Err(DwfError::InvalidConfig { .. })
        ));
        assert!(driver.calls().is_empty());
    }

    #[test]
    fn test_apply_rejects_wrong_sign() {
        let (driver, supply) = setup();
        let config = PowerSupplyConfig {
            negative: Some(SupplySetpoint {
                voltage: 5.0,
                current: 0.1,
            }),
            ..PowerSupplyConfig::default()
        };
        assert!(matches!(
            supply.apply(&config),
            Err(DwfError::InvalidConfig { .. })
        ));
        assert!(driver.calls().is_empty());
    }
}
