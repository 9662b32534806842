//! WaveForms subsystem implementations.
//!
//! Each accessor holds a clone of the [`DwfDevice`](crate::DwfDevice) it was
//! acquired from and shares its connection:
//!
//! - [`power_supply`] - Programmable V+ / V- supplies
//! - [`spi`] - SPI master on the digital I/O pins
//! - [`i2c`] - I2C master on the digital I/O pins

pub mod i2c;
pub mod power_supply;
pub mod spi;

use serde::Deserialize;

/// Digital I/O pin number (DIO 0..=15 on the Analog Discovery family).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct DioPin(pub u8);

impl DioPin {
    /// Pin index as passed to the driver.
    pub fn index(self) -> i32 {
        i32::from(self.0)
    }
}

impl From<u8> for DioPin {
    fn from(pin: u8) -> Self {
        Self(pin)
    }
}

impl std::fmt::Display for DioPin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DIO{}", self.0)
    }
}

/// Idle level of a line (SPI clock or chip-select).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Polarity {
    /// Line rests low
    #[default]
    IdleLow,
    /// Line rests high
    IdleHigh,
}

impl Polarity {
    /// Native level of the line at rest.
    pub fn idle_level(self) -> i32 {
        match self {
            Self::IdleLow => 0,
            Self::IdleHigh => 1,
        }
    }

    /// Native level of the line when asserted.
    pub fn active_level(self) -> i32 {
        1 - self.idle_level()
    }
}

/// SPI clock edge on which data is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClockPhase {
    /// Sample on the leading edge
    #[default]
    FirstEdge,
    /// Sample on the trailing edge
    SecondEdge,
}
