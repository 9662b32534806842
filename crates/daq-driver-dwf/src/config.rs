//! Session configuration loading.
//!
//! A session file describes which device to open and how to set up its
//! supplies and buses:
//!
//! ```toml
//! [device]
//! profile = "scope8k_wavegen4k_logic2k_patterns256_power"
//! device_name = "Analog Discovery 2"
//!
//! [power_supply]
//! positive = { voltage = 3.3, current = 0.5 }
//! enable_outputs = true
//!
//! [spi]
//! chip_select = 0
//! clock = 1
//! mosi = 2
//! miso = 3
//! clock_rate = 10e6
//!
//! [i2c]
//! address = 0x18
//! clock_rate = 400e3
//! ```
//!
//! Every field can be overridden with a `DWF_`-prefixed environment variable;
//! nested fields use double underscores, e.g. `DWF_I2C__ADDRESS=25` or
//! `DWF_DEVICE__DEVICE_INDEX=1`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::device::OpenOptions;
use crate::subsystem::i2c::I2cConfig;
use crate::subsystem::power_supply::PowerSupplyConfig;
use crate::subsystem::spi::SpiConfig;

/// Everything needed to bring up one instrument session.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Device selection and resource preset
    pub device: OpenOptions,
    /// Supply set-points
    pub power_supply: PowerSupplyConfig,
    /// SPI bus, if the session uses one
    pub spi: Option<SpiConfig>,
    /// I2C bus, if the session uses one
    pub i2c: Option<I2cConfig>,
}

impl SessionConfig {
    /// Check values serde cannot.
    ///
    /// Each section is checked by the accessor that will consume it, so a
    /// file is rejected for the same reasons a direct call would be.
    pub fn validate(&self) -> Result<()> {
        if let Some(spi) = &self.spi {
            spi.validate().context("Invalid [spi] section")?;
        }
        if let Some(i2c) = &self.i2c {
            i2c.validate().context("Invalid [i2c] section")?;
        }
        self.power_supply
            .validate()
            .context("Invalid [power_supply] section")?;
        Ok(())
    }
}

/// Load a session file, applying `DWF_` environment overrides.
pub fn load_session_config(path: &Path) -> Result<SessionConfig> {
    if !path.exists() {
        bail!("Session config not found: {}", path.display());
    }

    let config: SessionConfig = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("DWF_").split("__"))
        .extract()
        .with_context(|| format!("Failed to parse session config {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("Invalid session config {}", path.display()))?;

    info!(path = %path.display(), "Loaded session config");
    Ok(config)
}

/// Parse a session from TOML text. Environment overrides are not applied.
pub fn session_config_from_str(toml: &str) -> Result<SessionConfig> {
    let config: SessionConfig = Figment::new()
        .merge(Toml::string(toml))
        .extract()
        .context("Failed to parse session config")?;
    config.validate()?;
    debug!("Parsed session config from string");
    Ok(config)
}
