//! Application configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/labwire.toml` (or the path given on the command line)
//! 2. Environment variables prefixed with `LABWIRE_`, nested keys separated by
//!    a double underscore (`LABWIRE_LOGGING__LEVEL=debug`)
//!
//! # Example
//! ```toml
//! [logging]
//! level = "info"
//! format = "compact"
//!
//! [instruments.gaussmeter]
//! driver = "lakeshore_425"
//! address = "/dev/ttyUSB0"
//!
//! [instruments.lockin]
//! driver = "srs_sr830"
//! address = "/dev/ttyUSB1"
//! timing = { post_send_delay = "5ms", response_timeout = "2s" }
//! ```
//!
//! An instrument either names an `address`, and the driver supplies line
//! settings and pacing, or gives a complete `session` table.

use crate::logging::LogFormat;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use labwire_core::{SessionConfig, TimingPolicy};
use labwire_drivers::{find_driver, DriverFactory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/labwire.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "LABWIRE_";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File or environment could not be read or deserialized
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// Values were read but are not usable
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// No instrument with this name
    #[error("Unknown instrument '{name}'. Configured: {configured}")]
    UnknownInstrument {
        /// Requested name
        name: String,
        /// Comma-separated configured names
        configured: String,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Instruments by name
    #[serde(default)]
    pub instruments: BTreeMap<String, InstrumentConfig>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One configured instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Driver type (`lakeshore_425`, `srs_sr830`, ...)
    pub driver: String,
    /// Serial device path or host name, used with the driver's defaults
    #[serde(default)]
    pub address: Option<String>,
    /// Full session settings, replacing the driver's defaults
    #[serde(default)]
    pub session: Option<SessionConfig>,
    /// Pacing override applied on top of either of the above
    #[serde(default)]
    pub timing: Option<TimingPolicy>,
    /// Disabled instruments are listed but never opened
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl InstrumentConfig {
    /// Driver factory named by `driver`.
    pub fn factory(&self) -> Result<&'static dyn DriverFactory, ConfigError> {
        find_driver(&self.driver).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "unknown driver '{}'. Available: {}",
                self.driver,
                labwire_drivers::driver_types().join(", ")
            ))
        })
    }

    /// Session settings after applying driver defaults and overrides.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let factory = self.factory()?;
        let mut config = match (&self.session, &self.address) {
            (Some(session), _) => session.clone(),
            (None, Some(address)) => factory.default_session(address),
            (None, None) => {
                return Err(ConfigError::Invalid(format!(
                    "{} instrument needs an address or a session table",
                    factory.name()
                )))
            }
        };
        if let Some(timing) = self.timing {
            config.timing = timing;
        }
        config
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(config)
    }
}

impl AppConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file and the environment.
    ///
    /// A missing file is not an error; the environment alone may configure
    /// everything.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Check log level, drivers and every instrument's session settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        crate::logging::parse_log_level(&self.logging.level).map_err(ConfigError::Invalid)?;

        for (name, instrument) in &self.instruments {
            instrument
                .session_config()
                .map_err(|e| ConfigError::Invalid(format!("instrument '{name}': {e}")))?;
        }
        Ok(())
    }

    /// Configuration of one instrument.
    pub fn instrument(&self, name: &str) -> Result<&InstrumentConfig, ConfigError> {
        self.instruments
            .get(name)
            .ok_or_else(|| ConfigError::UnknownInstrument {
                name: name.to_string(),
                configured: self
                    .instruments
                    .keys()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// Enabled instruments, by name.
    pub fn enabled_instruments(&self) -> impl Iterator<Item = (&String, &InstrumentConfig)> {
        self.instruments.iter().filter(|(_, inst)| inst.enabled)
    }
}
