//! Connection configuration
//!
//! Priority (highest to lowest):
//! 1. `SMA_`-prefixed environment variables (`SMA_HOST`, `SMA_PORT`, ...)
//! 2. YAML file passed to [`SmaConfig::load`]
//! 3. Default values

use crate::catalog::{UnitId, DEFAULT_UNIT_ID};
use crate::error::{Result, SmaError};
use crate::session::WriteOnlyReadPolicy;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_PREFIX: &str = "SMA_";
pub const DEFAULT_PORT: u16 = 502;

/// Settings for one SMA device connection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SmaConfig {
    /// Device host name or IP address
    pub host: String,
    pub port: u16,
    /// Unit ID used until discovery picks another one
    pub unit_id: UnitId,
    pub connect_timeout_ms: u64,
    pub response_timeout_ms: u64,
    /// What a read of a write-only register does
    pub write_only_reads: WriteOnlyReadPolicy,
    /// Run device map discovery after connecting and adopt the first unit ID found
    pub discover_unit_id: bool,
}

impl Default for SmaConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            unit_id: DEFAULT_UNIT_ID,
            connect_timeout_ms: 3000,
            response_timeout_ms: 2000,
            write_only_reads: WriteOnlyReadPolicy::default(),
            discover_unit_id: false,
        }
    }
}

impl SmaConfig {
    /// Merge defaults, an optional YAML file and the environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(SmaConfig::default()));
        if let Some(path) = path {
            if !path.exists() {
                return Err(SmaError::config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Yaml::file(path));
        }
        let config: SmaConfig = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(|e| SmaError::config(format!("Failed to load configuration: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(SmaError::config("host must not be empty"));
        }
        if self.port == 0 {
            return Err(SmaError::config("port must not be 0"));
        }
        if self.connect_timeout_ms == 0 || self.response_timeout_ms == 0 {
            return Err(SmaError::config("timeouts must be greater than 0"));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}
