//! Service Configuration

use crate::listing::ListingConfig;
use cloudgate_core::{ConfigError, GateConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable prefix, e.g. `CLOUDGATE__GATE__VALIDITY_WINDOW_SECS`
pub const ENV_PREFIX: &str = "CLOUDGATE";

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listen address
    pub bind_addr: String,
    /// Take the source address from `X-Forwarded-For`
    pub trust_forwarded_for: bool,
    /// JSON file with registered systems
    pub systems_file: Option<PathBuf>,
    /// Repository listing
    pub listing: ListingConfig,
    /// Instance verification
    pub gate: GateConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".into(),
            trust_forwarded_for: false,
            systems_file: None,
            listing: ListingConfig::default(),
            gate: GateConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load from an optional file, overridden by environment variables
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.gate.validate()?;
        Ok(config)
    }
}
