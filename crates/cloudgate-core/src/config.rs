//! Gate Configuration

use crate::CloudProvider;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Verification gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// How long a successful verification stays valid
    pub validity_window_secs: u64,
    /// Outbound provider call timeout
    pub request_timeout_ms: u64,
    /// Interval of the expired-record sweeper
    pub sweep_interval_secs: u64,
    /// Provider assumed when the request carries no hint
    pub default_provider: Option<CloudProvider>,
    /// Directory holding materialized repository artifacts
    pub artifact_root: Option<PathBuf>,
    /// Verification endpoints per provider
    pub providers: ProviderEndpoints,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            validity_window_secs: 20 * 60,
            request_timeout_ms: 5_000,
            sweep_interval_secs: 300,
            default_provider: None,
            artifact_root: None,
            providers: ProviderEndpoints::default(),
        }
    }
}

impl GateConfig {
    pub fn validity_window(&self) -> Duration {
        Duration::from_secs(self.validity_window_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Reject values that would silently disable verification
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.validity_window_secs == 0 {
            return Err(ConfigError::Invalid("validity_window_secs must be > 0".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("request_timeout_ms must be > 0".into()));
        }
        if let Some(provider) = self.default_provider {
            if self.providers.endpoint(provider).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "default provider {} has no verification endpoint",
                    provider
                )));
            }
        }
        Ok(())
    }
}

/// Provider verification endpoints. A provider without an endpoint is not
/// billed through this deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderEndpoints {
    pub aws: Option<String>,
    pub azure: Option<String>,
    pub gcp: Option<String>,
}

impl ProviderEndpoints {
    pub fn endpoint(&self, provider: CloudProvider) -> Option<&str> {
        match provider {
            CloudProvider::Aws => self.aws.as_deref(),
            CloudProvider::Azure => self.azure.as_deref(),
            CloudProvider::Gcp => self.gcp.as_deref(),
        }
    }

    pub fn set(&mut self, provider: CloudProvider, url: impl Into<String>) {
        let url = Some(url.into());
        match provider {
            CloudProvider::Aws => self.aws = url,
            CloudProvider::Azure => self.azure = url,
            CloudProvider::Gcp => self.gcp = url,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration source error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
