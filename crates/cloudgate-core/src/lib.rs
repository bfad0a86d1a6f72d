//! Cloudgate Instance Verification
//!
//! Decides whether a registered system asking for repository access is a
//! genuine, currently billable cloud instance.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Verification Gate                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │   ActivationRequest                                              │
//! │        │                                                         │
//! │        ▼                                                         │
//! │   ┌──────────┐  no document   ┌──────────┐                       │
//! │   │ Decide   │───────────────▶│ Bypassed │──────────┐            │
//! │   └────┬─────┘                └──────────┘          │            │
//! │        │ document                                   ▼            │
//! │        ▼                                       ┌─────────┐       │
//! │   ┌──────────┐     hit                         │ Allowed │       │
//! │   │  Cache   │────────────────────────────────▶└─────────┘       │
//! │   └────┬─────┘                                      ▲            │
//! │        │ miss                                       │            │
//! │        ▼                                            │            │
//! │   ┌──────────┐  Verified ─▶ store(Full|Registry) ───┘            │
//! │   │ Provider │                                                   │
//! │   │  Client  │  Failed ──────────────────────────▶ Denied        │
//! │   └──────────┘                                                   │
//! │      AWS │ Azure │ GCP                                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

pub mod artifact;
pub mod cache;
pub mod client;
pub mod config;
pub mod gate;

// Re-exports
pub use artifact::{ArtifactProbe, FsArtifactProbe, InMemoryArtifactProbe};
pub use cache::{CacheError, InMemoryVerificationCache, VerificationCache};
pub use client::{HttpVerificationClient, VerificationClient};
pub use config::{ConfigError, GateConfig, ProviderEndpoints};
pub use gate::{Admission, AdmissionPath, Denial, GateDecision, VerificationGate};

// =============================================================================
// Core Types
// =============================================================================

/// Cloud vendor whose marketplace bills the instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Aws,
    Azure,
    Gcp,
}

impl CloudProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aws => "AWS",
            Self::Azure => "Azure",
            Self::Gcp => "GCP",
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloudProvider {
    type Err = FailureReason;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" | "amazon" | "ec2" => Ok(Self::Aws),
            "azure" | "microsoft" => Ok(Self::Azure),
            "gcp" | "gce" | "google" => Ok(Self::Gcp),
            _ => Err(FailureReason::MalformedDocument),
        }
    }
}

/// One activation request as seen by the gate. Immutable per request.
#[derive(Clone, Debug)]
pub struct ActivationRequest {
    pub source_address: IpAddr,
    pub account_login: String,
    pub product_id: i64,
    /// Cloud-provider-issued attestation, opaque to the gate
    pub instance_metadata_document: Option<String>,
    pub cloud_provider_hint: Option<String>,
}

impl ActivationRequest {
    pub fn new(source_address: IpAddr, account_login: impl Into<String>, product_id: i64) -> Self {
        Self {
            source_address,
            account_login: account_login.into(),
            product_id,
            instance_metadata_document: None,
            cloud_provider_hint: None,
        }
    }

    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.instance_metadata_document = Some(document.into());
        self
    }

    pub fn with_provider_hint(mut self, hint: impl Into<String>) -> Self {
        self.cloud_provider_hint = Some(hint.into());
        self
    }

    /// Metadata document, ignoring blank values
    pub fn document(&self) -> Option<&str> {
        self.instance_metadata_document
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }

    pub fn key(&self) -> VerificationKey {
        VerificationKey::new(self.source_address, &self.account_login, self.product_id)
    }
}

/// Unwrap IPv4-mapped IPv6 addresses so the same host always compares equal
pub fn canonical_address(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(addr),
        v4 => v4,
    }
}

/// Cache key: this account, from this address, for this product
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerificationKey {
    pub source_address: IpAddr,
    pub account_login: String,
    pub product_id: i64,
}

impl VerificationKey {
    pub fn new(source_address: IpAddr, account_login: &str, product_id: i64) -> Self {
        Self {
            source_address,
            account_login: account_login.to_string(),
            product_id,
        }
    }
}

impl fmt::Display for VerificationKey {
    /// Renders as `<address>-<login>-<product_id>`, which is also the
    /// repository artifact name for this key.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.source_address, self.account_login, self.product_id)
    }
}

/// Whether a cache write follows a full verification or only refreshes
/// registry-visible freshness
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheScope {
    Full,
    RegistryOnly,
}

/// Successful verification entry, owned by the cache
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub key: VerificationKey,
    /// Last full external verification
    pub verified_at: DateTime<Utc>,
    /// Last write of any scope; freshness is measured from here
    pub refreshed_at: DateTime<Utc>,
    pub billing_account_id: Option<String>,
    pub registry_scoped: bool,
}

/// Instance identity confirmed by a provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedInstance {
    pub provider: CloudProvider,
    pub billing_account_id: Option<String>,
}

/// Normalized result of one verification attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// No cloud claim offered; proceed as a non-cloud activation
    NotApplicable,
    Verified(VerifiedInstance),
    Failed(FailureReason),
}

/// Why a verification attempt failed. Internal diagnostics only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum FailureReason {
    #[error("malformed instance metadata document")]
    MalformedDocument,

    #[error("verification provider unreachable")]
    ProviderUnreachable,

    #[error("verification provider rejected the instance")]
    ProviderRejected,

    #[error("verified instance address does not match request source")]
    AddressMismatch,
}
