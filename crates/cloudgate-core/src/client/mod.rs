//! Verification client
//!
//! Calls the claimed provider's verification endpoint with the instance
//! metadata document and normalizes every response into a
//! [`VerificationOutcome`].
//!
//! # Providers
//!
//! - **AWS**: signed instance identity document
//! - **Azure**: attested metadata
//! - **GCP**: instance identity token

use crate::{
    canonical_address, ActivationRequest, CloudProvider, FailureReason, GateConfig,
    ProviderEndpoints, VerificationOutcome, VerifiedInstance,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use std::net::IpAddr;
use std::time::Duration;

pub mod aws;
pub mod azure;
pub mod gcp;

/// One verification attempt per call, no retries
#[async_trait]
pub trait VerificationClient: Send + Sync {
    async fn verify(&self, request: &ActivationRequest) -> VerificationOutcome;
}

/// Provider-normalized verdict
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderVerdict {
    pub accepted: bool,
    pub billing_account_id: Option<String>,
    /// Addresses the provider attributes to the instance; empty if unknown
    pub instance_addresses: Vec<IpAddr>,
}

/// Per-vendor verification logic
pub trait InstanceProvider: Send + Sync {
    fn kind(&self) -> CloudProvider;

    /// Parse the document locally and build the verifier payload
    fn prepare(&self, document: &str) -> Result<serde_json::Value, FailureReason>;

    /// Normalize a successful (2xx) verifier response body
    fn interpret(&self, body: &[u8]) -> Result<ProviderVerdict, FailureReason>;
}

/// Resolve the provider for a request: hint first, then the deployment default
pub fn resolve_provider(
    hint: Option<&str>,
    default: Option<CloudProvider>,
) -> Result<Option<CloudProvider>, FailureReason> {
    match hint.map(str::trim).filter(|h| !h.is_empty()) {
        Some(hint) => hint.parse().map(Some),
        None => Ok(default),
    }
}

pub fn provider_for(kind: CloudProvider) -> &'static dyn InstanceProvider {
    match kind {
        CloudProvider::Aws => &aws::AwsProvider,
        CloudProvider::Azure => &azure::AzureProvider,
        CloudProvider::Gcp => &gcp::GcpProvider,
    }
}

/// HTTPS verification client
pub struct HttpVerificationClient {
    client: reqwest::Client,
    endpoints: ProviderEndpoints,
    default_provider: Option<CloudProvider>,
}

impl HttpVerificationClient {
    pub fn new(
        endpoints: ProviderEndpoints,
        default_provider: Option<CloudProvider>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cloudgate/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoints,
            default_provider,
        })
    }

    pub fn from_config(config: &GateConfig) -> Result<Self, reqwest::Error> {
        Self::new(
            config.providers.clone(),
            config.default_provider,
            config.request_timeout(),
        )
    }

    async fn call(
        &self,
        provider: &dyn InstanceProvider,
        endpoint: &str,
        payload: &serde_json::Value,
    ) -> Result<ProviderVerdict, FailureReason> {
        let response = self
            .client
            .post(endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(
                    "{} verifier request failed (timeout: {}): {}",
                    provider.kind(),
                    e.is_timeout(),
                    e
                );
                FailureReason::ProviderUnreachable
            })?;

        let status = response.status();
        if status.is_server_error() {
            tracing::warn!("{} verifier returned {}", provider.kind(), status);
            return Err(FailureReason::ProviderUnreachable);
        }
        if !status.is_success() {
            tracing::warn!("{} verifier rejected instance with {}", provider.kind(), status);
            return Err(FailureReason::ProviderRejected);
        }

        let body = response.bytes().await.map_err(|e| {
            tracing::warn!("{} verifier body read failed: {}", provider.kind(), e);
            FailureReason::ProviderUnreachable
        })?;

        provider.interpret(&body)
    }
}

#[async_trait]
impl VerificationClient for HttpVerificationClient {
    async fn verify(&self, request: &ActivationRequest) -> VerificationOutcome {
        let Some(document) = request.document() else {
            return VerificationOutcome::NotApplicable;
        };

        let hint = request.cloud_provider_hint.as_deref();
        let kind = match resolve_provider(hint, self.default_provider) {
            Ok(Some(kind)) => kind,
            Ok(None) => return VerificationOutcome::NotApplicable,
            Err(reason) => return VerificationOutcome::Failed(reason),
        };

        let Some(endpoint) = self.endpoints.endpoint(kind) else {
            tracing::debug!("No {} verifier configured, treating as non-cloud activation", kind);
            return VerificationOutcome::NotApplicable;
        };

        let provider = provider_for(kind);
        let outcome = match provider.prepare(document) {
            Ok(payload) => match self.call(provider, endpoint, &payload).await {
                Ok(verdict) => normalize(kind, verdict, request.source_address),
                Err(reason) => VerificationOutcome::Failed(reason),
            },
            Err(reason) => VerificationOutcome::Failed(reason),
        };

        tracing::debug!(
            provider = %kind,
            login = %request.account_login,
            outcome = ?outcome,
            "Instance verification finished"
        );
        outcome
    }
}

/// Fold a provider verdict into the four-way outcome
pub fn normalize(
    kind: CloudProvider,
    verdict: ProviderVerdict,
    source: IpAddr,
) -> VerificationOutcome {
    if !verdict.accepted {
        return VerificationOutcome::Failed(FailureReason::ProviderRejected);
    }
    let source = canonical_address(source);
    if !verdict.instance_addresses.is_empty() && !verdict.instance_addresses.contains(&source) {
        return VerificationOutcome::Failed(FailureReason::AddressMismatch);
    }
    VerificationOutcome::Verified(VerifiedInstance {
        provider: kind,
        billing_account_id: verdict.billing_account_id,
    })
}

/// Decode a base64 document holding JSON
pub(crate) fn decode_json_document<T: DeserializeOwned>(
    document: &str,
) -> Result<T, FailureReason> {
    let raw = STANDARD
        .decode(document.trim())
        .map_err(|_| FailureReason::MalformedDocument)?;
    serde_json::from_slice(&raw).map_err(|_| FailureReason::MalformedDocument)
}

/// Parse a verifier response body
pub(crate) fn parse_response<T: DeserializeOwned>(
    kind: CloudProvider,
    body: &[u8],
) -> Result<T, FailureReason> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!("{} verifier sent an unreadable response: {}", kind, e);
        FailureReason::ProviderUnreachable
    })
}

/// Keep only well-formed addresses, in canonical form
pub(crate) fn parse_addresses<'a>(values: impl IntoIterator<Item = &'a String>) -> Vec<IpAddr> {
    values
        .into_iter()
        .filter_map(|v| v.trim().parse().ok())
        .map(canonical_address)
        .collect()
}
