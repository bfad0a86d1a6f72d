//! Verification gate
//!
//! Per request: decide whether verification is needed, consult the cache,
//! call the verification client on a miss, record success, reject failure.
//!
//! ```text
//! Start → NeedsDecision → Bypassed           → Allowed
//!                       → CacheHit           → Allowed
//!                       → CacheMissVerifying → Allowed | Denied
//! ```

use crate::{
    ActivationRequest, ArtifactProbe, CacheScope, FailureReason, VerificationCache,
    VerificationClient, VerificationKey, VerificationOutcome,
};
use std::sync::Arc;
use tracing::Instrument;

/// Message shown to callers on any verification failure
pub const VERIFICATION_FAILED_MESSAGE: &str = "Instance verification failed";

/// How an allowed request got through
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmissionPath {
    /// No cloud claim; treated as a non-cloud activation
    Bypassed,
    /// Valid cached verification
    CacheHit,
    /// Fresh external verification
    Verified,
}

/// Allowed request, handed to the repository listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Admission {
    pub key: VerificationKey,
    pub path: AdmissionPath,
    pub billing_account_id: Option<String>,
}

/// Denied request. The reason is for diagnostics only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Denial {
    pub key: VerificationKey,
    reason: FailureReason,
}

impl Denial {
    pub fn reason(&self) -> FailureReason {
        self.reason
    }

    /// Caller-safe message
    pub fn public_message(&self) -> &'static str {
        VERIFICATION_FAILED_MESSAGE
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Allowed(Admission),
    Denied(Denial),
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }
}

/// Instance verification gate
pub struct VerificationGate {
    client: Arc<dyn VerificationClient>,
    cache: Arc<dyn VerificationCache>,
    artifacts: Arc<dyn ArtifactProbe>,
}

impl VerificationGate {
    pub fn new(
        client: Arc<dyn VerificationClient>,
        cache: Arc<dyn VerificationCache>,
        artifacts: Arc<dyn ArtifactProbe>,
    ) -> Self {
        Self {
            client,
            cache,
            artifacts,
        }
    }

    /// Evaluate one activation request
    pub async fn evaluate(&self, request: &ActivationRequest) -> GateDecision {
        let span = tracing::info_span!(
            "instance_verification",
            login = %request.account_login,
            product_id = request.product_id,
            source = %request.source_address,
        );
        self.decide(request).instrument(span).await
    }

    async fn decide(&self, request: &ActivationRequest) -> GateDecision {
        let key = request.key();

        if request.document().is_none() {
            return allow(key, AdmissionPath::Bypassed, None);
        }

        match self.cache.lookup(&key).await {
            Ok(Some(record)) => {
                tracing::debug!("Verification cache hit");
                return allow(key, AdmissionPath::CacheHit, record.billing_account_id);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Verification cache lookup failed, re-verifying: {}", e),
        }

        match self.client.verify(request).await {
            VerificationOutcome::NotApplicable => allow(key, AdmissionPath::Bypassed, None),
            VerificationOutcome::Verified(instance) => {
                let scope = if self.artifacts.exists(&key).await {
                    CacheScope::RegistryOnly
                } else {
                    CacheScope::Full
                };

                if let Err(e) = self.cache.store(&key, &instance, scope).await {
                    tracing::warn!("Failed to record verification for {}: {}", key, e);
                }
                tracing::info!(provider = %instance.provider, ?scope, "Instance verified");
                allow(key, AdmissionPath::Verified, instance.billing_account_id)
            }
            VerificationOutcome::Failed(reason) => {
                if reason == FailureReason::AddressMismatch {
                    self.invalidate(&key).await;
                }
                tracing::warn!(%reason, "Instance verification denied");
                GateDecision::Denied(Denial { key, reason })
            }
        }
    }

    /// Force the next request for `key` through external verification
    pub async fn invalidate(&self, key: &VerificationKey) {
        if let Err(e) = self.cache.invalidate(key).await {
            tracing::warn!("Failed to invalidate verification for {}: {}", key, e);
        }
    }
}

fn allow(
    key: VerificationKey,
    path: AdmissionPath,
    billing_account_id: Option<String>,
) -> GateDecision {
    GateDecision::Allowed(Admission {
        key,
        path,
        billing_account_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, CacheResult};
    use crate::{
        CloudProvider, InMemoryArtifactProbe, InMemoryVerificationCache, VerificationRecord,
        VerifiedInstance,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Client returning a fixed outcome and counting calls
    struct FixedClient {
        outcome: VerificationOutcome,
        calls: AtomicUsize,
    }

    impl FixedClient {
        fn new(outcome: VerificationOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VerificationClient for FixedClient {
        async fn verify(&self, _request: &ActivationRequest) -> VerificationOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    /// Cache wrapper recording every store call
    struct RecordingCache {
        inner: InMemoryVerificationCache,
        stores: Mutex<Vec<(VerificationKey, CacheScope)>>,
        fail_lookups: bool,
    }

    impl RecordingCache {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: InMemoryVerificationCache::new(Duration::from_secs(600)),
                stores: Mutex::new(Vec::new()),
                fail_lookups: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                inner: InMemoryVerificationCache::new(Duration::from_secs(600)),
                stores: Mutex::new(Vec::new()),
                fail_lookups: true,
            })
        }

        fn stores(&self) -> Vec<(VerificationKey, CacheScope)> {
            self.stores.lock().clone()
        }
    }

    #[async_trait]
    impl VerificationCache for RecordingCache {
        async fn lookup(&self, key: &VerificationKey) -> CacheResult<Option<VerificationRecord>> {
            if self.fail_lookups {
                return Err(CacheError::Unavailable("redis down".into()));
            }
            self.inner.lookup(key).await
        }

        async fn store(
            &self,
            key: &VerificationKey,
            instance: &VerifiedInstance,
            scope: CacheScope,
        ) -> CacheResult<VerificationRecord> {
            self.stores.lock().push((key.clone(), scope));
            self.inner.store(key, instance, scope).await
        }

        async fn invalidate(&self, key: &VerificationKey) -> CacheResult<()> {
            self.inner.invalidate(key).await
        }
    }

    fn verified(billing: &str) -> VerificationOutcome {
        VerificationOutcome::Verified(VerifiedInstance {
            provider: CloudProvider::Aws,
            billing_account_id: Some(billing.to_string()),
        })
    }

    fn request() -> ActivationRequest {
        ActivationRequest::new(IpAddr::V4(Ipv4Addr::LOCALHOST), "SCC_3b336b", 1743)
    }

    fn gate(
        client: Arc<FixedClient>,
        cache: Arc<RecordingCache>,
        artifacts: Arc<InMemoryArtifactProbe>,
    ) -> VerificationGate {
        VerificationGate::new(client, cache, artifacts)
    }

    #[tokio::test]
    async fn test_no_document_bypasses() {
        let client = FixedClient::new(verified("bp-1"));
        let cache = RecordingCache::new();
        let gate = gate(client.clone(), cache.clone(), Arc::new(InMemoryArtifactProbe::new()));

        let decision = gate.evaluate(&request()).await;

        match decision {
            GateDecision::Allowed(admission) => assert_eq!(admission.path, AdmissionPath::Bypassed),
            other => panic!("expected bypass, got {:?}", other),
        }
        assert_eq!(client.calls(), 0);
        assert!(cache.stores().is_empty());
    }

    #[tokio::test]
    async fn test_failure_denies_without_store() {
        for reason in [
            FailureReason::MalformedDocument,
            FailureReason::ProviderUnreachable,
            FailureReason::ProviderRejected,
            FailureReason::AddressMismatch,
        ] {
            let client = FixedClient::new(VerificationOutcome::Failed(reason));
            let cache = RecordingCache::new();
            let gate = gate(client.clone(), cache.clone(), Arc::new(InMemoryArtifactProbe::new()));
            let request = request().with_document("IMDS");

            let decision = gate.evaluate(&request).await;

            match decision {
                GateDecision::Denied(denial) => {
                    assert_eq!(denial.reason(), reason);
                    assert_eq!(denial.public_message(), "Instance verification failed");
                }
                other => panic!("expected denial, got {:?}", other),
            }
            assert!(cache.stores().is_empty());
            assert!(cache.lookup(&request.key()).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_client() {
        let client = FixedClient::new(VerificationOutcome::Failed(FailureReason::ProviderRejected));
        let cache = RecordingCache::new();
        let request = request().with_document("IMDS");
        cache
            .inner
            .store(
                &request.key(),
                &VerifiedInstance {
                    provider: CloudProvider::Gcp,
                    billing_account_id: Some("1000008".into()),
                },
                CacheScope::Full,
            )
            .await
            .unwrap();
        let gate = gate(client.clone(), cache.clone(), Arc::new(InMemoryArtifactProbe::new()));

        for _ in 0..5 {
            let decision = gate.evaluate(&request).await;
            assert_eq!(
                decision,
                GateDecision::Allowed(Admission {
                    key: request.key(),
                    path: AdmissionPath::CacheHit,
                    billing_account_id: Some("1000008".into()),
                })
            );
        }
        assert_eq!(client.calls(), 0);
        assert!(cache.stores().is_empty());
    }

    #[tokio::test]
    async fn test_expired_record_is_reverified() {
        let client = FixedClient::new(verified("bp-6fa54006"));
        let cache = RecordingCache::new();
        let request = request().with_document("IMDS");
        cache.inner.put_at(
            &request.key(),
            &VerifiedInstance {
                provider: CloudProvider::Aws,
                billing_account_id: Some("bp-stale".into()),
            },
            CacheScope::Full,
            chrono::Utc::now() - chrono::Duration::hours(1),
        );
        let gate = gate(client.clone(), cache.clone(), Arc::new(InMemoryArtifactProbe::new()));

        let decision = gate.evaluate(&request).await;

        match decision {
            GateDecision::Allowed(admission) => {
                assert_eq!(admission.path, AdmissionPath::Verified);
                assert_eq!(admission.billing_account_id.as_deref(), Some("bp-6fa54006"));
            }
            other => panic!("expected fresh verification, got {:?}", other),
        }
        assert_eq!(client.calls(), 1);
        assert_eq!(cache.stores(), vec![(request.key(), CacheScope::Full)]);
    }

    #[tokio::test]
    async fn test_verified_stores_full_scope() {
        let client = FixedClient::new(verified("bp-6fa54006"));
        let cache = RecordingCache::new();
        let gate = gate(client.clone(), cache.clone(), Arc::new(InMemoryArtifactProbe::new()));
        let request = request().with_document("IMDS");

        let decision = gate.evaluate(&request).await;

        assert!(decision.is_allowed());
        assert_eq!(client.calls(), 1);
        assert_eq!(cache.stores(), vec![(request.key(), CacheScope::Full)]);

        // Second request is served from the cache
        let decision = gate.evaluate(&request).await;
        match decision {
            GateDecision::Allowed(admission) => assert_eq!(admission.path, AdmissionPath::CacheHit),
            other => panic!("expected cache hit, got {:?}", other),
        }
        assert_eq!(client.calls(), 1);
        assert_eq!(cache.stores().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_artifact_stores_registry_scope() {
        let client = FixedClient::new(verified("bp-6fa54006"));
        let cache = RecordingCache::new();
        let artifacts = Arc::new(InMemoryArtifactProbe::new());
        let request = request().with_document("IMDS");
        artifacts.insert(request.key());
        let gate = gate(client.clone(), cache.clone(), artifacts);

        let decision = gate.evaluate(&request).await;

        assert!(decision.is_allowed());
        assert_eq!(cache.stores(), vec![(request.key(), CacheScope::RegistryOnly)]);
    }

    #[tokio::test]
    async fn test_not_applicable_is_bypass() {
        let client = FixedClient::new(VerificationOutcome::NotApplicable);
        let cache = RecordingCache::new();
        let gate = gate(client.clone(), cache.clone(), Arc::new(InMemoryArtifactProbe::new()));

        let decision = gate.evaluate(&request().with_document("IMDS")).await;

        match decision {
            GateDecision::Allowed(admission) => {
                assert_eq!(admission.path, AdmissionPath::Bypassed);
                assert!(admission.billing_account_id.is_none());
            }
            other => panic!("expected bypass, got {:?}", other),
        }
        assert_eq!(client.calls(), 1);
        assert!(cache.stores().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_error_falls_back_to_verification() {
        let client = FixedClient::new(verified("bp-1"));
        let cache = RecordingCache::failing();
        let gate = gate(client.clone(), cache.clone(), Arc::new(InMemoryArtifactProbe::new()));

        let decision = gate.evaluate(&request().with_document("IMDS")).await;

        assert!(decision.is_allowed());
        assert_eq!(client.calls(), 1);
        assert_eq!(cache.stores().len(), 1);
    }

    #[tokio::test]
    async fn test_address_mismatch_invalidates_prior_record() {
        // Lookups fail, so the stored record is invisible to the gate
        let cache = RecordingCache::failing();
        let request = request().with_document("IMDS");
        cache
            .inner
            .store(
                &request.key(),
                &VerifiedInstance {
                    provider: CloudProvider::Aws,
                    billing_account_id: None,
                },
                CacheScope::Full,
            )
            .await
            .unwrap();

        let client = FixedClient::new(VerificationOutcome::Failed(FailureReason::AddressMismatch));
        let gate = gate(client.clone(), cache.clone(), Arc::new(InMemoryArtifactProbe::new()));
        let decision = gate.evaluate(&request).await;

        assert!(!decision.is_allowed());
        assert!(cache.inner.is_empty());
        assert!(cache.stores().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_invalidate_forces_reverification() {
        let client = FixedClient::new(verified("bp-1"));
        let cache = RecordingCache::new();
        let gate = gate(client.clone(), cache.clone(), Arc::new(InMemoryArtifactProbe::new()));
        let request = request().with_document("IMDS");

        gate.evaluate(&request).await;
        gate.invalidate(&request.key()).await;
        gate.evaluate(&request).await;

        assert_eq!(client.calls(), 2);
        assert_eq!(cache.stores().len(), 2);
    }
}
