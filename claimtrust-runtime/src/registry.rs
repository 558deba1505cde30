//! Adapter registry and dispatcher
//!
//! The registry is built once and read-only afterwards. Dispatch never
//! fails: every rejection (general or deferred domain, no adapter, adapter
//! error or panic) comes back as a failed `VerificationResult`. Adapter
//! results are badged under the registry's `BadgePolicy`.

use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use claimtrust_adapters::{
    BioinformaticsAdapter, CompBioAdapter, DomainAdapter, EpidemiologyAdapter, GenomicsAdapter, ImmunoAdapter,
    MetabolomicsAdapter, MlAiAdapter, PhysicsAdapter, SystemsBiologyAdapter,
};
use claimtrust_core::{
    deferred_domain, infer_domain, BadgePolicy, ClaimMetadata, VerificationResult, VerifyError, GENERAL_DOMAIN,
    SUPPORTED_DOMAINS,
};
use claimtrust_net::HttpClient;

pub type SharedAdapter = Arc<dyn DomainAdapter>;

/// A domain resolved to its adapter
#[derive(Clone)]
pub struct Dispatch {
    pub domain: String,
    pub adapter: SharedAdapter,
    /// Set when the domain was inferred from the claim fields
    pub inferred: Option<String>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Immutable map from domain name to adapter
#[derive(Clone, Default)]
pub struct Registry {
    adapters: BTreeMap<&'static str, SharedAdapter>,
    policy: BadgePolicy,
}

impl Registry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every supported domain over one shared client
    pub fn standard(http: &HttpClient) -> Self {
        Self::empty()
            .with_adapter(Arc::new(GenomicsAdapter::new(http.clone())))
            .with_adapter(Arc::new(BioinformaticsAdapter::new(http.clone())))
            .with_adapter(Arc::new(CompBioAdapter::new(http.clone())))
            .with_adapter(Arc::new(EpidemiologyAdapter::new(http.clone())))
            .with_adapter(Arc::new(ImmunoAdapter::new(http.clone())))
            .with_adapter(Arc::new(MetabolomicsAdapter::new(http.clone())))
            .with_adapter(Arc::new(SystemsBiologyAdapter::new(http.clone())))
            .with_adapter(Arc::new(PhysicsAdapter::new()))
            .with_adapter(Arc::new(MlAiAdapter::new(http.clone())))
    }

    pub fn with_badge_policy(mut self, policy: BadgePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn badge_policy(&self) -> &BadgePolicy {
        &self.policy
    }

    pub fn with_adapter(mut self, adapter: SharedAdapter) -> Self {
        self.adapters.insert(adapter.domain(), adapter);
        self
    }

    /// Registered domain names, sorted
    pub fn domains(&self) -> Vec<&'static str> {
        self.adapters.keys().copied().collect()
    }

    pub fn get(&self, domain: &str) -> Option<&SharedAdapter> {
        self.adapters.get(domain)
    }

    /// Resolve `domain` (or, when blank, the metadata domain or an
    /// inferred one) to an adapter
    pub fn resolve(&self, domain: &str, claim: &Value, metadata: &ClaimMetadata) -> Result<Dispatch, VerifyError> {
        let requested = if domain.trim().is_empty() {
            metadata.domain.trim()
        } else {
            domain.trim()
        };

        let (domain, inferred) = if requested.is_empty() {
            let inferred = infer_domain(claim).ok_or_else(|| VerifyError::MissingClassification {
                kind: "domain",
                valid: SUPPORTED_DOMAINS.iter().map(|d| d.to_string()).collect(),
            })?;
            debug!("Inferred domain {}", inferred);
            (
                inferred.to_string(),
                Some(format!("domain not provided — inferred as '{}'", inferred)),
            )
        } else {
            (requested.to_ascii_lowercase(), None)
        };

        if domain == GENERAL_DOMAIN {
            return Err(VerifyError::GeneralDomain);
        }
        if let Some(deferred) = deferred_domain(&domain) {
            return Err(VerifyError::DeferredDomain {
                domain: domain.clone(),
                dependency: deferred.dependency,
            });
        }
        let adapter = self
            .get(&domain)
            .cloned()
            .ok_or_else(|| VerifyError::UnregisteredDomain(domain.clone()))?;

        Ok(Dispatch { domain, adapter, inferred })
    }

    /// Run a resolved adapter, turning a panic into `AdapterCrash`. The
    /// result is badged under the registry's policy.
    pub async fn run(
        &self,
        dispatch: &Dispatch,
        claim: &Value,
        metadata: &ClaimMetadata,
    ) -> Result<VerificationResult, VerifyError> {
        info!("Dispatching {} verification", dispatch.domain);
        let outcome = AssertUnwindSafe(dispatch.adapter.verify(claim, metadata))
            .catch_unwind()
            .await;
        let mut result = match outcome {
            Ok(result) => result?,
            Err(payload) => {
                let message = panic_message(&*payload);
                error!("{} adapter panicked: {}", dispatch.domain, message);
                return Err(VerifyError::AdapterCrash(message));
            }
        };
        result.reclassify(&self.policy);
        if let Some(warning) = &dispatch.inferred {
            result.warnings.insert(0, warning.clone());
        }
        Ok(result)
    }

    /// Verify one claim result with its domain adapter
    pub async fn dispatch_verification(
        &self,
        domain: &str,
        claim: &Value,
        metadata: &ClaimMetadata,
    ) -> VerificationResult {
        let dispatch = match self.resolve(domain, claim, metadata) {
            Ok(dispatch) => dispatch,
            Err(e) => {
                warn!("Rejected {} claim: {}", domain, e);
                return VerificationResult::failure(domain, e.to_string());
            }
        };
        match self.run(&dispatch, claim, metadata).await {
            Ok(result) => result,
            Err(e) => {
                warn!("{} verification failed: {}", dispatch.domain, e);
                VerificationResult::failure(&dispatch.domain, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use claimtrust_core::{Badge, ClaimTypeSpec};
    use claimtrust_net::StubFetcher;
    use serde_json::json;

    fn registry() -> Registry {
        Registry::standard(&HttpClient::new(Arc::new(StubFetcher::offline())))
    }

    struct Crashing;

    #[async_trait]
    impl DomainAdapter for Crashing {
        fn domain(&self) -> &'static str {
            "physics"
        }

        fn claim_types(&self) -> &'static [ClaimTypeSpec] {
            &[]
        }

        async fn verify(&self, _claim: &Value, _metadata: &ClaimMetadata) -> Result<VerificationResult, VerifyError> {
            panic!("solver diverged");
        }
    }

    struct Scoring(f64);

    #[async_trait]
    impl DomainAdapter for Scoring {
        fn domain(&self) -> &'static str {
            "physics"
        }

        fn claim_types(&self) -> &'static [ClaimTypeSpec] {
            &[]
        }

        async fn verify(&self, _claim: &Value, _metadata: &ClaimMetadata) -> Result<VerificationResult, VerifyError> {
            Ok(VerificationResult::scored("physics", self.0, &BadgePolicy::default()))
        }
    }

    #[test]
    fn test_standard_registers_supported_domains() {
        let mut expected: Vec<&str> = SUPPORTED_DOMAINS.to_vec();
        expected.sort_unstable();
        assert_eq!(registry().domains(), expected);
    }

    #[tokio::test]
    async fn test_general_always_fails() {
        let registry = registry();
        for claim in [json!({}), json!({"variant_id": "rs1", "consequence": "missense_variant"})] {
            let result = registry
                .dispatch_verification("general", &claim, &ClaimMetadata::new("general"))
                .await;
            assert!(!result.passed);
            assert_eq!(result.score, 0.0);
            assert_eq!(result.badge, Badge::Red);
            assert!(result.errors[0].contains("requires specific domain"));
        }
    }

    #[tokio::test]
    async fn test_deferred_domain_names_dependency() {
        let result = registry()
            .dispatch_verification("mathematics", &json!({"theorem": "x"}), &ClaimMetadata::new("mathematics"))
            .await;
        assert!(!result.passed);
        assert!(result.errors[0].contains("Lean4"));
    }

    #[tokio::test]
    async fn test_unregistered_domain() {
        let result = registry()
            .dispatch_verification("astrology", &json!({}), &ClaimMetadata::new("astrology"))
            .await;
        assert!(result.errors[0].contains("astrology"));
    }

    #[tokio::test]
    async fn test_blank_domain_is_inferred() {
        let claim = json!({"variant_id": "rs1", "consequence": "missense_variant"});
        let result = registry().dispatch_verification("", &claim, &ClaimMetadata::default()).await;
        assert_eq!(result.domain, "genomics");
        assert!(result.warnings[0].contains("inferred as 'genomics'"));
    }

    #[tokio::test]
    async fn test_blank_domain_without_signature_fails() {
        let result = registry().dispatch_verification("", &json!({}), &ClaimMetadata::default()).await;
        assert!(!result.passed);
        assert!(result.errors[0].contains("genomics"));
    }

    #[tokio::test]
    async fn test_adapter_errors_become_failures() {
        let result = registry()
            .dispatch_verification("physics", &json!([1, 2]), &ClaimMetadata::new("physics"))
            .await;
        assert!(!result.passed);
        assert!(result.errors[0].contains("JSON object"));
    }

    #[tokio::test]
    async fn test_configured_badge_policy_applies_to_adapter_results() {
        let claim = json!({});
        let meta = ClaimMetadata::new("physics");
        let default = Registry::empty().with_adapter(Arc::new(Scoring(0.7)));
        assert_eq!(default.dispatch_verification("physics", &claim, &meta).await.badge, Badge::Amber);

        let lenient = BadgePolicy { green: 0.6, amber: 0.4, pass_threshold: 0.4 };
        let registry = Registry::empty().with_adapter(Arc::new(Scoring(0.7))).with_badge_policy(lenient);
        let result = registry.dispatch_verification("physics", &claim, &meta).await;
        assert_eq!(result.badge, Badge::Green);
        assert!(result.passed);

        let strict = BadgePolicy { green: 0.95, amber: 0.9, pass_threshold: 0.9 };
        let registry = Registry::empty().with_adapter(Arc::new(Scoring(0.7))).with_badge_policy(strict);
        let result = registry.dispatch_verification("physics", &claim, &meta).await;
        assert_eq!(result.badge, Badge::Red);
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn test_adapter_panic_is_caught() {
        let registry = Registry::empty().with_adapter(Arc::new(Crashing));
        let result = registry
            .dispatch_verification("physics", &json!({}), &ClaimMetadata::new("physics"))
            .await;
        assert!(!result.passed);
        assert!(result.errors[0].contains("solver diverged"));
    }
}
