//! Verification engine
//!
//! Runs the domain adapter and the cross-cutting batch concurrently, then
//! merges both into the final result.

use serde_json::Value;
use std::time::Instant;
use tracing::{info, warn};

use claimtrust_core::{ClaimMetadata, VerificationResult};
use claimtrust_crosscheck::{run_cross_cutting, standard_verifiers, RunnerConfig, SharedVerifier};
use claimtrust_net::{FetchError, HttpClient};

use crate::{merge, EngineConfig, Registry};

pub struct VerificationEngine {
    config: EngineConfig,
    registry: Registry,
    verifiers: Vec<SharedVerifier>,
    runner: RunnerConfig,
}

impl VerificationEngine {
    /// Engine over a live reqwest client
    pub fn new(config: EngineConfig) -> Result<Self, FetchError> {
        let http = HttpClient::from_config(&config.http.to_http_config())?;
        Ok(Self::with_client(config, http))
    }

    /// Engine over a caller-supplied client (stubbed, offline, shared)
    pub fn with_client(config: EngineConfig, http: HttpClient) -> Self {
        let registry = Registry::standard(&http);
        let verifiers = if config.cross_cutting.enabled {
            standard_verifiers(&http, config.cross_cutting.max_citations)
        } else {
            Vec::new()
        };
        Self::from_parts(config, registry, verifiers)
    }

    /// The registry is rebadged under `config.badges`
    pub fn from_parts(config: EngineConfig, registry: Registry, verifiers: Vec<SharedVerifier>) -> Self {
        let registry = registry.with_badge_policy(config.badges);
        let runner = config.cross_cutting.to_runner_config();
        Self {
            config,
            registry,
            verifiers,
            runner,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Verify one claim result. Always returns a structured result.
    pub async fn verify(&self, domain: &str, claim: &Value, metadata: &ClaimMetadata) -> VerificationResult {
        let started = Instant::now();

        let dispatch = match self.registry.resolve(domain, claim, metadata) {
            Ok(dispatch) => dispatch,
            Err(e) => {
                warn!("Rejected {} claim: {}", domain, e);
                return VerificationResult::failure(domain, e.to_string())
                    .with_compute_time(started.elapsed().as_secs_f64());
            }
        };

        let mut metadata = metadata.clone();
        metadata.domain = dispatch.domain.clone();

        let (domain_result, cross) = tokio::join!(
            self.registry.run(&dispatch, claim, &metadata),
            run_cross_cutting(&self.verifiers, claim, &metadata, &self.runner),
        );

        let domain_result = match domain_result {
            Ok(result) => result,
            Err(e) => {
                warn!("{} verification failed: {}", dispatch.domain, e);
                return VerificationResult::failure(&dispatch.domain, e.to_string())
                    .with_compute_time(started.elapsed().as_secs_f64());
            }
        };

        let weight = self.config.domain_weight(&dispatch.domain);
        let merged = merge(domain_result, &cross, weight, &self.config.badges)
            .with_compute_time(started.elapsed().as_secs_f64());
        info!(
            "{} claim scored {} ({}) with {} cross-cutting checks",
            merged.domain,
            merged.score,
            merged.badge,
            cross.len()
        );
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimtrust_net::{StubFetcher, StubReply};
    use serde_json::json;
    use std::sync::Arc;

    fn offline_engine(config: EngineConfig) -> VerificationEngine {
        VerificationEngine::with_client(config, HttpClient::new(Arc::new(StubFetcher::offline())))
    }

    #[tokio::test]
    async fn test_general_domain_fails_without_cross_cutting() {
        let claim = json!({"citations": ["10.1000/x"]});
        let result = offline_engine(EngineConfig::default())
            .verify("general", &claim, &ClaimMetadata::new("general"))
            .await;
        assert!(!result.passed);
        assert!(!result.details.contains_key("cross_cutting"));
    }

    #[tokio::test]
    async fn test_cross_cutting_merged_into_domain_result() {
        let claim = json!({
            "units": ["m", "s"],
            "statistics": {"mean": 3.44, "n": 20}
        });
        let result = offline_engine(EngineConfig::default())
            .verify("physics", &claim, &ClaimMetadata::new("physics"))
            .await;
        assert_eq!(result.domain, "physics");
        assert!(result.details["cross_cutting"].get("statistical_forensics").is_some());
        assert_eq!(result.details["domain_weight"], 0.65);
        assert!(result.errors.iter().any(|e| e.starts_with("[statistical_forensics] GRIM")));
    }

    #[tokio::test]
    async fn test_disabled_cross_cutting_keeps_domain_score() {
        let mut config = EngineConfig::default();
        config.cross_cutting.enabled = false;
        let claim = json!({"units": ["m", "s"], "statistics": {"mean": 3.44, "n": 20}});
        let result = offline_engine(config)
            .verify("physics", &claim, &ClaimMetadata::new("physics"))
            .await;
        assert_eq!(result.details["cross_cutting_score"], Value::Null);
        assert_eq!(result.score, result.details["domain_score"]);
    }

    #[tokio::test]
    async fn test_inferred_domain_drives_weight() {
        let stub = StubFetcher::new().route("myvariant.info", StubReply::status(500));
        let engine = VerificationEngine::with_client(EngineConfig::default(), HttpClient::new(Arc::new(stub)));
        let claim = json!({"variant_id": "rs1", "consequence": "missense_variant"});
        let result = engine.verify("", &claim, &ClaimMetadata::default()).await;
        assert_eq!(result.domain, "genomics");
        assert_eq!(result.details["domain_weight"], 0.7);
        assert!(result.warnings[0].contains("inferred as 'genomics'"));
    }

    #[test]
    fn test_registry_shares_configured_badges() {
        let mut config = EngineConfig::default();
        config.badges.green = 0.9;
        let engine = offline_engine(config);
        assert_eq!(engine.registry().badge_policy().green, 0.9);
    }
}
