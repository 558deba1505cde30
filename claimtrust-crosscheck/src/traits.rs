//! Common traits for cross-cutting verifiers

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use claimtrust_core::{ClaimMetadata, CrossCuttingResult, Scorecard};
use claimtrust_net::FetchError;

/// Failure of a verifier as a whole
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("lookup failed: {0}")]
    Lookup(#[from] FetchError),

    #[error("check failed: {0}")]
    Internal(String),
}

/// A domain-agnostic check applied to any claim result
#[async_trait]
pub trait CrossCuttingVerifier: Send + Sync {
    /// Name reported on the result
    fn name(&self) -> &'static str;

    /// Declared weight in (0, 1]
    fn weight(&self) -> f64;

    /// Whether the claim carries the keys this check needs
    fn is_applicable(&self, claim: &Value) -> bool;

    async fn verify(
        &self,
        claim: &Value,
        metadata: &ClaimMetadata,
    ) -> Result<CrossCuttingResult, CheckError>;
}

pub type SharedVerifier = Arc<dyn CrossCuttingVerifier>;

/// Degrade a component to neutral after a failed lookup
pub(crate) fn unavailable(card: &mut Scorecard, component: &str, source: &str, err: &FetchError) {
    debug!("{} lookup for {} degraded: {}", source, component, err);
    card.neutral(component, format!("{} unavailable ({}); {} scored neutral", source, err, component));
}
