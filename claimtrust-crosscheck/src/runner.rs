//! Concurrent cross-cutting runner
//!
//! Applicable verifiers run concurrently and the batch races one global
//! deadline. A verifier's own error or panic becomes a zero-score result
//! and never aborts its siblings.

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use claimtrust_core::{ClaimMetadata, CrossCuttingResult, NEUTRAL_SCORE};
use claimtrust_net::HttpClient;

use crate::{
    CitationVerifier, CrossCuttingVerifier, DataIntegrityVerifier, ReproducibilityVerifier, SharedVerifier,
    StatisticalForensicsVerifier,
};

/// Global deadline for one cross-cutting batch
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(120);

/// What a batch returns when the deadline fires first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Return no results at all
    #[default]
    DiscardAll,
    /// Keep finished results; unfinished checks report neutral and `timed_out`
    KeepFinished,
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub timeout: Duration,
    pub policy: TimeoutPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_BATCH_TIMEOUT,
            policy: TimeoutPolicy::default(),
        }
    }
}

/// The four standard checks over one shared client
pub fn standard_verifiers(http: &HttpClient, max_citations: usize) -> Vec<SharedVerifier> {
    vec![
        Arc::new(CitationVerifier::with_max_citations(http.clone(), max_citations)),
        Arc::new(StatisticalForensicsVerifier::new()),
        Arc::new(DataIntegrityVerifier::new()),
        Arc::new(ReproducibilityVerifier::new(http.clone())),
    ]
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Applicability with panics treated as "not applicable"
fn applicable(verifier: &SharedVerifier, claim: &Value) -> bool {
    match catch_unwind(AssertUnwindSafe(|| verifier.is_applicable(claim))) {
        Ok(applicable) => applicable,
        Err(payload) => {
            warn!(
                "{} applicability check panicked ({}); excluded from the batch",
                verifier.name(),
                panic_message(&*payload)
            );
            false
        }
    }
}

fn timed_out(verifier: &SharedVerifier, timeout: Duration) -> CrossCuttingResult {
    let mut details = Map::new();
    details.insert("timed_out".to_string(), json!(true));
    let mut result =
        CrossCuttingResult::new(verifier.name(), verifier.weight(), NEUTRAL_SCORE).with_details(details);
    result.warnings.push(format!(
        "{} did not finish within {}s; scored neutral",
        verifier.name(),
        timeout.as_secs_f64()
    ));
    result
}

/// Run every applicable verifier concurrently under `config.timeout`.
///
/// Results come back in the order of `verifiers`. Under
/// [`TimeoutPolicy::DiscardAll`] a fired deadline yields an empty set.
pub async fn run_cross_cutting(
    verifiers: &[SharedVerifier],
    claim: &Value,
    metadata: &ClaimMetadata,
    config: &RunnerConfig,
) -> Vec<CrossCuttingResult> {
    let selected: Vec<&SharedVerifier> = verifiers
        .iter()
        .filter(|v| applicable(v, claim))
        .collect();
    if selected.is_empty() {
        debug!("No applicable cross-cutting checks");
        return Vec::new();
    }
    info!(
        "Running {} cross-cutting checks: {}",
        selected.len(),
        selected.iter().map(|v| v.name()).collect::<Vec<_>>().join(", ")
    );

    let mut pending: FuturesUnordered<_> = selected
        .iter()
        .enumerate()
        .map(|(i, verifier)| async move {
            let (name, weight) = (verifier.name(), verifier.weight());
            let outcome = AssertUnwindSafe(verifier.verify(claim, metadata)).catch_unwind().await;
            let result = match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    warn!("{} failed: {}", name, e);
                    CrossCuttingResult::failed(name, weight, format!("{} failed: {}", name, e))
                }
                Err(payload) => {
                    let message = panic_message(&*payload);
                    warn!("{} panicked: {}", name, message);
                    CrossCuttingResult::failed(name, weight, format!("{} crashed: {}", name, message))
                }
            };
            (i, result)
        })
        .collect();

    let mut finished: Vec<Option<CrossCuttingResult>> = vec![None; selected.len()];
    let deadline = tokio::time::sleep(config.timeout);
    tokio::pin!(deadline);

    let deadline_hit = loop {
        tokio::select! {
            next = pending.next() => match next {
                Some((i, result)) => finished[i] = Some(result),
                None => break false,
            },
            _ = &mut deadline => break true,
        }
    };
    drop(pending);

    if !deadline_hit {
        return finished.into_iter().flatten().collect();
    }

    let done = finished.iter().filter(|r| r.is_some()).count();
    match config.policy {
        TimeoutPolicy::DiscardAll => {
            warn!(
                "Cross-cutting batch exceeded {:?} ({} of {} finished); discarding all results",
                config.timeout,
                done,
                selected.len()
            );
            Vec::new()
        }
        TimeoutPolicy::KeepFinished => {
            warn!(
                "Cross-cutting batch exceeded {:?}; keeping {} of {} results",
                config.timeout,
                done,
                selected.len()
            );
            finished
                .into_iter()
                .zip(&selected)
                .map(|(result, verifier)| result.unwrap_or_else(|| timed_out(verifier, config.timeout)))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CheckError;
    use async_trait::async_trait;

    struct Fixed {
        name: &'static str,
        score: f64,
        delay: Duration,
    }

    #[async_trait]
    impl CrossCuttingVerifier for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn weight(&self) -> f64 {
            0.1
        }

        fn is_applicable(&self, _claim: &Value) -> bool {
            true
        }

        async fn verify(&self, _claim: &Value, _metadata: &ClaimMetadata) -> Result<CrossCuttingResult, CheckError> {
            tokio::time::sleep(self.delay).await;
            Ok(CrossCuttingResult::new(self.name, 0.1, self.score))
        }
    }

    struct Faulty {
        panic_in_applicable: bool,
        panic_in_verify: bool,
    }

    #[async_trait]
    impl CrossCuttingVerifier for Faulty {
        fn name(&self) -> &'static str {
            "faulty"
        }

        fn weight(&self) -> f64 {
            0.2
        }

        fn is_applicable(&self, _claim: &Value) -> bool {
            if self.panic_in_applicable {
                panic!("applicability exploded");
            }
            true
        }

        async fn verify(&self, _claim: &Value, _metadata: &ClaimMetadata) -> Result<CrossCuttingResult, CheckError> {
            if self.panic_in_verify {
                panic!("verify exploded");
            }
            Err(CheckError::Internal("bad input".to_string()))
        }
    }

    fn fixed(name: &'static str, score: f64, delay_ms: u64) -> SharedVerifier {
        Arc::new(Fixed { name, score, delay: Duration::from_millis(delay_ms) })
    }

    fn faulty(panic_in_applicable: bool, panic_in_verify: bool) -> SharedVerifier {
        Arc::new(Faulty { panic_in_applicable, panic_in_verify })
    }

    fn config(timeout_ms: u64, policy: TimeoutPolicy) -> RunnerConfig {
        RunnerConfig { timeout: Duration::from_millis(timeout_ms), policy }
    }

    #[tokio::test]
    async fn test_results_keep_verifier_order() {
        let verifiers = vec![fixed("slow", 0.9, 30), fixed("fast", 0.4, 0)];
        let results = run_cross_cutting(&verifiers, &json!({}), &ClaimMetadata::default(), &RunnerConfig::default()).await;
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_panicking_applicability_excluded() {
        let verifiers = vec![faulty(true, false), fixed("ok", 1.0, 0)];
        let results = run_cross_cutting(&verifiers, &json!({}), &ClaimMetadata::default(), &RunnerConfig::default()).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "ok");
    }

    #[tokio::test]
    async fn test_errors_and_panics_become_zero_scores() {
        let verifiers = vec![faulty(false, false), faulty(false, true), fixed("ok", 0.8, 0)];
        let results = run_cross_cutting(&verifiers, &json!({}), &ClaimMetadata::default(), &RunnerConfig::default()).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].score, 0.0);
        assert!(results[0].errors[0].contains("bad input"));
        assert_eq!(results[1].score, 0.0);
        assert!(results[1].errors[0].contains("verify exploded"));
        assert_eq!(results[2].score, 0.8);
    }

    #[tokio::test]
    async fn test_timeout_discards_everything() {
        let verifiers = vec![fixed("fast", 1.0, 0), fixed("stuck", 1.0, 10_000)];
        let results = run_cross_cutting(
            &verifiers,
            &json!({}),
            &ClaimMetadata::default(),
            &config(50, TimeoutPolicy::DiscardAll),
        )
        .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_keeps_finished() {
        let verifiers = vec![fixed("fast", 1.0, 0), fixed("stuck", 1.0, 10_000)];
        let results = run_cross_cutting(
            &verifiers,
            &json!({}),
            &ClaimMetadata::default(),
            &config(50, TimeoutPolicy::KeepFinished),
        )
        .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].score, 1.0);
        assert_eq!(results[1].score, 0.5);
        assert_eq!(results[1].details["timed_out"], true);
        assert_eq!(results[1].warnings.len(), 1);
    }

    #[test]
    fn test_timeout_policy_serde() {
        let policy: TimeoutPolicy = serde_json::from_value(json!("keep_finished")).unwrap();
        assert_eq!(policy, TimeoutPolicy::KeepFinished);
        assert_eq!(serde_json::to_value(TimeoutPolicy::DiscardAll).unwrap(), "discard_all");
    }

    #[test]
    fn test_standard_verifiers() {
        let http = HttpClient::new(Arc::new(claimtrust_net::StubFetcher::offline()));
        let names: Vec<&str> = standard_verifiers(&http, 10).iter().map(|v| v.name()).collect();
        assert_eq!(names, vec!["citation", "statistical_forensics", "data_integrity", "reproducibility"]);
    }
}
