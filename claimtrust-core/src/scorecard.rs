//! Weighted component scoring for claim-type verifiers
//!
//! Every component of a claim type starts at the neutral score. A verifier
//! overwrites a component only when it has evidence: a confirmed value, a
//! rejected (implausible) value, or an explicit neutral with a reason.

use serde_json::{json, Map, Value};
use std::time::Instant;
use tracing::warn;

use crate::{round_score, BadgePolicy, CrossCuttingResult, VerificationResult, NEUTRAL_SCORE};

/// Component weights of one claim type. Weights sum to 1.0.
#[derive(Debug, Clone, Copy)]
pub struct ClaimTypeSpec {
    pub name: &'static str,
    pub weights: &'static [(&'static str, f64)],
}

impl ClaimTypeSpec {
    pub fn weight_sum(&self) -> f64 {
        self.weights.iter().map(|(_, w)| w).sum()
    }

    pub fn component_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.weights.iter().map(|(name, _)| *name)
    }
}

/// Running tally for one claim-type verification
#[derive(Debug, Clone)]
pub struct Scorecard {
    spec: &'static ClaimTypeSpec,
    scores: Vec<f64>,
    touched: Vec<bool>,
    details: Map<String, Value>,
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl Scorecard {
    pub fn new(spec: &'static ClaimTypeSpec) -> Self {
        let n = spec.weights.len();
        Self {
            spec,
            scores: vec![NEUTRAL_SCORE; n],
            touched: vec![false; n],
            details: Map::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn claim_type(&self) -> &'static str {
        self.spec.name
    }

    fn index(&self, component: &str) -> Option<usize> {
        let idx = self.spec.weights.iter().position(|(name, _)| *name == component);
        if idx.is_none() {
            warn!("Unknown component '{}' for {}", component, self.spec.name);
        }
        idx
    }

    /// Record evidence for a component
    pub fn score(&mut self, component: &str, score: f64, detail: Value) {
        if let Some(i) = self.index(component) {
            self.scores[i] = if score.is_nan() { NEUTRAL_SCORE } else { score.clamp(0.0, 1.0) };
            self.touched[i] = true;
            self.details.insert(component.to_string(), detail);
        }
    }

    /// Record evidence plus a warning that explains a reduced score
    pub fn score_with_warning(
        &mut self,
        component: &str,
        score: f64,
        detail: Value,
        warning: impl Into<String>,
    ) {
        self.score(component, score, detail);
        self.warn(warning);
    }

    /// A present but implausible value: component forced to 0
    pub fn reject(&mut self, component: &str, error: impl Into<String>) {
        let error = error.into();
        self.score(component, 0.0, json!({ "status": "rejected", "reason": error }));
        self.errors.push(error);
    }

    /// No evidence either way, with the reason recorded as a warning
    pub fn neutral(&mut self, component: &str, warning: impl Into<String>) {
        let warning = warning.into();
        self.score(component, NEUTRAL_SCORE, json!({ "status": "neutral", "reason": warning }));
        self.warnings.push(warning);
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Attach a detail that is not a component
    pub fn note(&mut self, key: &str, value: Value) {
        self.details.insert(key.to_string(), value);
    }

    pub fn component_score(&self, component: &str) -> Option<f64> {
        self.spec
            .weights
            .iter()
            .position(|(name, _)| *name == component)
            .map(|i| self.scores[i])
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Weighted sum of component scores, rounded to 4 decimals
    pub fn total(&self) -> f64 {
        let sum: f64 = self
            .spec
            .weights
            .iter()
            .zip(&self.scores)
            .map(|((_, w), s)| w * s)
            .sum();
        round_score(sum)
    }

    /// Details with `component_scores` and a `no_input` marker for every
    /// component that never received evidence
    fn closed_details(&self) -> Map<String, Value> {
        let mut details = self.details.clone();
        let mut component_scores = Map::new();
        for (i, (name, _)) in self.spec.weights.iter().enumerate() {
            component_scores.insert(name.to_string(), json!(round_score(self.scores[i])));
            if !self.touched[i] {
                details.insert(name.to_string(), json!({ "status": "no_input" }));
            }
        }
        details.insert("component_scores".to_string(), Value::Object(component_scores));
        details
    }

    pub fn finish(self, domain: &str, policy: &BadgePolicy, started: Instant) -> VerificationResult {
        let mut details = self.closed_details();
        details.insert("claim_type".to_string(), json!(self.spec.name));

        let mut result = VerificationResult::scored(domain, self.total(), policy)
            .with_details(details)
            .with_compute_time(started.elapsed().as_secs_f64());
        result.warnings = self.warnings;
        result.errors = self.errors;
        result
    }

    /// Close the card as the result of a cross-cutting check
    pub fn finish_check(self, weight: f64, started: Instant) -> CrossCuttingResult {
        let details = self.closed_details();
        let mut result = CrossCuttingResult::new(self.spec.name, weight, self.total())
            .with_details(details)
            .with_compute_time(started.elapsed().as_secs_f64());
        result.warnings = self.warnings;
        result.errors = self.errors;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SPEC: ClaimTypeSpec = ClaimTypeSpec {
        name: "example",
        weights: &[("alpha", 0.5), ("beta", 0.3), ("gamma", 0.2)],
    };

    #[test]
    fn test_untouched_is_neutral() {
        let card = Scorecard::new(&SPEC);
        assert_eq!(card.total(), 0.5);
        let result = card.finish("physics", &BadgePolicy::default(), Instant::now());
        assert_eq!(result.score, 0.5);
        assert_eq!(result.details["alpha"]["status"], "no_input");
        assert_eq!(result.details["claim_type"], "example");
    }

    #[test]
    fn test_weighted_sum() {
        let mut card = Scorecard::new(&SPEC);
        card.score("alpha", 1.0, json!({}));
        card.reject("beta", "value out of range");
        assert_eq!(card.total(), 0.6);
        assert_eq!(card.errors().len(), 1);
    }

    #[test]
    fn test_scores_are_clamped() {
        let mut card = Scorecard::new(&SPEC);
        card.score("alpha", 7.0, json!({}));
        card.score("beta", -1.0, json!({}));
        assert_eq!(card.component_score("alpha"), Some(1.0));
        assert_eq!(card.component_score("beta"), Some(0.0));
    }

    #[test]
    fn test_unknown_component_ignored() {
        let mut card = Scorecard::new(&SPEC);
        card.score("delta", 0.0, json!({}));
        assert_eq!(card.total(), 0.5);
    }

    #[test]
    fn test_neutral_records_warning() {
        let mut card = Scorecard::new(&SPEC);
        card.neutral("gamma", "solver unavailable");
        assert_eq!(card.total(), 0.5);
        let result = card.finish("physics", &BadgePolicy::default(), Instant::now());
        assert_eq!(result.warnings, vec!["solver unavailable".to_string()]);
        assert_eq!(result.details["component_scores"]["gamma"], 0.5);
    }

    #[test]
    fn test_finish_check_keeps_component_scores() {
        static CHECK: ClaimTypeSpec = ClaimTypeSpec {
            name: "data_integrity",
            weights: &[("schema", 0.6), ("duplicates", 0.4)],
        };
        let mut card = Scorecard::new(&CHECK);
        card.score("schema", 1.0, json!({}));
        let result = card.finish_check(0.10, Instant::now());
        assert_eq!(result.name, "data_integrity");
        assert_eq!(result.score, 0.8);
        assert_eq!(result.details["duplicates"]["status"], "no_input");
        assert!(result.details.get("claim_type").is_none());
    }
}
