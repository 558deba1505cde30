//! Verification outcomes
//!
//! A `VerificationResult` is produced once per verification call and handed
//! to the caller; a `CrossCuttingResult` is produced per applicable
//! domain-agnostic check. Both are plain data, created fresh per call.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::round_score;

/// Qualitative trust classification derived from a final score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    Green,
    Amber,
    Red,
}

impl fmt::Display for Badge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Badge::Green => "green",
            Badge::Amber => "amber",
            Badge::Red => "red",
        };
        f.write_str(label)
    }
}

/// Score thresholds for badge and pass/fail classification.
///
/// The thresholds are deployment configuration, not fixed constants; the
/// defaults are green at 0.80, amber at 0.50 and passing at 0.50.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BadgePolicy {
    /// Minimum score for a green badge
    pub green: f64,
    /// Minimum score for an amber badge
    pub amber: f64,
    /// Minimum score for `passed = true`
    pub pass_threshold: f64,
}

impl Default for BadgePolicy {
    fn default() -> Self {
        Self {
            green: 0.80,
            amber: 0.50,
            pass_threshold: 0.50,
        }
    }
}

impl BadgePolicy {
    pub fn badge(&self, score: f64) -> Badge {
        if score >= self.green {
            Badge::Green
        } else if score >= self.amber {
            Badge::Amber
        } else {
            Badge::Red
        }
    }

    pub fn passed(&self, score: f64) -> bool {
        score >= self.pass_threshold
    }
}

/// Outcome of verifying one claim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub domain: String,
    /// Trust score in [0, 1], 4 decimal places
    pub score: f64,
    pub badge: Badge,
    pub passed: bool,
    pub details: Map<String, Value>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub compute_time_seconds: f64,
}

impl VerificationResult {
    /// Build a result, classifying the (rounded) score with `policy`
    pub fn scored(domain: &str, score: f64, policy: &BadgePolicy) -> Self {
        let score = round_score(score);
        Self {
            domain: domain.to_string(),
            score,
            badge: policy.badge(score),
            passed: policy.passed(score),
            details: Map::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            compute_time_seconds: 0.0,
        }
    }

    /// A failed verification carrying a human-readable reason
    pub fn failure(domain: &str, reason: impl Into<String>) -> Self {
        Self {
            domain: domain.to_string(),
            score: 0.0,
            badge: Badge::Red,
            passed: false,
            details: Map::new(),
            warnings: Vec::new(),
            errors: vec![reason.into()],
            compute_time_seconds: 0.0,
        }
    }

    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = details;
        self
    }

    pub fn with_compute_time(mut self, seconds: f64) -> Self {
        self.compute_time_seconds = seconds;
        self
    }

    /// Re-classify after the score changed under a different policy
    pub fn reclassify(&mut self, policy: &BadgePolicy) {
        self.score = round_score(self.score);
        self.badge = policy.badge(self.score);
        self.passed = policy.passed(self.score);
    }
}

/// Outcome of one cross-cutting check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossCuttingResult {
    pub name: String,
    /// Declared weight in (0, 1]
    pub weight: f64,
    pub score: f64,
    pub details: Map<String, Value>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub compute_time_seconds: f64,
}

impl CrossCuttingResult {
    pub fn new(name: &str, weight: f64, score: f64) -> Self {
        Self {
            name: name.to_string(),
            weight,
            score: round_score(score),
            details: Map::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            compute_time_seconds: 0.0,
        }
    }

    /// Zero-score result for a check that failed on its own
    pub fn failed(name: &str, weight: f64, error: impl Into<String>) -> Self {
        let mut result = Self::new(name, weight, 0.0);
        result.errors.push(error.into());
        result
    }

    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = details;
        self
    }

    pub fn with_compute_time(mut self, seconds: f64) -> Self {
        self.compute_time_seconds = seconds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_badges() {
        let policy = BadgePolicy::default();
        assert_eq!(policy.badge(0.95), Badge::Green);
        assert_eq!(policy.badge(0.80), Badge::Green);
        assert_eq!(policy.badge(0.5), Badge::Amber);
        assert_eq!(policy.badge(0.4999), Badge::Red);
        assert!(policy.passed(0.5));
        assert!(!policy.passed(0.49));
    }

    #[test]
    fn test_failure_result() {
        let result = VerificationResult::failure("genomics", "lookup exploded");
        assert_eq!(result.score, 0.0);
        assert_eq!(result.badge, Badge::Red);
        assert!(!result.passed);
        assert_eq!(result.errors, vec!["lookup exploded".to_string()]);
    }

    #[test]
    fn test_scored_rounds() {
        let result = VerificationResult::scored("physics", 0.666666, &BadgePolicy::default());
        assert_eq!(result.score, 0.6667);
        assert_eq!(result.badge, Badge::Amber);
    }

    #[test]
    fn test_badge_serializes_snake_case() {
        let json = serde_json::to_string(&Badge::Amber).unwrap();
        assert_eq!(json, "\"amber\"");
    }
}
