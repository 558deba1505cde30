//! Final score merge
//!
//! `final = w * domain + (1 - w) * cross`, where `cross` is the
//! weight-normalised mean of the cross-cutting checks that ran. With none
//! the domain score stands alone.

use serde_json::{json, Map, Value};

use claimtrust_core::{round_score, BadgePolicy, CrossCuttingResult, VerificationResult};

/// Weight-normalised mean of the cross-cutting scores, `None` when empty
pub fn cross_cutting_aggregate(results: &[CrossCuttingResult]) -> Option<f64> {
    let total_weight: f64 = results.iter().map(|r| r.weight.max(0.0)).sum();
    if total_weight <= 0.0 {
        return None;
    }
    let weighted: f64 = results.iter().map(|r| r.weight.max(0.0) * r.score).sum();
    Some(weighted / total_weight)
}

pub fn merge(
    domain_result: VerificationResult,
    cross: &[CrossCuttingResult],
    domain_weight: f64,
    policy: &BadgePolicy,
) -> VerificationResult {
    let w = domain_weight.clamp(0.0, 1.0);
    let domain_score = domain_result.score;
    let aggregate = cross_cutting_aggregate(cross);
    let score = match aggregate {
        Some(cross_score) => w * domain_score + (1.0 - w) * cross_score,
        None => domain_score,
    };

    let mut details = domain_result.details;
    details.insert("domain_score".to_string(), json!(domain_score));
    details.insert("domain_weight".to_string(), json!(w));
    details.insert(
        "cross_cutting_score".to_string(),
        aggregate.map_or(Value::Null, |a| json!(round_score(a))),
    );
    let mut checks = Map::new();
    for result in cross {
        checks.insert(
            result.name.clone(),
            json!({
                "score": result.score,
                "weight": result.weight,
                "details": result.details,
            }),
        );
    }
    details.insert("cross_cutting".to_string(), Value::Object(checks));

    let mut warnings = domain_result.warnings;
    let mut errors = domain_result.errors;
    for result in cross {
        warnings.extend(result.warnings.iter().map(|w| format!("[{}] {}", result.name, w)));
        errors.extend(result.errors.iter().map(|e| format!("[{}] {}", result.name, e)));
    }

    let mut merged = VerificationResult::scored(&domain_result.domain, score, policy)
        .with_details(details)
        .with_compute_time(domain_result.compute_time_seconds);
    merged.warnings = warnings;
    merged.errors = errors;
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimtrust_core::Badge;

    fn domain(score: f64) -> VerificationResult {
        let mut result = VerificationResult::scored("physics", score, &BadgePolicy::default());
        result.warnings.push("domain warning".to_string());
        result
    }

    #[test]
    fn test_no_cross_cutting_keeps_domain_score() {
        let merged = merge(domain(0.62), &[], 0.65, &BadgePolicy::default());
        assert_eq!(merged.score, 0.62);
        assert_eq!(merged.details["cross_cutting_score"], Value::Null);
        assert_eq!(merged.badge, Badge::Amber);
    }

    #[test]
    fn test_weighted_blend() {
        let cross = vec![
            CrossCuttingResult::new("citation", 0.15, 1.0),
            CrossCuttingResult::new("reproducibility", 0.15, 0.0),
        ];
        let merged = merge(domain(0.9), &cross, 0.6, &BadgePolicy::default());
        // 0.6 * 0.9 + 0.4 * 0.5
        assert_eq!(merged.score, 0.74);
        assert_eq!(merged.details["cross_cutting_score"], 0.5);
        assert_eq!(merged.details["cross_cutting"]["citation"]["score"], 1.0);
        assert!(merged.passed);
    }

    #[test]
    fn test_aggregate_normalises_weights() {
        let cross = vec![
            CrossCuttingResult::new("citation", 0.15, 0.8),
            CrossCuttingResult::new("statistical_forensics", 0.10, 0.3),
        ];
        let aggregate = cross_cutting_aggregate(&cross).unwrap();
        assert!((aggregate - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_messages_are_prefixed() {
        let mut failed = CrossCuttingResult::failed("data_integrity", 0.10, "checksum mismatch");
        failed.warnings.push("few rows".to_string());
        let merged = merge(domain(0.5), &[failed], 0.7, &BadgePolicy::default());
        assert_eq!(merged.warnings, vec!["domain warning", "[data_integrity] few rows"]);
        assert_eq!(merged.errors, vec!["[data_integrity] checksum mismatch"]);
    }

    #[test]
    fn test_policy_applies_to_final_score() {
        let strict = BadgePolicy { green: 0.95, amber: 0.8, pass_threshold: 0.8 };
        let merged = merge(domain(0.9), &[], 0.7, &strict);
        assert_eq!(merged.badge, Badge::Amber);
        assert!(merged.passed);
    }
}
