//! Statistical forensics
//!
//! Four independent heuristics for impossible or fabricated statistics.
//! Each one is skipped (recorded as `applicable: false`, neutral 0.5) when
//! the claim does not carry enough data for it; the overall score is the
//! mean of the heuristics that did run.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Instant;
use tracing::debug;

use claimtrust_core::math::{chi_squared_survival, mean, std_dev};
use claimtrust_core::value::{collect_numbers, field, first_num, has_field, num_array};
use claimtrust_core::{ClaimMetadata, CrossCuttingResult, NEUTRAL_SCORE};

use crate::traits::{CheckError, CrossCuttingVerifier};

const NAME: &str = "statistical_forensics";
const WEIGHT: f64 = 0.10;

/// Local search budget for SPRITE
pub const SPRITE_MAX_ITERATIONS: usize = 5000;
/// Fixed SPRITE seed; identical inputs give identical verdicts
pub const SPRITE_SEED: u64 = 0x5EED_5917_E000_0001;
/// Minimum numbers before Benford's Law is tested
pub const BENFORD_MIN_NUMBERS: usize = 10;
/// Minimum significant p-values before a p-curve is tested
pub const P_CURVE_MIN_SIGNIFICANT: usize = 3;
/// Largest sample SPRITE will reconstruct
const SPRITE_MAX_N: usize = 10_000;

/// A reported summary: mean, optional sd and scale bounds, sample size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub mean: f64,
    pub sd: Option<f64>,
    pub n: usize,
    pub scale: Option<(i64, i64)>,
}

/// GRIM: `mean·n` must lie within `0.005n + 0.01` of an integer
pub fn grim_consistent(mean: f64, n: usize) -> bool {
    let product = mean * n as f64;
    let remainder = (product - product.round()).abs();
    remainder <= 0.005 * n as f64 + 0.01
}

/// Linear congruential generator (Knuth MMIX constants)
#[derive(Debug, Clone)]
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0
    }

    /// Uniform index in `0..bound`
    pub fn below(&mut self, bound: usize) -> usize {
        ((self.next_u64() >> 33) % bound as u64) as usize
    }
}

fn sample_sd(values: &[i64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<i64>() as f64 / n;
    let ssd: f64 = values.iter().map(|v| (*v as f64 - mean).powi(2)).sum();
    (ssd / (n - 1.0)).sqrt()
}

/// SPRITE: search for integer data on `[min, max]` with the reported mean
/// and standard deviation. `sd_tolerance` is half a unit of the reported
/// precision.
pub fn sprite_achievable(mean: f64, sd: f64, n: usize, min: i64, max: i64, sd_tolerance: f64) -> bool {
    if n < 2 || min >= max || sd < 0.0 || mean < min as f64 || mean > max as f64 {
        return false;
    }
    let target_sum = (mean * n as f64).round() as i64;
    if (target_sum as f64 / n as f64 - mean).abs() > 0.005 + 1e-9 {
        return false;
    }

    // Start as flat as possible with the exact target sum
    let base = target_sum.div_euclid(n as i64);
    let extra = target_sum.rem_euclid(n as i64) as usize;
    let mut values: Vec<i64> = (0..n).map(|i| if i < extra { base + 1 } else { base }).collect();
    if values.iter().any(|v| *v < min || *v > max) {
        return false;
    }

    let mut rng = Lcg::new(SPRITE_SEED);
    for _ in 0..SPRITE_MAX_ITERATIONS {
        let current = sample_sd(&values);
        if (current - sd).abs() <= sd_tolerance {
            return true;
        }
        let i = rng.below(n);
        let j = rng.below(n);
        if i == j {
            continue;
        }
        if current < sd {
            // spread out: raise the larger value, lower the smaller
            let (hi, lo) = if values[i] >= values[j] { (i, j) } else { (j, i) };
            if values[hi] < max && values[lo] > min {
                values[hi] += 1;
                values[lo] -= 1;
            }
        } else {
            // pull together, only when it strictly reduces spread
            let (hi, lo) = if values[i] > values[j] { (i, j) } else { (j, i) };
            if values[hi] - values[lo] >= 2 {
                values[hi] -= 1;
                values[lo] += 1;
            }
        }
    }
    false
}

/// Leading decimal digit of a non-zero finite number
pub fn leading_digit(value: f64) -> Option<u8> {
    let mut x = value.abs();
    if x == 0.0 || !x.is_finite() {
        return None;
    }
    while x >= 10.0 {
        x /= 10.0;
    }
    while x < 1.0 {
        x *= 10.0;
    }
    Some(x.floor().clamp(1.0, 9.0) as u8)
}

/// Chi-squared statistic and p-value (8 dof) of leading digits against
/// Benford's distribution. `None` below the minimum sample.
pub fn benford_test(values: &[f64]) -> Option<(f64, f64, usize)> {
    let digits: Vec<u8> = values.iter().filter_map(|v| leading_digit(*v)).collect();
    if digits.len() < BENFORD_MIN_NUMBERS {
        return None;
    }
    let mut observed = [0usize; 9];
    for d in &digits {
        observed[(*d - 1) as usize] += 1;
    }
    let total = digits.len() as f64;
    let chi2: f64 = (1..=9)
        .map(|d| {
            let expected = total * (1.0 + 1.0 / d as f64).log10();
            let o = observed[d - 1] as f64;
            (o - expected).powi(2) / expected
        })
        .sum();
    Some((chi2, chi_squared_survival(chi2, 8.0), digits.len()))
}

/// Asymptotic Kolmogorov distribution survival `Q(λ)`
fn kolmogorov_survival(lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return 1.0;
    }
    let mut sum = 0.0;
    for k in 1..=100 {
        let k = k as f64;
        let term = 2.0 * (-1f64).powf(k - 1.0) * (-2.0 * k * k * lambda * lambda).exp();
        sum += term;
        if term.abs() < 1e-12 {
            break;
        }
    }
    sum.clamp(0.0, 1.0)
}

/// Outcome of a p-curve analysis over significant p-values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PCurve {
    pub significant: usize,
    pub proportion_below_025: f64,
    pub ks_statistic: f64,
    pub ks_p_value: f64,
}

impl PCurve {
    /// Left skew (mass near 0.05) that departs from uniform
    pub fn suggests_p_hacking(&self) -> bool {
        self.proportion_below_025 < 0.5 && self.ks_p_value < 0.05
    }

    /// Right skew: most significant results well below 0.025
    pub fn has_evidential_value(&self) -> bool {
        self.proportion_below_025 > 0.5
    }
}

/// p-curve over `p < 0.05`, with a KS test against uniform on `[0, 0.05]`
pub fn p_curve(p_values: &[f64]) -> Option<PCurve> {
    let mut significant: Vec<f64> = p_values.iter().copied().filter(|p| *p > 0.0 && *p < 0.05).collect();
    if significant.len() < P_CURVE_MIN_SIGNIFICANT {
        return None;
    }
    significant.sort_by(f64::total_cmp);
    let n = significant.len() as f64;
    let below = significant.iter().filter(|p| **p < 0.025).count() as f64;
    let d = significant
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let uniform = p / 0.05;
            let before = i as f64 / n;
            let after = (i + 1) as f64 / n;
            (uniform - before).abs().max((after - uniform).abs())
        })
        .fold(0.0, f64::max);
    let root = n.sqrt();
    let lambda = (root + 0.12 + 0.11 / root) * d;
    Some(PCurve {
        significant: significant.len(),
        proportion_below_025: below / n,
        ks_statistic: d,
        ks_p_value: kolmogorov_survival(lambda),
    })
}

fn summary_from(record: &Value) -> Option<Summary> {
    let mean = first_num(record, &["mean", "reported_mean"])?;
    let n = first_num(record, &["n", "sample_size"])?;
    if n < 1.0 || n.fract() != 0.0 {
        return None;
    }
    let scale = match (
        first_num(record, &["scale_min", "min_value"]),
        first_num(record, &["scale_max", "max_value"]),
    ) {
        (Some(lo), Some(hi)) if lo.fract() == 0.0 && hi.fract() == 0.0 => Some((lo as i64, hi as i64)),
        _ => None,
    };
    Some(Summary {
        mean,
        sd: first_num(record, &["sd", "std_dev", "standard_deviation"]),
        n: n as usize,
        scale,
    })
}

/// Reported summaries at the top level, under `statistics` and under
/// `statistics.groups`
pub fn summaries(claim: &Value) -> Vec<Summary> {
    let mut out: Vec<Summary> = summary_from(claim).into_iter().collect();
    if let Some(stats) = field(claim, "statistics") {
        out.extend(summary_from(stats));
        if let Some(Value::Array(groups)) = field(stats, "groups") {
            out.extend(groups.iter().filter_map(summary_from));
        }
    }
    out
}

fn raw_numbers(claim: &Value) -> Vec<f64> {
    let mut numbers = Vec::new();
    for key in ["data", "raw_data", "values"] {
        if let Some(value) = field(claim, key) {
            collect_numbers(value, &mut numbers);
        }
    }
    if let Some(stats) = field(claim, "statistics") {
        if let Some(values) = field(stats, "values") {
            collect_numbers(values, &mut numbers);
        }
    }
    numbers
}

fn p_values(claim: &Value) -> Vec<f64> {
    let mut values = num_array(claim, "p_values");
    if let Some(stats) = field(claim, "statistics") {
        values.extend(num_array(stats, "p_values"));
    }
    values
}

fn skipped(reason: &str) -> Value {
    json!({ "applicable": false, "score": NEUTRAL_SCORE, "reason": reason })
}

/// GRIM, SPRITE, Benford's Law and p-curve checks
#[derive(Debug, Default)]
pub struct StatisticalForensicsVerifier;

impl StatisticalForensicsVerifier {
    pub fn new() -> Self {
        Self
    }

    fn grim(&self, summaries: &[Summary], errors: &mut Vec<String>) -> (Option<f64>, Value) {
        if summaries.is_empty() {
            return (None, skipped("no mean with a sample size"));
        }
        let checks: Vec<Value> = summaries
            .iter()
            .map(|s| {
                let consistent = grim_consistent(s.mean, s.n);
                if !consistent {
                    errors.push(format!("GRIM: mean {} is impossible for n = {}", s.mean, s.n));
                }
                json!({ "mean": s.mean, "n": s.n, "consistent": consistent })
            })
            .collect();
        let passed = checks.iter().filter(|c| c["consistent"] == true).count();
        let score = passed as f64 / checks.len() as f64;
        (Some(score), json!({ "applicable": true, "score": score, "checks": checks }))
    }

    fn sprite(&self, summaries: &[Summary], errors: &mut Vec<String>) -> (Option<f64>, Value) {
        let candidates: Vec<(&Summary, f64, (i64, i64))> = summaries
            .iter()
            .filter_map(|s| Some((s, s.sd?, s.scale?)))
            .filter(|(s, _, _)| s.n >= 2 && s.n <= SPRITE_MAX_N)
            .collect();
        if candidates.is_empty() {
            return (None, skipped("needs mean, sd, n and integer scale bounds"));
        }
        let checks: Vec<Value> = candidates
            .iter()
            .map(|(s, sd, (lo, hi))| {
                let achievable = sprite_achievable(s.mean, *sd, s.n, *lo, *hi, 0.005);
                if !achievable {
                    errors.push(format!(
                        "SPRITE: no integer data on [{}, {}] with n = {} gives mean {} and sd {}",
                        lo, hi, s.n, s.mean, sd
                    ));
                }
                json!({ "mean": s.mean, "sd": sd, "n": s.n, "scale": [lo, hi], "achievable": achievable })
            })
            .collect();
        let passed = checks.iter().filter(|c| c["achievable"] == true).count();
        let score = passed as f64 / checks.len() as f64;
        (Some(score), json!({ "applicable": true, "score": score, "checks": checks }))
    }

    fn benford(&self, numbers: &[f64], warnings: &mut Vec<String>) -> (Option<f64>, Value) {
        let Some((chi2, p, count)) = benford_test(numbers) else {
            return (None, skipped("fewer than 10 non-zero numbers"));
        };
        let score = if p >= 0.05 {
            1.0
        } else if p >= 0.01 {
            0.5
        } else {
            0.1
        };
        if p < 0.05 {
            warnings.push(format!("Benford: leading digits deviate from Benford's Law (p = {:.4})", p));
        }
        if count < 50 {
            warnings.push(format!("Benford: only {} numbers; the test has little power", count));
        }
        (
            Some(score),
            json!({ "applicable": true, "score": score, "chi_squared": chi2, "p_value": p, "count": count }),
        )
    }

    fn p_curve(&self, p_values: &[f64], warnings: &mut Vec<String>) -> (Option<f64>, Value) {
        let Some(curve) = p_curve(p_values) else {
            return (None, skipped("fewer than 3 significant p-values"));
        };
        let score = if curve.has_evidential_value() {
            1.0
        } else if curve.suggests_p_hacking() {
            warnings.push("p-curve: significant p-values cluster just below 0.05 (possible p-hacking)".to_string());
            0.2
        } else {
            warnings.push("p-curve: flat p-curve shows no evidential value".to_string());
            NEUTRAL_SCORE
        };
        (
            Some(score),
            json!({
                "applicable": true,
                "score": score,
                "significant": curve.significant,
                "proportion_below_025": curve.proportion_below_025,
                "ks_statistic": curve.ks_statistic,
                "ks_p_value": curve.ks_p_value,
            }),
        )
    }
}

#[async_trait]
impl CrossCuttingVerifier for StatisticalForensicsVerifier {
    fn name(&self) -> &'static str {
        NAME
    }

    fn weight(&self) -> f64 {
        WEIGHT
    }

    fn is_applicable(&self, claim: &Value) -> bool {
        has_field(claim, "statistics")
            || has_field(claim, "p_values")
            || (has_field(claim, "mean") && (has_field(claim, "n") || has_field(claim, "sample_size")))
            || ["data", "raw_data", "values"].iter().any(|k| has_field(claim, k))
    }

    async fn verify(&self, claim: &Value, _metadata: &ClaimMetadata) -> Result<CrossCuttingResult, CheckError> {
        let started = Instant::now();
        let summaries = summaries(claim);
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let tests = [
            ("grim", self.grim(&summaries, &mut errors)),
            ("sprite", self.sprite(&summaries, &mut errors)),
            ("benford", self.benford(&raw_numbers(claim), &mut warnings)),
            ("p_curve", self.p_curve(&p_values(claim), &mut warnings)),
        ];

        let mut details = Map::new();
        let mut scores = Vec::new();
        for (name, (score, detail)) in tests {
            scores.extend(score);
            details.insert(name.to_string(), detail);
        }
        let score = mean(&scores).unwrap_or(NEUTRAL_SCORE);
        details.insert("tests_run".to_string(), json!(scores.len()));
        if let Some(sd) = std_dev(&scores) {
            details.insert("score_spread".to_string(), json!(sd));
        }
        debug!("statistical forensics ran {} tests, score {}", scores.len(), score);

        let mut result = CrossCuttingResult::new(NAME, WEIGHT, score)
            .with_details(details)
            .with_compute_time(started.elapsed().as_secs_f64());
        result.warnings = warnings;
        result.errors = errors;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grim_examples() {
        assert!(!grim_consistent(3.44, 20));
        assert!(grim_consistent(3.45, 20));
    }

    #[test]
    fn test_sprite_reachable_and_unreachable() {
        // all 3s already have sd 0
        assert!(sprite_achievable(3.0, 0.0, 10, 1, 5, 0.005));
        // one step away from flat: two values moved by one leave ssd = 2
        assert!(sprite_achievable(3.0, 0.47, 10, 1, 5, 0.005));
        // sum of squares must be even when the sum is, so ssd = 9 is impossible
        assert!(!sprite_achievable(3.0, 1.0, 10, 1, 5, 0.005));
        // beyond the widest spread a 1..5 scale allows
        assert!(!sprite_achievable(3.0, 3.0, 10, 1, 5, 0.005));
        // GRIM-inconsistent mean
        assert!(!sprite_achievable(3.44, 1.0, 20, 1, 7, 0.005));
    }

    #[test]
    fn test_sprite_is_deterministic() {
        let first = sprite_achievable(4.2, 1.31, 25, 1, 7, 0.005);
        let second = sprite_achievable(4.2, 1.31, 25, 1, 7, 0.005);
        assert_eq!(first, second);
    }

    #[test]
    fn test_leading_digit() {
        assert_eq!(leading_digit(0.0042), Some(4));
        assert_eq!(leading_digit(-917.0), Some(9));
        assert_eq!(leading_digit(1.0), Some(1));
        assert_eq!(leading_digit(0.0), None);
    }

    #[test]
    fn test_benford_needs_ten_numbers() {
        assert!(benford_test(&[1.0, 2.0, 3.0]).is_none());
        let uniform_nines: Vec<f64> = (0..40).map(|i| 900.0 + i as f64).collect();
        let (_, p, count) = benford_test(&uniform_nines).unwrap();
        assert_eq!(count, 40);
        assert!(p < 0.01);
    }

    #[test]
    fn test_p_curve_shapes() {
        assert!(p_curve(&[0.01, 0.02]).is_none());
        let right = p_curve(&[0.001, 0.002, 0.01, 0.03]).unwrap();
        assert!(right.has_evidential_value());
        let hacked = p_curve(&[0.041, 0.045, 0.048, 0.049, 0.044, 0.046, 0.047, 0.043]).unwrap();
        assert!(hacked.suggests_p_hacking());
    }

    #[tokio::test]
    async fn test_insufficient_data_is_neutral() {
        let verifier = StatisticalForensicsVerifier::new();
        let claim = json!({"values": [1, 2, 3], "p_values": [0.01, 0.2]});
        assert!(verifier.is_applicable(&claim));
        let result = verifier.verify(&claim, &ClaimMetadata::default()).await.unwrap();
        assert_eq!(result.score, 0.5);
        assert_eq!(result.details["benford"]["applicable"], false);
        assert_eq!(result.details["p_curve"]["applicable"], false);
        assert_eq!(result.details["benford"]["score"], 0.5);
    }

    #[tokio::test]
    async fn test_grim_failure_lowers_score() {
        let verifier = StatisticalForensicsVerifier::new();
        let claim = json!({"statistics": {"groups": [{"mean": 3.44, "n": 20}, {"mean": 3.45, "n": 20}]}});
        let result = verifier.verify(&claim, &ClaimMetadata::default()).await.unwrap();
        assert_eq!(result.score, 0.5);
        assert_eq!(result.details["grim"]["applicable"], true);
        assert_eq!(result.errors, vec!["GRIM: mean 3.44 is impossible for n = 20"]);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_not_applicable_without_statistics() {
        let verifier = StatisticalForensicsVerifier::new();
        assert!(!verifier.is_applicable(&json!({"mean": 2.0})));
        assert!(verifier.is_applicable(&json!({"mean": 2.0, "n": 12})));
    }
}
