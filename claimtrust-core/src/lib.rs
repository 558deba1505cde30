//! claimtrust Core - Result types and scoring primitives for claim verification
//!
//! This crate provides the foundational pieces every verifier shares:
//! - Verification and cross-cutting result types with badge classification
//! - Total, panic-free accessors over untyped claim records
//! - Math utilities (gamma, chi-squared survival, descriptive statistics)
//! - Domain weight tables and domain/claim-type inference
//! - Weighted component scorecards

pub mod domains;
pub mod error;
pub mod inference;
pub mod math;
pub mod metadata;
pub mod result;
pub mod scorecard;
pub mod value;

pub use domains::*;
pub use error::*;
pub use inference::*;
pub use metadata::*;
pub use result::*;
pub use scorecard::*;

/// Score meaning "no evidence either way"
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Minimum score
pub const MIN_SCORE: f64 = 0.0;

/// Maximum score
pub const MAX_SCORE: f64 = 1.0;

/// Clamp to [0, 1] and round to 4 decimal places. NaN is treated as neutral.
pub fn round_score(score: f64) -> f64 {
    if score.is_nan() {
        return NEUTRAL_SCORE;
    }
    (score.clamp(MIN_SCORE, MAX_SCORE) * 10_000.0).round() / 10_000.0
}
