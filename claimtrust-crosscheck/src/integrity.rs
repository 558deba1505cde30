//! Data integrity
//!
//! Checks tabular data attached to a claim: rows share one schema, exact
//! duplicates are rare, numeric columns have few 3σ outliers, and any
//! declared checksums match the attached content.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Instant;
use tracing::debug;

use claimtrust_core::math::{mean, std_dev};
use claimtrust_core::value::{as_number, as_string, field, object_array, type_name};
use claimtrust_core::{ClaimMetadata, ClaimTypeSpec, CrossCuttingResult, Scorecard};

use crate::traits::{CheckError, CrossCuttingVerifier};

const WEIGHT: f64 = 0.10;

/// |z| above which a value is an outlier
pub const OUTLIER_Z: f64 = 3.0;
/// Outlier share tolerated before the score drops
const OUTLIER_ALLOWANCE: f64 = 0.01;

static DATA_INTEGRITY: ClaimTypeSpec = ClaimTypeSpec {
    name: "data_integrity",
    weights: &[
        ("schema_consistency", 0.30),
        ("duplicates", 0.25),
        ("outliers", 0.25),
        ("checksums", 0.20),
    ],
};

const ROW_KEYS: &[&str] = &["data", "rows", "dataset"];

/// 64-bit FNV-1a, hex encoded
pub fn fnv1a64(bytes: &[u8]) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    format!("{:016x}", hash)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Bytes a checksum covers: strings as-is, anything else as compact JSON
fn checksum_bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::String(s) => s.as_bytes().to_vec(),
        other => other.to_string().into_bytes(),
    }
}

/// Compare a declared checksum (`<fnv1a64 hex>` or `sha256:<hex>`) with
/// the content
pub fn checksum_matches(declared: &str, content: &Value) -> bool {
    let declared = declared.trim().to_ascii_lowercase();
    let bytes = checksum_bytes(content);
    match declared.strip_prefix("sha256:") {
        Some(hex) => hex == sha256_hex(&bytes),
        None => declared.strip_prefix("fnv1a64:").unwrap_or(&declared) == fnv1a64(&bytes),
    }
}

/// Declared checksums as `(target, hash)` pairs
fn declared_checksums(value: &Value) -> Vec<(String, String)> {
    match value {
        Value::Object(map) => map
            .iter()
            .filter_map(|(name, hash)| Some((name.clone(), as_string(hash)?)))
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let name = ["name", "file", "field"].iter().find_map(|k| item.get(*k).and_then(as_string))?;
                let hash = ["checksum", "hash", "value"].iter().find_map(|k| item.get(*k).and_then(as_string))?;
                Some((name, hash))
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn rows(claim: &Value) -> Vec<&Map<String, Value>> {
    ROW_KEYS
        .iter()
        .map(|k| object_array(claim, k))
        .find(|rows| !rows.is_empty())
        .unwrap_or_default()
}

/// Schema, duplicate, outlier and checksum checks on attached data
#[derive(Debug, Default)]
pub struct DataIntegrityVerifier;

impl DataIntegrityVerifier {
    pub fn new() -> Self {
        Self
    }

    fn schema_consistency(&self, rows: &[&Map<String, Value>], card: &mut Scorecard) {
        let mut key_sets: HashMap<BTreeSet<&str>, usize> = HashMap::new();
        for row in rows {
            *key_sets.entry(row.keys().map(String::as_str).collect()).or_default() += 1;
        }
        let (reference, matching) = key_sets
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(keys, count)| (keys.clone(), *count))
            .unwrap_or_default();
        let row_share = matching as f64 / rows.len() as f64;

        let mut column_types: BTreeMap<&str, HashSet<&'static str>> = BTreeMap::new();
        for row in rows {
            for (key, value) in row.iter() {
                let types = column_types.entry(key.as_str()).or_default();
                if !value.is_null() {
                    types.insert(type_name(value));
                }
            }
        }
        let mixed: Vec<&str> = column_types
            .iter()
            .filter(|(_, types)| types.len() > 1)
            .map(|(name, _)| *name)
            .collect();
        let column_share = if column_types.is_empty() {
            1.0
        } else {
            1.0 - mixed.len() as f64 / column_types.len() as f64
        };

        let detail = json!({
            "rows": rows.len(),
            "rows_matching_schema": matching,
            "columns": reference.iter().collect::<Vec<_>>(),
            "mixed_type_columns": mixed,
        });
        let score = row_share * column_share;
        if score < 1.0 {
            card.score_with_warning(
                "schema_consistency",
                score,
                detail,
                format!(
                    "{} of {} rows deviate from the common schema; {} columns mix types",
                    rows.len() - matching,
                    rows.len(),
                    mixed.len()
                ),
            );
        } else {
            card.score("schema_consistency", 1.0, detail);
        }
    }

    fn duplicates(&self, rows: &[&Map<String, Value>], card: &mut Scorecard) {
        let mut seen = HashSet::new();
        let duplicates = rows
            .iter()
            .filter(|row| !seen.insert(Value::Object((**row).clone()).to_string()))
            .count();
        let ratio = duplicates as f64 / rows.len() as f64;
        let detail = json!({ "duplicates": duplicates, "ratio": ratio });
        if duplicates == 0 {
            card.score("duplicates", 1.0, detail);
        } else {
            card.score_with_warning(
                "duplicates",
                1.0 - ratio,
                detail,
                format!("{} exact duplicate rows ({:.1}%)", duplicates, ratio * 100.0),
            );
        }
    }

    fn outliers(&self, rows: &[&Map<String, Value>], card: &mut Scorecard) {
        let mut columns: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for row in rows {
            for (key, value) in row.iter() {
                if value.is_number() {
                    if let Some(n) = as_number(value) {
                        columns.entry(key.as_str()).or_default().push(n);
                    }
                }
            }
        }
        let mut cells = 0usize;
        let mut flagged = Map::new();
        let mut outliers = 0usize;
        for (name, values) in &columns {
            if values.len() < 3 {
                continue;
            }
            let (Some(m), Some(sd)) = (mean(values), std_dev(values)) else { continue };
            cells += values.len();
            if sd == 0.0 {
                continue;
            }
            let count = values.iter().filter(|v| ((**v - m) / sd).abs() > OUTLIER_Z).count();
            if count > 0 {
                flagged.insert(name.to_string(), json!(count));
                outliers += count;
            }
        }
        if cells == 0 {
            return;
        }
        let ratio = outliers as f64 / cells as f64;
        let detail = json!({ "numeric_cells": cells, "outliers": outliers, "ratio": ratio, "columns": flagged });
        if ratio <= OUTLIER_ALLOWANCE {
            card.score("outliers", 1.0, detail);
        } else {
            let score = (1.0 - (ratio - OUTLIER_ALLOWANCE) * 10.0).max(0.0);
            card.score_with_warning(
                "outliers",
                score,
                detail,
                format!("{:.1}% of numeric values lie beyond {}σ", ratio * 100.0, OUTLIER_Z),
            );
        }
    }

    fn checksums(&self, claim: &Value, declared: &Value, card: &mut Scorecard) {
        let declared = declared_checksums(declared);
        if declared.is_empty() {
            card.reject("checksums", "checksums must map targets to hash strings");
            return;
        }
        let files = field(claim, "files");
        let mut matched = Vec::new();
        let mut mismatched = Vec::new();
        let mut missing = Vec::new();
        for (target, hash) in &declared {
            let content = files.and_then(|f| field(f, target)).or_else(|| field(claim, target));
            match content {
                Some(content) if checksum_matches(hash, content) => matched.push(target.clone()),
                Some(_) => mismatched.push(target.clone()),
                None => missing.push(target.clone()),
            }
        }
        let checked = matched.len() + mismatched.len();
        let detail = json!({ "matched": matched, "mismatched": mismatched, "missing_content": missing });
        if checked == 0 {
            card.neutral("checksums", "no content attached for any declared checksum");
            return;
        }
        card.score("checksums", matched.len() as f64 / checked as f64, detail);
        if !mismatched.is_empty() {
            card.error(format!("checksum mismatch for {}", mismatched.join(", ")));
        }
        if !missing.is_empty() {
            card.warn(format!("no content to verify checksums for {}", missing.join(", ")));
        }
    }
}

#[async_trait]
impl CrossCuttingVerifier for DataIntegrityVerifier {
    fn name(&self) -> &'static str {
        DATA_INTEGRITY.name
    }

    fn weight(&self) -> f64 {
        WEIGHT
    }

    fn is_applicable(&self, claim: &Value) -> bool {
        !rows(claim).is_empty() || field(claim, "checksums").is_some()
    }

    async fn verify(&self, claim: &Value, _metadata: &ClaimMetadata) -> Result<CrossCuttingResult, CheckError> {
        let started = Instant::now();
        let mut card = Scorecard::new(&DATA_INTEGRITY);

        let rows = rows(claim);
        if !rows.is_empty() {
            self.schema_consistency(&rows, &mut card);
            self.duplicates(&rows, &mut card);
            self.outliers(&rows, &mut card);
        }
        if let Some(declared) = field(claim, "checksums") {
            self.checksums(claim, declared, &mut card);
        }

        debug!("data integrity over {} rows, score {}", rows.len(), card.total());
        Ok(card.finish_check(WEIGHT, started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a64_vectors() {
        assert_eq!(fnv1a64(b""), "cbf29ce484222325");
        assert_eq!(fnv1a64(b"a"), "af63dc4c8601ec8c");
    }

    #[test]
    fn test_checksum_formats() {
        let content = json!("hello");
        assert!(checksum_matches(&fnv1a64(b"hello"), &content));
        assert!(checksum_matches(
            "sha256:2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824",
            &content
        ));
        assert!(!checksum_matches("sha256:00", &content));
    }

    #[tokio::test]
    async fn test_clean_table_scores_full() {
        let claim = json!({
            "data": [
                {"id": 1, "value": 2.0},
                {"id": 2, "value": 2.1},
                {"id": 3, "value": 1.9},
                {"id": 4, "value": 2.05}
            ]
        });
        let verifier = DataIntegrityVerifier::new();
        assert!(verifier.is_applicable(&claim));
        let result = verifier.verify(&claim, &ClaimMetadata::default()).await.unwrap();
        let scores = &result.details["component_scores"];
        assert_eq!(scores["schema_consistency"], 1.0);
        assert_eq!(scores["duplicates"], 1.0);
        assert_eq!(scores["outliers"], 1.0);
        assert_eq!(scores["checksums"], 0.5);
        assert_eq!(result.name, "data_integrity");
    }

    #[tokio::test]
    async fn test_duplicates_and_schema_drift() {
        let claim = json!({
            "rows": [
                {"a": 1, "b": "x"},
                {"a": 1, "b": "x"},
                {"a": 2, "b": "y"},
                {"a": "three"}
            ]
        });
        let result = DataIntegrityVerifier::new()
            .verify(&claim, &ClaimMetadata::default())
            .await
            .unwrap();
        let scores = &result.details["component_scores"];
        assert_eq!(scores["duplicates"], 0.75);
        assert!(scores["schema_consistency"].as_f64().unwrap() < 1.0);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_recorded() {
        let claim = json!({
            "files": {"results.csv": "a,b\n1,2\n"},
            "checksums": {"results.csv": "0000000000000000"}
        });
        let result = DataIntegrityVerifier::new()
            .verify(&claim, &ClaimMetadata::default())
            .await
            .unwrap();
        assert_eq!(result.details["component_scores"]["checksums"], 0.0);
        assert!(result.errors[0].contains("results.csv"));
    }

    #[test]
    fn test_not_applicable_without_rows() {
        let verifier = DataIntegrityVerifier::new();
        assert!(!verifier.is_applicable(&json!({"data": [1, 2, 3]})));
        assert!(verifier.is_applicable(&json!({"checksums": {}})));
    }
}
