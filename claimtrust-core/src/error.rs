//! Errors that fail a whole verification
//!
//! Component-level problems (an unreachable service, an implausible value)
//! never surface here; they are recorded on the scorecard instead.

use thiserror::Error;

/// Reasons a claim cannot be verified at all
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VerifyError {
    #[error("no {kind} provided and none could be inferred; valid values: {}", valid.join(", "))]
    MissingClassification { kind: &'static str, valid: Vec<String> },

    #[error("unsupported claim_type '{claim_type}' for {domain}; valid values: {}", valid.join(", "))]
    UnsupportedClaimType {
        domain: String,
        claim_type: String,
        valid: Vec<String>,
    },

    #[error("no adapter for general, requires specific domain")]
    GeneralDomain,

    #[error("domain '{domain}' is deferred: requires {dependency}, which is not available in this runtime")]
    DeferredDomain {
        domain: String,
        dependency: &'static str,
    },

    #[error("no adapter registered for domain '{0}'")]
    UnregisteredDomain(String),

    #[error("claim result must be a JSON object, got {0}")]
    InvalidPayload(&'static str),

    #[error("adapter crashed: {0}")]
    AdapterCrash(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_enumerate_valid_values() {
        let err = VerifyError::UnsupportedClaimType {
            domain: "genomics".to_string(),
            claim_type: "folding".to_string(),
            valid: vec!["variant_annotation".to_string(), "gene_expression".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("folding"));
        assert!(msg.contains("variant_annotation, gene_expression"));
    }

    #[test]
    fn test_deferred_names_dependency() {
        let err = VerifyError::DeferredDomain {
            domain: "chemistry".to_string(),
            dependency: "rdkit",
        };
        assert!(err.to_string().contains("rdkit"));
    }
}
