//! Common traits for domain adapters

use async_trait::async_trait;
use serde_json::Value;

use claimtrust_core::value::{str_field, type_name};
use claimtrust_core::{infer_claim_type, ClaimMetadata, ClaimTypeSpec, VerificationResult, VerifyError};

/// Verifier for one scientific domain
#[async_trait]
pub trait DomainAdapter: Send + Sync {
    /// Domain name this adapter is registered under
    fn domain(&self) -> &'static str;

    /// Claim types and their component weights
    fn claim_types(&self) -> &'static [ClaimTypeSpec];

    /// Score a claim result. Component-level problems are recorded in the
    /// result; `Err` is reserved for claims that cannot be scored at all.
    async fn verify(
        &self,
        claim: &Value,
        metadata: &ClaimMetadata,
    ) -> Result<VerificationResult, VerifyError>;
}

fn valid_names(specs: &[ClaimTypeSpec]) -> Vec<String> {
    specs.iter().map(|s| s.name.to_string()).collect()
}

/// Resolve the claim type from metadata, the claim itself, or inference.
///
/// Returns the matching spec and, when inferred, a warning echoing the
/// inferred value back to the caller.
pub fn resolve_claim_type(
    domain: &str,
    specs: &'static [ClaimTypeSpec],
    claim: &Value,
    metadata: &ClaimMetadata,
) -> Result<(&'static ClaimTypeSpec, Option<String>), VerifyError> {
    if !claim.is_object() {
        return Err(VerifyError::InvalidPayload(type_name(claim)));
    }

    let explicit = metadata
        .explicit_claim_type()
        .map(str::to_string)
        .or_else(|| str_field(claim, "claim_type"));

    if let Some(claim_type) = explicit {
        return specs
            .iter()
            .find(|s| s.name == claim_type)
            .map(|s| (s, None))
            .ok_or_else(|| VerifyError::UnsupportedClaimType {
                domain: domain.to_string(),
                claim_type,
                valid: valid_names(specs),
            });
    }

    infer_claim_type(domain, claim)
        .and_then(|inferred| specs.iter().find(|s| s.name == inferred))
        .map(|s| {
            let warning = format!("claim_type not provided — inferred as '{}'", s.name);
            (s, Some(warning))
        })
        .ok_or_else(|| VerifyError::MissingClassification {
            kind: "claim_type",
            valid: valid_names(specs),
        })
}

/// Error for a resolved spec the adapter has no verifier for
pub fn unhandled_claim_type(domain: &str, spec: &ClaimTypeSpec, specs: &[ClaimTypeSpec]) -> VerifyError {
    VerifyError::UnsupportedClaimType {
        domain: domain.to_string(),
        claim_type: spec.name.to_string(),
        valid: valid_names(specs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static SPECS: &[ClaimTypeSpec] = &[
        ClaimTypeSpec {
            name: "gwas_association",
            weights: &[("a", 1.0)],
        },
        ClaimTypeSpec {
            name: "variant_annotation",
            weights: &[("a", 1.0)],
        },
    ];

    #[test]
    fn test_explicit_metadata_wins() {
        let meta = ClaimMetadata::new("genomics").with_claim_type("variant_annotation");
        let (spec, warning) = resolve_claim_type("genomics", SPECS, &json!({"odds_ratio": 2}), &meta).unwrap();
        assert_eq!(spec.name, "variant_annotation");
        assert!(warning.is_none());
    }

    #[test]
    fn test_claim_type_field_in_result() {
        let meta = ClaimMetadata::new("genomics");
        let claim = json!({"claim_type": "gwas_association"});
        let (spec, _) = resolve_claim_type("genomics", SPECS, &claim, &meta).unwrap();
        assert_eq!(spec.name, "gwas_association");
    }

    #[test]
    fn test_inferred_claim_type_warns() {
        let meta = ClaimMetadata::new("genomics");
        let claim = json!({"rsid": "rs1", "consequence": "missense_variant"});
        let (spec, warning) = resolve_claim_type("genomics", SPECS, &claim, &meta).unwrap();
        assert_eq!(spec.name, "variant_annotation");
        assert!(warning.unwrap().contains("inferred as 'variant_annotation'"));
    }

    #[test]
    fn test_unknown_claim_type_enumerates_valid() {
        let meta = ClaimMetadata::new("genomics").with_claim_type("folding");
        let err = resolve_claim_type("genomics", SPECS, &json!({}), &meta).unwrap_err();
        assert!(err.to_string().contains("gwas_association, variant_annotation"));
    }

    #[test]
    fn test_uninferable_is_missing_classification() {
        let meta = ClaimMetadata::new("genomics");
        let err = resolve_claim_type("genomics", SPECS, &json!({"x": 1}), &meta).unwrap_err();
        assert!(matches!(err, VerifyError::MissingClassification { kind: "claim_type", .. }));
    }

    #[test]
    fn test_non_object_payload() {
        let meta = ClaimMetadata::new("genomics");
        let err = resolve_claim_type("genomics", SPECS, &json!([1, 2]), &meta).unwrap_err();
        assert_eq!(err, VerifyError::InvalidPayload("array"));
    }
}
