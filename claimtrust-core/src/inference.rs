//! Domain and claim-type inference from field signatures
//!
//! Both classifiers are pure functions over the set of non-null fields in a
//! claim result. A candidate scores one point per signature field present;
//! it replaces the current best only with a strictly higher score, so ties
//! keep the earlier (more specific) candidate.

use serde_json::Value;

use crate::value::has_field;

/// Minimum matching fields before a domain is accepted
pub const DOMAIN_MATCH_THRESHOLD: usize = 2;

/// Minimum matching fields before a claim type is accepted
pub const CLAIM_TYPE_MATCH_THRESHOLD: usize = 1;

/// Signature fields of one claim type
#[derive(Debug, Clone, Copy)]
pub struct ClaimTypeSignature {
    pub claim_type: &'static str,
    pub fields: &'static [&'static str],
}

/// Signature fields of one domain and its claim types (specific first)
#[derive(Debug, Clone, Copy)]
pub struct DomainSignature {
    pub domain: &'static str,
    pub fields: &'static [&'static str],
    pub claim_types: &'static [ClaimTypeSignature],
}

pub static DOMAIN_SIGNATURES: &[DomainSignature] = &[
    DomainSignature {
        domain: "genomics",
        fields: &[
            "variant_id", "rsid", "hgvs", "consequence", "clinical_significance",
            "allele_frequency", "gwas_trait", "odds_ratio", "risk_allele",
            "log2_fold_change", "fold_change", "geo_accession",
        ],
        claim_types: &[
            ClaimTypeSignature {
                claim_type: "gwas_association",
                fields: &["gwas_trait", "odds_ratio", "risk_allele", "study_accession"],
            },
            ClaimTypeSignature {
                claim_type: "gene_expression",
                fields: &["log2_fold_change", "fold_change", "adjusted_p_value", "geo_accession"],
            },
            ClaimTypeSignature {
                claim_type: "variant_annotation",
                fields: &[
                    "variant_id", "rsid", "hgvs", "consequence",
                    "clinical_significance", "allele_frequency",
                ],
            },
        ],
    },
    DomainSignature {
        domain: "bioinformatics",
        fields: &[
            "dot_bracket", "rfam_family", "mfe", "e_value", "percent_identity",
            "identity", "query_coverage", "accession", "database",
        ],
        claim_types: &[
            ClaimTypeSignature {
                claim_type: "rna_structure",
                fields: &["dot_bracket", "rfam_family", "mfe", "rna_sequence"],
            },
            ClaimTypeSignature {
                claim_type: "sequence_analysis",
                fields: &[
                    "accession", "e_value", "percent_identity", "identity",
                    "query_coverage", "coverage", "database", "sequence",
                ],
            },
        ],
    },
    DomainSignature {
        domain: "computational_biology",
        fields: &[
            "plddt", "ptm", "tm_score", "binding_affinity", "ligand",
            "designed_sequence", "sequence_recovery", "ddg", "rmsd", "pdb_id",
            "secondary_structure",
        ],
        claim_types: &[
            ClaimTypeSignature {
                claim_type: "docking",
                fields: &["binding_affinity", "ligand", "pose_rmsd", "receptor_pdb"],
            },
            ClaimTypeSignature {
                claim_type: "protein_design",
                fields: &["designed_sequence", "sequence_recovery", "ddg", "template_accession"],
            },
            ClaimTypeSignature {
                claim_type: "structure_prediction",
                fields: &["plddt", "ptm", "tm_score", "rmsd", "pdb_id", "secondary_structure"],
            },
        ],
    },
    DomainSignature {
        domain: "immunoinformatics",
        fields: &[
            "hla_allele", "mhc_class", "ic50", "ic50_nm", "percentile_rank",
            "epitope_sequence", "antigen_accession", "allele", "peptide",
        ],
        claim_types: &[
            ClaimTypeSignature {
                claim_type: "bcell_epitope",
                fields: &["antigen_accession", "start_position", "end_position", "prediction_score"],
            },
            ClaimTypeSignature {
                claim_type: "epitope_prediction",
                fields: &["hla_allele", "allele", "mhc_class", "ic50", "ic50_nm", "percentile_rank"],
            },
        ],
    },
    DomainSignature {
        domain: "metabolomics",
        fields: &[
            "hmdb_id", "massbank_id", "mass_error_ppm", "cosine_score",
            "matched_peaks", "observed_mz", "precursor_mz", "adduct",
            "molecular_formula", "msi_level",
        ],
        claim_types: &[
            ClaimTypeSignature {
                claim_type: "spectral_match",
                fields: &["massbank_id", "cosine_score", "matched_peaks", "collision_energy"],
            },
            ClaimTypeSignature {
                claim_type: "compound_identification",
                fields: &[
                    "hmdb_id", "mass_error_ppm", "observed_mz", "molecular_formula",
                    "msi_level", "compound_name",
                ],
            },
        ],
    },
    DomainSignature {
        domain: "systems_biology",
        fields: &[
            "stoichiometry_matrix", "flux_vector", "kegg_pathway",
            "reactome_pathway", "pathway_id", "interactions", "edges",
            "network_density", "mean_degree", "enrichment_method", "overlap_count",
        ],
        claim_types: &[
            ClaimTypeSignature {
                claim_type: "flux_balance",
                fields: &["stoichiometry_matrix", "flux_vector", "flux_bounds", "objective_value"],
            },
            ClaimTypeSignature {
                claim_type: "network_analysis",
                fields: &["interactions", "edges", "num_nodes", "num_edges", "network_density", "mean_degree"],
            },
            ClaimTypeSignature {
                claim_type: "pathway_enrichment",
                fields: &[
                    "kegg_pathway", "reactome_pathway", "pathway_id",
                    "enrichment_method", "overlap_count", "pathway_size",
                ],
            },
        ],
    },
    DomainSignature {
        domain: "epidemiology",
        fields: &[
            "hazard_ratio", "r0", "serial_interval", "incubation_period",
            "case_fatality_rate", "prevalence", "gho_indicator", "incidence",
            "median_survival",
        ],
        claim_types: &[
            ClaimTypeSignature {
                claim_type: "survival_analysis",
                fields: &["hazard_ratio", "median_survival", "km_curve"],
            },
            ClaimTypeSignature {
                claim_type: "transmission_model",
                fields: &["r0", "serial_interval", "incubation_period", "case_fatality_rate", "compartment_model"],
            },
            ClaimTypeSignature {
                claim_type: "disease_prevalence",
                fields: &["prevalence", "gho_indicator", "incidence", "country"],
            },
        ],
    },
    DomainSignature {
        domain: "physics",
        fields: &[
            "energy_drift", "initial_energy", "final_energy", "cfl_number",
            "integrator", "timestep", "convergence_order", "residuals", "units",
            "equation", "dimensions", "constants",
        ],
        claim_types: &[
            ClaimTypeSignature {
                claim_type: "dimensional_analysis",
                fields: &["units", "equation", "dimensions", "constants"],
            },
            ClaimTypeSignature {
                claim_type: "numerical_simulation",
                fields: &[
                    "energy_drift", "initial_energy", "final_energy", "timestep",
                    "cfl_number", "integrator", "residuals", "convergence_order",
                ],
            },
        ],
    },
    DomainSignature {
        domain: "ml_ai",
        fields: &[
            "model_id", "benchmark", "metric_value", "parameter_count",
            "loss_curve", "learning_rate", "batch_size", "epochs", "splits",
            "dataset_id", "accuracy", "perplexity",
        ],
        claim_types: &[
            ClaimTypeSignature {
                claim_type: "training_run",
                fields: &["loss_curve", "learning_rate", "batch_size", "epochs", "gpu_hours"],
            },
            ClaimTypeSignature {
                claim_type: "dataset_validation",
                fields: &["splits", "num_rows", "dataset_license", "dataset_id"],
            },
            ClaimTypeSignature {
                claim_type: "benchmark_result",
                fields: &["model_id", "benchmark", "metric", "metric_value", "accuracy", "parameter_count"],
            },
        ],
    },
];

fn match_count(result: &Value, fields: &[&str]) -> usize {
    fields.iter().filter(|f| has_field(result, f)).count()
}

/// Pick the first candidate with the strictly highest count at or above
/// `threshold`
fn best_match<'a, T>(
    result: &Value,
    candidates: impl IntoIterator<Item = (T, &'a [&'a str])>,
    threshold: usize,
) -> Option<T> {
    let mut best: Option<(T, usize)> = None;
    for (candidate, fields) in candidates {
        let count = match_count(result, fields);
        if count < threshold {
            continue;
        }
        let better = best.as_ref().map_or(true, |(_, best_count)| count > *best_count);
        if better {
            best = Some((candidate, count));
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// Infer the domain of a claim result, `None` when no domain reaches the
/// threshold
pub fn infer_domain(result: &Value) -> Option<&'static str> {
    best_match(
        result,
        DOMAIN_SIGNATURES.iter().map(|d| (d.domain, d.fields)),
        DOMAIN_MATCH_THRESHOLD,
    )
}

/// Infer the claim type of a result already known to belong to `domain`
pub fn infer_claim_type(domain: &str, result: &Value) -> Option<&'static str> {
    let signature = domain_signature(domain)?;
    best_match(
        result,
        signature.claim_types.iter().map(|c| (c.claim_type, c.fields)),
        CLAIM_TYPE_MATCH_THRESHOLD,
    )
}

pub fn domain_signature(domain: &str) -> Option<&'static DomainSignature> {
    DOMAIN_SIGNATURES.iter().find(|d| d.domain == domain)
}

/// Claim types a domain knows how to infer, specific first
pub fn claim_types_for(domain: &str) -> Vec<&'static str> {
    domain_signature(domain)
        .map(|d| d.claim_types.iter().map(|c| c.claim_type).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_infer_genomics_from_two_fields() {
        let result = json!({"variant_id": "rs1", "consequence": "missense_variant"});
        assert_eq!(infer_domain(&result), Some("genomics"));
    }

    #[test]
    fn test_infer_empty_is_none() {
        assert_eq!(infer_domain(&json!({})), None);
        assert_eq!(infer_domain(&json!("not an object")), None);
    }

    #[test]
    fn test_single_field_below_threshold() {
        assert_eq!(infer_domain(&json!({"plddt": 91.2})), None);
    }

    #[test]
    fn test_null_fields_do_not_count() {
        let result = json!({"variant_id": "rs1", "consequence": null});
        assert_eq!(infer_domain(&result), None);
    }

    #[test]
    fn test_strictly_greater_wins() {
        let result = json!({"plddt": 90, "ptm": 0.8, "accession": "P69905", "e_value": 1e-30, "identity": 98});
        assert_eq!(infer_domain(&result), Some("bioinformatics"));
    }

    #[test]
    fn test_tie_keeps_earlier_domain() {
        // Two genomics fields and two computational_biology fields
        let result = json!({"rsid": "rs1", "hgvs": "x", "plddt": 90, "ptm": 0.8});
        assert_eq!(infer_domain(&result), Some("genomics"));
    }

    #[test]
    fn test_infer_claim_type_specific_first() {
        let gwas = json!({"rsid": "rs7903146", "gwas_trait": "type 2 diabetes", "odds_ratio": 1.4});
        assert_eq!(infer_claim_type("genomics", &gwas), Some("gwas_association"));

        let variant = json!({"rsid": "rs7903146"});
        assert_eq!(infer_claim_type("genomics", &variant), Some("variant_annotation"));

        assert_eq!(infer_claim_type("genomics", &json!({})), None);
        assert_eq!(infer_claim_type("astrology", &variant), None);
    }

    #[test]
    fn test_signature_domains_are_supported() {
        for signature in DOMAIN_SIGNATURES {
            assert!(crate::is_supported(signature.domain), "{}", signature.domain);
        }
    }
}
