//! Genomics Adapter
//!
//! Verifies variant annotations, GWAS associations and differential
//! expression claims against MyVariant.info, NCBI dbSNP, Ensembl (lookup,
//! variation and VEP), the EBI GWAS Catalog and GEO.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, info};
use urlencoding::encode;

use claimtrust_core::math::{jaccard_similarity, relative_difference};
use claimtrust_core::value::{first_num, first_str};
use claimtrust_core::{BadgePolicy, ClaimMetadata, ClaimTypeSpec, Scorecard, VerificationResult, VerifyError};
use claimtrust_net::{HttpClient, Lookup};

use crate::checks::{in_range, unavailable};
use crate::sources::{ensembl_lookup_id, ensembl_lookup_symbol, ncbi_esearch_count, ncbi_esummary};
use crate::traits::{resolve_claim_type, unhandled_claim_type, DomainAdapter};

const DOMAIN: &str = "genomics";

const MYVARIANT: &str = "https://myvariant.info/v1";
const ENSEMBL: &str = "https://rest.ensembl.org";
const GWAS_CATALOG: &str = "https://www.ebi.ac.uk/gwas/rest/api";

/// Genome-wide significance threshold
const GENOME_WIDE_P: f64 = 5e-8;
/// Suggestive association threshold
const SUGGESTIVE_P: f64 = 1e-5;
/// Relative tolerance for population allele frequencies
const FREQUENCY_TOLERANCE: f64 = 0.20;

pub static GENOMICS_CLAIM_TYPES: &[ClaimTypeSpec] = &[
    ClaimTypeSpec {
        name: "gwas_association",
        weights: &[
            ("variant_format", 0.15),
            ("catalog_association", 0.30),
            ("trait_match", 0.15),
            ("p_value", 0.20),
            ("effect_size", 0.20),
        ],
    },
    ClaimTypeSpec {
        name: "gene_expression",
        weights: &[
            ("gene_exists", 0.25),
            ("fold_change", 0.20),
            ("p_value", 0.20),
            ("multiple_testing", 0.15),
            ("sample_size", 0.10),
            ("dataset_accession", 0.10),
        ],
    },
    ClaimTypeSpec {
        name: "variant_annotation",
        weights: &[
            ("variant_exists", 0.25),
            ("consequence", 0.20),
            ("gene_match", 0.15),
            ("clinical_significance", 0.20),
            ("population_frequency", 0.20),
        ],
    },
];

static RSID_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^rs\d+$").unwrap());

static HGVS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:chr)?(?:[0-9]{1,2}|X|Y|MT?|NC_\d+\.\d+):g\.\d+(?:_\d+)?[ACGTN]*(?:>|del|ins|dup)[ACGTN]*$").unwrap()
});

static ENSEMBL_GENE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ENS[A-Z]*G\d{11}(?:\.\d+)?$").unwrap());

static GEO_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^G(?:SE|DS|SM|PL)\d+$").unwrap());

static ARRAYEXPRESS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^E-[A-Z]{4}-\d+$").unwrap());

/// Sequence Ontology consequence terms used by VEP
const SO_CONSEQUENCES: &[&str] = &[
    "transcript_ablation", "splice_acceptor_variant", "splice_donor_variant", "stop_gained",
    "frameshift_variant", "stop_lost", "start_lost", "transcript_amplification",
    "inframe_insertion", "inframe_deletion", "missense_variant", "protein_altering_variant",
    "splice_region_variant", "splice_polypyrimidine_tract_variant", "splice_donor_region_variant",
    "splice_donor_5th_base_variant", "incomplete_terminal_codon_variant", "start_retained_variant",
    "stop_retained_variant", "synonymous_variant", "coding_sequence_variant",
    "mature_mirna_variant", "5_prime_utr_variant", "3_prime_utr_variant",
    "non_coding_transcript_exon_variant", "intron_variant", "nmd_transcript_variant",
    "non_coding_transcript_variant", "upstream_gene_variant", "downstream_gene_variant",
    "tfbs_ablation", "tfbs_amplification", "tf_binding_site_variant",
    "regulatory_region_ablation", "regulatory_region_amplification", "feature_elongation",
    "regulatory_region_variant", "feature_truncation", "intergenic_variant",
];

/// ClinVar clinical significance vocabulary (normalized)
const CLINVAR_TERMS: &[&str] = &[
    "pathogenic", "likely_pathogenic", "uncertain_significance", "likely_benign", "benign",
    "conflicting_interpretations_of_pathogenicity", "drug_response", "risk_factor",
    "association", "protective", "affects", "not_provided",
];

fn normalize_term(term: &str) -> String {
    term.trim()
        .to_ascii_lowercase()
        .replace([' ', '-', '/'], "_")
}

/// Coarse pathogenicity direction: pathogenic (+1), benign (-1), other (0)
fn pathogenicity(term: &str) -> i8 {
    match term {
        "pathogenic" | "likely_pathogenic" => 1,
        "benign" | "likely_benign" => -1,
        _ => 0,
    }
}

/// Every string stored under `key` anywhere inside `value`
fn strings_under(value: &Value, key: &str, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                if k == key {
                    match v {
                        Value::String(s) => out.push(s.clone()),
                        Value::Array(items) => {
                            out.extend(items.iter().filter_map(|i| i.as_str().map(str::to_string)))
                        }
                        _ => strings_under(v, key, out),
                    }
                } else {
                    strings_under(v, key, out);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| strings_under(v, key, out)),
        _ => {}
    }
}

/// Where a variant was found
#[derive(Debug, Default)]
struct VariantEvidence {
    found_in: Option<&'static str>,
    myvariant: Option<Value>,
    unavailable: Vec<String>,
    absent: Vec<&'static str>,
}

/// Transcript consequences reported by VEP
#[derive(Debug, Default)]
struct VepAnnotation {
    consequences: Vec<String>,
    genes: Vec<String>,
}

/// Verifier for the genomics domain
pub struct GenomicsAdapter {
    http: HttpClient,
}

impl GenomicsAdapter {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// MyVariant record for an rsID (query) or HGVS id (direct)
    async fn myvariant_record(&self, variant: &str) -> Lookup<Value> {
        if RSID_REGEX.is_match(variant) {
            let url = format!(
                "{}/query?q=dbsnp.rsid:{}&fields=dbsnp,clinvar,gnomad_genome,gnomad_exome&size=1",
                MYVARIANT,
                encode(&variant.to_ascii_lowercase())
            );
            let body = self.http.get_json(&url).await?;
            Ok(body["hits"].as_array().and_then(|hits| hits.first()).cloned())
        } else {
            let url = format!("{}/variant/{}", MYVARIANT, encode(variant));
            self.http.lookup_json(&url).await
        }
    }

    /// MyVariant, then dbSNP, then Ensembl variation; stops at the first hit
    async fn find_variant(&self, variant: &str) -> VariantEvidence {
        let mut evidence = VariantEvidence::default();
        let is_rsid = RSID_REGEX.is_match(variant);

        match self.myvariant_record(variant).await {
            Ok(Some(record)) => {
                evidence.found_in = Some("myvariant");
                evidence.myvariant = Some(record);
                return evidence;
            }
            Ok(None) => evidence.absent.push("myvariant"),
            Err(e) => evidence.unavailable.push(format!("MyVariant: {}", e)),
        }

        if is_rsid {
            let numeric = &variant[2..];
            match ncbi_esummary(&self.http, "snp", numeric).await {
                Ok(Some(_)) => {
                    evidence.found_in = Some("dbsnp");
                    return evidence;
                }
                Ok(None) => evidence.absent.push("dbsnp"),
                Err(e) => evidence.unavailable.push(format!("dbSNP: {}", e)),
            }
        }

        let url = format!(
            "{}/variation/human/{}?content-type=application/json",
            ENSEMBL,
            encode(variant)
        );
        match self.http.lookup_json(&url).await {
            Ok(Some(_)) => evidence.found_in = Some("ensembl"),
            Ok(None) => evidence.absent.push("ensembl"),
            Err(e) => evidence.unavailable.push(format!("Ensembl variation: {}", e)),
        }
        evidence
    }

    async fn vep(&self, variant: &str) -> Lookup<VepAnnotation> {
        let kind = if RSID_REGEX.is_match(variant) { "id" } else { "hgvs" };
        let url = format!(
            "{}/vep/human/{}/{}?content-type=application/json",
            ENSEMBL,
            kind,
            encode(variant)
        );
        let Some(body) = self.http.lookup_json(&url).await? else {
            return Ok(None);
        };
        let mut annotation = VepAnnotation::default();
        strings_under(&body, "most_severe_consequence", &mut annotation.consequences);
        strings_under(&body, "consequence_terms", &mut annotation.consequences);
        strings_under(&body, "gene_symbol", &mut annotation.genes);
        annotation.consequences = annotation.consequences.iter().map(|c| normalize_term(c)).collect();
        annotation.consequences.sort();
        annotation.consequences.dedup();
        annotation.genes.sort();
        annotation.genes.dedup();
        Ok(Some(annotation))
    }

    async fn variant_annotation(&self, claim: &Value, card: &mut Scorecard) {
        let Some(variant) = first_str(claim, &["rsid", "variant_id", "hgvs"]) else {
            return;
        };
        if !RSID_REGEX.is_match(&variant) && !HGVS_REGEX.is_match(&variant) {
            card.reject(
                "variant_exists",
                format!("variant id '{}' is neither an rsID nor a genomic HGVS expression", variant),
            );
            return;
        }

        let evidence = self.find_variant(&variant).await;
        match (evidence.found_in, evidence.unavailable.is_empty()) {
            (Some(source), _) => card.score("variant_exists", 1.0, json!({ "variant": variant, "source": source })),
            (None, true) => card.reject(
                "variant_exists",
                format!("variant {} not found in {}", variant, evidence.absent.join(", ")),
            ),
            (None, false) => card.neutral(
                "variant_exists",
                format!("variant lookup unavailable ({}); variant_exists scored neutral", evidence.unavailable.join("; ")),
            ),
        }

        let claimed_consequence = first_str(claim, &["consequence", "variant_consequence"]).map(|c| normalize_term(&c));
        let claimed_gene = first_str(claim, &["gene", "gene_symbol"]);
        let vep = if claimed_consequence.is_some() || claimed_gene.is_some() {
            Some(self.vep(&variant).await)
        } else {
            None
        };

        let mut genes: Vec<String> = Vec::new();
        if let Some(Ok(Some(annotation))) = &vep {
            genes.extend(annotation.genes.iter().cloned());
        }
        if let Some(record) = &evidence.myvariant {
            if let Some(dbsnp) = record.get("dbsnp") {
                strings_under(dbsnp, "symbol", &mut genes);
            }
        }

        if let Some(consequence) = claimed_consequence {
            self.score_consequence(card, &consequence, vep.as_ref());
        }

        if let Some(gene) = claimed_gene {
            if genes.is_empty() {
                card.neutral("gene_match", "no gene annotation available for the variant; gene_match scored neutral");
            } else if genes.iter().any(|g| g.eq_ignore_ascii_case(&gene)) {
                card.score("gene_match", 1.0, json!({ "claimed": gene, "annotated": genes }));
            } else {
                card.reject(
                    "gene_match",
                    format!("gene {} is not among genes annotated for {}: {}", gene, variant, genes.join(", ")),
                );
            }
        }

        if let Some(significance) = first_str(claim, &["clinical_significance", "clinvar_significance"]) {
            self.score_clinical_significance(card, &significance, &evidence);
        }

        if let Some(frequency) = first_num(claim, &["allele_frequency", "population_frequency", "maf"]) {
            self.score_population_frequency(card, frequency, &evidence);
        }
    }

    fn score_consequence(&self, card: &mut Scorecard, claimed: &str, vep: Option<&Lookup<VepAnnotation>>) {
        if !SO_CONSEQUENCES.contains(&claimed) {
            card.reject(
                "consequence",
                format!("consequence '{}' is not a Sequence Ontology consequence term", claimed),
            );
            return;
        }
        match vep {
            Some(Ok(Some(annotation))) if annotation.consequences.iter().any(|c| c == claimed) => {
                card.score("consequence", 1.0, json!({ "claimed": claimed, "vep": annotation.consequences }))
            }
            Some(Ok(Some(annotation))) => card.score_with_warning(
                "consequence",
                0.2,
                json!({ "claimed": claimed, "vep": annotation.consequences }),
                format!("VEP does not report '{}' (reports: {})", claimed, annotation.consequences.join(", ")),
            ),
            Some(Ok(None)) => card.reject("consequence", "VEP has no annotation for the variant"),
            Some(Err(e)) => unavailable(card, "consequence", "Ensembl VEP", e),
            None => {}
        }
    }

    fn score_clinical_significance(&self, card: &mut Scorecard, claimed: &str, evidence: &VariantEvidence) {
        let claimed = normalize_term(claimed);
        if !CLINVAR_TERMS.contains(&claimed.as_str()) {
            card.reject(
                "clinical_significance",
                format!("clinical significance '{}' is not a ClinVar term", claimed),
            );
            return;
        }
        let Some(record) = &evidence.myvariant else {
            card.neutral(
                "clinical_significance",
                "no MyVariant record to compare ClinVar significance; clinical_significance scored neutral",
            );
            return;
        };
        let mut reported = Vec::new();
        if let Some(clinvar) = record.get("clinvar") {
            strings_under(clinvar, "clinical_significance", &mut reported);
        }
        let reported: Vec<String> = reported.iter().map(|r| normalize_term(r)).collect();
        if reported.is_empty() {
            card.neutral("clinical_significance", "ClinVar has no assertion for the variant");
        } else if reported.contains(&claimed) {
            card.score("clinical_significance", 1.0, json!({ "claimed": claimed, "clinvar": reported }));
        } else if pathogenicity(&claimed) != 0
            && reported.iter().any(|r| pathogenicity(r) == pathogenicity(&claimed))
        {
            card.score_with_warning(
                "clinical_significance",
                0.6,
                json!({ "claimed": claimed, "clinvar": reported }),
                format!("ClinVar reports {} rather than {}", reported.join(", "), claimed),
            );
        } else {
            card.reject(
                "clinical_significance",
                format!("claimed {} contradicts ClinVar ({})", claimed, reported.join(", ")),
            );
        }
    }

    fn score_population_frequency(&self, card: &mut Scorecard, claimed: f64, evidence: &VariantEvidence) {
        let Some(claimed) = in_range(card, "population_frequency", "allele frequency", claimed, 0.0, 1.0) else {
            return;
        };
        let reference = evidence.myvariant.as_ref().and_then(|record| {
            ["gnomad_genome", "gnomad_exome"]
                .iter()
                .find_map(|source| record[*source]["af"]["af"].as_f64())
        });
        let Some(reference) = reference else {
            card.neutral("population_frequency", "no gnomAD frequency available; population_frequency scored neutral");
            return;
        };
        let detail = json!({ "claimed": claimed, "gnomad": reference });
        let difference = relative_difference(claimed, reference).unwrap_or(if claimed == 0.0 { 0.0 } else { 1.0 });
        if difference <= FREQUENCY_TOLERANCE {
            card.score("population_frequency", 1.0, detail);
        } else if difference <= 2.0 * FREQUENCY_TOLERANCE {
            card.score_with_warning(
                "population_frequency",
                0.5,
                detail,
                format!("allele frequency {} differs from gnomAD {} by {:.0}%", claimed, reference, difference * 100.0),
            );
        } else {
            card.reject(
                "population_frequency",
                format!("allele frequency {} disagrees with gnomAD {}", claimed, reference),
            );
        }
    }

    async fn gwas_association(&self, claim: &Value, card: &mut Scorecard) {
        let rsid = first_str(claim, &["rsid", "variant_id", "snp"]);
        let mut catalog_traits: Vec<String> = Vec::new();

        if let Some(rsid) = &rsid {
            if RSID_REGEX.is_match(rsid) {
                card.score("variant_format", 1.0, json!({ "rsid": rsid }));
                let url = format!(
                    "{}/singleNucleotidePolymorphisms/{}/associations",
                    GWAS_CATALOG,
                    encode(&rsid.to_ascii_lowercase())
                );
                match self.http.lookup_json(&url).await {
                    Ok(Some(body)) => {
                        let count = body["_embedded"]["associations"].as_array().map_or(0, Vec::len);
                        if count == 0 {
                            card.reject("catalog_association", format!("GWAS Catalog lists no associations for {}", rsid));
                        } else {
                            strings_under(&body, "trait", &mut catalog_traits);
                            card.score(
                                "catalog_association",
                                1.0,
                                json!({ "associations": count, "traits": catalog_traits }),
                            );
                        }
                    }
                    Ok(None) => card.reject("catalog_association", format!("{} is not in the GWAS Catalog", rsid)),
                    Err(e) => unavailable(card, "catalog_association", "GWAS Catalog", &e),
                }
            } else {
                card.reject("variant_format", format!("'{}' is not a valid rsID", rsid));
            }
        }

        if let Some(claimed_trait) = first_str(claim, &["gwas_trait", "trait", "phenotype"]) {
            if catalog_traits.is_empty() {
                card.neutral("trait_match", "no GWAS Catalog traits to compare; trait_match scored neutral");
            } else {
                let best = catalog_traits
                    .iter()
                    .map(|t| jaccard_similarity(&claimed_trait, t))
                    .fold(0.0, f64::max);
                let detail = json!({ "claimed": claimed_trait, "similarity": best });
                if best >= 0.5 {
                    card.score("trait_match", 1.0, detail);
                } else if best >= 0.2 {
                    card.score_with_warning("trait_match", 0.6, detail, "claimed trait only partially matches GWAS Catalog traits");
                } else {
                    card.score_with_warning("trait_match", 0.1, detail, "claimed trait does not match any GWAS Catalog trait");
                }
            }
        }

        if let Some(p) = first_num(claim, &["p_value", "pvalue"]) {
            if let Some(p) = in_range(card, "p_value", "p-value", p, 0.0, 1.0) {
                if p <= GENOME_WIDE_P {
                    card.score("p_value", 1.0, json!({ "p_value": p, "level": "genome_wide" }));
                } else if p <= SUGGESTIVE_P {
                    card.score_with_warning(
                        "p_value",
                        0.6,
                        json!({ "p_value": p, "level": "suggestive" }),
                        format!("p = {} is suggestive, not genome-wide significant (5e-8)", p),
                    );
                } else {
                    card.reject("p_value", format!("p = {} does not reach suggestive significance (1e-5)", p));
                }
            }
        }

        if let Some(odds_ratio) = first_num(claim, &["odds_ratio", "or"]) {
            if odds_ratio <= 0.0 {
                card.reject("effect_size", format!("odds ratio {} must be positive", odds_ratio));
            } else if odds_ratio > 10.0 {
                card.score_with_warning(
                    "effect_size",
                    0.3,
                    json!({ "odds_ratio": odds_ratio }),
                    format!("odds ratio {} is implausibly large for a GWAS association", odds_ratio),
                );
            } else {
                card.score("effect_size", 1.0, json!({ "odds_ratio": odds_ratio }));
            }
        } else if let Some(beta) = first_num(claim, &["beta", "effect_size"]) {
            card.score("effect_size", 1.0, json!({ "beta": beta }));
        }
    }

    async fn gene_exists(&self, gene: &str, species: &str) -> Lookup<Value> {
        if ENSEMBL_GENE_REGEX.is_match(gene) {
            ensembl_lookup_id(&self.http, gene).await
        } else {
            ensembl_lookup_symbol(&self.http, species, gene).await
        }
    }

    async fn gene_expression(&self, claim: &Value, card: &mut Scorecard) {
        if let Some(gene) = first_str(claim, &["gene", "gene_symbol", "gene_id"]) {
            let species = first_str(claim, &["species", "organism"])
                .map(|s| s.to_ascii_lowercase().replace(' ', "_"))
                .unwrap_or_else(|| "homo_sapiens".to_string());
            match self.gene_exists(&gene, &species).await {
                Ok(Some(record)) => card.score(
                    "gene_exists",
                    1.0,
                    json!({ "gene": gene, "ensembl_id": record.get("id").cloned().unwrap_or(Value::Null) }),
                ),
                Ok(None) => card.reject("gene_exists", format!("gene {} not found in Ensembl ({})", gene, species)),
                Err(e) => unavailable(card, "gene_exists", "Ensembl", &e),
            }
        }

        let log2fc = match (
            first_num(claim, &["log2_fold_change", "log2fc", "logfc"]),
            first_num(claim, &["fold_change"]),
        ) {
            (Some(l), _) => Some(l),
            (None, Some(fc)) if fc > 0.0 => Some(fc.log2()),
            (None, Some(fc)) => {
                card.reject("fold_change", format!("linear fold change {} must be positive", fc));
                None
            }
            (None, None) => None,
        };
        if let Some(log2fc) = log2fc {
            self.score_fold_change(claim, card, log2fc);
        }

        let raw_p = first_num(claim, &["p_value", "pvalue"]);
        if let Some(p) = raw_p {
            if let Some(p) = in_range(card, "p_value", "p-value", p, 0.0, 1.0) {
                if p <= 0.05 {
                    card.score("p_value", 1.0, json!({ "p_value": p }));
                } else {
                    card.score_with_warning("p_value", 0.3, json!({ "p_value": p }), format!("p = {} is not significant at 0.05", p));
                }
            }
        }

        match first_num(claim, &["adjusted_p_value", "padj", "fdr", "q_value"]) {
            Some(adjusted) => {
                if let Some(adjusted) = in_range(card, "multiple_testing", "adjusted p-value", adjusted, 0.0, 1.0) {
                    match raw_p {
                        Some(p) if adjusted + 1e-12 < p => card.reject(
                            "multiple_testing",
                            format!("adjusted p {} is smaller than raw p {}", adjusted, p),
                        ),
                        _ => card.score("multiple_testing", 1.0, json!({ "adjusted_p_value": adjusted })),
                    }
                }
            }
            None if raw_p.is_some() => card.neutral("multiple_testing", "no multiple-testing correction reported"),
            None => {}
        }

        if let Some(n) = first_num(claim, &["sample_size", "n", "replicates"]) {
            if n.fract() != 0.0 || n < 2.0 {
                card.reject("sample_size", format!("sample size {} cannot support a differential test", n));
            } else if n < 6.0 {
                card.score_with_warning(
                    "sample_size",
                    0.5,
                    json!({ "sample_size": n }),
                    format!("sample size {} leaves fewer than three replicates per group", n),
                );
            } else {
                card.score("sample_size", 1.0, json!({ "sample_size": n }));
            }
        }

        if let Some(accession) = first_str(claim, &["geo_accession", "dataset_accession"]) {
            self.score_dataset_accession(card, &accession).await;
        }
    }

    fn score_fold_change(&self, claim: &Value, card: &mut Scorecard, log2fc: f64) {
        if log2fc.abs() > 20.0 {
            card.reject("fold_change", format!("|log2 fold change| {} exceeds 20", log2fc.abs()));
            return;
        }
        let direction = first_str(claim, &["direction", "regulation"]).map(|d| d.to_ascii_lowercase());
        let claimed_up = direction.as_deref().and_then(|d| {
            if d.starts_with("up") || d.starts_with("increase") {
                Some(true)
            } else if d.starts_with("down") || d.starts_with("decrease") {
                Some(false)
            } else {
                None
            }
        });
        let detail = json!({ "log2_fold_change": log2fc, "direction": direction });
        match claimed_up {
            Some(_) if log2fc == 0.0 => {
                card.score_with_warning("fold_change", 0.5, detail, "direction claimed for a zero fold change")
            }
            Some(up) if up != (log2fc > 0.0) => card.reject(
                "fold_change",
                format!("claimed direction contradicts log2 fold change {}", log2fc),
            ),
            _ => card.score("fold_change", 1.0, detail),
        }
    }

    async fn score_dataset_accession(&self, card: &mut Scorecard, accession: &str) {
        let accession = accession.to_ascii_uppercase();
        if GEO_REGEX.is_match(&accession) {
            let term = format!("{}[ACCN]", accession);
            match ncbi_esearch_count(&self.http, "gds", &term).await {
                Ok(0) => card.reject("dataset_accession", format!("GEO has no record for {}", accession)),
                Ok(count) => card.score("dataset_accession", 1.0, json!({ "accession": accession, "geo_records": count })),
                Err(e) => unavailable(card, "dataset_accession", "NCBI GEO", &e),
            }
        } else if ARRAYEXPRESS_REGEX.is_match(&accession) {
            card.score(
                "dataset_accession",
                0.8,
                json!({ "accession": accession, "archive": "arrayexpress", "verified": false }),
            );
        } else {
            card.reject(
                "dataset_accession",
                format!("'{}' is not a GEO or ArrayExpress accession", accession),
            );
        }
    }
}

#[async_trait]
impl DomainAdapter for GenomicsAdapter {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn claim_types(&self) -> &'static [ClaimTypeSpec] {
        GENOMICS_CLAIM_TYPES
    }

    async fn verify(&self, claim: &Value, metadata: &ClaimMetadata) -> Result<VerificationResult, VerifyError> {
        let started = Instant::now();
        let (spec, inferred) = resolve_claim_type(DOMAIN, GENOMICS_CLAIM_TYPES, claim, metadata)?;
        info!("Verifying {} claim ({})", DOMAIN, spec.name);

        let mut card = Scorecard::new(spec);
        if let Some(warning) = inferred {
            card.warn(warning);
        }
        match spec.name {
            "gwas_association" => self.gwas_association(claim, &mut card).await,
            "gene_expression" => self.gene_expression(claim, &mut card).await,
            "variant_annotation" => self.variant_annotation(claim, &mut card).await,
            _ => return Err(unhandled_claim_type(DOMAIN, spec, GENOMICS_CLAIM_TYPES)),
        }

        debug!("{} {} total {}", DOMAIN, spec.name, card.total());
        Ok(card.finish(DOMAIN, &BadgePolicy::default(), started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimtrust_core::claim_types_for;
    use claimtrust_net::{StubFetcher, StubReply};
    use std::sync::Arc;

    fn adapter(stub: StubFetcher) -> (GenomicsAdapter, Arc<StubFetcher>) {
        let stub = Arc::new(stub);
        (GenomicsAdapter::new(HttpClient::new(stub.clone())), stub)
    }

    fn meta(claim_type: &str) -> ClaimMetadata {
        ClaimMetadata::new(DOMAIN).with_claim_type(claim_type)
    }

    #[test]
    fn test_weights_sum_to_one() {
        for spec in GENOMICS_CLAIM_TYPES {
            assert!((spec.weight_sum() - 1.0).abs() < 1e-9, "{}", spec.name);
        }
    }

    #[test]
    fn test_claim_types_match_inference_table() {
        let mut inferred = claim_types_for(DOMAIN);
        let mut names: Vec<&str> = GENOMICS_CLAIM_TYPES.iter().map(|s| s.name).collect();
        inferred.sort();
        names.sort();
        assert_eq!(inferred, names);
    }

    #[tokio::test]
    async fn test_all_absent_is_neutral() {
        let (adapter, stub) = adapter(StubFetcher::offline());
        for spec in GENOMICS_CLAIM_TYPES {
            let result = adapter.verify(&json!({}), &meta(spec.name)).await.unwrap();
            assert_eq!(result.score, 0.5, "{}", spec.name);
        }
        assert!(stub.requests().is_empty());
    }

    #[tokio::test]
    async fn test_variant_falls_back_to_dbsnp() {
        let (adapter, stub) = adapter(
            StubFetcher::new()
                .route("myvariant.info", StubReply::json(json!({"total": 0, "hits": []})))
                .route("esummary.fcgi", StubReply::json(json!({"result": {"uids": ["429358"], "429358": {"snp_id": 429358}}}))),
        );
        let claim = json!({"rsid": "rs429358"});
        let result = adapter.verify(&claim, &meta("variant_annotation")).await.unwrap();
        assert_eq!(result.details["variant_exists"]["source"], "dbsnp");
        assert_eq!(result.details["component_scores"]["variant_exists"], 1.0);
        assert!(stub.requests().iter().all(|u| !u.contains("/variation/")));
    }

    #[tokio::test]
    async fn test_variant_annotation_scored_against_myvariant() {
        let hit = json!({"hits": [{
            "_id": "chr19:g.44908684T>C",
            "dbsnp": {"rsid": "rs429358", "gene": {"symbol": "APOE"}},
            "clinvar": {"rcv": [{"clinical_significance": "Pathogenic"}, {"clinical_significance": "risk factor"}]},
            "gnomad_genome": {"af": {"af": 0.15}}
        }]});
        let vep = json!([{
            "most_severe_consequence": "missense_variant",
            "transcript_consequences": [{"gene_symbol": "APOE", "consequence_terms": ["missense_variant"]}]
        }]);
        let (adapter, _) = adapter(
            StubFetcher::new()
                .route("myvariant.info", StubReply::json(hit))
                .route("/vep/human/id/rs429358", StubReply::json(vep)),
        );
        let claim = json!({
            "rsid": "rs429358",
            "consequence": "missense_variant",
            "gene": "APOE",
            "clinical_significance": "pathogenic",
            "allele_frequency": 0.16
        });
        let result = adapter.verify(&claim, &meta("variant_annotation")).await.unwrap();
        assert_eq!(result.score, 1.0);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_consequence_rejected() {
        let (adapter, _) = adapter(StubFetcher::offline());
        let claim = json!({"rsid": "rs1", "consequence": "very_bad_variant"});
        let result = adapter.verify(&claim, &meta("variant_annotation")).await.unwrap();
        assert_eq!(result.details["component_scores"]["consequence"], 0.0);
        assert_eq!(result.details["component_scores"]["variant_exists"], 0.5);
    }

    #[tokio::test]
    async fn test_gwas_thresholds() {
        let (adapter, _) = adapter(StubFetcher::new().route(
            "singleNucleotidePolymorphisms/rs7903146",
            StubReply::json(json!({"_embedded": {"associations": [
                {"pvalue": 1e-30, "efoTraits": [{"trait": "type 2 diabetes mellitus"}]}
            ]}})),
        ));
        let claim = json!({
            "rsid": "rs7903146",
            "gwas_trait": "type 2 diabetes",
            "p_value": 3e-6,
            "odds_ratio": 1.4
        });
        let result = adapter.verify(&claim, &meta("gwas_association")).await.unwrap();
        let scores = &result.details["component_scores"];
        assert_eq!(scores["catalog_association"], 1.0);
        assert_eq!(scores["p_value"], 0.6);
        assert_eq!(scores["trait_match"], 1.0);
        assert!(result.warnings.iter().any(|w| w.contains("suggestive")));
    }

    #[tokio::test]
    async fn test_expression_direction_and_adjustment() {
        let (adapter, _) = adapter(StubFetcher::offline());
        let claim = json!({
            "log2_fold_change": -2.5,
            "direction": "upregulated",
            "p_value": 0.01,
            "adjusted_p_value": 0.001,
            "geo_accession": "E-MTAB-1234"
        });
        let result = adapter.verify(&claim, &meta("gene_expression")).await.unwrap();
        let scores = &result.details["component_scores"];
        assert_eq!(scores["fold_change"], 0.0);
        assert_eq!(scores["multiple_testing"], 0.0);
        assert_eq!(scores["dataset_accession"], 0.8);
    }

    #[tokio::test]
    async fn test_missing_adjusted_p_is_neutral() {
        let (adapter, _) = adapter(StubFetcher::offline());
        let claim = json!({"p_value": 0.01});
        let result = adapter.verify(&claim, &meta("gene_expression")).await.unwrap();
        assert_eq!(result.details["component_scores"]["multiple_testing"], 0.5);
        assert!(result.warnings.iter().any(|w| w == "no multiple-testing correction reported"));
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_inferred_claim_type_echoed() {
        let (adapter, _) = adapter(StubFetcher::offline());
        let claim = json!({"variant_id": "rs1", "consequence": "missense_variant"});
        let result = adapter.verify(&claim, &ClaimMetadata::new(DOMAIN)).await.unwrap();
        assert_eq!(result.details["claim_type"], "variant_annotation");
        assert!(result.warnings[0].contains("inferred as 'variant_annotation'"));
    }
}
