//! Immunoinformatics Adapter
//!
//! T-cell (MHC binding) and B-cell epitope claims. MHC class I binding is
//! re-predicted with the IEDB tools API; B-cell epitopes are located in
//! their UniProt antigen.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, info};

use claimtrust_core::value::{bool_field, first_num, first_str};
use claimtrust_core::{BadgePolicy, ClaimMetadata, ClaimTypeSpec, Scorecard, VerificationResult, VerifyError};
use claimtrust_net::{FetchError, HttpClient};

use crate::checks::{check_sequence, in_range, score_reference, unavailable, Alphabet};
use crate::sources::uniprot_entry;
use crate::traits::{resolve_claim_type, unhandled_claim_type, DomainAdapter};

const DOMAIN: &str = "immunoinformatics";

const IEDB_MHCI: &str = "https://tools-cluster-interface.iedb.org/tools_api/mhci/";

/// IC50 (nM) at or below which a peptide is a binder
const BINDER_IC50_NM: f64 = 500.0;
/// Percentile rank at or below which a peptide is a binder
const BINDER_PERCENTILE: f64 = 2.0;
/// Upper bound of measurable IC50 values (nM)
const MAX_IC50_NM: f64 = 100_000.0;

pub static IMMUNO_CLAIM_TYPES: &[ClaimTypeSpec] = &[
    ClaimTypeSpec {
        name: "bcell_epitope",
        weights: &[
            ("peptide_validity", 0.20),
            ("peptide_length", 0.15),
            ("antigen_reference", 0.25),
            ("method", 0.15),
            ("score_range", 0.25),
        ],
    },
    ClaimTypeSpec {
        name: "epitope_prediction",
        weights: &[
            ("peptide_validity", 0.20),
            ("peptide_length", 0.15),
            ("allele_format", 0.15),
            ("iedb_prediction", 0.30),
            ("ic50_range", 0.20),
        ],
    },
];

static HLA_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^HLA-(?:[ABCEFG]|D[PQR][AB]\d?)\*\d{2,3}:\d{2,3}(?::\d{2,3}){0,2}[NLSCAQ]?$").unwrap()
});

static MOUSE_MHC_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^H-?2-[KDLI][a-z]+$").unwrap());

static LOOSE_HLA_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:HLA-?)?(?:[ABC]|D[PQR][AB]\d?)\*?\d{2,3}:?\d{2,3}$").unwrap());

const BCELL_METHODS: &[&str] = &[
    "bepipred3", "bepipred2", "bepipred", "discotope3", "discotope", "ellipro", "abcpred", "lbtope",
    "emini", "kolaskartongaonkar", "parker", "choufasman", "karplusschulz", "svmtrip", "epitopia", "seppa",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MhcClass {
    I,
    II,
}

fn mhc_class(claim: &Value, allele: Option<&str>) -> MhcClass {
    if let Some(class) = first_str(claim, &["mhc_class"]) {
        match class.trim().to_ascii_uppercase().trim_start_matches("MHC-").trim_start_matches("MHC") {
            "II" | "2" => return MhcClass::II,
            "I" | "1" => return MhcClass::I,
            _ => {}
        }
    }
    match allele {
        Some(a) if a.to_ascii_uppercase().starts_with("HLA-D") || a.contains("-I") => MhcClass::II,
        _ => MhcClass::I,
    }
}

/// Predicted binding for one peptide from an IEDB TSV response
#[derive(Debug, Clone, PartialEq)]
pub struct IedbPrediction {
    pub percentile_rank: Option<f64>,
    pub ic50: Option<f64>,
}

impl IedbPrediction {
    fn is_binder(&self) -> Option<bool> {
        self.percentile_rank
            .map(|r| r <= BINDER_PERCENTILE)
            .or_else(|| self.ic50.map(|ic50| ic50 <= BINDER_IC50_NM))
    }
}

/// Row for `peptide` in an IEDB tab-separated prediction table
pub fn parse_iedb_table(body: &str, peptide: &str) -> Option<IedbPrediction> {
    let mut lines = body.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<String> = lines.next()?.split('\t').map(|h| h.trim().to_ascii_lowercase()).collect();
    let column = |names: &[&str]| header.iter().position(|h| names.contains(&h.as_str()));
    let peptide_col = column(&["peptide"])?;
    let rank_col = column(&["percentile_rank", "rank", "netmhcpan_el_percentile", "netmhcpan_ba_percentile"]);
    let ic50_col = column(&["ic50", "netmhcpan_ic50", "ann_ic50", "smm_ic50"]);

    lines
        .map(|line| line.split('\t').map(str::trim).collect::<Vec<_>>())
        .find(|cells| cells.get(peptide_col).is_some_and(|p| p.eq_ignore_ascii_case(peptide)))
        .map(|cells| {
            let number = |col: Option<usize>| col.and_then(|c| cells.get(c)).and_then(|v| v.parse::<f64>().ok());
            IedbPrediction {
                percentile_rank: number(rank_col),
                ic50: number(ic50_col),
            }
        })
}

/// Verifier for the immunoinformatics domain
pub struct ImmunoAdapter {
    http: HttpClient,
}

impl ImmunoAdapter {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    async fn predict_mhci(&self, peptide: &str, allele: &str) -> Result<Option<IedbPrediction>, FetchError> {
        let fields = vec![
            ("method".to_string(), "recommended".to_string()),
            ("sequence_text".to_string(), peptide.to_string()),
            ("allele".to_string(), allele.to_string()),
            ("length".to_string(), peptide.len().to_string()),
        ];
        let body = self.http.post_form_text(IEDB_MHCI, fields).await?;
        Ok(parse_iedb_table(&body, peptide))
    }

    fn peptide(&self, claim: &Value, card: &mut Scorecard) -> Option<String> {
        let raw = first_str(claim, &["peptide", "epitope", "sequence"])?;
        check_sequence(card, "peptide_validity", &raw, Some(Alphabet::Protein)).map(|p| p.to_ascii_uppercase())
    }

    async fn epitope_prediction(&self, claim: &Value, card: &mut Scorecard) {
        let peptide = self.peptide(claim, card);
        let allele = first_str(claim, &["hla_allele", "allele", "mhc_allele"]);
        let class = mhc_class(claim, allele.as_deref());

        if let Some(peptide) = &peptide {
            let length = peptide.len();
            let (ideal, tolerated) = match class {
                MhcClass::I => (8..=11, 12..=14),
                MhcClass::II => (12..=25, 9..=11),
            };
            let detail = json!({ "length": length, "mhc_class": format!("{:?}", class) });
            if ideal.contains(&length) {
                card.score("peptide_length", 1.0, detail);
            } else if tolerated.contains(&length) {
                card.score_with_warning(
                    "peptide_length",
                    0.5,
                    detail,
                    format!("{}-mer is atypical for MHC class {:?}", length, class),
                );
            } else {
                card.reject("peptide_length", format!("{}-mer cannot bind MHC class {:?}", length, class));
            }
        }

        let mut standard_allele = None;
        if let Some(allele) = &allele {
            if HLA_REGEX.is_match(allele) || MOUSE_MHC_REGEX.is_match(allele) {
                standard_allele = Some(allele.clone());
                card.score("allele_format", 1.0, json!({ "allele": allele }));
            } else if LOOSE_HLA_REGEX.is_match(&allele.to_ascii_uppercase()) {
                card.score_with_warning(
                    "allele_format",
                    0.5,
                    json!({ "allele": allele }),
                    format!("allele '{}' is not in standard nomenclature (e.g. HLA-A*02:01)", allele),
                );
            } else {
                card.reject("allele_format", format!("'{}' is not an MHC allele name", allele));
            }
        }

        let claimed_ic50 = first_num(claim, &["ic50_nm", "ic50"]);
        let claimed_rank = first_num(claim, &["percentile_rank", "rank"]);
        let claimed_binder = bool_field(claim, "binder")
            .or_else(|| claimed_rank.map(|r| r <= BINDER_PERCENTILE))
            .or_else(|| claimed_ic50.map(|ic50| ic50 <= BINDER_IC50_NM));

        if let (Some(peptide), Some(allele), Some(claimed_binder)) = (&peptide, &standard_allele, claimed_binder) {
            if class == MhcClass::I && (8..=14).contains(&peptide.len()) {
                match self.predict_mhci(peptide, allele).await {
                    Ok(Some(prediction)) => match prediction.is_binder() {
                        Some(predicted) if predicted == claimed_binder => card.score(
                            "iedb_prediction",
                            1.0,
                            json!({ "claimed_binder": claimed_binder, "percentile_rank": prediction.percentile_rank, "ic50": prediction.ic50 }),
                        ),
                        Some(predicted) => card.reject(
                            "iedb_prediction",
                            format!(
                                "IEDB predicts {} to be a {} of {} (rank {:?}, IC50 {:?})",
                                peptide,
                                if predicted { "binder" } else { "non-binder" },
                                allele,
                                prediction.percentile_rank,
                                prediction.ic50
                            ),
                        ),
                        None => card.neutral("iedb_prediction", "IEDB response carries no rank or IC50"),
                    },
                    Ok(None) => card.neutral("iedb_prediction", format!("IEDB returned no prediction row for {}", peptide)),
                    Err(e) => unavailable(card, "iedb_prediction", "IEDB", &e),
                }
            } else {
                card.neutral(
                    "iedb_prediction",
                    "IEDB re-prediction covers MHC class I 8-14-mers only; iedb_prediction scored neutral",
                );
            }
        }

        if let Some(ic50) = claimed_ic50 {
            if ic50 <= 0.0 || ic50 > MAX_IC50_NM {
                card.reject("ic50_range", format!("IC50 {} nM is outside (0, {}]", ic50, MAX_IC50_NM));
            } else {
                card.score("ic50_range", 1.0, json!({ "ic50_nm": ic50 }));
            }
        } else if let Some(rank) = claimed_rank {
            if let Some(rank) = in_range(card, "ic50_range", "percentile rank", rank, 0.0, 100.0) {
                card.score("ic50_range", 1.0, json!({ "percentile_rank": rank }));
            }
        }
    }

    async fn bcell_epitope(&self, claim: &Value, card: &mut Scorecard) {
        let peptide = self.peptide(claim, card);

        if let Some(peptide) = &peptide {
            let length = peptide.len();
            if (5..=50).contains(&length) {
                card.score("peptide_length", 1.0, json!({ "length": length }));
            } else {
                card.reject("peptide_length", format!("B-cell epitope length {} is outside 5-50", length));
            }
        }

        if let Some(accession) = first_str(claim, &["antigen_accession", "uniprot_id", "antigen"]) {
            match uniprot_entry(&self.http, &accession).await {
                Ok(Some(entry)) => self.locate_epitope(claim, card, &accession, entry.length(), entry.sequence.map(|s| s.value), peptide.as_deref()),
                Ok(None) => card.reject("antigen_reference", format!("antigen {} not found in UniProt", accession)),
                Err(e) => unavailable(card, "antigen_reference", "UniProt", &e),
            }
        }

        score_reference(card, "method", "B-cell prediction method", first_str(claim, &["method", "tool"]), BCELL_METHODS);

        if let Some(score) = first_num(claim, &["prediction_score", "score"]) {
            if let Some(score) = in_range(card, "score_range", "prediction score", score, 0.0, 1.0) {
                card.score("score_range", 1.0, json!({ "prediction_score": score }));
            }
        }
    }

    fn locate_epitope(
        &self,
        claim: &Value,
        card: &mut Scorecard,
        accession: &str,
        antigen_length: Option<usize>,
        antigen_sequence: Option<String>,
        peptide: Option<&str>,
    ) {
        let start = first_num(claim, &["start_position", "start"]);
        let end = first_num(claim, &["end_position", "end"]);
        let (Some(start), Some(end), Some(length)) = (start, end, antigen_length) else {
            card.score("antigen_reference", 1.0, json!({ "accession": accession, "antigen_length": antigen_length }));
            return;
        };
        if start < 1.0 || end < start || end > length as f64 || start.fract() != 0.0 || end.fract() != 0.0 {
            card.reject(
                "antigen_reference",
                format!("epitope {}-{} does not fit antigen {} of length {}", start, end, accession, length),
            );
            return;
        }
        let (start, end) = (start as usize, end as usize);
        let detail = json!({ "accession": accession, "start": start, "end": end, "antigen_length": length });
        let located = antigen_sequence
            .as_deref()
            .and_then(|seq| seq.get(start - 1..end))
            .map(|window| window.to_string());
        match (peptide, located) {
            (Some(peptide), Some(window)) if !window.eq_ignore_ascii_case(peptide) => card.score_with_warning(
                "antigen_reference",
                0.3,
                detail,
                format!("antigen residues {}-{} are {}, not {}", start, end, window, peptide),
            ),
            (Some(peptide), None) if peptide.len() != end - start + 1 => card.score_with_warning(
                "antigen_reference",
                0.6,
                detail,
                "epitope span length differs from the peptide length",
            ),
            _ => card.score("antigen_reference", 1.0, detail),
        }
    }
}

#[async_trait]
impl DomainAdapter for ImmunoAdapter {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn claim_types(&self) -> &'static [ClaimTypeSpec] {
        IMMUNO_CLAIM_TYPES
    }

    async fn verify(&self, claim: &Value, metadata: &ClaimMetadata) -> Result<VerificationResult, VerifyError> {
        let started = Instant::now();
        let (spec, inferred) = resolve_claim_type(DOMAIN, IMMUNO_CLAIM_TYPES, claim, metadata)?;
        info!("Verifying {} claim ({})", DOMAIN, spec.name);

        let mut card = Scorecard::new(spec);
        if let Some(warning) = inferred {
            card.warn(warning);
        }
        match spec.name {
            "bcell_epitope" => self.bcell_epitope(claim, &mut card).await,
            "epitope_prediction" => self.epitope_prediction(claim, &mut card).await,
            _ => return Err(unhandled_claim_type(DOMAIN, spec, IMMUNO_CLAIM_TYPES)),
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

    const IEDB_TSV: &str = "allele\tseq_num\tstart\tend\tlength\tpeptide\tcore\ticore\tic50\tpercentile_rank\n\
HLA-A*02:01\t1\t1\t9\t9\tSLYNTVATL\tSLYNTVATL\tSLYNTVATL\t18.5\t0.21\n";

    fn adapter(stub: StubFetcher) -> (ImmunoAdapter, Arc<StubFetcher>) {
        let stub = Arc::new(stub);
        (ImmunoAdapter::new(HttpClient::new(stub.clone())), stub)
    }

    fn meta(claim_type: &str) -> ClaimMetadata {
        ClaimMetadata::new(DOMAIN).with_claim_type(claim_type)
    }

    #[test]
    fn test_weights_sum_to_one() {
        for spec in IMMUNO_CLAIM_TYPES {
            assert!((spec.weight_sum() - 1.0).abs() < 1e-9, "{}", spec.name);
        }
    }

    #[test]
    fn test_claim_types_match_inference_table() {
        let mut inferred = claim_types_for(DOMAIN);
        let mut names: Vec<&str> = IMMUNO_CLAIM_TYPES.iter().map(|s| s.name).collect();
        inferred.sort();
        names.sort();
        assert_eq!(inferred, names);
    }

    #[test]
    fn test_parse_iedb_table() {
        let prediction = parse_iedb_table(IEDB_TSV, "slynTVATL").unwrap();
        assert_eq!(prediction.percentile_rank, Some(0.21));
        assert_eq!(prediction.ic50, Some(18.5));
        assert_eq!(prediction.is_binder(), Some(true));
        assert!(parse_iedb_table(IEDB_TSV, "AAAAAAAAA").is_none());
        assert!(parse_iedb_table("", "SLYNTVATL").is_none());
    }

    #[tokio::test]
    async fn test_all_absent_is_neutral() {
        let (adapter, _) = adapter(StubFetcher::offline());
        for spec in IMMUNO_CLAIM_TYPES {
            let result = adapter.verify(&json!({}), &meta(spec.name)).await.unwrap();
            assert_eq!(result.score, 0.5, "{}", spec.name);
        }
    }

    #[tokio::test]
    async fn test_epitope_prediction_agrees_with_iedb() {
        let (adapter, stub) = adapter(StubFetcher::new().route("tools_api/mhci", StubReply::text(200, IEDB_TSV)));
        let claim = json!({
            "peptide": "SLYNTVATL",
            "hla_allele": "HLA-A*02:01",
            "ic50_nm": 25.0
        });
        let result = adapter.verify(&claim, &meta("epitope_prediction")).await.unwrap();
        assert_eq!(result.score, 1.0);
        assert_eq!(stub.requests(), vec![IEDB_MHCI.to_string()]);
    }

    #[tokio::test]
    async fn test_epitope_prediction_disagreement_and_bad_allele() {
        let (adapter, _) = adapter(StubFetcher::new().route("tools_api/mhci", StubReply::text(200, IEDB_TSV)));
        let claim = json!({"peptide": "SLYNTVATL", "hla_allele": "HLA-A*02:01", "binder": false});
        let result = adapter.verify(&claim, &meta("epitope_prediction")).await.unwrap();
        assert_eq!(result.details["component_scores"]["iedb_prediction"], 0.0);

        let claim = json!({"peptide": "SLYNTVATL", "hla_allele": "A2 supertype"});
        let result = adapter.verify(&claim, &meta("epitope_prediction")).await.unwrap();
        assert_eq!(result.details["component_scores"]["allele_format"], 0.0);
    }

    #[tokio::test]
    async fn test_bcell_epitope_located_in_antigen() {
        let (adapter, _) = adapter(StubFetcher::new().route(
            "uniprotkb/P0DTC2",
            StubReply::json(json!({"primaryAccession": "P0DTC2", "sequence": {"value": "MFVFLVLLPLVSSQCVNLT", "length": 19}})),
        ));
        let claim = json!({
            "peptide": "LVLLPLVSS",
            "antigen_accession": "P0DTC2",
            "start_position": 5,
            "end_position": 13,
            "method": "BepiPred-2.0",
            "prediction_score": 0.71
        });
        let result = adapter.verify(&claim, &meta("bcell_epitope")).await.unwrap();
        assert_eq!(result.score, 1.0);

        let claim = json!({"antigen_accession": "P0DTC2", "start_position": 15, "end_position": 30});
        let result = adapter.verify(&claim, &meta("bcell_epitope")).await.unwrap();
        assert_eq!(result.details["component_scores"]["antigen_reference"], 0.0);
    }
}
