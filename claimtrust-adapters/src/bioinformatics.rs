//! Bioinformatics Adapter
//!
//! Sequence-analysis and RNA secondary structure claims. Accessions are
//! resolved against UniProt, NCBI and Ensembl, Rfam families against Rfam.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, info};
use urlencoding::encode;

use claimtrust_core::value::{first_num, first_str};
use claimtrust_core::{BadgePolicy, ClaimMetadata, ClaimTypeSpec, Scorecard, VerificationResult, VerifyError};
use claimtrust_net::{HttpClient, Lookup};

use crate::checks::{
    check_sequence, in_range, invalid_symbols, is_uniprot_accession, parse_fasta, score_reference, unavailable,
    Alphabet,
};
use crate::sources::{ensembl_lookup_id, ncbi_esummary, uniprot_entry};
use crate::traits::{resolve_claim_type, unhandled_claim_type, DomainAdapter};

const DOMAIN: &str = "bioinformatics";

const RFAM: &str = "https://rfam.org/family";

pub static BIOINFORMATICS_CLAIM_TYPES: &[ClaimTypeSpec] = &[
    ClaimTypeSpec {
        name: "rna_structure",
        weights: &[
            ("rfam_family", 0.25),
            ("dot_bracket", 0.25),
            ("sequence_match", 0.15),
            ("mfe", 0.20),
            ("tool", 0.15),
        ],
    },
    ClaimTypeSpec {
        name: "sequence_analysis",
        weights: &[
            ("accession", 0.20),
            ("sequence_validity", 0.15),
            ("tool", 0.15),
            ("e_value", 0.15),
            ("identity", 0.15),
            ("coverage", 0.10),
            ("database", 0.10),
        ],
    },
];

static RFAM_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^RF\d{5}$").unwrap());

static REFSEQ_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[ANXYW][CGMRPT])_\d+(?:\.\d+)?$").unwrap());

static GENBANK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{1,3}\d{5,8}(?:\.\d+)?$").unwrap());

static ENSEMBL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ENS[A-Z]*[GTPE]\d{11}(?:\.\d+)?$").unwrap());

const SEQUENCE_TOOLS: &[&str] = &[
    "blast", "blastp", "blastn", "blastx", "tblastn", "psiblast", "diamond", "mmseqs2", "hmmer",
    "jackhmmer", "hhblits", "hhsearch", "hhpred", "clustalw", "clustalomega", "muscle", "mafft",
    "tcoffee", "kalign", "prank", "bowtie2", "bwa", "minimap2", "star", "hisat2", "salmon",
    "kallisto", "emboss", "needle", "water", "fasta", "usearch", "vsearch", "cdhit", "interproscan",
];

const RNA_TOOLS: &[&str] = &[
    "rnafold", "viennarna", "mfold", "unafold", "rnastructure", "infernal", "cmsearch", "linearfold",
    "contrafold", "eternafold", "spotrna", "mxfold2", "rnaalifold", "ipknot", "pkiss", "centroidfold",
];

const SEQUENCE_DATABASES: &[&str] = &[
    "uniprotkb", "uniprot", "swissprot", "trembl", "uniref100", "uniref90", "uniref50", "nr", "nt",
    "refseq", "genbank", "pdb", "pdbseqres", "pfam", "rfam", "interpro", "ensembl", "silva", "gtdb",
    "mgnify", "bfd", "uniclust30", "swiss-prot",
];

const BRACKET_PAIRS: &[(char, char)] = &[('(', ')'), ('[', ']'), ('{', '}'), ('<', '>')];

/// Base-pair partner indices of a dot-bracket string
pub fn parse_dot_bracket(structure: &str) -> Result<Vec<(usize, usize)>, String> {
    let mut stacks: Vec<Vec<usize>> = vec![Vec::new(); BRACKET_PAIRS.len()];
    let mut pairs = Vec::new();
    for (i, c) in structure.chars().enumerate() {
        if let Some(k) = BRACKET_PAIRS.iter().position(|(open, _)| *open == c) {
            stacks[k].push(i);
        } else if let Some(k) = BRACKET_PAIRS.iter().position(|(_, close)| *close == c) {
            let j = stacks[k]
                .pop()
                .ok_or_else(|| format!("unmatched '{}' at position {}", c, i + 1))?;
            pairs.push((j, i));
        } else if !matches!(c, '.' | ',' | ':' | '_' | '-' | '~') {
            return Err(format!("invalid character '{}' at position {}", c, i + 1));
        }
    }
    if let Some((k, open)) = stacks
        .iter()
        .enumerate()
        .find_map(|(k, s)| s.last().map(|p| (k, *p)))
    {
        return Err(format!("unmatched '{}' at position {}", BRACKET_PAIRS[k].0, open + 1));
    }
    pairs.sort_unstable();
    Ok(pairs)
}

fn is_canonical_pair(a: char, b: char) -> bool {
    matches!(
        (a, b),
        ('A', 'U') | ('U', 'A') | ('G', 'C') | ('C', 'G') | ('G', 'U') | ('U', 'G')
    )
}

/// Source an accession format resolves against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessionKind {
    Uniprot,
    Refseq,
    Genbank,
    Ensembl,
}

fn accession_kind(accession: &str) -> Option<AccessionKind> {
    if ENSEMBL_REGEX.is_match(accession) {
        Some(AccessionKind::Ensembl)
    } else if REFSEQ_REGEX.is_match(accession) {
        Some(AccessionKind::Refseq)
    } else if is_uniprot_accession(accession) {
        Some(AccessionKind::Uniprot)
    } else if GENBANK_REGEX.is_match(accession) {
        Some(AccessionKind::Genbank)
    } else {
        None
    }
}

/// Verifier for the bioinformatics domain
pub struct BioinformaticsAdapter {
    http: HttpClient,
}

impl BioinformaticsAdapter {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    async fn rfam_family(&self, accession: &str) -> Lookup<Value> {
        let url = format!("{}/{}?content-type=application/json", RFAM, encode(accession));
        self.http.lookup_json(&url).await
    }

    async fn rna_structure(&self, claim: &Value, card: &mut Scorecard) {
        if let Some(family) = first_str(claim, &["rfam_family", "rfam_accession"]) {
            let family = family.to_ascii_uppercase();
            if !RFAM_REGEX.is_match(&family) {
                card.reject("rfam_family", format!("'{}' is not an Rfam accession (RFnnnnn)", family));
            } else {
                match self.rfam_family(&family).await {
                    Ok(Some(body)) => card.score(
                        "rfam_family",
                        1.0,
                        json!({ "accession": family, "id": body["rfam"]["id"].clone() }),
                    ),
                    Ok(None) => card.reject("rfam_family", format!("Rfam has no family {}", family)),
                    Err(e) => unavailable(card, "rfam_family", "Rfam", &e),
                }
            }
        }

        let structure = first_str(claim, &["dot_bracket", "structure", "secondary_structure"]);
        let pairs = structure.as_ref().and_then(|s| match parse_dot_bracket(s) {
            Ok(pairs) => {
                card.score("dot_bracket", 1.0, json!({ "length": s.chars().count(), "base_pairs": pairs.len() }));
                Some(pairs)
            }
            Err(reason) => {
                card.reject("dot_bracket", format!("dot-bracket structure is malformed: {}", reason));
                None
            }
        });

        if let Some(raw) = first_str(claim, &["rna_sequence", "sequence"]) {
            let sequence: String = parse_fasta(&raw).to_ascii_uppercase().replace('T', "U");
            let invalid = invalid_symbols(&sequence, Alphabet::Rna);
            if !invalid.is_empty() {
                let symbols: String = invalid.iter().collect();
                card.reject("sequence_match", format!("RNA sequence contains invalid symbols: {}", symbols));
            } else if let (Some(structure), Some(pairs)) = (&structure, &pairs) {
                self.score_sequence_match(card, &sequence, structure, pairs);
            }
        }

        if let Some(mfe) = first_num(claim, &["mfe", "free_energy", "delta_g"]) {
            if mfe > 0.0 {
                card.reject("mfe", format!("minimum free energy {} kcal/mol must not be positive", mfe));
            } else if mfe < 0.0 && pairs.as_ref().is_some_and(|p| p.is_empty()) {
                card.score_with_warning(
                    "mfe",
                    0.5,
                    json!({ "mfe": mfe }),
                    "negative free energy reported for a structure without base pairs",
                );
            } else {
                card.score("mfe", 1.0, json!({ "mfe": mfe }));
            }
        }

        score_reference(card, "tool", "tool", first_str(claim, &["tool", "method", "software"]), RNA_TOOLS);
    }

    fn score_sequence_match(&self, card: &mut Scorecard, sequence: &str, structure: &str, pairs: &[(usize, usize)]) {
        let residues: Vec<char> = sequence.chars().collect();
        let structure_len = structure.chars().count();
        if residues.len() != structure_len {
            card.reject(
                "sequence_match",
                format!("sequence length {} differs from structure length {}", residues.len(), structure_len),
            );
            return;
        }
        if pairs.is_empty() {
            card.score("sequence_match", 1.0, json!({ "canonical_fraction": null }));
            return;
        }
        let canonical = pairs
            .iter()
            .filter(|(i, j)| is_canonical_pair(residues[*i], residues[*j]))
            .count();
        let fraction = canonical as f64 / pairs.len() as f64;
        let detail = json!({ "base_pairs": pairs.len(), "canonical_fraction": fraction });
        if fraction >= 0.9 {
            card.score("sequence_match", 1.0, detail);
        } else if fraction >= 0.7 {
            card.score_with_warning("sequence_match", 0.6, detail, format!("{:.0}% of base pairs are non-canonical", (1.0 - fraction) * 100.0));
        } else {
            card.score_with_warning("sequence_match", 0.2, detail, "most base pairs are non-canonical for the sequence");
        }
    }

    async fn resolve_accession(&self, kind: AccessionKind, accession: &str) -> Lookup<Value> {
        match kind {
            AccessionKind::Uniprot => Ok(uniprot_entry(&self.http, accession)
                .await?
                .map(|e| json!({ "source": "uniprot", "length": e.length() }))),
            AccessionKind::Ensembl => Ok(ensembl_lookup_id(&self.http, accession)
                .await?
                .map(|_| json!({ "source": "ensembl" }))),
            AccessionKind::Refseq | AccessionKind::Genbank => {
                let protein = accession.as_bytes().get(1) == Some(&b'P');
                let db = if protein { "protein" } else { "nuccore" };
                Ok(ncbi_esummary(&self.http, db, accession)
                    .await?
                    .map(|_| json!({ "source": "ncbi", "db": db })))
            }
        }
    }

    async fn sequence_analysis(&self, claim: &Value, card: &mut Scorecard) {
        if let Some(accession) = first_str(claim, &["accession", "accession_id", "uniprot_id"]) {
            match accession_kind(&accession) {
                None => card.reject(
                    "accession",
                    format!("'{}' is not a UniProt, RefSeq, GenBank or Ensembl accession", accession),
                ),
                Some(kind) => match self.resolve_accession(kind, &accession).await {
                    Ok(Some(detail)) => card.score("accession", 1.0, detail),
                    Ok(None) => card.reject("accession", format!("accession {} not found ({:?})", accession, kind)),
                    Err(e) => unavailable(card, "accession", &format!("{:?}", kind), &e),
                },
            }
        }

        if let Some(sequence) = first_str(claim, &["sequence", "query_sequence"]) {
            let alphabet = first_str(claim, &["sequence_type", "molecule_type"])
                .as_deref()
                .and_then(Alphabet::from_label);
            check_sequence(card, "sequence_validity", &sequence, alphabet);
        }

        score_reference(card, "tool", "tool", first_str(claim, &["tool", "method", "software"]), SEQUENCE_TOOLS);

        if let Some(e_value) = first_num(claim, &["e_value", "evalue"]) {
            if e_value < 0.0 {
                card.reject("e_value", format!("E-value {} cannot be negative", e_value));
            } else if e_value <= 1e-5 {
                card.score("e_value", 1.0, json!({ "e_value": e_value }));
            } else if e_value <= 0.01 {
                card.score("e_value", 0.7, json!({ "e_value": e_value }));
            } else {
                card.score_with_warning(
                    "e_value",
                    0.3,
                    json!({ "e_value": e_value }),
                    format!("E-value {} indicates a weak or chance hit", e_value),
                );
            }
        }

        if let Some(identity) = first_num(claim, &["percent_identity", "identity"]) {
            if let Some(identity) = in_range(card, "identity", "percent identity", identity, 0.0, 100.0) {
                if identity < 25.0 {
                    card.score_with_warning(
                        "identity",
                        0.6,
                        json!({ "percent_identity": identity }),
                        "identity below 25% is in the twilight zone for homology",
                    );
                } else {
                    card.score("identity", 1.0, json!({ "percent_identity": identity }));
                }
            }
        }

        if let Some(coverage) = first_num(claim, &["query_coverage", "coverage"]) {
            if let Some(coverage) = in_range(card, "coverage", "coverage", coverage, 0.0, 100.0) {
                card.score("coverage", 1.0, json!({ "coverage": coverage }));
            }
        }

        score_reference(card, "database", "database", first_str(claim, &["database", "db"]), SEQUENCE_DATABASES);
    }
}

#[async_trait]
impl DomainAdapter for BioinformaticsAdapter {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn claim_types(&self) -> &'static [ClaimTypeSpec] {
        BIOINFORMATICS_CLAIM_TYPES
    }

    async fn verify(&self, claim: &Value, metadata: &ClaimMetadata) -> Result<VerificationResult, VerifyError> {
        let started = Instant::now();
        let (spec, inferred) = resolve_claim_type(DOMAIN, BIOINFORMATICS_CLAIM_TYPES, claim, metadata)?;
        info!("Verifying {} claim ({})", DOMAIN, spec.name);

        let mut card = Scorecard::new(spec);
        if let Some(warning) = inferred {
            card.warn(warning);
        }
        match spec.name {
            "rna_structure" => self.rna_structure(claim, &mut card).await,
            "sequence_analysis" => self.sequence_analysis(claim, &mut card).await,
            _ => return Err(unhandled_claim_type(DOMAIN, spec, BIOINFORMATICS_CLAIM_TYPES)),
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

    fn adapter(stub: StubFetcher) -> BioinformaticsAdapter {
        BioinformaticsAdapter::new(HttpClient::new(Arc::new(stub)))
    }

    fn meta(claim_type: &str) -> ClaimMetadata {
        ClaimMetadata::new(DOMAIN).with_claim_type(claim_type)
    }

    #[test]
    fn test_weights_sum_to_one() {
        for spec in BIOINFORMATICS_CLAIM_TYPES {
            assert!((spec.weight_sum() - 1.0).abs() < 1e-9, "{}", spec.name);
        }
    }

    #[test]
    fn test_claim_types_match_inference_table() {
        let mut inferred = claim_types_for(DOMAIN);
        let mut names: Vec<&str> = BIOINFORMATICS_CLAIM_TYPES.iter().map(|s| s.name).collect();
        inferred.sort();
        names.sort();
        assert_eq!(inferred, names);
    }

    #[test]
    fn test_dot_bracket_parsing() {
        assert_eq!(parse_dot_bracket("((..))").unwrap(), vec![(0, 5), (1, 4)]);
        assert_eq!(parse_dot_bracket("((..[[..))..]]").unwrap().len(), 4);
        assert!(parse_dot_bracket("((..)").is_err());
        assert!(parse_dot_bracket("(..))").is_err());
        assert!(parse_dot_bracket("((xx))").is_err());
    }

    #[test]
    fn test_accession_formats() {
        assert_eq!(accession_kind("P69905"), Some(AccessionKind::Uniprot));
        assert_eq!(accession_kind("A0A024R161"), Some(AccessionKind::Uniprot));
        assert_eq!(accession_kind("NP_000509.1"), Some(AccessionKind::Refseq));
        assert_eq!(accession_kind("ENSG00000139618"), Some(AccessionKind::Ensembl));
        assert_eq!(accession_kind("AB123456"), Some(AccessionKind::Genbank));
        assert_eq!(accession_kind("not-an-id"), None);
    }

    #[tokio::test]
    async fn test_all_absent_is_neutral() {
        let adapter = adapter(StubFetcher::offline());
        for spec in BIOINFORMATICS_CLAIM_TYPES {
            let result = adapter.verify(&json!({}), &meta(spec.name)).await.unwrap();
            assert_eq!(result.score, 0.5, "{}", spec.name);
        }
    }

    #[tokio::test]
    async fn test_rna_structure_full_marks() {
        let adapter = adapter(StubFetcher::new().route(
            "rfam.org/family/RF00005",
            StubReply::json(json!({"rfam": {"acc": "RF00005", "id": "tRNA"}})),
        ));
        let claim = json!({
            "rfam_family": "RF00005",
            "dot_bracket": "((((....))))",
            "rna_sequence": "GGGAAAAAUCCC",
            "mfe": -3.2,
            "tool": "RNAfold 2.6"
        });
        let result = adapter.verify(&claim, &meta("rna_structure")).await.unwrap();
        assert_eq!(result.score, 1.0);
    }

    #[tokio::test]
    async fn test_rna_length_mismatch_and_positive_mfe() {
        let adapter = adapter(StubFetcher::offline());
        let claim = json!({"dot_bracket": "((..))", "rna_sequence": "GGAACCA", "mfe": 1.5});
        let result = adapter.verify(&claim, &meta("rna_structure")).await.unwrap();
        let scores = &result.details["component_scores"];
        assert_eq!(scores["sequence_match"], 0.0);
        assert_eq!(scores["mfe"], 0.0);
        assert_eq!(result.errors.len(), 2);
    }

    #[tokio::test]
    async fn test_sequence_analysis_uniprot_not_found() {
        let adapter = adapter(StubFetcher::new().route("uniprotkb/Q00000", StubReply::status(404)));
        let claim = json!({
            "accession": "Q00000",
            "e_value": 1e-40,
            "percent_identity": 135,
            "database": "Swiss-Prot"
        });
        let result = adapter.verify(&claim, &meta("sequence_analysis")).await.unwrap();
        let scores = &result.details["component_scores"];
        assert_eq!(scores["accession"], 0.0);
        assert_eq!(scores["e_value"], 1.0);
        assert_eq!(scores["identity"], 0.0);
        assert_eq!(scores["database"], 1.0);
    }
}
