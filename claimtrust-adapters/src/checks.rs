//! Reusable component checks
//!
//! Range validation, reference-set recognition, sequence alphabets,
//! accession formats and molecular formulas used by several adapters.

use regex::Regex;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;

use claimtrust_core::Scorecard;
use claimtrust_net::FetchError;

/// Score given to a present but unrecognized tool or database name
pub const UNRECOGNIZED_SCORE: f64 = 0.4;

/// Lowercase, alphanumeric-only form of a name
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Find the reference entry a free-text name refers to. Versions and
/// suffixes are tolerated ("BLAST+ 2.14" matches "blast").
pub fn recognize(name: &str, known: &[&'static str]) -> Option<&'static str> {
    let normalized = normalize_name(name);
    if normalized.is_empty() {
        return None;
    }
    known
        .iter()
        .find(|k| normalize_name(k) == normalized)
        .or_else(|| {
            known.iter().find(|k| {
                let k = normalize_name(k);
                k.len() >= 3 && normalized.contains(&k)
            })
        })
        .copied()
}

/// A lookup could not be completed: the component stays neutral
pub fn unavailable(card: &mut Scorecard, component: &str, source: &str, err: &FetchError) {
    debug!("{} lookup for {} degraded: {}", source, component, err);
    card.neutral(
        component,
        format!("{} unavailable ({}); {} scored neutral", source, err, component),
    );
}

/// Reject `value` when outside `[min, max]`, otherwise return it
pub fn in_range(
    card: &mut Scorecard,
    component: &str,
    label: &str,
    value: f64,
    min: f64,
    max: f64,
) -> Option<f64> {
    if value < min || value > max {
        card.reject(
            component,
            format!("{} = {} is outside the plausible range [{}, {}]", label, value, min, max),
        );
        None
    } else {
        Some(value)
    }
}

/// Score a named tool/method/database against a reference set
pub fn score_reference(
    card: &mut Scorecard,
    component: &str,
    kind: &str,
    name: Option<String>,
    known: &[&'static str],
) {
    let Some(name) = name else { return };
    match recognize(&name, known) {
        Some(matched) => card.score(component, 1.0, json!({ "claimed": name, "recognized_as": matched })),
        None => card.score_with_warning(
            component,
            UNRECOGNIZED_SCORE,
            json!({ "claimed": name, "recognized": false }),
            format!("{} '{}' is not in the reference set of known {}s", kind, name, kind),
        ),
    }
}

/// Residue alphabet of a biological sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alphabet {
    Dna,
    Rna,
    Protein,
}

impl Alphabet {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "dna" | "nucleotide" | "nucleic_acid" => Some(Self::Dna),
            "rna" => Some(Self::Rna),
            "protein" | "peptide" | "amino_acid" | "aa" => Some(Self::Protein),
            _ => None,
        }
    }

    fn symbols(&self) -> &'static str {
        match self {
            Self::Dna => "ACGTNRYSWKMBDHV-",
            Self::Rna => "ACGUNRYSWKMBDHV-",
            Self::Protein => "ACDEFGHIKLMNPQRSTVWYBXZJUO*-",
        }
    }

    /// Guess from content: nucleotides only means DNA/RNA
    pub fn detect(sequence: &str) -> Self {
        let upper: Vec<char> = sequence.chars().map(|c| c.to_ascii_uppercase()).collect();
        if upper.iter().all(|c| "ACGTN-".contains(*c)) {
            Self::Dna
        } else if upper.iter().all(|c| "ACGUN-".contains(*c)) {
            Self::Rna
        } else {
            Self::Protein
        }
    }
}

/// Residues of a raw or FASTA-formatted sequence with whitespace removed
pub fn parse_fasta(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('>') && !line.starts_with(';'))
        .flat_map(|line| line.chars().filter(|c| !c.is_whitespace()))
        .collect()
}

/// Distinct symbols not allowed by `alphabet`
pub fn invalid_symbols(sequence: &str, alphabet: Alphabet) -> Vec<char> {
    let allowed = alphabet.symbols();
    let mut invalid: Vec<char> = sequence
        .chars()
        .map(|c| c.to_ascii_uppercase())
        .filter(|c| !allowed.contains(*c))
        .collect();
    invalid.sort_unstable();
    invalid.dedup();
    invalid
}

/// Validate a sequence component; returns the residues if valid
pub fn check_sequence(
    card: &mut Scorecard,
    component: &str,
    raw: &str,
    alphabet: Option<Alphabet>,
) -> Option<String> {
    let residues = parse_fasta(raw);
    if residues.is_empty() {
        card.reject(component, "sequence is empty after FASTA parsing");
        return None;
    }
    let alphabet = alphabet.unwrap_or_else(|| Alphabet::detect(&residues));
    let invalid = invalid_symbols(&residues, alphabet);
    if invalid.is_empty() {
        card.score(
            component,
            1.0,
            json!({ "length": residues.len(), "alphabet": format!("{:?}", alphabet).to_lowercase() }),
        );
        Some(residues)
    } else {
        let symbols: String = invalid.iter().collect();
        card.reject(
            component,
            format!("sequence contains symbols not valid for {:?}: {}", alphabet, symbols),
        );
        None
    }
}

static UNIPROT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[OPQ][0-9][A-Z0-9]{3}[0-9]|[A-NR-Z][0-9](?:[A-Z][A-Z0-9]{2}[0-9]){1,2})(?:-\d+)?$").unwrap()
});

static PDB_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9][A-Za-z0-9]{3}$").unwrap());

static FORMULA_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([A-Z][a-z]?)(\d*)").unwrap());

pub fn is_uniprot_accession(accession: &str) -> bool {
    UNIPROT_REGEX.is_match(accession)
}

pub fn is_pdb_id(id: &str) -> bool {
    PDB_REGEX.is_match(id)
}

/// Monoisotopic masses of the elements found in small molecules and metabolites
const MONOISOTOPIC_MASSES: &[(&str, f64)] = &[
    ("H", 1.007_825_032), ("C", 12.0), ("N", 14.003_074_004), ("O", 15.994_914_620),
    ("P", 30.973_761_998), ("S", 31.972_071_174), ("F", 18.998_403_163), ("Cl", 34.968_852_682),
    ("Br", 78.918_337_6), ("I", 126.904_473), ("Na", 22.989_769_282), ("K", 38.963_706_486),
    ("Si", 27.976_926_535), ("Se", 79.916_521_8), ("B", 11.009_305_4), ("Fe", 55.934_936_3),
    ("Mg", 23.985_041_697), ("Ca", 39.962_590_86), ("Zn", 63.929_142_0), ("Cu", 62.929_597_7),
    ("Co", 58.933_194_3), ("Mn", 54.938_043_9), ("As", 74.921_595_7),
];

/// Element counts of a flat molecular formula (`C8H10N4O2`). Charges and
/// whitespace are ignored; groups in parentheses are not supported.
pub fn parse_formula(formula: &str) -> Option<BTreeMap<String, u32>> {
    let cleaned: String = formula
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '+' | '-'))
        .collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    let mut counts = BTreeMap::new();
    let mut consumed = 0;
    for caps in FORMULA_REGEX.captures_iter(&cleaned) {
        let whole = caps.get(0)?;
        if whole.start() != consumed {
            return None;
        }
        consumed = whole.end();
        let count = match caps.get(2).map(|m| m.as_str()).filter(|s| !s.is_empty()) {
            Some(digits) => digits.parse::<u32>().ok()?,
            None => 1,
        };
        *counts.entry(caps[1].to_string()).or_insert(0) += count;
    }
    (consumed == cleaned.len()).then_some(counts)
}

/// Monoisotopic neutral mass of a formula; `None` for unknown elements
pub fn monoisotopic_mass(formula: &str) -> Option<f64> {
    parse_formula(formula)?
        .iter()
        .map(|(element, count)| {
            MONOISOTOPIC_MASSES
                .iter()
                .find(|(symbol, _)| symbol == element)
                .map(|(_, mass)| mass * f64::from(*count))
        })
        .sum()
}

/// Non-hydrogen atom count of a formula
pub fn heavy_atoms(formula: &str) -> Option<u32> {
    Some(
        parse_formula(formula)?
            .iter()
            .filter(|(element, _)| element.as_str() != "H")
            .map(|(_, count)| count)
            .sum(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimtrust_core::ClaimTypeSpec;

    static SPEC: ClaimTypeSpec = ClaimTypeSpec {
        name: "test",
        weights: &[("tool", 0.5), ("sequence", 0.5)],
    };

    #[test]
    fn test_recognize_tolerates_versions() {
        let known = &["blast", "hmmer", "mafft"];
        assert_eq!(recognize("BLAST+ 2.14.0", known), Some("blast"));
        assert_eq!(recognize("HMMER3", known), Some("hmmer"));
        assert_eq!(recognize("clustal", known), None);
        assert_eq!(recognize("   ", known), None);
    }

    #[test]
    fn test_formula_parsing_and_mass() {
        let caffeine = parse_formula("C8H10N4O2").unwrap();
        assert_eq!(caffeine.get("N"), Some(&4));
        assert_eq!(heavy_atoms("C8H10N4O2"), Some(14));
        assert!((monoisotopic_mass("C8H10N4O2").unwrap() - 194.080_376).abs() < 1e-4);
        assert_eq!(parse_formula("C6H12O6Xx!"), None);
        assert_eq!(parse_formula("c6h12"), None);
        assert_eq!(monoisotopic_mass("C2Qq"), None);
    }

    #[test]
    fn test_accession_helpers() {
        assert!(is_uniprot_accession("P69905"));
        assert!(!is_uniprot_accession("1ABC"));
        assert!(is_pdb_id("1abc"));
        assert!(!is_pdb_id("ABCD"));
    }

    #[test]
    fn test_parse_fasta() {
        let fasta = ">sp|P69905|HBA_HUMAN\nMVLSPADKTN\nVKAAWGKVGA\n";
        assert_eq!(parse_fasta(fasta), "MVLSPADKTNVKAAWGKVGA");
    }

    #[test]
    fn test_alphabet_detection_and_validation() {
        assert_eq!(Alphabet::detect("ACGTTGCA"), Alphabet::Dna);
        assert_eq!(Alphabet::detect("ACGUUGCA"), Alphabet::Rna);
        assert_eq!(Alphabet::detect("MVLSPADK"), Alphabet::Protein);
        assert_eq!(invalid_symbols("ACGTXZ", Alphabet::Dna), vec!['X', 'Z']);
    }

    #[test]
    fn test_check_sequence_rejects_bad_symbols() {
        let mut card = Scorecard::new(&SPEC);
        assert!(check_sequence(&mut card, "sequence", "ACGT123", Some(Alphabet::Dna)).is_none());
        assert_eq!(card.component_score("sequence"), Some(0.0));
        assert_eq!(card.errors().len(), 1);
    }

    #[test]
    fn test_score_reference_unknown_warns() {
        let mut card = Scorecard::new(&SPEC);
        score_reference(&mut card, "tool", "tool", Some("MyCustomAligner".into()), &["blast"]);
        assert_eq!(card.component_score("tool"), Some(UNRECOGNIZED_SCORE));
        assert_eq!(card.warnings().len(), 1);
    }
}
