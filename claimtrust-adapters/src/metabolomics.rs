//! Metabolomics Adapter
//!
//! Compound identification and spectral library match claims, checked
//! against HMDB, PubChem and MassBank with adduct-corrected mass accuracy.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, info};
use urlencoding::encode;

use claimtrust_core::value::{as_number, first_num, first_str};
use claimtrust_core::{BadgePolicy, ClaimMetadata, ClaimTypeSpec, Scorecard, VerificationResult, VerifyError};
use claimtrust_net::{HttpClient, Lookup};

use crate::checks::{in_range, monoisotopic_mass, parse_formula, unavailable};
use crate::sources::{pubchem_by_cid, pubchem_by_name, PubchemCompound};
use crate::traits::{resolve_claim_type, unhandled_claim_type, DomainAdapter};

const DOMAIN: &str = "metabolomics";

const HMDB: &str = "https://hmdb.ca/metabolites";
const MASSBANK: &str = "https://massbank.eu/MassBank-api/records";

/// Mass of a proton (Da)
const PROTON: f64 = 1.007_276;
/// Mass of an electron (Da)
const ELECTRON: f64 = 0.000_549;
/// Absolute tolerance on a library precursor m/z (Da)
const PRECURSOR_TOLERANCE_DA: f64 = 0.01;

pub static METABOLOMICS_CLAIM_TYPES: &[ClaimTypeSpec] = &[
    ClaimTypeSpec {
        name: "spectral_match",
        weights: &[
            ("massbank_record", 0.30),
            ("similarity_score", 0.20),
            ("matched_peaks", 0.15),
            ("precursor_mz", 0.15),
            ("adduct", 0.10),
            ("collision_energy", 0.10),
        ],
    },
    ClaimTypeSpec {
        name: "compound_identification",
        weights: &[
            ("hmdb_record", 0.20),
            ("pubchem_match", 0.20),
            ("formula_match", 0.15),
            ("mass_accuracy", 0.20),
            ("adduct", 0.10),
            ("identification_level", 0.15),
        ],
    },
];

/// Ion species: `m/z = (multimer · M + delta) / |charge|`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adduct {
    pub name: &'static str,
    pub multimer: f64,
    pub delta: f64,
    pub charge: i32,
}

impl Adduct {
    pub fn mz(&self, neutral_mass: f64) -> f64 {
        (self.multimer * neutral_mass + self.delta) / f64::from(self.charge.abs())
    }
}

pub static ADDUCTS: &[Adduct] = &[
    Adduct { name: "[M+H]+", multimer: 1.0, delta: PROTON, charge: 1 },
    Adduct { name: "[M+Na]+", multimer: 1.0, delta: 22.989_218, charge: 1 },
    Adduct { name: "[M+K]+", multimer: 1.0, delta: 38.963_158, charge: 1 },
    Adduct { name: "[M+NH4]+", multimer: 1.0, delta: 18.033_823, charge: 1 },
    Adduct { name: "[M+H-H2O]+", multimer: 1.0, delta: -17.003_289, charge: 1 },
    Adduct { name: "[M+2H]2+", multimer: 1.0, delta: 2.0 * PROTON, charge: 2 },
    Adduct { name: "[2M+H]+", multimer: 2.0, delta: PROTON, charge: 1 },
    Adduct { name: "[M]+", multimer: 1.0, delta: -ELECTRON, charge: 1 },
    Adduct { name: "[M-H]-", multimer: 1.0, delta: -PROTON, charge: -1 },
    Adduct { name: "[M+Cl]-", multimer: 1.0, delta: 34.969_402, charge: -1 },
    Adduct { name: "[M+FA-H]-", multimer: 1.0, delta: 44.998_201, charge: -1 },
    Adduct { name: "[M+CH3COO]-", multimer: 1.0, delta: 59.013_851, charge: -1 },
    Adduct { name: "[M-H2O-H]-", multimer: 1.0, delta: -19.017_841, charge: -1 },
    Adduct { name: "[M-2H]2-", multimer: 1.0, delta: -2.0 * PROTON, charge: -2 },
    Adduct { name: "[2M-H]-", multimer: 2.0, delta: -PROTON, charge: -1 },
];

fn adduct_key(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '[' | ']'))
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Look up an adduct by name; brackets and whitespace are optional
pub fn find_adduct(name: &str) -> Option<&'static Adduct> {
    let key = adduct_key(name);
    ADDUCTS.iter().find(|a| {
        let known = adduct_key(a.name);
        // "M+H" without a charge suffix is accepted for singly charged ions
        known == key || known.strip_suffix(['+', '-']) == Some(key.as_str())
    })
}

static HMDB_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^HMDB(\d{5}|\d{7})$").unwrap());

static HMDB_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<name>([^<]+)</name>").unwrap());

static HMDB_FORMULA_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<chemical_formula>([^<]+)</chemical_formula>").unwrap());

static HMDB_MASS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<monisotopic_molecular_weight>([^<]+)</monisotopic_molecular_weight>|<monoisotopic_molecular_weight>([^<]+)</monoisotopic_molecular_weight>").unwrap()
});

static MASSBANK_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:MSBNK-[A-Za-z0-9_]+-[A-Z0-9_]+|[A-Z]{2,3}\d{5,6})$").unwrap());

static LEADING_NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)").unwrap());

/// Metabolite fields parsed from an HMDB XML record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HmdbRecord {
    pub name: Option<String>,
    pub formula: Option<String>,
    pub monoisotopic_mass: Option<f64>,
}

pub fn parse_hmdb_xml(xml: &str) -> HmdbRecord {
    let capture = |re: &Regex| {
        re.captures(xml)
            .and_then(|c| c.iter().skip(1).flatten().next().map(|m| m.as_str().trim().to_string()))
    };
    HmdbRecord {
        name: capture(&HMDB_NAME_REGEX),
        formula: capture(&HMDB_FORMULA_REGEX),
        monoisotopic_mass: capture(&HMDB_MASS_REGEX).and_then(|m| m.parse().ok()),
    }
}

/// HMDB ids are seven digits; five-digit legacy ids are zero-padded
fn normalize_hmdb_id(id: &str) -> Option<String> {
    let id = id.trim().to_ascii_uppercase();
    let digits = HMDB_ID_REGEX.captures(&id)?.get(1)?.as_str().to_string();
    Some(format!("HMDB{:0>7}", digits))
}

/// Precursor m/z stored in a MassBank record
fn massbank_precursor(record: &Value) -> Option<f64> {
    if let Some(mz) = record.get("precursor_mz").and_then(as_number) {
        return Some(mz);
    }
    fn search(value: &Value) -> Option<f64> {
        match value {
            Value::Object(map) => {
                let tag = map.get("subtag").or_else(|| map.get("name")).and_then(Value::as_str);
                if tag.is_some_and(|t| t.to_ascii_uppercase().contains("PRECURSOR_M/Z")) {
                    if let Some(mz) = map.get("value").and_then(as_number) {
                        return Some(mz);
                    }
                }
                map.values().find_map(search)
            }
            Value::Array(items) => items.iter().find_map(search),
            _ => None,
        }
    }
    search(record)
}

fn score_adduct(card: &mut Scorecard, claim: &Value) -> Option<&'static Adduct> {
    let name = first_str(claim, &["adduct", "ion_type", "precursor_type"])?;
    match find_adduct(&name) {
        Some(adduct) => {
            card.score("adduct", 1.0, json!({ "claimed": name, "adduct": adduct.name }));
            Some(adduct)
        }
        None => {
            card.reject("adduct", format!("adduct '{}' is not a known ion species", name));
            None
        }
    }
}

/// Verifier for the metabolomics domain
pub struct MetabolomicsAdapter {
    http: HttpClient,
}

impl MetabolomicsAdapter {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    async fn hmdb_record(&self, id: &str) -> Lookup<HmdbRecord> {
        let url = format!("{}/{}.xml", HMDB, encode(id));
        Ok(self.http.lookup_text(&url).await?.map(|xml| parse_hmdb_xml(&xml)))
    }

    async fn compound_identification(&self, claim: &Value, card: &mut Scorecard) {
        let mut references: Vec<(&'static str, Option<String>, Option<f64>)> = Vec::new();

        if let Some(raw_id) = first_str(claim, &["hmdb_id", "hmdb"]) {
            match normalize_hmdb_id(&raw_id) {
                None => card.reject("hmdb_record", format!("'{}' is not an HMDB accession", raw_id)),
                Some(id) => match self.hmdb_record(&id).await {
                    Ok(Some(record)) => {
                        card.score("hmdb_record", 1.0, json!({ "hmdb_id": id, "name": record.name }));
                        references.push(("hmdb", record.formula, record.monoisotopic_mass));
                    }
                    Ok(None) => card.reject("hmdb_record", format!("HMDB has no metabolite {}", id)),
                    Err(e) => unavailable(card, "hmdb_record", "HMDB", &e),
                },
            }
        }

        let pubchem: Option<(String, Lookup<PubchemCompound>)> =
            if let Some(cid) = first_str(claim, &["pubchem_cid", "cid"]) {
                Some((format!("CID {}", cid), pubchem_by_cid(&self.http, &cid).await))
            } else if let Some(name) = first_str(claim, &["compound_name", "name"]) {
                let lookup = pubchem_by_name(&self.http, &name).await;
                Some((name, lookup))
            } else {
                None
            };
        if let Some((label, lookup)) = pubchem {
            match lookup {
                Ok(Some(compound)) => {
                    card.score("pubchem_match", 1.0, json!({ "query": label, "cid": compound.cid }));
                    references.push(("pubchem", compound.molecular_formula, compound.monoisotopic_mass));
                }
                Ok(None) => card.reject("pubchem_match", format!("PubChem has no compound {}", label)),
                Err(e) => unavailable(card, "pubchem_match", "PubChem", &e),
            }
        }

        let claimed_formula = first_str(claim, &["molecular_formula", "formula"]);
        let mut neutral_mass = None;
        if let Some(formula) = &claimed_formula {
            match parse_formula(formula) {
                None => card.reject("formula_match", format!("'{}' is not a molecular formula", formula)),
                Some(parsed) => {
                    neutral_mass = monoisotopic_mass(formula);
                    let reference = references
                        .iter()
                        .find_map(|(source, f, _)| f.as_deref().and_then(parse_formula).map(|p| (*source, p)));
                    match reference {
                        Some((source, reference)) if reference == parsed => {
                            card.score("formula_match", 1.0, json!({ "formula": formula, "source": source }))
                        }
                        Some((source, _)) => card.reject(
                            "formula_match",
                            format!("formula {} does not match the {} record", formula, source),
                        ),
                        None => card.neutral("formula_match", "no reference formula available; formula_match scored neutral"),
                    }
                }
            }
        }
        if neutral_mass.is_none() {
            neutral_mass = references.iter().find_map(|(_, _, mass)| *mass);
        }

        let adduct = score_adduct(card, claim);
        let observed = first_num(claim, &["observed_mz", "mz", "precursor_mz"]);
        let claimed_ppm = first_num(claim, &["mass_error_ppm", "ppm_error"]);
        self.score_mass_accuracy(card, observed, neutral_mass, adduct, claimed_ppm);

        if let Some(level) = first_str(claim, &["msi_level", "identification_level"]) {
            let digits: String = level.chars().filter(char::is_ascii_digit).collect();
            let score = match digits.as_str() {
                "1" => Some(1.0),
                "2" => Some(0.9),
                "3" => Some(0.7),
                "4" => Some(0.5),
                _ => None,
            };
            match score {
                Some(score) => card.score("identification_level", score, json!({ "msi_level": digits })),
                None => card.reject("identification_level", format!("'{}' is not an MSI identification level (1-4)", level)),
            }
        }
    }

    fn score_mass_accuracy(
        &self,
        card: &mut Scorecard,
        observed: Option<f64>,
        neutral_mass: Option<f64>,
        adduct: Option<&'static Adduct>,
        claimed_ppm: Option<f64>,
    ) {
        let adduct = adduct.or_else(|| find_adduct("[M+H]+"));
        let computed = match (observed, neutral_mass, adduct) {
            (Some(observed), Some(mass), Some(adduct)) => {
                let theoretical = adduct.mz(mass);
                Some(((observed - theoretical) / theoretical * 1e6, theoretical))
            }
            _ => None,
        };
        let (ppm, detail) = match (computed, claimed_ppm) {
            (Some((ppm, theoretical)), claimed) => {
                if let Some(claimed) = claimed {
                    if (claimed.abs() - ppm.abs()).abs() > 1.0 {
                        card.warn(format!(
                            "reported mass error {} ppm differs from recomputed {:.2} ppm",
                            claimed, ppm
                        ));
                    }
                }
                (ppm, json!({ "ppm": ppm, "theoretical_mz": theoretical, "recomputed": true }))
            }
            (None, Some(claimed)) => (claimed, json!({ "ppm": claimed, "recomputed": false })),
            (None, None) => return,
        };
        let error = ppm.abs();
        if error <= 5.0 {
            card.score("mass_accuracy", 1.0, detail);
        } else if error <= 10.0 {
            card.score_with_warning("mass_accuracy", 0.6, detail, format!("mass error {:.1} ppm exceeds 5 ppm", error));
        } else if error <= 100.0 {
            card.score_with_warning("mass_accuracy", 0.2, detail, format!("mass error {:.1} ppm is poor for an identification", error));
        } else {
            card.reject("mass_accuracy", format!("mass error {:.1} ppm rules out the proposed compound", error));
        }
    }

    async fn spectral_match(&self, claim: &Value, card: &mut Scorecard) {
        let mut library_precursor = None;
        if let Some(id) = first_str(claim, &["massbank_id", "accession"]) {
            if !MASSBANK_ID_REGEX.is_match(&id) {
                card.reject("massbank_record", format!("'{}' is not a MassBank accession", id));
            } else {
                let url = format!("{}/{}", MASSBANK, encode(&id));
                match self.http.lookup_json(&url).await {
                    Ok(Some(record)) => {
                        library_precursor = massbank_precursor(&record);
                        card.score(
                            "massbank_record",
                            1.0,
                            json!({ "accession": id, "precursor_mz": library_precursor }),
                        );
                    }
                    Ok(None) => card.reject("massbank_record", format!("MassBank has no record {}", id)),
                    Err(e) => unavailable(card, "massbank_record", "MassBank", &e),
                }
            }
        }

        if let Some(cosine) = first_num(claim, &["cosine_score", "similarity", "match_score"]) {
            if let Some(cosine) = in_range(card, "similarity_score", "cosine similarity", cosine, 0.0, 1.0) {
                if cosine >= 0.7 {
                    card.score("similarity_score", 1.0, json!({ "cosine": cosine }));
                } else if cosine >= 0.5 {
                    card.score_with_warning("similarity_score", 0.6, json!({ "cosine": cosine }), "cosine similarity below 0.7 is a weak match");
                } else {
                    card.score_with_warning("similarity_score", 0.2, json!({ "cosine": cosine }), "cosine similarity below 0.5 does not support a match");
                }
            }
        }

        if let Some(matched) = first_num(claim, &["matched_peaks", "shared_peaks"]) {
            let total = first_num(claim, &["total_peaks", "num_peaks"]);
            if matched < 0.0 || matched.fract() != 0.0 {
                card.reject("matched_peaks", format!("matched peak count {} is not a count", matched));
            } else if total.is_some_and(|t| matched > t) {
                card.reject("matched_peaks", "more matched peaks than peaks in the spectrum");
            } else if matched >= 6.0 {
                card.score("matched_peaks", 1.0, json!({ "matched": matched }));
            } else if matched >= 3.0 {
                card.score_with_warning("matched_peaks", 0.6, json!({ "matched": matched }), "fewer than 6 matched peaks");
            } else {
                card.score_with_warning("matched_peaks", 0.2, json!({ "matched": matched }), "fewer than 3 matched peaks");
            }
        }

        if let Some(mz) = first_num(claim, &["precursor_mz", "observed_mz"]) {
            if mz <= 0.0 || mz > 5000.0 {
                card.reject("precursor_mz", format!("precursor m/z {} is outside (0, 5000]", mz));
            } else {
                match library_precursor {
                    Some(reference) if (mz - reference).abs() <= PRECURSOR_TOLERANCE_DA => {
                        card.score("precursor_mz", 1.0, json!({ "claimed": mz, "library": reference }))
                    }
                    Some(reference) => card.reject(
                        "precursor_mz",
                        format!("precursor m/z {} differs from the library record {}", mz, reference),
                    ),
                    None => card.score("precursor_mz", 0.7, json!({ "claimed": mz, "library": null })),
                }
            }
        }

        score_adduct(card, claim);

        if let Some(raw) = first_str(claim, &["collision_energy", "ce"]) {
            let energy = LEADING_NUMBER_REGEX
                .captures(&raw)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok());
            match energy {
                Some(e) if e > 0.0 && e <= 200.0 => card.score("collision_energy", 1.0, json!({ "energy": e, "claimed": raw })),
                _ => card.reject("collision_energy", format!("collision energy '{}' is not in (0, 200]", raw)),
            }
        }
    }
}

#[async_trait]
impl DomainAdapter for MetabolomicsAdapter {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn claim_types(&self) -> &'static [ClaimTypeSpec] {
        METABOLOMICS_CLAIM_TYPES
    }

    async fn verify(&self, claim: &Value, metadata: &ClaimMetadata) -> Result<VerificationResult, VerifyError> {
        let started = Instant::now();
        let (spec, inferred) = resolve_claim_type(DOMAIN, METABOLOMICS_CLAIM_TYPES, claim, metadata)?;
        info!("Verifying {} claim ({})", DOMAIN, spec.name);

        let mut card = Scorecard::new(spec);
        if let Some(warning) = inferred {
            card.warn(warning);
        }
        match spec.name {
            "spectral_match" => self.spectral_match(claim, &mut card).await,
            "compound_identification" => self.compound_identification(claim, &mut card).await,
            _ => return Err(unhandled_claim_type(DOMAIN, spec, METABOLOMICS_CLAIM_TYPES)),
        }

        debug!("{} {} total {}", DOMAIN, spec.name, card.total());
        Ok(card.finish(DOMAIN, &BadgePolicy::default(), started))
    }
}
