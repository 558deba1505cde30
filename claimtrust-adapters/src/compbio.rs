//! Computational Biology Adapter
//!
//! Structure prediction, protein design and docking claims. Targets are
//! resolved against RCSB PDB and the AlphaFold database, templates against
//! UniProt and ligands against PubChem.

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
    check_sequence, heavy_atoms, in_range, is_pdb_id, is_uniprot_accession, score_reference, unavailable, Alphabet,
};
use crate::sources::{pubchem_by_cid, pubchem_by_name, rcsb_entry, uniprot_entry, PubchemCompound};
use crate::traits::{resolve_claim_type, unhandled_claim_type, DomainAdapter};

const DOMAIN: &str = "computational_biology";

const ALPHAFOLD_DB: &str = "https://alphafold.ebi.ac.uk/api/prediction";

/// Tolerance between a claimed and recomputed ligand efficiency
const LIGAND_EFFICIENCY_TOLERANCE: f64 = 0.05;

pub static COMPBIO_CLAIM_TYPES: &[ClaimTypeSpec] = &[
    ClaimTypeSpec {
        name: "docking",
        weights: &[
            ("binding_affinity", 0.25),
            ("pdb_target", 0.20),
            ("ligand", 0.20),
            ("pose_rmsd", 0.15),
            ("tool", 0.10),
            ("ligand_efficiency", 0.10),
        ],
    },
    ClaimTypeSpec {
        name: "protein_design",
        weights: &[
            ("sequence_validity", 0.25),
            ("template_reference", 0.15),
            ("sequence_recovery", 0.15),
            ("stability", 0.15),
            ("tool", 0.15),
            ("biophysical_properties", 0.15),
        ],
    },
    ClaimTypeSpec {
        name: "structure_prediction",
        weights: &[
            ("pdb_reference", 0.20),
            ("plddt", 0.20),
            ("ptm", 0.15),
            ("rmsd", 0.15),
            ("tm_score", 0.15),
            ("secondary_structure", 0.15),
        ],
    },
];

static ALPHAFOLD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^AF-([A-Z0-9]+)-F\d+(?:-model_v\d+)?$").unwrap());

const DOCKING_TOOLS: &[&str] = &[
    "autodockvina", "vina", "autodock", "smina", "gnina", "qvina", "glide", "gold", "rdock", "dock6",
    "ledock", "haddock", "hdock", "diffdock", "equibind", "flexx", "surflex", "plants", "moe", "icm",
];

const DESIGN_TOOLS: &[&str] = &[
    "proteinmpnn", "ligandmpnn", "rfdiffusion", "rosetta", "esmif1", "esmif", "chroma", "evodiff",
    "progen2", "protgpt2", "colabdesign", "bindcraft", "frame2seq", "rosettafold", "alphafold2",
];

/// Three-state and eight-state (DSSP) secondary structure codes
const SECONDARY_STRUCTURE_CODES: &str = "HGIEBTSCLP- ";

/// Verifier for the computational biology domain
pub struct CompBioAdapter {
    http: HttpClient,
}

impl CompBioAdapter {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    async fn pdb_lookup(&self, card: &mut Scorecard, component: &str, id: &str) {
        if !is_pdb_id(id) {
            card.reject(component, format!("'{}' is not a PDB identifier", id));
            return;
        }
        match rcsb_entry(&self.http, id).await {
            Ok(Some(entry)) => card.score(
                component,
                1.0,
                json!({ "pdb_id": id.to_ascii_uppercase(), "title": entry["struct"]["title"].clone() }),
            ),
            Ok(None) => card.reject(component, format!("PDB entry {} does not exist", id.to_ascii_uppercase())),
            Err(e) => unavailable(card, component, "RCSB PDB", &e),
        }
    }

    async fn ligand_lookup(&self, claim: &Value) -> Option<(String, Lookup<PubchemCompound>)> {
        if let Some(cid) = first_str(claim, &["ligand_cid", "pubchem_cid"]) {
            let lookup = pubchem_by_cid(&self.http, &cid).await;
            return Some((format!("CID {}", cid), lookup));
        }
        let name = first_str(claim, &["ligand", "ligand_name"])?;
        let lookup = pubchem_by_name(&self.http, &name).await;
        Some((name, lookup))
    }

    async fn docking(&self, claim: &Value, card: &mut Scorecard) {
        let affinity = first_num(claim, &["binding_affinity", "docking_score", "affinity"]);
        if let Some(value) = affinity {
            if let Some(value) = in_range(card, "binding_affinity", "binding affinity (kcal/mol)", value, -25.0, 5.0) {
                if value > 0.0 {
                    card.score_with_warning(
                        "binding_affinity",
                        0.3,
                        json!({ "kcal_per_mol": value }),
                        format!("binding affinity {} kcal/mol is unfavourable", value),
                    );
                } else if value <= -15.0 {
                    card.score_with_warning(
                        "binding_affinity",
                        0.6,
                        json!({ "kcal_per_mol": value }),
                        format!("binding affinity {} kcal/mol is unusually strong for docking", value),
                    );
                } else {
                    card.score("binding_affinity", 1.0, json!({ "kcal_per_mol": value }));
                }
            }
        }

        if let Some(target) = first_str(claim, &["receptor_pdb", "pdb_id", "target_pdb"]) {
            self.pdb_lookup(card, "pdb_target", &target).await;
        }

        let mut ligand_heavy_atoms = first_num(claim, &["heavy_atoms", "heavy_atom_count"]);
        if let Some((label, lookup)) = self.ligand_lookup(claim).await {
            match lookup {
                Ok(Some(compound)) => {
                    if ligand_heavy_atoms.is_none() {
                        ligand_heavy_atoms = compound
                            .molecular_formula
                            .as_deref()
                            .and_then(heavy_atoms)
                            .map(f64::from);
                    }
                    card.score(
                        "ligand",
                        1.0,
                        json!({ "ligand": label, "cid": compound.cid, "formula": compound.molecular_formula }),
                    );
                }
                Ok(None) => card.reject("ligand", format!("ligand {} not found in PubChem", label)),
                Err(e) => unavailable(card, "ligand", "PubChem", &e),
            }
        }

        if let Some(rmsd) = first_num(claim, &["pose_rmsd", "rmsd"]) {
            if rmsd < 0.0 {
                card.reject("pose_rmsd", format!("pose RMSD {} cannot be negative", rmsd));
            } else if rmsd <= 2.0 {
                card.score("pose_rmsd", 1.0, json!({ "angstrom": rmsd }));
            } else if rmsd <= 3.0 {
                card.score_with_warning("pose_rmsd", 0.6, json!({ "angstrom": rmsd }), "pose RMSD above the 2 Å success cutoff");
            } else {
                card.score_with_warning("pose_rmsd", 0.2, json!({ "angstrom": rmsd }), format!("pose RMSD {} Å does not reproduce the reference pose", rmsd));
            }
        }

        score_reference(card, "tool", "docking tool", first_str(claim, &["tool", "docking_program", "software"]), DOCKING_TOOLS);

        if let Some(claimed) = first_num(claim, &["ligand_efficiency", "le"]) {
            let computed = match (affinity, ligand_heavy_atoms) {
                (Some(dg), Some(atoms)) if atoms > 0.0 => Some(-dg / atoms),
                _ => None,
            };
            match computed {
                Some(computed) if (claimed - computed).abs() <= LIGAND_EFFICIENCY_TOLERANCE => {
                    card.score("ligand_efficiency", 1.0, json!({ "claimed": claimed, "computed": computed }))
                }
                Some(computed) => card.reject(
                    "ligand_efficiency",
                    format!("ligand efficiency {} disagrees with -ΔG/heavy atoms = {:.3}", claimed, computed),
                ),
                None => {
                    if in_range(card, "ligand_efficiency", "ligand efficiency", claimed, 0.0, 1.5).is_some() {
                        card.score_with_warning(
                            "ligand_efficiency",
                            0.7,
                            json!({ "claimed": claimed, "computed": null }),
                            "ligand efficiency could not be recomputed without heavy atom count",
                        );
                    }
                }
            }
        }
    }

    async fn protein_design(&self, claim: &Value, card: &mut Scorecard) {
        if let Some(sequence) = first_str(claim, &["designed_sequence", "sequence"]) {
            if check_sequence(card, "sequence_validity", &sequence, Some(Alphabet::Protein)).is_some() {
                card.neutral(
                    "biophysical_properties",
                    "ProtParam-equivalent analysis unavailable; biophysical_properties scored neutral",
                );
            }
        }

        if let Some(template) = first_str(claim, &["template_accession", "template_pdb", "template"]) {
            if is_uniprot_accession(&template) {
                match uniprot_entry(&self.http, &template).await {
                    Ok(Some(entry)) => card.score(
                        "template_reference",
                        1.0,
                        json!({ "uniprot": entry.primary_accession, "length": entry.length() }),
                    ),
                    Ok(None) => card.reject("template_reference", format!("UniProt has no entry {}", template)),
                    Err(e) => unavailable(card, "template_reference", "UniProt", &e),
                }
            } else {
                self.pdb_lookup(card, "template_reference", &template).await;
            }
        }

        if let Some(recovery) = first_num(claim, &["sequence_recovery", "recovery"]) {
            let fraction = if recovery > 1.0 { recovery / 100.0 } else { recovery };
            if let Some(fraction) = in_range(card, "sequence_recovery", "sequence recovery", fraction, 0.0, 1.0) {
                if fraction > 0.9 {
                    card.score_with_warning(
                        "sequence_recovery",
                        0.6,
                        json!({ "fraction": fraction }),
                        "sequence recovery above 90% suggests the template was copied",
                    );
                } else {
                    card.score("sequence_recovery", 1.0, json!({ "fraction": fraction }));
                }
            }
        }

        if let Some(ddg) = first_num(claim, &["ddg", "delta_delta_g", "stability"]) {
            if ddg.abs() > 50.0 {
                card.reject("stability", format!("ΔΔG {} kcal/mol exceeds 50 in magnitude", ddg));
            } else {
                card.score("stability", 1.0, json!({ "ddg": ddg }));
            }
        }

        score_reference(card, "tool", "design tool", first_str(claim, &["tool", "method", "software"]), DESIGN_TOOLS);
    }

    async fn alphafold_lookup(&self, card: &mut Scorecard, id: &str, uniprot: &str) {
        let url = format!("{}/{}", ALPHAFOLD_DB, encode(uniprot));
        match self.http.lookup_json(&url).await {
            Ok(Some(body)) if body.as_array().is_some_and(|a| !a.is_empty()) => {
                card.score("pdb_reference", 1.0, json!({ "alphafold_id": id }))
            }
            Ok(_) => card.reject("pdb_reference", format!("AlphaFold DB has no model {}", id)),
            Err(e) => unavailable(card, "pdb_reference", "AlphaFold DB", &e),
        }
    }

    async fn structure_prediction(&self, claim: &Value, card: &mut Scorecard) {
        if let Some(reference) = first_str(claim, &["pdb_id", "reference_pdb", "alphafold_id"]) {
            let alphafold = ALPHAFOLD_REGEX
                .captures(&reference)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string());
            match alphafold {
                Some(uniprot) => self.alphafold_lookup(card, &reference, &uniprot).await,
                None => self.pdb_lookup(card, "pdb_reference", &reference).await,
            }
        }

        if let Some(plddt) = first_num(claim, &["plddt", "mean_plddt"]) {
            if let Some(plddt) = in_range(card, "plddt", "pLDDT", plddt, 0.0, 100.0) {
                if plddt >= 70.0 {
                    card.score("plddt", 1.0, json!({ "plddt": plddt }));
                } else if plddt >= 50.0 {
                    card.score_with_warning("plddt", 0.6, json!({ "plddt": plddt }), "pLDDT between 50 and 70 is low confidence");
                } else {
                    card.score_with_warning("plddt", 0.3, json!({ "plddt": plddt }), "pLDDT below 50 indicates disorder or a failed model");
                }
            }
        }

        if let Some(ptm) = first_num(claim, &["ptm", "p_tm"]) {
            if let Some(ptm) = in_range(card, "ptm", "pTM", ptm, 0.0, 1.0) {
                let score = if ptm >= 0.5 { 1.0 } else { 0.5 };
                card.score("ptm", score, json!({ "ptm": ptm }));
            }
        }

        if let Some(rmsd) = first_num(claim, &["rmsd", "ca_rmsd"]) {
            if rmsd < 0.0 {
                card.reject("rmsd", format!("RMSD {} cannot be negative", rmsd));
            } else {
                let score = if rmsd <= 2.0 {
                    1.0
                } else if rmsd <= 5.0 {
                    0.6
                } else {
                    0.3
                };
                card.score("rmsd", score, json!({ "angstrom": rmsd }));
            }
        }

        if let Some(tm) = first_num(claim, &["tm_score", "tmscore"]) {
            if let Some(tm) = in_range(card, "tm_score", "TM-score", tm, 0.0, 1.0) {
                if tm >= 0.5 {
                    card.score("tm_score", 1.0, json!({ "tm_score": tm }));
                } else if tm >= 0.17 {
                    card.score_with_warning("tm_score", 0.5, json!({ "tm_score": tm }), "TM-score below 0.5: folds differ");
                } else {
                    card.score_with_warning("tm_score", 0.2, json!({ "tm_score": tm }), "TM-score at random-structure level");
                }
            }
        }

        if let Some(ss) = first_str(claim, &["secondary_structure", "dssp"]) {
            let invalid: Vec<char> = ss
                .chars()
                .filter(|c| !SECONDARY_STRUCTURE_CODES.contains(c.to_ascii_uppercase()))
                .collect();
            if invalid.is_empty() {
                card.neutral(
                    "secondary_structure",
                    "DSSP unavailable; secondary_structure assignment not recomputed",
                );
            } else {
                card.reject(
                    "secondary_structure",
                    format!("secondary structure string has invalid codes: {}", invalid.iter().collect::<String>()),
                );
            }
        }
    }
}

#[async_trait]
impl DomainAdapter for CompBioAdapter {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn claim_types(&self) -> &'static [ClaimTypeSpec] {
        COMPBIO_CLAIM_TYPES
    }

    async fn verify(&self, claim: &Value, metadata: &ClaimMetadata) -> Result<VerificationResult, VerifyError> {
        let started = Instant::now();
        let (spec, inferred) = resolve_claim_type(DOMAIN, COMPBIO_CLAIM_TYPES, claim, metadata)?;
        info!("Verifying {} claim ({})", DOMAIN, spec.name);

        let mut card = Scorecard::new(spec);
        if let Some(warning) = inferred {
            card.warn(warning);
        }
        match spec.name {
            "docking" => self.docking(claim, &mut card).await,
            "protein_design" => self.protein_design(claim, &mut card).await,
            "structure_prediction" => self.structure_prediction(claim, &mut card).await,
            _ => return Err(unhandled_claim_type(DOMAIN, spec, COMPBIO_CLAIM_TYPES)),
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

    fn adapter(stub: StubFetcher) -> CompBioAdapter {
        CompBioAdapter::new(HttpClient::new(Arc::new(stub)))
    }

    fn meta(claim_type: &str) -> ClaimMetadata {
        ClaimMetadata::new(DOMAIN).with_claim_type(claim_type)
    }

    #[test]
    fn test_weights_sum_to_one() {
        for spec in COMPBIO_CLAIM_TYPES {
            assert!((spec.weight_sum() - 1.0).abs() < 1e-9, "{}", spec.name);
        }
    }

    #[test]
    fn test_claim_types_match_inference_table() {
        let mut inferred = claim_types_for(DOMAIN);
        let mut names: Vec<&str> = COMPBIO_CLAIM_TYPES.iter().map(|s| s.name).collect();
        inferred.sort();
        names.sort();
        assert_eq!(inferred, names);
    }

    #[tokio::test]
    async fn test_all_absent_is_neutral() {
        let adapter = adapter(StubFetcher::offline());
        for spec in COMPBIO_CLAIM_TYPES {
            let result = adapter.verify(&json!({}), &meta(spec.name)).await.unwrap();
            assert_eq!(result.score, 0.5, "{}", spec.name);
            assert!(result.warnings.is_empty());
        }
    }

    #[tokio::test]
    async fn test_docking_recomputes_ligand_efficiency() {
        let adapter = adapter(
            StubFetcher::new()
                .route("core/entry/1HSG", StubReply::json(json!({"struct": {"title": "HIV-1 protease"}})))
                .route(
                    "compound/name/indinavir",
                    StubReply::json(json!({"PropertyTable": {"Properties": [
                        {"CID": 5362440, "MolecularFormula": "C36H47N5O4", "MonoisotopicMass": "613.36"}
                    ]}})),
                ),
        );
        // 45 heavy atoms: LE = 11.7 / 45 = 0.26
        let claim = json!({
            "binding_affinity": -11.7,
            "receptor_pdb": "1hsg",
            "ligand": "indinavir",
            "pose_rmsd": 1.2,
            "tool": "AutoDock Vina 1.2",
            "ligand_efficiency": 0.26
        });
        let result = adapter.verify(&claim, &meta("docking")).await.unwrap();
        assert_eq!(result.score, 1.0);
    }

    #[tokio::test]
    async fn test_docking_out_of_range_affinity() {
        let adapter = adapter(StubFetcher::offline());
        let claim = json!({"binding_affinity": -40.0, "ligand_efficiency": 2.0});
        let result = adapter.verify(&claim, &meta("docking")).await.unwrap();
        let scores = &result.details["component_scores"];
        assert_eq!(scores["binding_affinity"], 0.0);
        assert_eq!(scores["ligand_efficiency"], 0.0);
    }

    #[tokio::test]
    async fn test_protein_design_neutral_biophysics() {
        let adapter = adapter(StubFetcher::offline());
        let claim = json!({
            "designed_sequence": "MKTAYIAKQRQISFVKSHFSRQ",
            "sequence_recovery": 45,
            "ddg": -1.8,
            "tool": "ProteinMPNN"
        });
        let result = adapter.verify(&claim, &meta("protein_design")).await.unwrap();
        let scores = &result.details["component_scores"];
        assert_eq!(scores["sequence_validity"], 1.0);
        assert_eq!(scores["biophysical_properties"], 0.5);
        assert_eq!(scores["sequence_recovery"], 1.0);
        assert!(result.warnings.iter().any(|w| w.contains("ProtParam")));
    }

    #[tokio::test]
    async fn test_structure_prediction_alphafold_reference() {
        let adapter = adapter(StubFetcher::new().route(
            "api/prediction/P69905",
            StubReply::json(json!([{"entryId": "AF-P69905-F1"}])),
        ));
        let claim = json!({
            "alphafold_id": "AF-P69905-F1",
            "plddt": 92.1,
            "ptm": 0.85,
            "tm_score": 0.91,
            "secondary_structure": "CCHHHHHHEEEECC"
        });
        let result = adapter.verify(&claim, &meta("structure_prediction")).await.unwrap();
        let scores = &result.details["component_scores"];
        assert_eq!(scores["pdb_reference"], 1.0);
        assert_eq!(scores["secondary_structure"], 0.5);
        assert!(result.errors.is_empty());
    }
}
