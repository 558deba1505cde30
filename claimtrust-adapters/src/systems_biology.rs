//! Systems Biology Adapter
//!
//! Flux balance, interaction network and pathway enrichment claims. Flux
//! vectors are checked against their stoichiometry directly; interactions
//! are confirmed against STRING and pathway ids against KEGG and Reactome.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, info};
use urlencoding::encode;

use claimtrust_core::math::{jaccard_similarity, relative_difference};
use claimtrust_core::value::{as_number, as_string, field, first_num, first_str, has_field, num_matrix};
use claimtrust_core::{BadgePolicy, ClaimMetadata, ClaimTypeSpec, Scorecard, VerificationResult, VerifyError};
use claimtrust_net::HttpClient;

use crate::checks::{in_range, score_reference, unavailable};
use crate::traits::{resolve_claim_type, unhandled_claim_type, DomainAdapter};

const DOMAIN: &str = "systems_biology";

const STRING_NETWORK: &str = "https://string-db.org/api/json/network";
const KEGG_GET: &str = "https://rest.kegg.jp/get";
const REACTOME_QUERY: &str = "https://reactome.org/ContentService/data/query";

/// Numerical tolerance for flux bounds and mass balance
const FLUX_TOLERANCE: f64 = 1e-6;
/// Proteins sent to STRING in one request
const MAX_STRING_IDENTIFIERS: usize = 100;
const DEFAULT_SPECIES: &str = "9606";

pub static SYSTEMS_BIOLOGY_CLAIM_TYPES: &[ClaimTypeSpec] = &[
    ClaimTypeSpec {
        name: "flux_balance",
        weights: &[
            ("stoichiometry_shape", 0.20),
            ("nonzero_entries", 0.15),
            ("flux_bounds", 0.25),
            ("steady_state", 0.20),
            ("objective_feasibility", 0.10),
            ("model_reference", 0.10),
        ],
    },
    ClaimTypeSpec {
        name: "network_analysis",
        weights: &[
            ("string_interactions", 0.30),
            ("graph_consistency", 0.20),
            ("degree_statistics", 0.15),
            ("confidence_threshold", 0.10),
            ("topology_metrics", 0.25),
        ],
    },
    ClaimTypeSpec {
        name: "pathway_enrichment",
        weights: &[
            ("kegg_pathway", 0.20),
            ("reactome_pathway", 0.20),
            ("p_value", 0.15),
            ("fdr", 0.15),
            ("gene_overlap", 0.15),
            ("method", 0.15),
        ],
    },
];

const GENOME_SCALE_MODELS: &[&str] = &[
    "iML1515", "iJO1366", "iAF1260", "iJR904", "e_coli_core", "Recon3D", "Recon2", "Recon1",
    "Human1", "HMR2", "Yeast8", "iMM904", "iND750", "iYO844", "iNF517", "iMM1415", "iCHOv1",
    "iRC1080", "iJN1463", "iJN746", "iPAE1146", "iYS1720", "iSB619", "iNJ661", "iEK1008",
    "AGORA", "iHN637", "iCN900", "iAT_PLT_636",
];

const ENRICHMENT_METHODS: &[&str] = &[
    "hypergeometric", "fisher", "ora", "gsea", "fgsea", "gsva", "ssgsea", "camera", "roast",
    "padog", "spia", "david", "enrichr", "g:profiler", "gprofiler", "clusterprofiler", "topgo",
    "goseq", "panther", "metascape", "reactomepa", "webgestalt", "gseapy", "decoupler",
];

const TOPOLOGY_FIELDS: &[&str] = &[
    "clustering_coefficient", "betweenness", "betweenness_centrality", "modularity",
    "closeness_centrality", "eigenvector_centrality", "diameter", "average_path_length",
];

static KEGG_PATHWAY_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:path:)?[a-z]{2,4}\d{5}$").unwrap());

static REACTOME_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^R-[A-Z]{3}-\d+(?:\.\d+)?$").unwrap());

/// KEGG flat-file `NAME` line
fn kegg_name(flat: &str) -> Option<String> {
    flat.lines()
        .find_map(|line| line.strip_prefix("NAME"))
        .map(|name| name.trim().to_string())
}

/// Flux bounds as `[lower, upper]` pairs or `{lower, upper}` objects
fn parse_bounds(value: &Value) -> Option<Vec<(f64, f64)>> {
    value
        .as_array()?
        .iter()
        .map(|bound| match bound {
            Value::Array(pair) if pair.len() == 2 => Some((as_number(&pair[0])?, as_number(&pair[1])?)),
            Value::Object(map) => {
                let lower = map.get("lower").or_else(|| map.get("lb")).and_then(as_number)?;
                let upper = map.get("upper").or_else(|| map.get("ub")).and_then(as_number)?;
                Some((lower, upper))
            }
            _ => None,
        })
        .collect()
}

/// `‖S·v‖∞`
pub fn mass_balance_residual(stoichiometry: &[Vec<f64>], fluxes: &[f64]) -> f64 {
    stoichiometry
        .iter()
        .map(|row| row.iter().zip(fluxes).map(|(s, v)| s * v).sum::<f64>().abs())
        .fold(0.0, f64::max)
}

/// Undirected edge with case-folded endpoints, smaller name first
fn edge_key(a: &str, b: &str) -> (String, String) {
    let (a, b) = (a.trim().to_ascii_uppercase(), b.trim().to_ascii_uppercase());
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn endpoint(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| map.get(*k).and_then(as_string))
}

/// Edges as `[a, b]` pairs or objects naming their endpoints
pub fn parse_edges(claim: &Value) -> Option<Vec<(String, String)>> {
    let items = field(claim, "interactions").or_else(|| field(claim, "edges"))?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| match item {
                Value::Array(pair) if pair.len() >= 2 => Some((as_string(&pair[0])?, as_string(&pair[1])?)),
                Value::Object(map) => Some((
                    endpoint(map, &["source", "protein_a", "node1", "preferredName_A", "a"])?,
                    endpoint(map, &["target", "protein_b", "node2", "preferredName_B", "b"])?,
                )),
                _ => None,
            })
            .collect(),
    )
}

/// Verifier for the systems biology domain
pub struct SystemsBiologyAdapter {
    http: HttpClient,
}

impl SystemsBiologyAdapter {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    async fn flux_balance(&self, claim: &Value, card: &mut Scorecard) {
        let matrix = num_matrix(claim, "stoichiometry_matrix");
        let fluxes: Option<Vec<f64>> = field(claim, "flux_vector")
            .and_then(Value::as_array)
            .and_then(|items| items.iter().map(as_number).collect());

        if has_field(claim, "stoichiometry_matrix") && matrix.is_none() {
            card.reject("stoichiometry_shape", "stoichiometry_matrix must be an array of numeric rows");
        }
        if has_field(claim, "flux_vector") && fluxes.is_none() {
            card.reject("flux_bounds", "flux_vector must be an array of numbers");
        }

        let mut shape_ok = false;
        if let Some(matrix) = &matrix {
            let rows = matrix.len();
            let columns = matrix.first().map_or(0, Vec::len);
            let claimed_rows = first_num(claim, &["num_metabolites"]);
            let claimed_columns = first_num(claim, &["num_reactions"]);
            if rows == 0 || columns == 0 {
                card.reject("stoichiometry_shape", "stoichiometry_matrix is empty");
            } else if matrix.iter().any(|row| row.len() != columns) {
                card.reject("stoichiometry_shape", "stoichiometry_matrix rows have unequal lengths");
            } else if fluxes.as_ref().is_some_and(|v| v.len() != columns) {
                card.reject(
                    "stoichiometry_shape",
                    format!("flux_vector has {} entries but the matrix has {} reactions", fluxes.as_ref().map_or(0, Vec::len), columns),
                );
            } else if claimed_rows.is_some_and(|r| r != rows as f64) || claimed_columns.is_some_and(|c| c != columns as f64) {
                card.reject("stoichiometry_shape", format!("claimed model size does not match the {}x{} matrix", rows, columns));
            } else {
                shape_ok = true;
                card.score("stoichiometry_shape", 1.0, json!({ "metabolites": rows, "reactions": columns }));
            }

            if shape_ok {
                let nonzero = matrix.iter().flatten().filter(|s| **s != 0.0).count();
                let empty_reactions = (0..columns).filter(|&j| matrix.iter().all(|row| row[j] == 0.0)).count();
                let detail = json!({ "nonzero": nonzero, "empty_reactions": empty_reactions });
                if nonzero == 0 {
                    card.reject("nonzero_entries", "stoichiometry_matrix has no non-zero entries");
                } else if first_num(claim, &["nonzero_entries"]).is_some_and(|n| n != nonzero as f64) {
                    card.reject("nonzero_entries", format!("claimed non-zero count differs from the matrix ({})", nonzero));
                } else if empty_reactions > 0 {
                    card.score_with_warning(
                        "nonzero_entries",
                        0.6,
                        detail,
                        format!("{} reactions involve no metabolite", empty_reactions),
                    );
                } else {
                    card.score("nonzero_entries", 1.0, detail);
                }
            }
        }

        if let Some(fluxes) = &fluxes {
            match field(claim, "flux_bounds") {
                None => {}
                Some(raw) => match parse_bounds(raw) {
                    None => card.reject("flux_bounds", "flux_bounds must be [lower, upper] pairs"),
                    Some(bounds) if bounds.len() != fluxes.len() => card.reject(
                        "flux_bounds",
                        format!("{} bounds for {} fluxes", bounds.len(), fluxes.len()),
                    ),
                    Some(bounds) if bounds.iter().any(|(lo, hi)| lo > hi) => {
                        card.reject("flux_bounds", "a lower flux bound exceeds its upper bound")
                    }
                    Some(bounds) => {
                        let violations = fluxes
                            .iter()
                            .zip(&bounds)
                            .filter(|(v, (lo, hi))| **v < lo - FLUX_TOLERANCE || **v > hi + FLUX_TOLERANCE)
                            .count();
                        let detail = json!({ "violations": violations, "reactions": fluxes.len() });
                        if violations == 0 {
                            card.score("flux_bounds", 1.0, detail);
                        } else {
                            let score = 1.0 - violations as f64 / fluxes.len() as f64;
                            card.score("flux_bounds", score, detail);
                            card.error(format!("{} fluxes violate their bounds", violations));
                        }
                    }
                },
            }

            if let (Some(matrix), true) = (&matrix, shape_ok) {
                let residual = mass_balance_residual(matrix, fluxes);
                if residual <= FLUX_TOLERANCE {
                    card.score("steady_state", 1.0, json!({ "max_residual": residual }));
                } else {
                    card.reject("steady_state", format!("S·v is not zero (max residual {:.3e})", residual));
                }
            }
        }

        if has_field(claim, "objective_value") {
            card.neutral(
                "objective_feasibility",
                "no LP solver available; objective_feasibility scored neutral",
            );
        }

        score_reference(
            card,
            "model_reference",
            "genome-scale model",
            first_str(claim, &["model_id", "model_name", "model"]),
            GENOME_SCALE_MODELS,
        );
    }

    async fn network_analysis(&self, claim: &Value, card: &mut Scorecard) {
        let edges = parse_edges(claim);
        let nodes: Option<HashSet<String>> = edges.as_ref().map(|edges| {
            edges
                .iter()
                .flat_map(|(a, b)| [a.trim().to_ascii_uppercase(), b.trim().to_ascii_uppercase()])
                .collect()
        });

        if let (Some(edges), Some(nodes)) = (&edges, &nodes) {
            if edges.is_empty() {
                card.reject("string_interactions", "interaction list is empty");
            } else {
                self.confirm_with_string(claim, edges, nodes, card).await;
            }
        }

        let edge_count = edges
            .as_ref()
            .map(|e| e.iter().map(|(a, b)| edge_key(a, b)).collect::<HashSet<_>>().len() as f64)
            .or_else(|| first_num(claim, &["num_edges"]));
        let node_count = nodes
            .as_ref()
            .map(|n| n.len() as f64)
            .or_else(|| first_num(claim, &["num_nodes"]));

        let mut problems = Vec::new();
        if let (Some(claimed), Some(n)) = (first_num(claim, &["num_nodes"]), nodes.as_ref()) {
            if claimed != n.len() as f64 {
                problems.push(format!("num_nodes {} but the edge list touches {} nodes", claimed, n.len()));
            }
        }
        if let (Some(claimed), Some(e)) = (first_num(claim, &["num_edges"]), edges.as_ref().and(edge_count)) {
            if claimed != e {
                problems.push(format!("num_edges {} but the edge list has {} distinct edges", claimed, e));
            }
        }
        if let (Some(n), Some(e)) = (node_count, edge_count) {
            let max_edges = n * (n - 1.0) / 2.0;
            if e > max_edges {
                problems.push(format!("{} edges exceed the {} possible in a simple graph", e, max_edges));
            }
            if let Some(claimed) = first_num(claim, &["network_density", "density"]) {
                if max_edges > 0.0 && (claimed - e / max_edges).abs() > 0.01 {
                    problems.push(format!("density {} disagrees with 2E/(N(N-1)) = {:.4}", claimed, e / max_edges));
                }
            }
        }
        let self_loops = edges.as_ref().map_or(0, |e| e.iter().filter(|(a, b)| a.eq_ignore_ascii_case(b)).count());
        if edges.is_some() || first_num(claim, &["num_nodes", "num_edges", "network_density"]).is_some() {
            if problems.is_empty() {
                let detail = json!({ "nodes": node_count, "edges": edge_count, "self_loops": self_loops });
                if self_loops > 0 {
                    card.score_with_warning("graph_consistency", 0.8, detail, format!("{} self-loops in the network", self_loops));
                } else {
                    card.score("graph_consistency", 1.0, detail);
                }
            } else {
                card.reject("graph_consistency", problems.join("; "));
            }
        }

        if let Some(mean_degree) = first_num(claim, &["mean_degree", "average_degree"]) {
            match (node_count, edge_count) {
                (Some(n), Some(e)) if n > 0.0 => {
                    let expected = 2.0 * e / n;
                    match relative_difference(mean_degree, expected) {
                        Some(diff) if diff > 0.05 => card.reject(
                            "degree_statistics",
                            format!("mean degree {} disagrees with 2E/N = {:.3}", mean_degree, expected),
                        ),
                        _ => card.score("degree_statistics", 1.0, json!({ "claimed": mean_degree, "expected": expected })),
                    }
                }
                _ => {
                    if in_range(card, "degree_statistics", "mean degree", mean_degree, 0.0, f64::MAX).is_some() {
                        card.score("degree_statistics", 0.7, json!({ "claimed": mean_degree, "expected": null }));
                    }
                }
            }
        }
        if let (Some(max_degree), Some(n)) = (first_num(claim, &["max_degree"]), node_count) {
            if max_degree > n - 1.0 {
                card.reject("degree_statistics", format!("max degree {} exceeds N-1 = {}", max_degree, n - 1.0));
            }
        }

        if let Some(threshold) = first_num(claim, &["confidence_threshold", "score_threshold", "required_score"]) {
            let scaled = if threshold > 1.0 { threshold / 1000.0 } else { threshold };
            if let Some(scaled) = in_range(card, "confidence_threshold", "confidence threshold", scaled, 0.0, 1.0) {
                if scaled >= 0.4 {
                    card.score("confidence_threshold", 1.0, json!({ "threshold": scaled }));
                } else {
                    card.score_with_warning(
                        "confidence_threshold",
                        0.4,
                        json!({ "threshold": scaled }),
                        format!("interaction confidence threshold {} is below STRING's medium confidence (0.4)", scaled),
                    );
                }
            }
        }

        let topology: Vec<&str> = TOPOLOGY_FIELDS.iter().copied().filter(|f| has_field(claim, f)).collect();
        if !topology.is_empty() {
            let out_of_range = first_num(claim, &["clustering_coefficient"]).is_some_and(|c| !(0.0..=1.0).contains(&c));
            if out_of_range {
                card.reject("topology_metrics", "clustering coefficient must lie in [0, 1]");
            } else {
                card.neutral(
                    "topology_metrics",
                    "graph algorithms library unavailable; topology_metrics scored neutral",
                );
            }
        }
    }

    async fn confirm_with_string(
        &self,
        claim: &Value,
        edges: &[(String, String)],
        nodes: &HashSet<String>,
        card: &mut Scorecard,
    ) {
        let mut identifiers: Vec<&String> = nodes.iter().collect();
        identifiers.sort();
        identifiers.truncate(MAX_STRING_IDENTIFIERS);
        let species = first_str(claim, &["species", "taxon_id", "organism_id"]).unwrap_or_else(|| DEFAULT_SPECIES.to_string());
        let joined = identifiers.iter().map(|s| s.as_str()).collect::<Vec<_>>().join("\r");
        let url = format!("{}?identifiers={}&species={}", STRING_NETWORK, encode(&joined), encode(&species));

        match self.http.lookup_json(&url).await {
            Ok(Some(Value::Array(rows))) => {
                let known: HashSet<(String, String)> = rows
                    .iter()
                    .filter_map(Value::as_object)
                    .filter_map(|row| {
                        Some(edge_key(
                            &endpoint(row, &["preferredName_A", "stringId_A"])?,
                            &endpoint(row, &["preferredName_B", "stringId_B"])?,
                        ))
                    })
                    .collect();
                let claimed: HashSet<(String, String)> = edges.iter().map(|(a, b)| edge_key(a, b)).collect();
                let confirmed = claimed.iter().filter(|e| known.contains(*e)).count();
                let share = confirmed as f64 / claimed.len() as f64;
                let detail = json!({ "confirmed": confirmed, "claimed": claimed.len(), "share": share });
                if share < 0.5 {
                    card.score_with_warning(
                        "string_interactions",
                        share,
                        detail,
                        format!("only {} of {} claimed interactions are in STRING", confirmed, claimed.len()),
                    );
                } else {
                    card.score("string_interactions", share, detail);
                }
            }
            Ok(Some(_)) | Ok(None) => card.reject("string_interactions", "STRING does not recognize the claimed proteins"),
            Err(e) => unavailable(card, "string_interactions", "STRING", &e),
        }
    }

    async fn pathway_enrichment(&self, claim: &Value, card: &mut Scorecard) {
        let generic = first_str(claim, &["pathway_id"]);
        let kegg = first_str(claim, &["kegg_pathway", "kegg_id"])
            .or_else(|| generic.clone().filter(|id| KEGG_PATHWAY_REGEX.is_match(id)));
        let reactome = first_str(claim, &["reactome_pathway", "reactome_id"])
            .or_else(|| generic.clone().filter(|id| REACTOME_REGEX.is_match(id)));
        let claimed_name = first_str(claim, &["pathway_name", "term_name"]);

        if let Some(id) = kegg {
            if !KEGG_PATHWAY_REGEX.is_match(&id) {
                card.reject("kegg_pathway", format!("'{}' is not a KEGG pathway id", id));
            } else {
                let id = id.trim_start_matches("path:").to_string();
                match self.http.lookup_text(&format!("{}/{}", KEGG_GET, id)).await {
                    Ok(Some(flat)) if !flat.trim().is_empty() => {
                        let name = kegg_name(&flat);
                        self.score_pathway_name(card, "kegg_pathway", &id, name, claimed_name.as_deref());
                    }
                    Ok(_) => card.reject("kegg_pathway", format!("KEGG has no pathway {}", id)),
                    Err(e) => unavailable(card, "kegg_pathway", "KEGG", &e),
                }
            }
        }

        if let Some(id) = reactome {
            if !REACTOME_REGEX.is_match(&id) {
                card.reject("reactome_pathway", format!("'{}' is not a Reactome stable id", id));
            } else {
                match self.http.lookup_json(&format!("{}/{}", REACTOME_QUERY, encode(&id))).await {
                    Ok(Some(record)) => {
                        let name = record.get("displayName").and_then(as_string);
                        self.score_pathway_name(card, "reactome_pathway", &id, name, claimed_name.as_deref());
                    }
                    Ok(None) => card.reject("reactome_pathway", format!("Reactome has no pathway {}", id)),
                    Err(e) => unavailable(card, "reactome_pathway", "Reactome", &e),
                }
            }
        }

        let p_value = first_num(claim, &["p_value", "pvalue"]);
        if let Some(p) = p_value {
            if let Some(p) = in_range(card, "p_value", "p_value", p, 0.0, 1.0) {
                if p <= 0.05 {
                    card.score("p_value", 1.0, json!({ "p_value": p }));
                } else {
                    card.score_with_warning("p_value", 0.3, json!({ "p_value": p }), "enrichment p_value is not significant at 0.05");
                }
            }
        }

        if let Some(fdr) = first_num(claim, &["fdr", "adjusted_p_value", "q_value", "padj"]) {
            if let Some(fdr) = in_range(card, "fdr", "FDR", fdr, 0.0, 1.0) {
                if p_value.is_some_and(|p| fdr + 1e-12 < p) {
                    card.reject("fdr", "adjusted p-value is smaller than the raw p-value");
                } else if fdr <= 0.05 {
                    card.score("fdr", 1.0, json!({ "fdr": fdr }));
                } else if fdr <= 0.25 {
                    card.score_with_warning("fdr", 0.6, json!({ "fdr": fdr }), "FDR above 0.05 is only suggestive");
                } else {
                    card.score_with_warning("fdr", 0.3, json!({ "fdr": fdr }), "FDR above 0.25 is not significant");
                }
            }
        }

        if let Some(overlap) = first_num(claim, &["overlap_count", "overlap"]) {
            self.gene_overlap(claim, overlap, card);
        }

        score_reference(
            card,
            "method",
            "enrichment method",
            first_str(claim, &["enrichment_method", "method"]),
            ENRICHMENT_METHODS,
        );
    }

    fn score_pathway_name(
        &self,
        card: &mut Scorecard,
        component: &str,
        id: &str,
        name: Option<String>,
        claimed: Option<&str>,
    ) {
        let detail = json!({ "id": id, "name": name });
        match (name.as_deref(), claimed) {
            (Some(name), Some(claimed)) if jaccard_similarity(name, claimed) < 0.3 => card.score_with_warning(
                component,
                0.7,
                detail,
                format!("{} is '{}', not '{}'", id, name, claimed),
            ),
            _ => card.score(component, 1.0, detail),
        }
    }

    fn gene_overlap(&self, claim: &Value, overlap: f64, card: &mut Scorecard) {
        let pathway_size = first_num(claim, &["pathway_size", "set_size"]);
        let query_size = first_num(claim, &["query_size", "input_size", "gene_list_size"]);
        let background = first_num(claim, &["background_size", "universe_size"]);
        let genes = field(claim, "overlap_genes")
            .and_then(Value::as_array)
            .map(Vec::len);

        if overlap < 0.0 || overlap.fract() != 0.0 {
            card.reject("gene_overlap", format!("overlap {} is not a gene count", overlap));
            return;
        }
        if pathway_size.is_some_and(|k| overlap > k) || query_size.is_some_and(|n| overlap > n) {
            card.reject("gene_overlap", "overlap exceeds the pathway or query size");
            return;
        }
        if let (Some(k), Some(total)) = (pathway_size, background) {
            if k > total {
                card.reject("gene_overlap", "pathway is larger than the background gene set");
                return;
            }
        }
        if genes.is_some_and(|g| g as f64 != overlap) {
            card.reject("gene_overlap", "overlap_genes does not have overlap_count entries");
            return;
        }
        let fold = match (pathway_size, query_size, background) {
            (Some(k), Some(n), Some(total)) if k > 0.0 && n > 0.0 => Some((overlap / n) / (k / total)),
            _ => None,
        };
        card.score("gene_overlap", 1.0, json!({ "overlap": overlap, "fold_enrichment": fold }));
    }
}

#[async_trait]
impl DomainAdapter for SystemsBiologyAdapter {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn claim_types(&self) -> &'static [ClaimTypeSpec] {
        SYSTEMS_BIOLOGY_CLAIM_TYPES
    }

    async fn verify(&self, claim: &Value, metadata: &ClaimMetadata) -> Result<VerificationResult, VerifyError> {
        let started = Instant::now();
        let (spec, inferred) = resolve_claim_type(DOMAIN, SYSTEMS_BIOLOGY_CLAIM_TYPES, claim, metadata)?;
        info!("Verifying {} claim ({})", DOMAIN, spec.name);

        let mut card = Scorecard::new(spec);
        if let Some(warning) = inferred {
            card.warn(warning);
        }
        match spec.name {
            "flux_balance" => self.flux_balance(claim, &mut card).await,
            "network_analysis" => self.network_analysis(claim, &mut card).await,
            "pathway_enrichment" => self.pathway_enrichment(claim, &mut card).await,
            _ => return Err(unhandled_claim_type(DOMAIN, spec, SYSTEMS_BIOLOGY_CLAIM_TYPES)),
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

    fn adapter(stub: StubFetcher) -> SystemsBiologyAdapter {
        SystemsBiologyAdapter::new(HttpClient::new(Arc::new(stub)))
    }

    fn meta(claim_type: &str) -> ClaimMetadata {
        ClaimMetadata::new(DOMAIN).with_claim_type(claim_type)
    }

    #[test]
    fn test_weights_sum_to_one() {
        for spec in SYSTEMS_BIOLOGY_CLAIM_TYPES {
            assert!((spec.weight_sum() - 1.0).abs() < 1e-9, "{}", spec.name);
        }
    }

    #[test]
    fn test_claim_types_match_inference_table() {
        let mut inferred = claim_types_for(DOMAIN);
        let mut names: Vec<&str> = SYSTEMS_BIOLOGY_CLAIM_TYPES.iter().map(|s| s.name).collect();
        inferred.sort();
        names.sort();
        assert_eq!(inferred, names);
    }

    #[test]
    fn test_mass_balance_residual() {
        // A -> B -> C with an uptake and a secretion
        let s = vec![vec![1.0, -1.0, 0.0], vec![0.0, 1.0, -1.0]];
        assert_eq!(mass_balance_residual(&s, &[2.0, 2.0, 2.0]), 0.0);
        assert_eq!(mass_balance_residual(&s, &[2.0, 1.0, 1.0]), 1.0);
    }

    #[test]
    fn test_parse_edges_pairs_and_objects() {
        let claim = json!({"interactions": [["TP53", "MDM2"], {"source": "TP53", "target": "ATM"}, 7]});
        let edges = parse_edges(&claim).unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[1], ("TP53".to_string(), "ATM".to_string()));
    }

    #[tokio::test]
    async fn test_all_absent_is_neutral() {
        let adapter = adapter(StubFetcher::offline());
        for spec in SYSTEMS_BIOLOGY_CLAIM_TYPES {
            let result = adapter.verify(&json!({}), &meta(spec.name)).await.unwrap();
            assert_eq!(result.score, 0.5, "{}", spec.name);
        }
    }

    #[tokio::test]
    async fn test_flux_balance_steady_state_and_bounds() {
        let adapter = adapter(StubFetcher::offline());
        let claim = json!({
            "stoichiometry_matrix": [[1, -1, 0], [0, 1, -1]],
            "flux_vector": [2.0, 2.0, 2.0],
            "flux_bounds": [[0, 10], [0, 10], [0, 1]],
            "objective_value": 2.0,
            "model_id": "e_coli_core"
        });
        let result = adapter.verify(&claim, &meta("flux_balance")).await.unwrap();
        let scores = &result.details["component_scores"];
        assert_eq!(scores["stoichiometry_shape"], 1.0);
        assert_eq!(scores["steady_state"], 1.0);
        assert_eq!(scores["objective_feasibility"], 0.5);
        assert_eq!(scores["model_reference"], 1.0);
        let bounds = scores["flux_bounds"].as_f64().unwrap();
        assert!((bounds - 2.0 / 3.0).abs() < 1e-3);
        assert!(result.errors.iter().any(|e| e.contains("violate")));
    }

    #[tokio::test]
    async fn test_flux_vector_length_mismatch_rejected() {
        let adapter = adapter(StubFetcher::offline());
        let claim = json!({"stoichiometry_matrix": [[1, -1]], "flux_vector": [1.0, 1.0, 1.0]});
        let result = adapter.verify(&claim, &meta("flux_balance")).await.unwrap();
        assert_eq!(result.details["component_scores"]["stoichiometry_shape"], 0.0);
    }

    #[tokio::test]
    async fn test_network_confirmed_by_string() {
        let adapter = adapter(StubFetcher::new().route(
            "string-db.org/api/json/network",
            StubReply::json(json!([
                {"preferredName_A": "MDM2", "preferredName_B": "TP53", "score": 0.999},
                {"preferredName_A": "ATM", "preferredName_B": "TP53", "score": 0.99}
            ])),
        ));
        let claim = json!({
            "interactions": [["TP53", "MDM2"], ["TP53", "ATM"]],
            "num_nodes": 3,
            "num_edges": 2,
            "mean_degree": 1.3333,
            "confidence_threshold": 700
        });
        let result = adapter.verify(&claim, &meta("network_analysis")).await.unwrap();
        let scores = &result.details["component_scores"];
        assert_eq!(scores["string_interactions"], 1.0);
        assert_eq!(scores["graph_consistency"], 1.0);
        assert_eq!(scores["degree_statistics"], 1.0);
        assert_eq!(scores["confidence_threshold"], 1.0);
    }

    #[tokio::test]
    async fn test_fdr_below_p_rejected() {
        let adapter = adapter(StubFetcher::offline());
        let claim = json!({"p_value": 0.01, "fdr": 0.001, "enrichment_method": "GSEA"});
        let result = adapter.verify(&claim, &meta("pathway_enrichment")).await.unwrap();
        let scores = &result.details["component_scores"];
        assert_eq!(scores["fdr"], 0.0);
        assert_eq!(scores["method"], 1.0);
        assert_eq!(scores["p_value"], 1.0);
    }

    #[tokio::test]
    async fn test_kegg_and_reactome_lookups() {
        let adapter = adapter(
            StubFetcher::new()
                .route("rest.kegg.jp/get/hsa04110", StubReply::text(200, "ENTRY       hsa04110\nNAME        Cell cycle - Homo sapiens (human)\n"))
                .route("data/query/R-HSA-69278", StubReply::json(json!({"displayName": "Cell Cycle, Mitotic"}))),
        );
        let claim = json!({
            "kegg_pathway": "hsa04110",
            "reactome_pathway": "R-HSA-69278",
            "pathway_name": "cell cycle"
        });
        let result = adapter.verify(&claim, &meta("pathway_enrichment")).await.unwrap();
        let scores = &result.details["component_scores"];
        assert_eq!(scores["kegg_pathway"], 1.0);
        assert_eq!(scores["reactome_pathway"], 1.0);
    }
}
