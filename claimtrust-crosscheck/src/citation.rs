//! Citation verification
//!
//! Every cited work is resolved and scored on four components:
//! - `doi`: the DOI resolves on CrossRef and the work is not retracted
//! - `metadata`: the claimed title matches the record (CrossRef, then
//!   OpenAlex, then Semantic Scholar)
//! - `claim_support`: the claim text overlaps the work's abstract
//! - `recency`: the work is younger than the domain's freshness threshold
//!
//! The check's score is the mean over the checked citations.

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use futures::future::join_all;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, info};

use claimtrust_core::math::{jaccard_similarity, mean};
use claimtrust_core::value::{as_number, field, first_num, first_str, str_field};
use claimtrust_core::{
    freshness_years, round_score, ClaimMetadata, ClaimTypeSpec, CrossCuttingResult, Scorecard, NEUTRAL_SCORE,
};
use claimtrust_net::{FetchError, HttpClient};

use crate::traits::{unavailable, CheckError, CrossCuttingVerifier};

const WEIGHT: f64 = 0.15;

pub const DEFAULT_MAX_CITATIONS: usize = 10;

static CITATION: ClaimTypeSpec = ClaimTypeSpec {
    name: "citation",
    weights: &[
        ("doi", 0.35),
        ("metadata", 0.25),
        ("claim_support", 0.25),
        ("recency", 0.15),
    ],
};

const EARLIEST_PUBLICATION_YEAR: i64 = 1000;

const CITATION_KEYS: &[&str] = &["citations", "references"];
const CLAIM_TEXT_KEYS: &[&str] = &["claim", "claim_text", "statement", "hypothesis", "summary", "conclusion"];

static DOI_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^10\.\d{4,9}/\S+$").unwrap());
static MARKUP_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Bare DOI from a `doi:` / `https://doi.org/` form
pub fn normalize_doi(raw: &str) -> String {
    let raw = raw.trim();
    let lower = raw.to_ascii_lowercase();
    for prefix in ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "http://dx.doi.org/", "doi:"] {
        if lower.starts_with(prefix) {
            return raw[prefix.len()..].trim().to_string();
        }
    }
    raw.to_string()
}

pub fn is_doi(value: &str) -> bool {
    DOI_REGEX.is_match(value)
}

fn strip_markup(text: &str) -> String {
    MARKUP_REGEX.replace_all(text, " ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Abstract text from an OpenAlex `abstract_inverted_index`
pub fn invert_abstract(index: &Value) -> Option<String> {
    let index = index.as_object()?;
    let mut positions = BTreeMap::new();
    for (word, slots) in index {
        for slot in slots.as_array()? {
            positions.insert(slot.as_u64()?, word.as_str());
        }
    }
    if positions.is_empty() {
        return None;
    }
    Some(positions.into_values().collect::<Vec<_>>().join(" "))
}

/// One cited work as the caller describes it
#[derive(Debug, Clone, Default)]
pub struct Citation {
    pub doi: Option<String>,
    pub title: Option<String>,
    pub year: Option<i64>,
    pub context: Option<String>,
}

impl Citation {
    /// A citation from a bare string (DOI or title) or an object
    pub fn parse(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => {
                let doi = normalize_doi(s);
                if is_doi(&doi) {
                    Some(Self { doi: Some(doi), ..Self::default() })
                } else if !s.trim().is_empty() {
                    Some(Self { title: Some(s.trim().to_string()), ..Self::default() })
                } else {
                    None
                }
            }
            Value::Object(_) => {
                let citation = Self {
                    doi: str_field(value, "doi").map(|d| normalize_doi(&d)),
                    title: str_field(value, "title"),
                    year: first_num(value, &["year", "publication_year"]).map(|y| y as i64),
                    context: first_str(value, &["context", "supports", "claim"]),
                };
                (citation.doi.is_some() || citation.title.is_some()).then_some(citation)
            }
            _ => None,
        }
    }
}

/// A resolved bibliographic record
#[derive(Debug, Clone, Default)]
pub struct Work {
    pub source: &'static str,
    pub title: Option<String>,
    pub year: Option<i64>,
    pub abstract_text: Option<String>,
    pub retracted: bool,
    pub corrected: bool,
}

fn update_types(message: &Value, key: &str) -> Vec<String> {
    field(message, key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|u| str_field(u, "type")).map(|t| t.to_ascii_lowercase()).collect())
        .unwrap_or_default()
}

/// Work from a CrossRef `/works/{doi}` message
pub fn crossref_work(message: &Value) -> Work {
    let title = message
        .get("title")
        .and_then(Value::as_array)
        .and_then(|t| t.first())
        .and_then(Value::as_str)
        .map(str::to_string);
    let year = ["issued", "published-print", "published-online", "created"]
        .iter()
        .find_map(|k| message.get(*k)?.pointer("/date-parts/0/0").and_then(as_number))
        .map(|y| y as i64);

    let mut updates = update_types(message, "update-to");
    updates.extend(update_types(message, "updated-by"));
    let relation_retracted = message
        .get("relation")
        .and_then(Value::as_object)
        .is_some_and(|r| r.contains_key("is-retracted-by"));
    let title_retracted = title
        .as_deref()
        .is_some_and(|t| t.trim_start().to_ascii_uppercase().starts_with("RETRACTED"));

    Work {
        source: "crossref",
        year,
        abstract_text: str_field(message, "abstract").map(|a| strip_markup(&a)),
        retracted: relation_retracted || title_retracted || updates.iter().any(|t| t.contains("retraction")),
        corrected: updates.iter().any(|t| t.contains("correction") || t.contains("erratum")),
        title,
    }
}

pub fn openalex_work(record: &Value) -> Work {
    Work {
        source: "openalex",
        title: first_str(record, &["title", "display_name"]),
        year: first_num(record, &["publication_year"]).map(|y| y as i64),
        abstract_text: record.get("abstract_inverted_index").and_then(invert_abstract),
        retracted: record.get("is_retracted").and_then(Value::as_bool).unwrap_or(false),
        corrected: false,
    }
}

pub fn semantic_scholar_work(record: &Value) -> Work {
    Work {
        source: "semantic_scholar",
        title: str_field(record, "title"),
        year: first_num(record, &["year"]).map(|y| y as i64),
        abstract_text: str_field(record, "abstract"),
        retracted: false,
        corrected: false,
    }
}

/// First non-empty citation array
fn citation_list(claim: &Value) -> Option<&Vec<Value>> {
    CITATION_KEYS
        .iter()
        .find_map(|k| field(claim, k).and_then(Value::as_array).filter(|a| !a.is_empty()))
}

/// 1.0 for a close title match, 0.6 for a partial one
fn title_score(similarity: f64) -> f64 {
    if similarity >= 0.5 {
        1.0
    } else if similarity >= 0.3 {
        0.6
    } else {
        0.2
    }
}

/// Resolves and scores each cited work
pub struct CitationVerifier {
    http: HttpClient,
    max_citations: usize,
}

impl CitationVerifier {
    pub fn new(http: HttpClient) -> Self {
        Self::with_max_citations(http, DEFAULT_MAX_CITATIONS)
    }

    pub fn with_max_citations(http: HttpClient, max_citations: usize) -> Self {
        Self { http, max_citations: max_citations.max(1) }
    }

    async fn crossref(&self, doi: &str) -> Result<Option<Work>, FetchError> {
        let url = format!("https://api.crossref.org/works/{}", urlencoding::encode(doi));
        Ok(self
            .http
            .lookup_json(&url)
            .await?
            .and_then(|body| body.get("message").map(crossref_work)))
    }

    async fn openalex(&self, title: &str) -> Result<Option<Work>, FetchError> {
        let url = format!(
            "https://api.openalex.org/works?search={}&per-page=1",
            urlencoding::encode(title)
        );
        let body = self.http.get_json(&url).await?;
        Ok(body.pointer("/results/0").map(openalex_work))
    }

    async fn semantic_scholar(&self, title: &str) -> Result<Option<Work>, FetchError> {
        let url = format!(
            "https://api.semanticscholar.org/graph/v1/paper/search?query={}&limit=1&fields=title,year,abstract",
            urlencoding::encode(title)
        );
        let body = self.http.get_json(&url).await?;
        Ok(body.pointer("/data/0").map(semantic_scholar_work))
    }

    /// Best title match from OpenAlex, falling back to Semantic Scholar
    async fn search_title(&self, title: &str) -> Result<Option<(Work, f64)>, FetchError> {
        let mut last_err = None;
        let mut best: Option<(Work, f64)> = None;
        for source in ["openalex", "semantic_scholar"] {
            let found = match source {
                "openalex" => self.openalex(title).await,
                _ => self.semantic_scholar(title).await,
            };
            match found {
                Ok(Some(work)) => {
                    let similarity = work.title.as_deref().map_or(0.0, |t| jaccard_similarity(title, t));
                    if best.as_ref().map_or(true, |(_, s)| similarity > *s) {
                        best = Some((work, similarity));
                    }
                    if similarity >= 0.5 {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    debug!("{} title search failed: {}", source, e);
                    last_err = Some(e);
                }
            }
        }
        match (best, last_err) {
            (Some(found), _) => Ok(Some(found)),
            (None, Some(e)) => Err(e),
            (None, None) => Ok(None),
        }
    }

    async fn check_one(&self, citation: &Citation, claim_text: Option<&str>, freshness: i32) -> CrossCuttingResult {
        let started = Instant::now();
        let mut card = Scorecard::new(&CITATION);
        let mut work: Option<Work> = None;

        match citation.doi.as_deref() {
            Some(doi) if !is_doi(doi) => card.reject("doi", format!("'{}' is not a DOI", doi)),
            Some(doi) => match self.crossref(doi).await {
                Ok(Some(found)) => {
                    let detail = json!({ "doi": doi, "retracted": found.retracted, "corrected": found.corrected });
                    if found.retracted {
                        card.score("doi", 0.0, detail);
                        card.error(format!("{} has been retracted", doi));
                    } else if found.corrected {
                        card.score_with_warning("doi", 1.0, detail, format!("{} has a published correction", doi));
                    } else {
                        card.score("doi", 1.0, detail);
                    }
                    work = Some(found);
                }
                Ok(None) => card.reject("doi", format!("DOI {} does not resolve on CrossRef", doi)),
                Err(e) => unavailable(&mut card, "doi", "CrossRef", &e),
            },
            None => {}
        }

        if let Some(title) = citation.title.as_deref() {
            let matched = match &work {
                Some(found) => {
                    let similarity = found.title.as_deref().map_or(0.0, |t| jaccard_similarity(title, t));
                    Ok(Some((found.clone(), similarity)))
                }
                None => self.search_title(title).await,
            };
            match matched {
                Ok(Some((found, similarity))) => {
                    let detail = json!({
                        "source": found.source,
                        "record_title": found.title,
                        "similarity": round_score(similarity),
                    });
                    let score = title_score(similarity);
                    if score < 1.0 {
                        card.score_with_warning("metadata", score, detail, format!("title '{}' matches the record poorly", title));
                    } else {
                        card.score("metadata", score, detail);
                    }
                    if found.retracted && work.is_none() {
                        card.error(format!("'{}' is flagged as retracted by {}", title, found.source));
                    }
                    if work.is_none() {
                        work = Some(found);
                    }
                }
                Ok(None) => card.score_with_warning(
                    "metadata",
                    0.2,
                    json!({ "title": title, "found": false }),
                    format!("no bibliographic record matches '{}'", title),
                ),
                Err(e) => unavailable(&mut card, "metadata", "OpenAlex/Semantic Scholar", &e),
            }
        }

        let support_text = citation.context.as_deref().or(claim_text);
        let abstract_text = work.as_ref().and_then(|w| w.abstract_text.as_deref());
        if let (Some(text), Some(abstract_text)) = (support_text, abstract_text) {
            let overlap = jaccard_similarity(text, abstract_text);
            let score = if overlap >= 0.15 {
                1.0
            } else if overlap >= 0.05 {
                0.6
            } else {
                0.3
            };
            card.score("claim_support", score, json!({ "overlap": round_score(overlap) }));
        }

        let year = citation.year.or_else(|| work.as_ref().and_then(|w| w.year));
        if let Some(year) = year {
            let current = i64::from(Utc::now().year());
            let freshness = i64::from(freshness);
            let age = current.saturating_sub(year);
            let detail = json!({ "year": year, "age_years": age, "threshold_years": freshness });
            if year < EARLIEST_PUBLICATION_YEAR {
                card.reject("recency", format!("publication year {} is implausible", year));
            } else if age < -1 {
                card.reject("recency", format!("publication year {} is in the future", year));
            } else if age <= freshness {
                card.score("recency", 1.0, detail);
            } else if age <= 2 * freshness {
                card.score_with_warning("recency", 0.6, detail, format!("cited work from {} is older than {} years", year, freshness));
            } else {
                card.score_with_warning("recency", 0.3, detail, format!("cited work from {} is older than {} years", year, 2 * freshness));
            }
            if let (Some(claimed), Some(found)) = (citation.year, work.as_ref().and_then(|w| w.year)) {
                if claimed.saturating_sub(found).saturating_abs() > 1 {
                    card.warn(format!("claimed year {} differs from record year {}", claimed, found));
                }
            }
        }

        card.finish_check(WEIGHT, started)
    }
}

#[async_trait]
impl CrossCuttingVerifier for CitationVerifier {
    fn name(&self) -> &'static str {
        CITATION.name
    }

    fn weight(&self) -> f64 {
        WEIGHT
    }

    fn is_applicable(&self, claim: &Value) -> bool {
        citation_list(claim).is_some()
    }

    async fn verify(&self, claim: &Value, metadata: &ClaimMetadata) -> Result<CrossCuttingResult, CheckError> {
        let started = Instant::now();
        let raw = citation_list(claim).ok_or_else(|| CheckError::InvalidInput("no citation list".to_string()))?;

        let mut warnings = Vec::new();
        let citations: Vec<Citation> = raw.iter().filter_map(Citation::parse).collect();
        if citations.len() < raw.len() {
            warnings.push(format!("{} citations carry neither a DOI nor a title", raw.len() - citations.len()));
        }
        if citations.len() > self.max_citations {
            warnings.push(format!("only the first {} of {} citations were checked", self.max_citations, citations.len()));
        }
        let checked: Vec<&Citation> = citations.iter().take(self.max_citations).collect();
        info!("Checking {} citations", checked.len());

        let claim_text = first_str(claim, CLAIM_TEXT_KEYS);
        let freshness = freshness_years(&metadata.domain);
        let results = join_all(
            checked
                .iter()
                .map(|c| self.check_one(c, claim_text.as_deref(), freshness)),
        )
        .await;

        let mut errors = Vec::new();
        let mut per_citation = Vec::new();
        for (i, (citation, result)) in checked.iter().zip(&results).enumerate() {
            let label = citation.doi.clone().or_else(|| citation.title.clone()).unwrap_or_default();
            warnings.extend(result.warnings.iter().map(|w| format!("citation {}: {}", i + 1, w)));
            errors.extend(result.errors.iter().map(|e| format!("citation {}: {}", i + 1, e)));
            let mut entry = Map::new();
            entry.insert("citation".to_string(), json!(label));
            entry.insert("score".to_string(), json!(result.score));
            for (key, value) in &result.details {
                entry.insert(key.clone(), value.clone());
            }
            per_citation.push(Value::Object(entry));
        }

        let scores: Vec<f64> = results.iter().map(|r| r.score).collect();
        let score = mean(&scores).unwrap_or(NEUTRAL_SCORE);
        if scores.is_empty() {
            warnings.push("no usable citations; citation check scored neutral".to_string());
        }
        debug!("citation score {} over {} works", score, scores.len());

        let mut details = Map::new();
        details.insert("checked".to_string(), json!(scores.len()));
        details.insert("citations".to_string(), Value::Array(per_citation));

        let mut result = CrossCuttingResult::new(CITATION.name, WEIGHT, score)
            .with_details(details)
            .with_compute_time(started.elapsed().as_secs_f64());
        result.warnings = warnings;
        result.errors = errors;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimtrust_net::{StubFetcher, StubReply};
    use std::sync::Arc;

    fn verifier(stub: StubFetcher) -> CitationVerifier {
        CitationVerifier::new(HttpClient::new(Arc::new(stub)))
    }

    fn crossref_record(title: &str, year: i32) -> Value {
        json!({
            "status": "ok",
            "message": {
                "title": [title],
                "issued": {"date-parts": [[year, 3, 1]]},
                "abstract": "<jats:p>Attention mechanisms replace recurrence for sequence transduction.</jats:p>"
            }
        })
    }

    #[test]
    fn test_normalize_doi() {
        assert_eq!(normalize_doi("https://doi.org/10.1038/nature12373"), "10.1038/nature12373");
        assert_eq!(normalize_doi("doi: 10.1000/xyz"), "10.1000/xyz");
        assert!(is_doi("10.1038/nature12373"));
        assert!(!is_doi("nature12373"));
    }

    #[test]
    fn test_invert_abstract() {
        let index = json!({"quick": [1], "The": [0], "fox": [2]});
        assert_eq!(invert_abstract(&index).as_deref(), Some("The quick fox"));
    }

    #[test]
    fn test_crossref_retraction_flags() {
        let retracted = crossref_work(&json!({"title": ["RETRACTED: A result"]}));
        assert!(retracted.retracted);
        let notice = crossref_work(&json!({"title": ["A result"], "updated-by": [{"type": "retraction"}]}));
        assert!(notice.retracted);
        let corrected = crossref_work(&json!({"title": ["A result"], "update-to": [{"type": "correction"}]}));
        assert!(corrected.corrected && !corrected.retracted);
    }

    #[tokio::test]
    async fn test_resolved_recent_citation_scores_high() {
        let year = Utc::now().year() - 1;
        let stub = StubFetcher::new().route(
            "api.crossref.org/works/",
            StubReply::json(crossref_record("Attention replaces recurrence", year)),
        );
        let claim = json!({
            "claim": "attention mechanisms replace recurrence",
            "citations": [{"doi": "10.1000/attn", "title": "Attention replaces recurrence"}]
        });
        let result = verifier(stub)
            .verify(&claim, &ClaimMetadata::new("ml_ai"))
            .await
            .unwrap();
        assert_eq!(result.score, 1.0);
        assert_eq!(result.details["checked"], 1);
    }

    #[tokio::test]
    async fn test_retracted_doi_zeroes_component() {
        let stub = StubFetcher::new().route(
            "api.crossref.org/works/",
            StubReply::json(json!({"message": {"title": ["RETRACTED: Cold fusion"]}})),
        );
        let claim = json!({"references": ["10.1000/cold"]});
        let result = verifier(stub).verify(&claim, &ClaimMetadata::new("physics")).await.unwrap();
        assert_eq!(result.details["citations"][0]["component_scores"]["doi"], 0.0);
        assert!(result.errors[0].starts_with("citation 1:"));
    }

    #[tokio::test]
    async fn test_unresolvable_doi_rejected_and_offline_neutral() {
        let stub = StubFetcher::new().route("api.crossref.org", StubReply::status(404));
        let claim = json!({"citations": ["10.1000/missing"]});
        let result = verifier(stub).verify(&claim, &ClaimMetadata::new("physics")).await.unwrap();
        assert_eq!(result.details["citations"][0]["component_scores"]["doi"], 0.0);

        let offline = verifier(StubFetcher::offline())
            .verify(&claim, &ClaimMetadata::new("physics"))
            .await
            .unwrap();
        assert_eq!(offline.score, 0.5);
    }

    #[tokio::test]
    async fn test_citation_limit() {
        let refs: Vec<String> = (0..12).map(|i| format!("10.1000/ref{}", i)).collect();
        let claim = json!({ "citations": refs });
        let result = CitationVerifier::with_max_citations(HttpClient::new(Arc::new(StubFetcher::offline())), 10)
            .verify(&claim, &ClaimMetadata::new("physics"))
            .await
            .unwrap();
        assert_eq!(result.details["checked"], 10);
        assert!(result.warnings.iter().any(|w| w.contains("first 10 of 12")));
    }

    #[tokio::test]
    async fn test_implausible_year_rejects_recency() {
        let claim = json!({"citations": [
            {"title": "Some paper", "year": -1e10},
            {"title": "Another paper", "year": 1e10}
        ]});
        let result = verifier(StubFetcher::offline())
            .verify(&claim, &ClaimMetadata::new("physics"))
            .await
            .unwrap();
        assert_eq!(result.details["checked"], 2);
        assert_eq!(result.details["citations"][0]["component_scores"]["recency"], 0.0);
        assert_eq!(result.details["citations"][1]["component_scores"]["recency"], 0.0);
        assert!(result.errors[0].starts_with("citation 1:") && result.errors[0].contains("implausible"));
        assert!(result.errors[1].contains("in the future"));
    }

    #[tokio::test]
    async fn test_empty_citations_fall_through_to_references() {
        let v = verifier(StubFetcher::offline());
        let claim = json!({"citations": [], "references": ["10.1000/x"]});
        assert!(v.is_applicable(&claim));
        let result = v.verify(&claim, &ClaimMetadata::new("physics")).await.unwrap();
        assert_eq!(result.details["checked"], 1);
    }

    #[test]
    fn test_applicability() {
        let v = verifier(StubFetcher::offline());
        assert!(v.is_applicable(&json!({"citations": ["10.1/x"]})));
        assert!(!v.is_applicable(&json!({"citations": []})));
    }
}
