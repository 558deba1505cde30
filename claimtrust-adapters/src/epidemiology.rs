//! Epidemiology Adapter
//!
//! Survival analysis, transmission model and disease prevalence claims.
//! Prevalence figures are compared against the WHO Global Health
//! Observatory OData API.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{debug, info};
use urlencoding::encode;

use claimtrust_core::math::{normal_two_sided_p, relative_difference};
use claimtrust_core::value::{field, first_num, first_str, has_field, num_array};
use claimtrust_core::{BadgePolicy, ClaimMetadata, ClaimTypeSpec, Scorecard, VerificationResult, VerifyError};
use claimtrust_net::{FetchError, HttpClient};

use crate::checks::{in_range, score_reference, unavailable};
use crate::traits::{resolve_claim_type, unhandled_claim_type, DomainAdapter};

const DOMAIN: &str = "epidemiology";

const GHO_API: &str = "https://ghoapi.azureedge.net/api";

/// z for a 95% confidence interval
const Z_95: f64 = 1.959_964;
/// Relative tolerance against the GHO value
const GHO_TOLERANCE: f64 = 0.20;

pub static EPIDEMIOLOGY_CLAIM_TYPES: &[ClaimTypeSpec] = &[
    ClaimTypeSpec {
        name: "survival_analysis",
        weights: &[
            ("hazard_ratio", 0.25),
            ("ci_consistency", 0.20),
            ("p_value", 0.15),
            ("ci_p_agreement", 0.15),
            ("median_survival", 0.10),
            ("km_reanalysis", 0.15),
        ],
    },
    ClaimTypeSpec {
        name: "transmission_model",
        weights: &[
            ("r0", 0.25),
            ("serial_interval", 0.15),
            ("incubation_period", 0.15),
            ("case_fatality", 0.20),
            ("model_type", 0.10),
            ("model_fit", 0.15),
        ],
    },
    ClaimTypeSpec {
        name: "disease_prevalence",
        weights: &[
            ("gho_indicator", 0.25),
            ("gho_value_match", 0.25),
            ("prevalence_range", 0.20),
            ("confidence_interval", 0.15),
            ("sample_size", 0.15),
        ],
    },
];

const COMPARTMENT_MODELS: &[&str] = &[
    "si", "sis", "sir", "sirs", "sird", "seir", "seirs", "seird", "seiar", "msir", "mseir",
    "agentbased", "abm", "branchingprocess", "renewal", "metapopulation", "network",
];

/// Lower and upper bound of a confidence interval, from `ci_lower`/`ci_upper`
/// or a two-element `confidence_interval` array
fn confidence_interval(claim: &Value) -> Option<(f64, f64)> {
    let lower = first_num(claim, &["ci_lower", "lower_ci", "ci_low"]);
    let upper = first_num(claim, &["ci_upper", "upper_ci", "ci_high"]);
    if let (Some(lower), Some(upper)) = (lower, upper) {
        return Some((lower, upper));
    }
    match num_array(claim, "confidence_interval").as_slice() {
        [lower, upper] => Some((*lower, *upper)),
        _ => None,
    }
}

/// A proportion given as a fraction or a percentage, as a fraction
fn as_fraction(value: f64) -> f64 {
    if value > 1.0 {
        value / 100.0
    } else {
        value
    }
}

/// Verifier for the epidemiology domain
pub struct EpidemiologyAdapter {
    http: HttpClient,
}

impl EpidemiologyAdapter {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    fn survival_analysis(&self, claim: &Value, card: &mut Scorecard) {
        let hr = first_num(claim, &["hazard_ratio", "hr"]);
        let hr = hr.and_then(|hr| {
            if hr <= 0.0 {
                card.reject("hazard_ratio", format!("hazard ratio {} must be positive", hr));
                None
            } else if hr > 20.0 {
                card.score_with_warning(
                    "hazard_ratio",
                    0.3,
                    json!({ "hazard_ratio": hr }),
                    format!("hazard ratio {} is implausibly large", hr),
                );
                Some(hr)
            } else {
                card.score("hazard_ratio", 1.0, json!({ "hazard_ratio": hr }));
                Some(hr)
            }
        });

        let ci = confidence_interval(claim);
        let valid_ci = match (hr, ci) {
            (_, Some((lower, upper))) if lower <= 0.0 || lower >= upper => {
                card.reject(
                    "ci_consistency",
                    format!("confidence interval [{}, {}] is not a valid ratio interval", lower, upper),
                );
                None
            }
            (Some(hr), Some((lower, upper))) if hr < lower || hr > upper => {
                card.reject(
                    "ci_consistency",
                    format!("hazard ratio {} lies outside its confidence interval [{}, {}]", hr, lower, upper),
                );
                None
            }
            (Some(hr), Some((lower, upper))) => {
                // Ratio intervals are symmetric on the log scale
                let midpoint = ((lower.ln() + upper.ln()) / 2.0).exp();
                let asymmetry = relative_difference(hr, midpoint).unwrap_or(0.0);
                let detail = json!({ "lower": lower, "upper": upper, "log_midpoint": midpoint });
                if asymmetry > 0.15 {
                    card.score_with_warning(
                        "ci_consistency",
                        0.6,
                        detail,
                        "confidence interval is not symmetric around the hazard ratio on the log scale",
                    );
                } else {
                    card.score("ci_consistency", 1.0, detail);
                }
                Some((hr, lower, upper))
            }
            (None, Some((lower, upper))) => {
                card.score("ci_consistency", 0.7, json!({ "lower": lower, "upper": upper }));
                None
            }
            (_, None) => None,
        };

        let p = first_num(claim, &["p_value", "pvalue"])
            .and_then(|p| in_range(card, "p_value", "p-value", p, 0.0, 1.0));
        if let Some(p) = p {
            card.score("p_value", 1.0, json!({ "p_value": p }));
        }

        if let (Some((hr, lower, upper)), Some(p)) = (valid_ci, p) {
            let excludes_null = lower > 1.0 || upper < 1.0;
            let significant = p < 0.05;
            let se = (upper.ln() - lower.ln()) / (2.0 * Z_95);
            let implied_p = normal_two_sided_p(hr.ln() / se);
            let detail = json!({ "reported_p": p, "implied_p": implied_p, "ci_excludes_1": excludes_null });
            if excludes_null != significant {
                card.reject(
                    "ci_p_agreement",
                    format!(
                        "p = {} is {} but the confidence interval {} 1",
                        p,
                        if significant { "significant" } else { "not significant" },
                        if excludes_null { "excludes" } else { "includes" }
                    ),
                );
            } else if (implied_p.max(1e-300).log10() - p.max(1e-300).log10()).abs() <= 1.0 {
                card.score("ci_p_agreement", 1.0, detail);
            } else {
                card.score_with_warning(
                    "ci_p_agreement",
                    0.7,
                    detail,
                    format!("reported p = {} differs from the CI-implied p = {:.2e}", p, implied_p),
                );
            }
        }

        self.score_median_survival(claim, card, hr);

        if has_field(claim, "km_curve") || has_field(claim, "survival_data") {
            card.neutral(
                "km_reanalysis",
                "Kaplan-Meier reanalysis unavailable (lifelines); km_reanalysis scored neutral",
            );
        }
    }

    fn score_median_survival(&self, claim: &Value, card: &mut Scorecard, hr: Option<f64>) {
        match field(claim, "median_survival") {
            Some(Value::Object(arms)) => {
                let treatment = arms.get("treatment").and_then(|v| v.as_f64());
                let control = arms.get("control").and_then(|v| v.as_f64());
                match (treatment, control) {
                    (Some(t), Some(c)) if t <= 0.0 || c <= 0.0 => {
                        card.reject("median_survival", "median survival times must be positive")
                    }
                    (Some(t), Some(c)) => {
                        let detail = json!({ "treatment": t, "control": c });
                        // HR < 1 favours treatment, so its median should not be shorter
                        match hr {
                            Some(hr) if (hr < 1.0 && t < c) || (hr > 1.0 && t > c) => card.score_with_warning(
                                "median_survival",
                                0.4,
                                detail,
                                "median survival ordering contradicts the hazard ratio",
                            ),
                            _ => card.score("median_survival", 1.0, detail),
                        }
                    }
                    _ => card.reject("median_survival", "median_survival needs numeric treatment and control arms"),
                }
            }
            Some(_) => match first_num(claim, &["median_survival"]) {
                Some(m) if m > 0.0 => card.score("median_survival", 1.0, json!({ "median": m })),
                Some(m) => card.reject("median_survival", format!("median survival {} must be positive", m)),
                None => card.reject("median_survival", "median_survival is not numeric"),
            },
            None => {}
        }
    }

    fn transmission_model(&self, claim: &Value, card: &mut Scorecard) {
        if let Some(r0) = first_num(claim, &["r0", "basic_reproduction_number"]) {
            if r0 <= 0.0 || r0 > 20.0 {
                card.reject("r0", format!("R0 = {} is outside (0, 20]", r0));
            } else {
                card.score("r0", 1.0, json!({ "r0": r0 }));
            }
        }

        if let Some(days) = first_num(claim, &["serial_interval", "generation_time"]) {
            if days <= 0.0 || days > 60.0 {
                card.reject("serial_interval", format!("serial interval {} days is outside (0, 60]", days));
            } else {
                card.score("serial_interval", 1.0, json!({ "days": days }));
            }
        }

        if let Some(days) = first_num(claim, &["incubation_period"]) {
            if days <= 0.0 || days > 365.0 {
                card.reject("incubation_period", format!("incubation period {} days is outside (0, 365]", days));
            } else if days > 60.0 {
                card.score_with_warning(
                    "incubation_period",
                    0.6,
                    json!({ "days": days }),
                    format!("incubation period {} days is unusually long", days),
                );
            } else {
                card.score("incubation_period", 1.0, json!({ "days": days }));
            }
        }

        if let Some(cfr) = first_num(claim, &["case_fatality_rate", "cfr", "case_fatality"]) {
            if let Some(cfr) = in_range(card, "case_fatality", "case fatality rate", as_fraction(cfr), 0.0, 1.0) {
                if cfr > 0.9 {
                    card.score_with_warning(
                        "case_fatality",
                        0.5,
                        json!({ "fraction": cfr }),
                        "case fatality rate above 90% is exceptional",
                    );
                } else {
                    card.score("case_fatality", 1.0, json!({ "fraction": cfr }));
                }
            }
        }

        score_reference(
            card,
            "model_type",
            "compartment model",
            first_str(claim, &["compartment_model", "model_type", "model"]),
            COMPARTMENT_MODELS,
        );

        if ["observed_cases", "incidence_data", "fitted_curve", "case_counts"]
            .iter()
            .any(|k| has_field(claim, k))
        {
            card.neutral("model_fit", "curve fitting unavailable (scipy); model_fit scored neutral");
        }
    }

    async fn gho_indicator_exists(&self, code: &str) -> Result<bool, FetchError> {
        let filter = format!("IndicatorCode eq '{}'", code);
        let url = format!("{}/Indicator?$filter={}", GHO_API, encode(&filter));
        let body = self.http.get_json(&url).await?;
        Ok(body["value"].as_array().is_some_and(|v| !v.is_empty()))
    }

    /// GHO numeric value for a country, for `year` or the latest year
    async fn gho_value(&self, code: &str, country: &str, year: Option<i64>) -> Result<Option<(f64, i64)>, FetchError> {
        let mut filter = format!("SpatialDim eq '{}'", country);
        if let Some(year) = year {
            filter.push_str(&format!(" and TimeDim eq {}", year));
        }
        let url = format!("{}/{}?$filter={}", GHO_API, encode(code), encode(&filter));
        let body = self.http.get_json(&url).await?;
        let best = body["value"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|row| {
                let value = row["NumericValue"].as_f64()?;
                let time = row["TimeDim"].as_i64().unwrap_or(0);
                // Prefer both-sexes rows when disaggregated
                let both = row["Dim1"].as_str().map_or(true, |d| d.contains("BTSX"));
                Some((both, time, value))
            })
            .max_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        Ok(best.map(|(_, time, value)| (value, time)))
    }

    async fn disease_prevalence(&self, claim: &Value, card: &mut Scorecard) {
        let prevalence = first_num(claim, &["prevalence", "incidence"]);

        let indicator = first_str(claim, &["gho_indicator", "indicator_code"]);
        let mut indicator_ok = false;
        if let Some(code) = &indicator {
            match self.gho_indicator_exists(code).await {
                Ok(true) => {
                    indicator_ok = true;
                    card.score("gho_indicator", 1.0, json!({ "indicator": code }));
                }
                Ok(false) => card.reject("gho_indicator", format!("WHO GHO has no indicator {}", code)),
                Err(e) => unavailable(card, "gho_indicator", "WHO GHO", &e),
            }
        }

        let country = first_str(claim, &["country", "country_code"]).map(|c| c.to_ascii_uppercase());
        if let (true, Some(code), Some(country), Some(claimed)) = (indicator_ok, &indicator, &country, prevalence) {
            if country.len() != 3 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
                card.neutral(
                    "gho_value_match",
                    format!("country '{}' is not an ISO 3166 alpha-3 code; gho_value_match scored neutral", country),
                );
            } else {
                let year = first_num(claim, &["year"]).map(|y| y as i64);
                match self.gho_value(code, country, year).await {
                    Ok(Some((reference, year))) => self.score_gho_match(card, claimed, reference, year),
                    Ok(None) => card.neutral("gho_value_match", format!("WHO GHO has no {} value for {}", code, country)),
                    Err(e) => unavailable(card, "gho_value_match", "WHO GHO", &e),
                }
            }
        }

        let fraction = prevalence.and_then(|p| {
            if (0.0..=100.0).contains(&p) {
                card.score("prevalence_range", 1.0, json!({ "prevalence": p }));
                Some(as_fraction(p))
            } else {
                card.reject("prevalence_range", format!("prevalence {} is not a proportion or percentage", p));
                None
            }
        });

        if let Some((lower, upper)) = confidence_interval(claim) {
            match prevalence {
                _ if lower > upper => card.reject(
                    "confidence_interval",
                    format!("confidence interval lower bound {} exceeds upper bound {}", lower, upper),
                ),
                Some(p) if p < lower || p > upper => card.reject(
                    "confidence_interval",
                    format!("prevalence {} lies outside its confidence interval [{}, {}]", p, lower, upper),
                ),
                _ => card.score("confidence_interval", 1.0, json!({ "lower": lower, "upper": upper })),
            }
        }

        if let Some(n) = first_num(claim, &["sample_size", "n"]) {
            self.score_sample_size(claim, card, n, fraction);
        }
    }

    fn score_gho_match(&self, card: &mut Scorecard, claimed: f64, reference: f64, year: i64) {
        // GHO publishes most prevalence indicators as percentages
        let difference = [claimed, claimed * 100.0]
            .iter()
            .filter_map(|c| relative_difference(*c, reference))
            .fold(f64::INFINITY, f64::min);
        let detail = json!({ "claimed": claimed, "gho_value": reference, "gho_year": year });
        if difference <= GHO_TOLERANCE {
            card.score("gho_value_match", 1.0, detail);
        } else if difference <= 2.5 * GHO_TOLERANCE {
            card.score_with_warning(
                "gho_value_match",
                0.5,
                detail,
                format!("prevalence {} differs from WHO GHO {} ({})", claimed, reference, year),
            );
        } else {
            card.reject(
                "gho_value_match",
                format!("prevalence {} disagrees with WHO GHO {} ({})", claimed, reference, year),
            );
        }
    }

    fn score_sample_size(&self, claim: &Value, card: &mut Scorecard, n: f64, fraction: Option<f64>) {
        if n < 1.0 || n.fract() != 0.0 {
            card.reject("sample_size", format!("sample size {} is not a positive integer", n));
            return;
        }
        let ci = confidence_interval(claim);
        match (fraction, ci) {
            (Some(p), Some((lower, upper))) if p > 0.0 && p < 1.0 => {
                let scale = if upper > 1.0 { 100.0 } else { 1.0 };
                let expected = Z_95 * (p * (1.0 - p) / n).sqrt() * scale;
                let claimed = (upper - lower) / 2.0;
                let ratio = claimed / expected;
                let detail = json!({ "n": n, "expected_half_width": expected, "claimed_half_width": claimed });
                if (0.5..=2.0).contains(&ratio) {
                    card.score("sample_size", 1.0, detail);
                } else {
                    card.score_with_warning(
                        "sample_size",
                        0.5,
                        detail,
                        format!("interval width is inconsistent with n = {} (ratio {:.2})", n, ratio),
                    );
                }
            }
            _ if n < 30.0 => card.score_with_warning(
                "sample_size",
                0.6,
                json!({ "n": n }),
                format!("sample size {} is small for a prevalence estimate", n),
            ),
            _ => card.score("sample_size", 1.0, json!({ "n": n })),
        }
    }
}

#[async_trait]
impl DomainAdapter for EpidemiologyAdapter {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn claim_types(&self) -> &'static [ClaimTypeSpec] {
        EPIDEMIOLOGY_CLAIM_TYPES
    }

    async fn verify(&self, claim: &Value, metadata: &ClaimMetadata) -> Result<VerificationResult, VerifyError> {
        let started = Instant::now();
        let (spec, inferred) = resolve_claim_type(DOMAIN, EPIDEMIOLOGY_CLAIM_TYPES, claim, metadata)?;
        info!("Verifying {} claim ({})", DOMAIN, spec.name);

        let mut card = Scorecard::new(spec);
        if let Some(warning) = inferred {
            card.warn(warning);
        }
        match spec.name {
            "survival_analysis" => self.survival_analysis(claim, &mut card),
            "transmission_model" => self.transmission_model(claim, &mut card),
            "disease_prevalence" => self.disease_prevalence(claim, &mut card).await,
            _ => return Err(unhandled_claim_type(DOMAIN, spec, EPIDEMIOLOGY_CLAIM_TYPES)),
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

    fn adapter(stub: StubFetcher) -> EpidemiologyAdapter {
        EpidemiologyAdapter::new(HttpClient::new(Arc::new(stub)))
    }

    fn meta(claim_type: &str) -> ClaimMetadata {
        ClaimMetadata::new(DOMAIN).with_claim_type(claim_type)
    }

    #[test]
    fn test_weights_sum_to_one() {
        for spec in EPIDEMIOLOGY_CLAIM_TYPES {
            assert!((spec.weight_sum() - 1.0).abs() < 1e-9, "{}", spec.name);
        }
    }

    #[test]
    fn test_claim_types_match_inference_table() {
        let mut inferred = claim_types_for(DOMAIN);
        let mut names: Vec<&str> = EPIDEMIOLOGY_CLAIM_TYPES.iter().map(|s| s.name).collect();
        inferred.sort();
        names.sort();
        assert_eq!(inferred, names);
    }

    #[tokio::test]
    async fn test_all_absent_is_neutral() {
        let adapter = adapter(StubFetcher::offline());
        for spec in EPIDEMIOLOGY_CLAIM_TYPES {
            let result = adapter.verify(&json!({}), &meta(spec.name)).await.unwrap();
            assert_eq!(result.score, 0.5, "{}", spec.name);
        }
    }

    #[tokio::test]
    async fn test_survival_consistent_claim() {
        let adapter = adapter(StubFetcher::offline());
        // HR 0.70, 95% CI 0.55-0.89 implies p ≈ 0.004
        let claim = json!({
            "hazard_ratio": 0.70,
            "ci_lower": 0.55,
            "ci_upper": 0.89,
            "p_value": 0.004,
            "median_survival": {"treatment": 18.2, "control": 12.4}
        });
        let result = adapter.verify(&claim, &meta("survival_analysis")).await.unwrap();
        let scores = &result.details["component_scores"];
        assert_eq!(scores["ci_consistency"], 1.0);
        assert_eq!(scores["ci_p_agreement"], 1.0);
        assert_eq!(scores["median_survival"], 1.0);
        assert_eq!(scores["km_reanalysis"], 0.5);
    }

    #[tokio::test]
    async fn test_survival_ci_contradicts_p() {
        let adapter = adapter(StubFetcher::offline());
        let claim = json!({"hazard_ratio": 0.9, "confidence_interval": [0.7, 1.15], "p_value": 0.01});
        let result = adapter.verify(&claim, &meta("survival_analysis")).await.unwrap();
        assert_eq!(result.details["component_scores"]["ci_p_agreement"], 0.0);
        assert!(result.errors.iter().any(|e| e.contains("includes 1")));
    }

    #[tokio::test]
    async fn test_transmission_ranges() {
        let adapter = adapter(StubFetcher::offline());
        let claim = json!({
            "r0": 35,
            "serial_interval": 5.8,
            "case_fatality_rate": 1.4,
            "compartment_model": "SEIR"
        });
        let result = adapter.verify(&claim, &meta("transmission_model")).await.unwrap();
        let scores = &result.details["component_scores"];
        assert_eq!(scores["r0"], 0.0);
        assert_eq!(scores["serial_interval"], 1.0);
        assert_eq!(scores["case_fatality"], 1.0);
        assert_eq!(scores["model_type"], 1.0);
    }

    #[tokio::test]
    async fn test_prevalence_matches_gho() {
        let adapter = adapter(
            StubFetcher::new()
                .route("api/Indicator", StubReply::json(json!({"value": [{"IndicatorCode": "NCD_DIABETES_PREVALENCE_AGESTD"}]})))
                .route(
                    "api/NCD_DIABETES_PREVALENCE_AGESTD",
                    StubReply::json(json!({"value": [
                        {"TimeDim": 2014, "Dim1": "SEX_BTSX", "NumericValue": 8.9},
                        {"TimeDim": 2022, "Dim1": "SEX_BTSX", "NumericValue": 10.5},
                        {"TimeDim": 2022, "Dim1": "SEX_MLE", "NumericValue": 11.8}
                    ]})),
                ),
        );
        let claim = json!({
            "gho_indicator": "NCD_DIABETES_PREVALENCE_AGESTD",
            "country": "usa",
            "prevalence": 0.105,
            "ci_lower": 0.095,
            "ci_upper": 0.115,
            "sample_size": 3500
        });
        let result = adapter.verify(&claim, &meta("disease_prevalence")).await.unwrap();
        let scores = &result.details["component_scores"];
        assert_eq!(scores["gho_indicator"], 1.0);
        assert_eq!(scores["gho_value_match"], 1.0);
        assert_eq!(result.details["gho_value_match"]["gho_year"], 2022);
        assert_eq!(scores["confidence_interval"], 1.0);
    }
}
