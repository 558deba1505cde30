//! ML/AI Adapter
//!
//! Training runs, dataset descriptions and benchmark results. Models and
//! datasets are looked up on the HuggingFace Hub, code repositories on
//! GitHub; loss curves, splits and metrics are checked locally.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, info};

use claimtrust_core::math::relative_difference;
use claimtrust_core::value::{as_number, as_string, field, first_num, first_str, has_field};
use claimtrust_core::{BadgePolicy, ClaimMetadata, ClaimTypeSpec, Scorecard, VerificationResult, VerifyError};
use claimtrust_net::{parse_github_repo, HttpClient, Lookup};

use crate::checks::{in_range, recognize, score_reference, unavailable, UNRECOGNIZED_SCORE};
use crate::traits::{resolve_claim_type, unhandled_claim_type, DomainAdapter};

const DOMAIN: &str = "ml_ai";

const HF_API: &str = "https://huggingface.co/api";

/// Relative tolerance for row and parameter counts against the Hub
const HUB_COUNT_TOLERANCE: f64 = 0.05;

pub static ML_AI_CLAIM_TYPES: &[ClaimTypeSpec] = &[
    ClaimTypeSpec {
        name: "training_run",
        weights: &[
            ("loss_curve", 0.25),
            ("hyperparameters", 0.20),
            ("compute_budget", 0.15),
            ("code_repository", 0.20),
            ("generalization_gap", 0.20),
        ],
    },
    ClaimTypeSpec {
        name: "dataset_validation",
        weights: &[
            ("dataset_exists", 0.30),
            ("split_consistency", 0.20),
            ("license", 0.15),
            ("row_count", 0.20),
            ("contamination", 0.15),
        ],
    },
    ClaimTypeSpec {
        name: "benchmark_result",
        weights: &[
            ("model_exists", 0.20),
            ("model_card", 0.15),
            ("metric_plausibility", 0.20),
            ("parameter_count", 0.15),
            ("dataset_exists", 0.15),
            ("leaderboard", 0.15),
        ],
    },
];

const LICENSES: &[&str] = &[
    "mit", "apache-2.0", "bsd-2-clause", "bsd-3-clause", "gpl-2.0", "gpl-3.0", "lgpl-3.0",
    "agpl-3.0", "mpl-2.0", "cc0-1.0", "cc-by-4.0", "cc-by-sa-4.0", "cc-by-nc-4.0",
    "cc-by-nc-sa-4.0", "cc-by-nd-4.0", "cc-by-3.0", "cc-by-sa-3.0", "odc-by", "odbl", "pddl",
    "cdla-permissive-2.0", "cdla-sharing-1.0", "openrail", "bigscience-openrail-m", "llama2",
    "llama3", "gemma", "unlicense", "wtfpl", "afl-3.0", "artistic-2.0", "c-uda",
];

const BENCHMARKS: &[&str] = &[
    "mmlu", "mmlu-pro", "hellaswag", "arc", "arc-challenge", "winogrande", "truthfulqa", "gsm8k",
    "math", "humaneval", "mbpp", "bbh", "big-bench", "gpqa", "drop", "squad", "glue", "superglue",
    "imagenet", "cifar-10", "cifar-100", "mnist", "coco", "librispeech", "wmt", "swe-bench",
    "mt-bench", "alpacaeval", "ifeval", "musr", "piqa", "boolq", "openbookqa", "lambada",
];

/// Metrics bounded to a percentage scale
const BOUNDED_METRICS: &[&str] = &[
    "accuracy", "acc", "f1", "precision", "recall", "auc", "auroc", "exact_match", "em", "bleu",
    "rouge", "meteor", "pass@1", "pass@k", "top1", "top5", "map", "miou", "win_rate",
];

/// Dense bf16 peak throughput (FLOP/s) per accelerator
const ACCELERATOR_PEAK_FLOPS: &[(&str, f64)] = &[
    ("h200", 989e12),
    ("h100", 989e12),
    ("a100", 312e12),
    ("a10g", 125e12),
    ("a6000", 155e12),
    ("l40s", 362e12),
    ("l4", 121e12),
    ("v100", 125e12),
    ("t4", 65e12),
    ("rtx4090", 165e12),
    ("rtx3090", 71e12),
    ("mi300x", 1307e12),
    ("mi250x", 383e12),
    ("tpuv5p", 459e12),
    ("tpuv5e", 197e12),
    ("tpuv4", 275e12),
];

static COUNT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*([0-9]+(?:\.[0-9]+)?)\s*(k|thousand|m|million|b|billion|t|trillion)?\s*$").unwrap()
});

static HF_REPO_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[A-Za-z0-9][A-Za-z0-9_.\-]*/)?[A-Za-z0-9][A-Za-z0-9_.\-]*$").unwrap());

/// Counts written as `7B`, `1.3 billion`, `350M` or plain numbers
pub fn parse_count(value: &Value) -> Option<f64> {
    if let Some(n) = value.as_f64() {
        return Some(n);
    }
    let text = value.as_str()?.replace(['_', ','], "");
    let captures = COUNT_REGEX.captures(&text)?;
    let base: f64 = captures.get(1)?.as_str().parse().ok()?;
    let scale = match captures.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        None => 1.0,
        Some(suffix) => match suffix.chars().next() {
            Some('k') => 1e3,
            Some('m') => 1e6,
            Some('b') => 1e9,
            Some('t') => 1e12,
            _ => 1.0,
        },
    };
    Some(base * scale)
}

fn first_count(claim: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| field(claim, k).and_then(parse_count))
}

/// Loss values from a bare array, `[{step, loss}]` or `{train: [...]}`.
/// `None` when any entry is not a finite number.
fn loss_values(value: &Value) -> Option<Vec<f64>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => map.get("train").or_else(|| map.get("loss"))?.as_array()?,
        _ => return None,
    };
    items
        .iter()
        .map(|item| match item {
            Value::Object(point) => point.get("loss").or_else(|| point.get("value")).and_then(as_number),
            other => as_number(other),
        })
        .collect()
}

/// Scale a metric reported as a fraction to a percentage
fn as_percent(value: f64) -> f64 {
    if value <= 1.0 {
        value * 100.0
    } else {
        value
    }
}

/// Licenses declared on a Hub record, from card data or `license:` tags
fn hub_licenses(record: &Value) -> Vec<String> {
    let mut licenses: Vec<String> = match record.pointer("/cardData/license") {
        Some(Value::Array(items)) => items.iter().filter_map(as_string).collect(),
        Some(other) => as_string(other).into_iter().collect(),
        None => Vec::new(),
    };
    if let Some(Value::Array(tags)) = record.get("tags") {
        licenses.extend(
            tags.iter()
                .filter_map(Value::as_str)
                .filter_map(|t| t.strip_prefix("license:"))
                .map(str::to_string),
        );
    }
    licenses.iter().map(|l| l.to_ascii_lowercase()).collect()
}

/// Split sizes of the first dataset config on a Hub record
pub fn hub_split_sizes(record: &Value) -> Vec<(String, f64)> {
    let info = match record.pointer("/cardData/dataset_info") {
        Some(Value::Array(configs)) => configs.first(),
        other => other,
    };
    let Some(Value::Array(splits)) = info.and_then(|i| i.get("splits")) else {
        return Vec::new();
    };
    splits
        .iter()
        .filter_map(|split| {
            let name = split.get("name").and_then(as_string)?;
            Some((name, split.get("num_examples").and_then(as_number)?))
        })
        .collect()
}

/// Verifier for the ML/AI domain
pub struct MlAiAdapter {
    http: HttpClient,
}

impl MlAiAdapter {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    async fn hub_record(&self, kind: &str, id: &str) -> Lookup<Value> {
        self.http.lookup_json(&format!("{}/{}/{}", HF_API, kind, id)).await
    }

    /// Check a Hub id, returning its record when found
    async fn hub_exists(&self, card: &mut Scorecard, component: &str, kind: &str, id: &str) -> Option<Value> {
        if !HF_REPO_ID_REGEX.is_match(id) {
            card.reject(component, format!("'{}' is not a HuggingFace repository id", id));
            return None;
        }
        match self.hub_record(kind, id).await {
            Ok(Some(record)) => {
                let detail = json!({
                    "id": id,
                    "downloads": record.get("downloads"),
                    "gated": record.get("gated"),
                });
                card.score(component, 1.0, detail);
                Some(record)
            }
            Ok(None) => {
                card.reject(component, format!("HuggingFace Hub has no {} '{}'", kind.trim_end_matches('s'), id));
                None
            }
            Err(e) => {
                unavailable(card, component, "HuggingFace Hub", &e);
                None
            }
        }
    }

    async fn training_run(&self, claim: &Value, card: &mut Scorecard) {
        if let Some(raw) = field(claim, "loss_curve") {
            self.loss_curve(claim, raw, card);
        }
        self.hyperparameters(claim, card);
        self.compute_budget(claim, card);

        if let Some(url) = first_str(claim, &["code_repository", "repository_url", "github_url", "code_url"]) {
            match parse_github_repo(&url) {
                None => card.score_with_warning(
                    "code_repository",
                    0.6,
                    json!({ "url": url, "host": "other" }),
                    "repository is not on GitHub and was not checked",
                ),
                Some((owner, repo)) => match self.http.github_json(&format!("/repos/{}/{}", owner, repo)).await {
                    Ok(Some(record)) => {
                        let archived = record.get("archived").and_then(Value::as_bool).unwrap_or(false);
                        let detail = json!({
                            "repository": format!("{}/{}", owner, repo),
                            "stars": record.get("stargazers_count"),
                            "archived": archived,
                        });
                        if archived {
                            card.score_with_warning("code_repository", 0.8, detail, "code repository is archived");
                        } else {
                            card.score("code_repository", 1.0, detail);
                        }
                    }
                    Ok(None) => card.reject("code_repository", format!("GitHub repository {}/{} does not exist", owner, repo)),
                    Err(e) => unavailable(card, "code_repository", "GitHub", &e),
                },
            }
        }

        self.generalization_gap(claim, card);
    }

    fn loss_curve(&self, claim: &Value, raw: &Value, card: &mut Scorecard) {
        let Some(losses) = loss_values(raw) else {
            card.reject("loss_curve", "loss_curve contains non-numeric or non-finite values");
            return;
        };
        if losses.len() < 2 {
            card.reject("loss_curve", "loss_curve needs at least two points");
            return;
        }
        if losses.iter().any(|l| *l < 0.0) && !has_field(claim, "negative_loss") {
            card.reject("loss_curve", "loss_curve has negative values");
            return;
        }
        let first = losses[0];
        let last = losses[losses.len() - 1];
        if let Some(final_loss) = first_num(claim, &["final_loss", "final_train_loss"]) {
            if relative_difference(final_loss, last).is_some_and(|d| d > 0.01) {
                card.reject("loss_curve", format!("final_loss {} is not the last point of the curve ({})", final_loss, last));
                return;
            }
        }
        let detail = json!({ "points": losses.len(), "initial": first, "final": last });
        if last > first {
            card.reject("loss_curve", format!("loss rose from {} to {}", first, last));
        } else if losses.iter().any(|l| *l > 10.0 * first.max(f64::MIN_POSITIVE)) {
            card.score_with_warning("loss_curve", 0.6, detail, "loss_curve has spikes above 10x the initial loss");
        } else if last == first {
            card.score_with_warning("loss_curve", 0.5, detail, "loss did not decrease");
        } else {
            card.score("loss_curve", 1.0, detail);
        }
    }

    fn hyperparameters(&self, claim: &Value, card: &mut Scorecard) {
        let lr = first_num(claim, &["learning_rate", "lr"]);
        let batch = first_num(claim, &["batch_size"]);
        let epochs = first_num(claim, &["epochs", "num_epochs"]);
        let decay = first_num(claim, &["weight_decay"]);
        let dropout = first_num(claim, &["dropout"]);
        if lr.is_none() && batch.is_none() && epochs.is_none() && decay.is_none() && dropout.is_none() {
            return;
        }

        let mut problems = Vec::new();
        let mut warnings = Vec::new();
        if let Some(lr) = lr {
            if lr <= 0.0 || lr > 10.0 {
                problems.push(format!("learning_rate {} is outside (0, 10]", lr));
            } else if lr > 0.1 {
                warnings.push(format!("learning_rate {} is unusually high", lr));
            }
        }
        if let Some(batch) = batch {
            if batch < 1.0 || batch.fract() != 0.0 {
                problems.push(format!("batch_size {} is not a positive integer", batch));
            }
        }
        if let Some(epochs) = epochs {
            if epochs <= 0.0 {
                problems.push(format!("epochs {} must be positive", epochs));
            }
        }
        if let Some(decay) = decay {
            if decay < 0.0 {
                problems.push("weight_decay cannot be negative".to_string());
            }
        }
        if let Some(dropout) = dropout {
            if !(0.0..1.0).contains(&dropout) {
                problems.push(format!("dropout {} is outside [0, 1)", dropout));
            }
        }

        let detail = json!({ "learning_rate": lr, "batch_size": batch, "epochs": epochs });
        if !problems.is_empty() {
            card.reject("hyperparameters", problems.join("; "));
        } else if !warnings.is_empty() {
            card.score_with_warning("hyperparameters", 0.7, detail, warnings.join("; "));
        } else {
            card.score("hyperparameters", 1.0, detail);
        }
    }

    fn compute_budget(&self, claim: &Value, card: &mut Scorecard) {
        let Some(gpu_hours) = first_num(claim, &["gpu_hours", "compute_hours", "accelerator_hours"]) else {
            return;
        };
        if gpu_hours <= 0.0 {
            card.reject("compute_budget", format!("gpu_hours {} must be positive", gpu_hours));
            return;
        }

        let gpus = first_num(claim, &["num_gpus", "gpu_count"]);
        let wall = first_num(claim, &["wall_clock_hours", "training_hours"]);
        if let (Some(gpus), Some(wall)) = (gpus, wall) {
            let implied = gpus * wall;
            if relative_difference(gpu_hours, implied).is_some_and(|d| d > 0.10) {
                card.reject(
                    "compute_budget",
                    format!("gpu_hours {} disagrees with {} GPUs x {} h", gpu_hours, gpus, wall),
                );
                return;
            }
        }

        // 6·N·D training FLOPs against the accelerator's peak
        let params = first_count(claim, &["parameter_count", "num_parameters", "params"]);
        let tokens = first_count(claim, &["training_tokens", "tokens"]);
        let peak = first_str(claim, &["gpu_type", "accelerator"]).and_then(|gpu| {
            let key: String = gpu.to_ascii_lowercase().chars().filter(char::is_ascii_alphanumeric).collect();
            ACCELERATOR_PEAK_FLOPS
                .iter()
                .find(|(name, _)| key.contains(name))
                .map(|(_, flops)| *flops)
        });
        match (params, tokens, peak) {
            (Some(n), Some(d), Some(peak)) => {
                let utilization = 6.0 * n * d / (gpu_hours * 3600.0 * peak);
                let detail = json!({ "gpu_hours": gpu_hours, "implied_utilization": utilization });
                if utilization > 1.0 {
                    card.reject(
                        "compute_budget",
                        format!("6ND needs {:.0}% of peak throughput, which is impossible", utilization * 100.0),
                    );
                } else if utilization < 0.01 {
                    card.score_with_warning("compute_budget", 0.6, detail, "claimed compute implies under 1% hardware utilization");
                } else {
                    card.score("compute_budget", 1.0, detail);
                }
            }
            _ => card.score("compute_budget", 0.8, json!({ "gpu_hours": gpu_hours, "implied_utilization": null })),
        }
    }

    fn generalization_gap(&self, claim: &Value, card: &mut Scorecard) {
        let train_loss = first_num(claim, &["train_loss", "final_train_loss"]);
        let val_loss = first_num(claim, &["val_loss", "validation_loss", "eval_loss"]);
        let train_acc = first_num(claim, &["train_accuracy"]);
        let val_acc = first_num(claim, &["val_accuracy", "validation_accuracy", "test_accuracy"]);

        if let (Some(train), Some(val)) = (train_loss, val_loss) {
            if train < 0.0 || val < 0.0 {
                card.reject("generalization_gap", "losses cannot be negative");
                return;
            }
            let detail = json!({ "train_loss": train, "val_loss": val });
            if train == 0.0 {
                card.score_with_warning("generalization_gap", 0.3, detail, "zero training loss indicates memorization");
            } else if val < 0.8 * train {
                card.score_with_warning(
                    "generalization_gap",
                    0.5,
                    detail,
                    "validation loss is well below training loss; check for leakage",
                );
            } else {
                let gap = (val - train) / train;
                if gap <= 0.5 {
                    card.score("generalization_gap", 1.0, detail);
                } else if gap <= 1.0 {
                    card.score_with_warning("generalization_gap", 0.6, detail, "validation loss exceeds training loss by over 50%");
                } else {
                    card.score_with_warning("generalization_gap", 0.3, detail, "validation loss is over twice the training loss");
                }
            }
        } else if let (Some(train), Some(val)) = (train_acc, val_acc) {
            let (train, val) = (as_percent(train), as_percent(val));
            let (Some(train), Some(val)) = (
                in_range(card, "generalization_gap", "train accuracy", train, 0.0, 100.0),
                in_range(card, "generalization_gap", "validation accuracy", val, 0.0, 100.0),
            ) else {
                return;
            };
            let gap = train - val;
            let detail = json!({ "train_accuracy": train, "val_accuracy": val, "gap": gap });
            if gap < -5.0 {
                card.score_with_warning("generalization_gap", 0.5, detail, "validation accuracy exceeds training accuracy");
            } else if gap <= 5.0 {
                card.score("generalization_gap", 1.0, detail);
            } else if gap <= 15.0 {
                card.score_with_warning("generalization_gap", 0.6, detail, "train/validation accuracy gap above 5 points");
            } else {
                card.score_with_warning("generalization_gap", 0.3, detail, "train/validation accuracy gap above 15 points");
            }
        }
    }

    async fn dataset_validation(&self, claim: &Value, card: &mut Scorecard) {
        let record = match first_str(claim, &["dataset_id", "dataset"]) {
            Some(id) => self.hub_exists(card, "dataset_exists", "datasets", &id).await,
            None => None,
        };

        let num_rows = first_count(claim, &["num_rows", "total_rows", "num_examples"]);
        if let Some(splits) = field(claim, "splits") {
            self.split_consistency(splits, num_rows, card);
        }

        if let Some(license) = first_str(claim, &["dataset_license", "license"]) {
            let declared = record.as_ref().map(hub_licenses).unwrap_or_default();
            let lowered = license.to_ascii_lowercase();
            match recognize(&license, LICENSES) {
                _ if !declared.is_empty() && !declared.contains(&lowered) => card.score_with_warning(
                    "license",
                    0.3,
                    json!({ "claimed": license, "hub": declared }),
                    format!("claimed license '{}' differs from the Hub's {:?}", license, declared),
                ),
                Some(matched) => card.score("license", 1.0, json!({ "claimed": license, "recognized_as": matched })),
                None => card.score_with_warning(
                    "license",
                    UNRECOGNIZED_SCORE,
                    json!({ "claimed": license, "recognized": false }),
                    format!("license '{}' is not a recognized license identifier", license),
                ),
            }
        }

        if let Some(rows) = num_rows {
            let hub_splits = record.as_ref().map(hub_split_sizes).unwrap_or_default();
            if rows < 0.0 || rows.fract() != 0.0 {
                card.reject("row_count", format!("num_rows {} is not a count", rows));
            } else if hub_splits.is_empty() {
                card.score("row_count", 0.7, json!({ "claimed": rows, "hub": null }));
            } else {
                let total: f64 = hub_splits.iter().map(|(_, n)| n).sum();
                match relative_difference(rows, total) {
                    Some(diff) if diff <= HUB_COUNT_TOLERANCE => {
                        card.score("row_count", 1.0, json!({ "claimed": rows, "hub": total }))
                    }
                    _ => card.reject("row_count", format!("num_rows {} differs from the Hub's {} by more than 5%", rows, total)),
                }
            }
        }

        if ["contamination_check", "benchmark_overlap", "deduplicated", "contamination"]
            .iter()
            .any(|f| has_field(claim, f))
        {
            card.neutral("contamination", "no deduplication index available; contamination scored neutral");
        }
    }

    fn split_consistency(&self, splits: &Value, num_rows: Option<f64>, card: &mut Scorecard) {
        let sizes: Vec<(String, f64)> = match splits {
            Value::Object(map) => map
                .iter()
                .filter_map(|(name, v)| Some((name.clone(), as_number(v).or_else(|| v.get("num_rows").and_then(as_number))?)))
                .collect(),
            Value::Array(items) if items.iter().all(Value::is_string) => {
                let names: Vec<String> = items.iter().filter_map(as_string).collect();
                let has_train = names.iter().any(|n| n.to_ascii_lowercase().starts_with("train"));
                if has_train {
                    card.score("split_consistency", 0.8, json!({ "splits": names, "sizes": null }));
                } else {
                    card.score_with_warning("split_consistency", 0.5, json!({ "splits": names }), "no training split declared");
                }
                return;
            }
            _ => {
                card.reject("split_consistency", "splits must map split names to sizes");
                return;
            }
        };
        if sizes.is_empty() || sizes.iter().any(|(_, n)| *n < 0.0) {
            card.reject("split_consistency", "split sizes must be non-negative numbers");
            return;
        }
        let total: f64 = sizes.iter().map(|(_, n)| n).sum();
        let fractions = sizes.iter().all(|(_, n)| *n <= 1.0) && total <= 1.0 + 1e-6;
        let detail = json!({ "splits": sizes.iter().map(|(k, v)| (k.clone(), json!(v))).collect::<serde_json::Map<_, _>>(), "total": total });
        if fractions {
            if (total - 1.0).abs() > 0.01 {
                card.reject("split_consistency", format!("split fractions sum to {}, not 1", total));
            } else {
                card.score("split_consistency", 1.0, detail);
            }
            return;
        }
        if sizes.iter().any(|(_, n)| n.fract() != 0.0) {
            card.reject("split_consistency", "split sizes must be whole numbers");
        } else if num_rows.is_some_and(|rows| rows != total) {
            card.reject("split_consistency", format!("splits sum to {} but num_rows is {}", total, num_rows.unwrap_or_default()));
        } else {
            card.score("split_consistency", 1.0, detail);
        }
    }

    async fn benchmark_result(&self, claim: &Value, card: &mut Scorecard) {
        let record = match first_str(claim, &["model_id", "model"]) {
            Some(id) => self.hub_exists(card, "model_exists", "models", &id).await,
            None => None,
        };

        if let Some(record) = &record {
            let card_data = record.get("cardData");
            let has_results = card_data.is_some_and(|c| c.get("model-index").is_some() || c.get("model_index").is_some());
            if has_results {
                card.score("model_card", 1.0, json!({ "card": true, "eval_results": true }));
            } else if card_data.is_some() {
                card.score("model_card", 0.7, json!({ "card": true, "eval_results": false }));
            } else {
                card.score_with_warning("model_card", 0.3, json!({ "card": false }), "model has no model card");
            }
        }

        self.metric_plausibility(claim, card);

        if let Some(claimed) = first_count(claim, &["parameter_count", "num_parameters", "params"]) {
            let hub_total = record
                .as_ref()
                .and_then(|r| r.pointer("/safetensors/total"))
                .and_then(as_number);
            if claimed <= 0.0 {
                card.reject("parameter_count", "parameter_count must be positive");
            } else {
                match hub_total {
                    Some(total) => match relative_difference(claimed, total) {
                        Some(diff) if diff <= HUB_COUNT_TOLERANCE => card.score(
                            "parameter_count",
                            1.0,
                            json!({ "claimed": claimed, "hub": total }),
                        ),
                        _ => card.reject(
                            "parameter_count",
                            format!("parameter_count {:.3e} differs from the Hub's {:.3e} by more than 5%", claimed, total),
                        ),
                    },
                    None if record.is_some() => {
                        card.neutral("parameter_count", "Hub reports no safetensors parameter total; parameter_count scored neutral")
                    }
                    None => {}
                }
            }
        }

        match first_str(claim, &["dataset_id"]) {
            Some(id) => {
                self.hub_exists(card, "dataset_exists", "datasets", &id).await;
            }
            None => score_reference(
                card,
                "dataset_exists",
                "benchmark",
                first_str(claim, &["benchmark", "benchmark_name"]),
                BENCHMARKS,
            ),
        }

        if ["leaderboard", "leaderboard_rank", "leaderboard_url"].iter().any(|f| has_field(claim, f)) {
            card.neutral("leaderboard", "no parquet reader available; leaderboard scored neutral");
        }
    }

    fn metric_plausibility(&self, claim: &Value, card: &mut Scorecard) {
        let named = first_str(claim, &["metric", "metric_name"]).zip(first_num(claim, &["metric_value", "score"]));
        let (metric, value) = match named {
            Some(pair) => pair,
            None => match (first_num(claim, &["accuracy"]), first_num(claim, &["perplexity"])) {
                (Some(acc), _) => ("accuracy".to_string(), acc),
                (None, Some(ppl)) => ("perplexity".to_string(), ppl),
                (None, None) => match first_num(claim, &["metric_value"]) {
                    Some(v) => ("unspecified".to_string(), v),
                    None => return,
                },
            },
        };
        let key = metric.to_ascii_lowercase();
        let detail = json!({ "metric": metric, "value": value });
        if key.contains("perplexity") || key == "ppl" {
            if value < 1.0 {
                card.reject("metric_plausibility", format!("perplexity {} is below 1", value));
            } else {
                card.score("metric_plausibility", 1.0, detail);
            }
        } else if key.contains("loss") || key.contains("error") || key == "wer" || key == "cer" {
            if value < 0.0 {
                card.reject("metric_plausibility", format!("{} {} cannot be negative", metric, value));
            } else {
                card.score("metric_plausibility", 1.0, detail);
            }
        } else if BOUNDED_METRICS.iter().any(|m| key.contains(m)) {
            if !(0.0..=100.0).contains(&value) {
                card.reject("metric_plausibility", format!("{} {} is outside [0, 100]", metric, value));
            } else if as_percent(value) >= 100.0 {
                card.score_with_warning("metric_plausibility", 0.7, detail, format!("perfect {} is rarely genuine", metric));
            } else {
                card.score("metric_plausibility", 1.0, detail);
            }
        } else {
            card.score_with_warning(
                "metric_plausibility",
                0.6,
                detail,
                format!("no plausibility range known for metric '{}'", metric),
            );
        }
    }
}

#[async_trait]
impl DomainAdapter for MlAiAdapter {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn claim_types(&self) -> &'static [ClaimTypeSpec] {
        ML_AI_CLAIM_TYPES
    }

    async fn verify(&self, claim: &Value, metadata: &ClaimMetadata) -> Result<VerificationResult, VerifyError> {
        let started = Instant::now();
        let (spec, inferred) = resolve_claim_type(DOMAIN, ML_AI_CLAIM_TYPES, claim, metadata)?;
        info!("Verifying {} claim ({})", DOMAIN, spec.name);

        let mut card = Scorecard::new(spec);
        if let Some(warning) = inferred {
            card.warn(warning);
        }
        match spec.name {
            "training_run" => self.training_run(claim, &mut card).await,
            "dataset_validation" => self.dataset_validation(claim, &mut card).await,
            "benchmark_result" => self.benchmark_result(claim, &mut card).await,
            _ => return Err(unhandled_claim_type(DOMAIN, spec, ML_AI_CLAIM_TYPES)),
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

    fn adapter(stub: StubFetcher) -> MlAiAdapter {
        MlAiAdapter::new(HttpClient::new(Arc::new(stub)))
    }

    fn meta(claim_type: &str) -> ClaimMetadata {
        ClaimMetadata::new(DOMAIN).with_claim_type(claim_type)
    }

    #[test]
    fn test_weights_sum_to_one() {
        for spec in ML_AI_CLAIM_TYPES {
            assert!((spec.weight_sum() - 1.0).abs() < 1e-9, "{}", spec.name);
        }
    }

    #[test]
    fn test_claim_types_match_inference_table() {
        let mut inferred = claim_types_for(DOMAIN);
        let mut names: Vec<&str> = ML_AI_CLAIM_TYPES.iter().map(|s| s.name).collect();
        inferred.sort();
        names.sort();
        assert_eq!(inferred, names);
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count(&json!("7B")), Some(7e9));
        assert_eq!(parse_count(&json!("1.5 million")), Some(1.5e6));
        assert_eq!(parse_count(&json!("350M")), Some(350e6));
        assert_eq!(parse_count(&json!(125000)), Some(125000.0));
        assert_eq!(parse_count(&json!("lots")), None);
    }

    #[test]
    fn test_hub_split_sizes() {
        let record = json!({"cardData": {"dataset_info": [{"splits": [
            {"name": "train", "num_examples": 900}, {"name": "test", "num_examples": 100}
        ]}]}});
        let sizes = hub_split_sizes(&record);
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0], ("train".to_string(), 900.0));
    }

    #[tokio::test]
    async fn test_all_absent_is_neutral() {
        let adapter = adapter(StubFetcher::offline());
        for spec in ML_AI_CLAIM_TYPES {
            let result = adapter.verify(&json!({}), &meta(spec.name)).await.unwrap();
            assert_eq!(result.score, 0.5, "{}", spec.name);
        }
    }

    #[tokio::test]
    async fn test_training_run_with_repository() {
        let adapter = adapter(StubFetcher::new().route(
            "/repos/karpathy/nanoGPT",
            StubReply::json(json!({"full_name": "karpathy/nanoGPT", "stargazers_count": 30000, "archived": false})),
        ));
        let claim = json!({
            "loss_curve": [4.2, 3.1, 2.5, 2.1],
            "learning_rate": 6e-4,
            "batch_size": 12,
            "epochs": 1,
            "code_repository": "https://github.com/karpathy/nanoGPT",
            "train_loss": 2.1,
            "val_loss": 2.3
        });
        let result = adapter.verify(&claim, &meta("training_run")).await.unwrap();
        let scores = &result.details["component_scores"];
        assert_eq!(scores["loss_curve"], 1.0);
        assert_eq!(scores["hyperparameters"], 1.0);
        assert_eq!(scores["code_repository"], 1.0);
        assert_eq!(scores["generalization_gap"], 1.0);
        assert_eq!(scores["compute_budget"], 0.5);
    }

    #[tokio::test]
    async fn test_rising_loss_rejected() {
        let adapter = adapter(StubFetcher::offline());
        let claim = json!({"loss_curve": [1.0, 1.5, 2.0]});
        let result = adapter.verify(&claim, &meta("training_run")).await.unwrap();
        assert_eq!(result.details["component_scores"]["loss_curve"], 0.0);
    }

    #[tokio::test]
    async fn test_impossible_compute_rejected() {
        let adapter = adapter(StubFetcher::offline());
        let claim = json!({
            "gpu_hours": 10,
            "gpu_type": "A100",
            "parameter_count": "7B",
            "training_tokens": "1T",
            "learning_rate": 3e-4
        });
        let result = adapter.verify(&claim, &meta("training_run")).await.unwrap();
        assert_eq!(result.details["component_scores"]["compute_budget"], 0.0);
    }

    #[tokio::test]
    async fn test_dataset_rows_match_hub() {
        let adapter = adapter(StubFetcher::new().route(
            "/api/datasets/openai/gsm8k",
            StubReply::json(json!({
                "id": "openai/gsm8k",
                "tags": ["license:mit"],
                "cardData": {"license": "mit", "dataset_info": {"splits": [
                    {"name": "train", "num_examples": 7473}, {"name": "test", "num_examples": 1319}
                ]}}
            })),
        ));
        let claim = json!({
            "dataset_id": "openai/gsm8k",
            "splits": {"train": 7473, "test": 1319},
            "num_rows": 8792,
            "dataset_license": "MIT"
        });
        let result = adapter.verify(&claim, &meta("dataset_validation")).await.unwrap();
        let scores = &result.details["component_scores"];
        assert_eq!(scores["dataset_exists"], 1.0);
        assert_eq!(scores["split_consistency"], 1.0);
        assert_eq!(scores["license"], 1.0);
        assert_eq!(scores["row_count"], 1.0);
    }

    #[tokio::test]
    async fn test_hub_unauthorized_is_unavailable() {
        let adapter = adapter(StubFetcher::new().route("/api/datasets/", StubReply::status(401)));
        let claim = json!({"dataset_id": "gated/private-set"});
        let result = adapter.verify(&claim, &meta("dataset_validation")).await.unwrap();
        assert_eq!(result.details["component_scores"]["dataset_exists"], 0.5);
        assert!(!result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_benchmark_parameter_count_against_hub() {
        let adapter = adapter(StubFetcher::new().route(
            "/api/models/mistralai/Mistral-7B-v0.1",
            StubReply::json(json!({
                "id": "mistralai/Mistral-7B-v0.1",
                "cardData": {"license": "apache-2.0"},
                "safetensors": {"total": 7241732096u64}
            })),
        ));
        let claim = json!({
            "model_id": "mistralai/Mistral-7B-v0.1",
            "benchmark": "MMLU",
            "metric": "accuracy",
            "metric_value": 64.2,
            "parameter_count": "7.24B",
            "leaderboard": "open_llm"
        });
        let result = adapter.verify(&claim, &meta("benchmark_result")).await.unwrap();
        let scores = &result.details["component_scores"];
        assert_eq!(scores["model_exists"], 1.0);
        assert_eq!(scores["model_card"], 0.7);
        assert_eq!(scores["metric_plausibility"], 1.0);
        assert_eq!(scores["parameter_count"], 1.0);
        assert_eq!(scores["dataset_exists"], 1.0);
        assert_eq!(scores["leaderboard"], 0.5);
    }

    #[tokio::test]
    async fn test_accuracy_above_hundred_rejected() {
        let adapter = adapter(StubFetcher::offline());
        let claim = json!({"benchmark": "mmlu", "accuracy": 130.0});
        let result = adapter.verify(&claim, &meta("benchmark_result")).await.unwrap();
        assert_eq!(result.details["component_scores"]["metric_plausibility"], 0.0);
    }
}
