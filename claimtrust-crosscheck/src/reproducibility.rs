//! Reproducibility
//!
//! Checks that the code behind a claim can be found and rerun: the GitHub
//! repository exists, the pinned commit exists, and the repository root
//! carries a dependency manifest and a recognised entry point. A claimed
//! entry point below the root is looked up by its path. Nothing is cloned
//! or executed.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, info};

use claimtrust_core::value::{first_str, str_field};
use claimtrust_core::{ClaimMetadata, ClaimTypeSpec, CrossCuttingResult, Scorecard};
use claimtrust_net::{parse_github_repo, HttpClient};

use crate::traits::{unavailable, CheckError, CrossCuttingVerifier};

const WEIGHT: f64 = 0.15;

static REPRODUCIBILITY: ClaimTypeSpec = ClaimTypeSpec {
    name: "reproducibility",
    weights: &[
        ("repository", 0.30),
        ("commit", 0.25),
        ("dependency_manifest", 0.25),
        ("entry_point", 0.20),
    ],
};

const REPOSITORY_KEYS: &[&str] = &["code_repo", "repository", "repository_url", "github_url"];
const COMMIT_KEYS: &[&str] = &["commit", "commit_sha", "commit_hash", "revision"];

pub const MANIFESTS: &[&str] = &[
    "requirements.txt",
    "pyproject.toml",
    "setup.py",
    "setup.cfg",
    "Pipfile",
    "poetry.lock",
    "environment.yml",
    "environment.yaml",
    "conda.yaml",
    "Cargo.toml",
    "package.json",
    "go.mod",
    "renv.lock",
    "DESCRIPTION",
    "Dockerfile",
];

pub const ENTRY_POINTS: &[&str] = &[
    "reproduce.py",
    "reproduce.sh",
    "run.sh",
    "run_all.sh",
    "main.py",
    "Makefile",
    "Snakefile",
];

static COMMIT_SHA_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{7,40}$").unwrap());

/// Root entries of a GitHub contents listing
fn listing_names(listing: &Value) -> Vec<String> {
    listing
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| str_field(item, "name"))
                .collect()
        })
        .unwrap_or_default()
}

/// `/repos/{owner}/{repo}` with both segments percent-encoded
fn repo_path(owner: &str, repo: &str) -> String {
    format!("/repos/{}/{}", urlencoding::encode(owner), urlencoding::encode(repo))
}

/// Repository-relative file path, normalised and percent-encoded per segment
fn encode_file_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn present<'a>(names: &[String], wanted: &[&'a str]) -> Vec<&'a str> {
    wanted
        .iter()
        .filter(|w| names.iter().any(|n| n.eq_ignore_ascii_case(w)))
        .copied()
        .collect()
}

/// Repository, commit, manifest and entry-point checks over GitHub
pub struct ReproducibilityVerifier {
    http: HttpClient,
}

impl ReproducibilityVerifier {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Score the repository itself. `false` when nothing further can be
    /// checked against it.
    async fn repository(&self, owner: &str, repo: &str, card: &mut Scorecard) -> bool {
        match self.http.github_json(&repo_path(owner, repo)).await {
            Ok(Some(record)) => {
                let archived = record.get("archived").and_then(Value::as_bool).unwrap_or(false);
                let detail = json!({
                    "repository": format!("{}/{}", owner, repo),
                    "default_branch": record.get("default_branch"),
                    "archived": archived,
                });
                if archived {
                    card.score_with_warning("repository", 0.8, detail, "code repository is archived");
                } else {
                    card.score("repository", 1.0, detail);
                }
                true
            }
            Ok(None) => {
                card.reject("repository", format!("GitHub repository {}/{} does not exist", owner, repo));
                false
            }
            Err(e) => {
                unavailable(card, "repository", "GitHub", &e);
                false
            }
        }
    }

    async fn commit(&self, owner: &str, repo: &str, sha: &str, card: &mut Scorecard) {
        if !COMMIT_SHA_REGEX.is_match(sha) {
            card.reject("commit", format!("'{}' is not a commit SHA", sha));
            return;
        }
        let path = format!("{}/commits/{}", repo_path(owner, repo), sha);
        match self.http.github_json(&path).await {
            Ok(Some(record)) => {
                let date = record.pointer("/commit/committer/date").cloned();
                card.score("commit", 1.0, json!({ "sha": record.get("sha"), "date": date }));
            }
            Ok(None) => card.reject("commit", format!("commit {} not found in {}/{}", sha, owner, repo)),
            Err(e) => unavailable(card, "commit", "GitHub", &e),
        }
    }

    async fn layout(&self, owner: &str, repo: &str, claimed_entry: Option<String>, card: &mut Scorecard) {
        let names = match self.http.github_json(&format!("{}/contents", repo_path(owner, repo))).await {
            Ok(Some(listing)) => listing_names(&listing),
            // empty repositories have no contents
            Ok(None) => Vec::new(),
            Err(e) => {
                unavailable(card, "dependency_manifest", "GitHub", &e);
                unavailable(card, "entry_point", "GitHub", &e);
                return;
            }
        };

        let manifests = present(&names, MANIFESTS);
        if manifests.is_empty() {
            card.score_with_warning(
                "dependency_manifest",
                0.2,
                json!({ "found": manifests }),
                "no dependency manifest at the repository root",
            );
        } else {
            card.score("dependency_manifest", 1.0, json!({ "found": manifests }));
        }

        match claimed_entry {
            Some(entry) if entry.trim_start_matches("./").trim_matches('/').contains('/') => {
                self.nested_entry(owner, repo, &entry, card).await;
            }
            Some(entry) => {
                let file = entry.trim_start_matches("./").trim_matches('/');
                if names.iter().any(|n| n == file) {
                    card.score("entry_point", 1.0, json!({ "claimed": entry, "found": true }));
                } else {
                    card.score_with_warning(
                        "entry_point",
                        0.3,
                        json!({ "claimed": entry, "found": false }),
                        format!("claimed entry point '{}' is not at the repository root", entry),
                    );
                }
            }
            None => {
                let entries = present(&names, ENTRY_POINTS);
                if entries.is_empty() {
                    card.score_with_warning(
                        "entry_point",
                        0.3,
                        json!({ "found": entries }),
                        "no recognised entry point (reproduce.py, run.sh, main.py, Makefile)",
                    );
                } else {
                    card.score("entry_point", 1.0, json!({ "found": entries }));
                }
            }
        }
    }

    /// Claimed entry point below the repository root, looked up by path
    async fn nested_entry(&self, owner: &str, repo: &str, entry: &str, card: &mut Scorecard) {
        let path = format!("{}/contents/{}", repo_path(owner, repo), encode_file_path(entry));
        match self.http.github_json(&path).await {
            Ok(Some(record)) if record.is_object() => {
                card.score("entry_point", 1.0, json!({ "claimed": entry, "found": true }));
            }
            Ok(Some(_)) => card.score_with_warning(
                "entry_point",
                0.3,
                json!({ "claimed": entry, "found": false }),
                format!("claimed entry point '{}' is a directory", entry),
            ),
            Ok(None) => card.score_with_warning(
                "entry_point",
                0.3,
                json!({ "claimed": entry, "found": false }),
                format!("claimed entry point '{}' is not in the repository", entry),
            ),
            Err(e) => unavailable(card, "entry_point", "GitHub", &e),
        }
    }
}

#[async_trait]
impl CrossCuttingVerifier for ReproducibilityVerifier {
    fn name(&self) -> &'static str {
        REPRODUCIBILITY.name
    }

    fn weight(&self) -> f64 {
        WEIGHT
    }

    fn is_applicable(&self, claim: &Value) -> bool {
        first_str(claim, REPOSITORY_KEYS).is_some()
    }

    async fn verify(&self, claim: &Value, _metadata: &ClaimMetadata) -> Result<CrossCuttingResult, CheckError> {
        let started = Instant::now();
        let mut card = Scorecard::new(&REPRODUCIBILITY);

        let url = first_str(claim, REPOSITORY_KEYS)
            .ok_or_else(|| CheckError::InvalidInput("no repository URL".to_string()))?;
        info!("Checking reproducibility of {}", url);

        let Some((owner, repo)) = parse_github_repo(&url) else {
            card.score_with_warning(
                "repository",
                0.6,
                json!({ "url": url, "host": "non-github" }),
                "repository is not on GitHub; existence not verified",
            );
            return Ok(card.finish_check(WEIGHT, started));
        };

        if self.repository(&owner, &repo, &mut card).await {
            match first_str(claim, COMMIT_KEYS) {
                Some(sha) => self.commit(&owner, &repo, sha.trim(), &mut card).await,
                None => card.warn("no commit pinned; results may not match the current default branch"),
            }
            let entry = first_str(claim, &["entry_point", "entrypoint"]);
            self.layout(&owner, &repo, entry, &mut card).await;
        }

        debug!("reproducibility of {}/{} scored {}", owner, repo, card.total());
        Ok(card.finish_check(WEIGHT, started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimtrust_net::{StubFetcher, StubReply};
    use std::sync::Arc;

    fn verifier(stub: StubFetcher) -> ReproducibilityVerifier {
        ReproducibilityVerifier::new(HttpClient::new(Arc::new(stub)))
    }

    fn complete_repo() -> StubFetcher {
        with_complete_repo(StubFetcher::new())
    }

    /// Appends the routes of a complete repository after any routes already set
    fn with_complete_repo(stub: StubFetcher) -> StubFetcher {
        stub.route(
            "/repos/lab/model/commits/",
            StubReply::json(json!({"sha": "a1b2c3d", "commit": {"committer": {"date": "2024-05-01T00:00:00Z"}}})),
        )
        .route(
            "/repos/lab/model/contents",
            StubReply::json(json!([
                {"name": "README.md", "type": "file"},
                {"name": "requirements.txt", "type": "file"},
                {"name": "reproduce.py", "type": "file"},
                {"name": "src", "type": "dir"}
            ])),
        )
        .route("/repos/lab/model", StubReply::json(json!({"default_branch": "main", "archived": false})))
    }

    #[tokio::test]
    async fn test_complete_repository_scores_full() {
        let claim = json!({"code_repo": "https://github.com/lab/model", "commit": "a1b2c3d"});
        let result = verifier(complete_repo()).verify(&claim, &ClaimMetadata::default()).await.unwrap();
        assert_eq!(result.score, 1.0);
        assert_eq!(result.name, "reproducibility");
        assert_eq!(result.details["dependency_manifest"]["found"][0], "requirements.txt");
    }

    #[tokio::test]
    async fn test_missing_repository_rejected() {
        let stub = StubFetcher::new().route("/repos/lab/gone", StubReply::status(404));
        let claim = json!({"repository": "github.com/lab/gone"});
        let result = verifier(stub).verify(&claim, &ClaimMetadata::default()).await.unwrap();
        assert_eq!(result.details["component_scores"]["repository"], 0.0);
        assert!(result.errors[0].contains("lab/gone"));
    }

    #[tokio::test]
    async fn test_offline_is_neutral() {
        let claim = json!({"github_url": "https://github.com/lab/model"});
        let result = verifier(StubFetcher::offline()).verify(&claim, &ClaimMetadata::default()).await.unwrap();
        assert_eq!(result.score, 0.5);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_commit_rejected() {
        let claim = json!({"code_repo": "https://github.com/lab/model", "commit": "not-a-sha"});
        let result = verifier(complete_repo()).verify(&claim, &ClaimMetadata::default()).await.unwrap();
        assert_eq!(result.details["component_scores"]["commit"], 0.0);
    }

    #[tokio::test]
    async fn test_nested_entry_point_looked_up_by_path() {
        let stub = StubFetcher::new()
            .route("/repos/lab/model/contents/src/main.py", StubReply::json(json!({"name": "main.py", "type": "file"})))
            .route("/repos/lab/model/contents/src/missing.py", StubReply::status(404));
        let v = verifier(with_complete_repo(stub));

        let claim = json!({
            "code_repo": "https://github.com/lab/model?tab=readme",
            "commit": "a1b2c3d",
            "entry_point": "./src/main.py"
        });
        let result = v.verify(&claim, &ClaimMetadata::default()).await.unwrap();
        assert_eq!(result.details["component_scores"]["entry_point"], 1.0);
        assert_eq!(result.score, 1.0);

        let claim = json!({"code_repo": "https://github.com/lab/model", "entry_point": "src/missing.py"});
        let result = v.verify(&claim, &ClaimMetadata::default()).await.unwrap();
        assert_eq!(result.details["component_scores"]["entry_point"], 0.3);
    }

    #[test]
    fn test_path_segments_are_encoded() {
        assert_eq!(repo_path("lab", "my model"), "/repos/lab/my%20model");
        assert_eq!(encode_file_path("./src/run me.py"), "src/run%20me.py");
    }

    #[test]
    fn test_applicability() {
        let v = verifier(StubFetcher::offline());
        assert!(v.is_applicable(&json!({"repository_url": "https://github.com/a/b"})));
        assert!(!v.is_applicable(&json!({"paper": "x"})));
    }
}
