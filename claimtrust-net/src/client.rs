//! Lookup helpers over an `HttpFetcher`
//!
//! A lookup has three outcomes: found (`Ok(Some)`), definitively absent
//! (`Ok(None)`, the source answered 400/404/410) and unavailable (`Err`,
//! timeout, other status, network failure or malformed body). Callers score
//! absent as evidence against a claim and unavailable as no evidence.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::{FetchError, FetchRequest, FetchResponse, HttpConfig, HttpFetcher, ReqwestFetcher};

/// Result of a lookup that distinguishes "not found" from "unavailable"
pub type Lookup<T> = Result<Option<T>, FetchError>;

const GITHUB_API: &str = "https://api.github.com";

/// Statuses meaning the source answered and the record does not exist
pub fn is_not_found(status: u16) -> bool {
    matches!(status, 400 | 404 | 410)
}

/// `(owner, repo)` of a GitHub URL in https, ssh or bare `github.com/..` form
pub fn parse_github_repo(url: &str) -> Option<(String, String)> {
    let url = url.trim();
    let url = url.split(['?', '#']).next().unwrap_or(url);
    let rest = url
        .strip_prefix("git@github.com:")
        .or_else(|| {
            let no_scheme = url
                .strip_prefix("https://")
                .or_else(|| url.strip_prefix("http://"))
                .unwrap_or(url);
            let no_www = no_scheme.strip_prefix("www.").unwrap_or(no_scheme);
            no_www.strip_prefix("github.com/")
        })?;

    let mut parts = rest.split('/').filter(|p| !p.is_empty());
    let owner = parts.next()?;
    let repo = parts.next()?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}

fn parse_json(body: &str) -> Result<Value, FetchError> {
    serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))
}

/// Shared handle used by every adapter and cross-cutting check
#[derive(Clone)]
pub struct HttpClient {
    fetcher: Arc<dyn HttpFetcher>,
    github_token: Option<String>,
}

impl HttpClient {
    pub fn new(fetcher: Arc<dyn HttpFetcher>) -> Self {
        Self {
            fetcher,
            github_token: None,
        }
    }

    /// reqwest-backed client from configuration
    pub fn from_config(config: &HttpConfig) -> Result<Self, FetchError> {
        let fetcher = ReqwestFetcher::new(config)?;
        Ok(Self::new(Arc::new(fetcher)).with_github_token(config.github_token.clone()))
    }

    pub fn with_github_token(mut self, token: Option<String>) -> Self {
        self.github_token = token;
        self
    }

    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        self.fetcher.fetch(request).await
    }

    async fn expect_success(&self, request: FetchRequest) -> Result<String, FetchError> {
        let response = self.fetch(request).await?;
        if !response.is_success() {
            return Err(FetchError::Status(response.status));
        }
        Ok(response.body)
    }

    async fn lookup(&self, request: FetchRequest) -> Lookup<String> {
        let url = request.url.clone();
        let response = self.fetch(request).await?;
        if response.is_success() {
            Ok(Some(response.body))
        } else if is_not_found(response.status) {
            debug!("{} not found ({})", url, response.status);
            Ok(None)
        } else {
            Err(FetchError::Status(response.status))
        }
    }

    /// GET a JSON document, any non-2xx status is an error
    pub async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let request = FetchRequest::get(url).header("Accept", "application/json");
        parse_json(&self.expect_success(request).await?)
    }

    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.expect_success(FetchRequest::get(url)).await
    }

    pub async fn lookup_json(&self, url: &str) -> Lookup<Value> {
        let request = FetchRequest::get(url).header("Accept", "application/json");
        match self.lookup(request).await? {
            Some(body) => parse_json(&body).map(Some),
            None => Ok(None),
        }
    }

    pub async fn lookup_text(&self, url: &str) -> Lookup<String> {
        self.lookup(FetchRequest::get(url)).await
    }

    /// POST form-encoded fields and return the response text
    pub async fn post_form_text(
        &self,
        url: &str,
        fields: Vec<(String, String)>,
    ) -> Result<String, FetchError> {
        self.expect_success(FetchRequest::post_form(url, fields)).await
    }

    /// GitHub REST v3 lookup for a path such as `/repos/owner/name`
    pub async fn github_json(&self, path: &str) -> Lookup<Value> {
        let mut request = FetchRequest::get(format!("{}{}", GITHUB_API, path))
            .header("Accept", "application/vnd.github.v3+json");
        if let Some(token) = &self.github_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        match self.lookup(request).await? {
            Some(body) => parse_json(&body).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StubFetcher, StubReply};
    use serde_json::json;

    fn client(stub: StubFetcher) -> HttpClient {
        HttpClient::new(Arc::new(stub))
    }

    #[tokio::test]
    async fn test_lookup_classifies_statuses() {
        let http = client(
            StubFetcher::new()
                .route("/found", StubReply::json(json!({"ok": true})))
                .route("/missing", StubReply::status(404))
                .route("/broken", StubReply::status(503))
                .route("/garbled", StubReply::text(200, "<html>")),
        );

        assert_eq!(
            http.lookup_json("https://x.test/found").await,
            Ok(Some(json!({"ok": true})))
        );
        assert_eq!(http.lookup_json("https://x.test/missing").await, Ok(None));
        assert_eq!(
            http.lookup_json("https://x.test/broken").await,
            Err(FetchError::Status(503))
        );
        assert!(matches!(
            http.lookup_json("https://x.test/garbled").await,
            Err(FetchError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_get_json_requires_success() {
        let http = client(StubFetcher::new().route("/missing", StubReply::status(404)));
        assert_eq!(
            http.get_json("https://x.test/missing").await,
            Err(FetchError::Status(404))
        );
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_error() {
        let http = client(StubFetcher::new().route("/slow", StubReply::Timeout));
        assert_eq!(
            http.lookup_text("https://x.test/slow").await,
            Err(FetchError::Timeout(15))
        );
    }

    #[test]
    fn test_parse_github_repo() {
        let expected = Some(("octo".to_string(), "model".to_string()));
        assert_eq!(parse_github_repo("https://github.com/octo/model"), expected);
        assert_eq!(parse_github_repo("https://www.github.com/octo/model/tree/main"), expected);
        assert_eq!(parse_github_repo("git@github.com:octo/model.git"), expected);
        assert_eq!(parse_github_repo("github.com/octo/model"), expected);
        assert_eq!(parse_github_repo("https://github.com/octo/model?tab=readme"), expected);
        assert_eq!(parse_github_repo("https://github.com/octo/model#usage"), expected);
        assert_eq!(parse_github_repo("https://github.com/octo/model.git?ref=v1"), expected);
        assert_eq!(parse_github_repo("https://gitlab.com/octo/model"), None);
        assert_eq!(parse_github_repo("https://github.com/octo"), None);
    }

    #[tokio::test]
    async fn test_github_sends_token() {
        let stub = Arc::new(StubFetcher::new().route("/repos/a/b", StubReply::json(json!({"id": 1}))));
        let http = HttpClient::new(stub.clone()).with_github_token(Some("secret".to_string()));
        assert!(http.github_json("/repos/a/b").await.unwrap().is_some());
        let requests = stub.requests();
        assert_eq!(requests, vec!["https://api.github.com/repos/a/b".to_string()]);
        assert!(stub.saw_header("Authorization", "Bearer secret"));
    }
}
