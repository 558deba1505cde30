//! Timeout-bounded HTTP fetching
//!
//! Every request carries its own deadline. A fired deadline is reported as
//! `FetchError::Timeout`, never as a panic, and nothing is retried.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// HTTP layer configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// User agent sent with every request
    pub user_agent: String,
    /// GitHub token (optional, raises the REST rate limit)
    pub github_token: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            user_agent: "claimtrust/0.1 (scientific claim verification)".to_string(),
            github_token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }
}

/// Errors from external lookups
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response body: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// application/x-www-form-urlencoded fields
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

/// A single outbound request
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    /// Overrides the fetcher's default timeout
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn post_form(url: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(RequestBody::Form(fields)),
            timeout: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Raw response: any status is a successful fetch at this layer
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport for outbound requests
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// reqwest-backed fetcher
pub struct ReqwestFetcher {
    client: Client,
    default_timeout: Duration,
}

impl ReqwestFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            default_timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn send(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            Some(RequestBody::Form(fields)) => builder.form(&fields),
            Some(RequestBody::Json(json)) => builder.json(&json),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(FetchResponse { status, body })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let url = request.url.clone();
        let method = request.method;

        match tokio::time::timeout(timeout, self.send(request)).await {
            Ok(result) => {
                if let Ok(response) = &result {
                    debug!("{:?} {} -> {}", method, url, response.status);
                }
                result
            }
            Err(_) => {
                debug!("Request to {} timed out after {:?}", url, timeout);
                Err(FetchError::Timeout(timeout.as_secs()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout_secs, 15);
        assert!(config.user_agent.starts_with("claimtrust"));
    }

    #[test]
    fn test_request_builder() {
        let request = FetchRequest::get("https://rest.uniprot.org/uniprotkb/P69905.json")
            .header("Accept", "application/json")
            .timeout(Duration::from_secs(3));
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_fetcher_builds() {
        assert!(ReqwestFetcher::new(&HttpConfig::default()).is_ok());
    }

    #[test]
    fn test_success_range() {
        assert!(FetchResponse { status: 204, body: String::new() }.is_success());
        assert!(!FetchResponse { status: 404, body: String::new() }.is_success());
    }
}
