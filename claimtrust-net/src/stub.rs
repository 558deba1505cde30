//! Routed canned responses
//!
//! `StubFetcher` answers each request from the first route whose pattern is
//! a substring of the URL. Unrouted requests fail as network errors, so a
//! stub with no routes is a fully offline fetcher: every lookup degrades to
//! "unavailable".

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::{FetchError, FetchRequest, FetchResponse, HttpFetcher};

/// Timeout reported by `StubReply::Timeout`
const STUB_TIMEOUT_SECS: u64 = 15;

/// Canned outcome for a route
#[derive(Debug, Clone)]
pub enum StubReply {
    Response { status: u16, body: String },
    Timeout,
    Failure(String),
}

impl StubReply {
    pub fn json(body: Value) -> Self {
        Self::json_status(200, body)
    }

    pub fn json_status(status: u16, body: Value) -> Self {
        Self::Response {
            status,
            body: body.to_string(),
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self::Response {
            status,
            body: body.to_string(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self::text(status, "")
    }
}

/// Fetcher that never touches the network
#[derive(Debug, Default)]
pub struct StubFetcher {
    routes: Vec<(String, StubReply)>,
    requests: Mutex<Vec<String>>,
    headers: Mutex<Vec<(String, String)>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// No routes: every request fails as unreachable
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn route(mut self, pattern: &str, reply: StubReply) -> Self {
        self.routes.push((pattern.to_string(), reply));
        self
    }

    /// URLs requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Whether any request carried the given header
    pub fn saw_header(&self, name: &str, value: &str) -> bool {
        self.headers
            .lock()
            .iter()
            .any(|(n, v)| n.eq_ignore_ascii_case(name) && v == value)
    }
}

#[async_trait]
impl HttpFetcher for StubFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        self.requests.lock().push(request.url.clone());
        self.headers.lock().extend(request.headers.iter().cloned());

        let reply = self
            .routes
            .iter()
            .find(|(pattern, _)| request.url.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone());

        match reply {
            Some(StubReply::Response { status, body }) => Ok(FetchResponse { status, body }),
            Some(StubReply::Timeout) => Err(FetchError::Timeout(STUB_TIMEOUT_SECS)),
            Some(StubReply::Failure(msg)) => Err(FetchError::Network(msg)),
            None => Err(FetchError::Network(format!("no route for {}", request.url))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_first_matching_route_wins() {
        let stub = StubFetcher::new()
            .route("/variant/rs1", StubReply::status(404))
            .route("/variant/", StubReply::json(json!({"_id": "rs2"})));

        let first = stub.fetch(FetchRequest::get("https://mv.test/variant/rs1")).await.unwrap();
        assert_eq!(first.status, 404);
        let second = stub.fetch(FetchRequest::get("https://mv.test/variant/rs2")).await.unwrap();
        assert_eq!(second.status, 200);
        assert_eq!(stub.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_offline_fails_everything() {
        let stub = StubFetcher::offline();
        let result = stub.fetch(FetchRequest::get("https://rest.ensembl.org/")).await;
        assert!(matches!(result, Err(FetchError::Network(_))));
    }
}
