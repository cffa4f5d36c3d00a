//! Mock upstreams for integration tests
//!
//! Provides wiremock-backed stand-ins for the key set endpoint and the
//! remote decision service.
//!
//! # Example
//! ```rust,ignore
//! let jwks = MockJwks::start(jwks_document(vec![RsaSigner::One.jwk_x5c()])).await;
//! let opa = MockOpa::start().await;
//! opa.respond("data.authz.allow", json!({"result": true})).await;
//! ```

use serde_json::Value;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock key set is served on.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Mock key set endpoint.
pub struct MockJwks {
    server: MockServer,
}

impl MockJwks {
    /// Start serving `document` on [`JWKS_PATH`].
    pub async fn start(document: Value) -> Self {
        let server = MockServer::start().await;
        let mock = Self { server };
        mock.set_document(document).await;
        mock
    }

    /// Start a server whose key set endpoint returns `status`.
    pub async fn start_failing(status: u16) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
        Self { server }
    }

    /// Replace the served document (key rotation).
    pub async fn set_document(&self, document: Value) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .mount(&self.server)
            .await;
    }

    /// Replace the served document, answering each fetch after `delay`.
    pub async fn set_document_delayed(&self, document: Value, delay: Duration) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(document)
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Full URL of the key set document.
    pub fn url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Number of fetches the endpoint has served.
    pub async fn fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }
}

/// Mock decision service.
pub struct MockOpa {
    server: MockServer,
}

impl MockOpa {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Answer POSTs for `query` (dotted, e.g. `data.authz.allow`) with `body`.
    pub async fn respond(&self, query: &str, body: Value) {
        Mock::given(method("POST"))
            .and(path(Self::query_path(query)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Answer POSTs for `query` with a raw status and body.
    pub async fn respond_raw(&self, query: &str, status: u16, body: &str) {
        Mock::given(method("POST"))
            .and(path(Self::query_path(query)))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Answer POSTs for `query` after `delay`.
    pub async fn respond_delayed(&self, query: &str, body: Value, delay: Duration) {
        Mock::given(method("POST"))
            .and(path(Self::query_path(query)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(body)
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Host the mock listens on.
    pub fn host(&self) -> String {
        self.server.address().ip().to_string()
    }

    /// Port the mock listens on.
    pub fn port(&self) -> u16 {
        self.server.address().port()
    }

    pub fn base_url(&self) -> String {
        self.server.uri()
    }

    /// JSON bodies of every request received so far.
    pub async fn received_bodies(&self) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|request| serde_json::from_slice(&request.body).ok())
            .collect()
    }

    fn query_path(query: &str) -> String {
        format!("/v1/{}", query.replace('.', "/"))
    }
}
