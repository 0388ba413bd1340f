//! HTTP client for upstream registries
//!
//! Each call is a single attempt bounded by the per-attempt timeout. There
//! are no retries here: the caller moves on to the next upstream candidate
//! instead.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderName};
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use tracing::debug;

use troc_core::error::TrocError;
use crate::RegistryResult;

/// Headers never forwarded from the client to an upstream
const HOP_HEADERS: &[HeaderName] = &[
    header::HOST,
    header::ACCEPT_ENCODING,
    header::AUTHORIZATION,
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    // A 304 would be useless: only 200 bodies are cached
    header::IF_NONE_MATCH,
    header::IF_MODIFIED_SINCE,
];

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout for one upstream attempt, body included
    pub attempt_timeout: Duration,
    /// Time allowed to establish a connection
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("troc/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// One request to send upstream
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    /// Upstream token from the caller's session
    pub bearer: Option<String>,
    pub body: Option<Bytes>,
}

impl UpstreamRequest {
    pub fn get(url: String) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            bearer: None,
            body: None,
        }
    }
}

/// Fully buffered upstream response
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }
}

/// HTTP client shared by every registry
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    /// Underlying HTTP client with connection pooling
    client: Client,
    config: ClientConfig,
}

impl UpstreamClient {
    /// Create an upstream client with default settings
    pub fn new() -> RegistryResult<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create an upstream client with custom configuration
    pub fn with_config(config: ClientConfig) -> RegistryResult<Self> {
        let client = ClientBuilder::new()
            // Connection pooling configuration
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(config.connect_timeout)
            .gzip(true)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TrocError::upstream("Failed to create HTTP client".to_string(), e))?;

        Ok(Self { client, config })
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.config.attempt_timeout
    }

    /// Send one request upstream and buffer the response. Any HTTP status is
    /// a successful send; only transport failures and timeouts are errors.
    pub async fn send(&self, request: UpstreamRequest) -> RegistryResult<UpstreamResponse> {
        let UpstreamRequest { method, url, headers, bearer, body } = request;
        debug!(%method, %url, "upstream request");

        let mut builder = self
            .client
            .request(method, &url)
            .headers(headers)
            .timeout(self.config.attempt_timeout);
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TrocError::upstream(format!("Request to {} failed: {}", url, e), e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| TrocError::upstream(format!("Failed to read response from {}: {}", url, e), e))?;

        debug!(%url, %status, size = body.len(), "upstream response");
        Ok(UpstreamResponse { status, headers, body })
    }
}

/// Copy client headers that are safe to send to an upstream
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    for name in HOP_HEADERS {
        forwarded.remove(name);
    }
    forwarded
}

/// Join an upstream base URL and a request path
pub fn upstream_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
