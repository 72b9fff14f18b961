//! Upstream HTTP fetch pipeline.
//!
//! The worker never talks to the network directly; it goes through the
//! [`Fetch`] trait so strategies can be exercised against fakes. The
//! production implementation is [`HttpFetcher`], a reqwest client with
//! timeout, redirect, and body-size limits.
//!
//! A non-2xx status is NOT an error here: the worker's strategies decide
//! what an error status means (a dynamic response with status 500 is
//! returned to the caller uncached, for example). Only transport-level
//! failures (connection refused, DNS, timeout, oversized body) surface
//! as [`FetchError`].

pub mod url;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use cachette_core::RequestInfo;
use reqwest::{Client, Method, header};

pub use url::{UrlError, join_origin};

/// Errors from the upstream fetch path.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// The request could not be constructed (bad method, bad URL).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Transport failure: connection, DNS, TLS, or protocol error.
    #[error("network error: {0}")]
    Network(String),

    /// The upstream did not answer within the configured timeout.
    #[error("fetch timeout: {0}")]
    Timeout(String),

    /// Response body exceeded the configured limit.
    #[error("response too large: {0}")]
    TooLarge(String),
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "cachette/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "cachette/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

/// Response from a fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Content-Type header.
    pub content_type: Option<String>,
    /// Response headers with UTF-8 values.
    pub headers: Vec<(String, String)>,
    /// Response body bytes.
    pub body: Bytes,
    /// Time taken to fetch in milliseconds.
    pub fetch_ms: u64,
}

impl FetchResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The network seam the worker's strategies run against.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Perform the request upstream.
    async fn fetch(&self, request: &RequestInfo) -> Result<FetchResponse, FetchError>;
}

/// HTTP fetch client backed by reqwest.
pub struct HttpFetcher {
    http: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| FetchError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, request: &RequestInfo) -> Result<FetchResponse, FetchError> {
        let start = Instant::now();

        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| FetchError::InvalidRequest(format!("bad method {}: {e}", request.method)))?;

        let response = self
            .http
            .request(method, request.url.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(e.to_string())
                } else {
                    FetchError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(FetchError::TooLarge(format!(
                "{} bytes exceeds {}",
                len, self.config.max_bytes
            )));
        }

        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
            .collect();

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(format!("failed to read response: {e}")))?;

        if body.len() > self.config.max_bytes {
            return Err(FetchError::TooLarge(format!(
                "{} bytes exceeds {}",
                body.len(),
                self.config.max_bytes
            )));
        }

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            url = %request.url,
            status,
            bytes = body.len(),
            fetch_ms,
            "upstream fetch complete"
        );

        Ok(FetchResponse { status, content_type, headers, body, fetch_ms })
    }
}
