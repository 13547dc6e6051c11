//! HTTP transport seam and its reqwest implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use thiserror::Error;

use crate::util::timeout::with_timeout;

/// A fully prepared outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

/// Status and raw body of a received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure to obtain any response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("failed to read response: {0}")]
    Body(String),
}

/// Executes one HTTP exchange. Implementations must not retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// [`Transport`] backed by a shared `reqwest::Client` with a fixed deadline
/// covering both the send and the body read.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .build()?;
        Ok(Self { client, timeout })
    }

    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(default_headers())
            .headers(request.headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        with_timeout(self.timeout, async move {
            let response = builder.send().await.map_err(map_send_error)?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|err| TransportError::Body(err.to_string()))?;
            Ok(HttpResponse { status, body })
        })
        .await
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

fn map_send_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        // Only reachable when a caller-supplied client carries its own timeout.
        TransportError::Timeout { timeout_ms: 0 }
    } else {
        TransportError::Connect(error.to_string())
    }
}
