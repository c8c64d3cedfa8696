//! Transport seam over the HTTP engine.
//!
//! The pipeline talks to a [`Transport`] object, never to the engine
//! directly. Production uses [`ReqwestTransport`]; tests substitute a stub
//! per call.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use parking_lot::RwLock;
use url::Url;

use crate::error::{HttpClientError, Result};

/// One fully prepared outgoing request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Request method.
    pub method: Method,
    /// Absolute target URL, query already applied.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body, if any.
    pub body: Option<Bytes>,
    /// Named pool the connection is checked out of.
    pub pool: Option<String>,
    /// Pool-checkout wait.
    pub checkout_timeout: Duration,
    /// Response wait.
    pub receive_timeout: Duration,
}

/// Raw engine response, before any decoding.
#[derive(Debug)]
pub struct TransportResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Final URL after redirects.
    pub url: Url,
    /// Buffered response body.
    pub body: Bytes,
}

/// The transport capability.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one request against the engine.
    async fn call(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// Pooled engine transport.
///
/// The engine fixes the connect timeout at client construction, so clients
/// are built lazily, one per (pool name, checkout timeout) pair, and reused
/// for the life of the transport.
pub struct ReqwestTransport {
    clients: RwLock<HashMap<(String, u64), reqwest::Client>>,
}

impl ReqwestTransport {
    /// Create a transport with no clients built yet.
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    fn client_for(&self, pool: &str, checkout_timeout: Duration) -> Result<reqwest::Client> {
        let key = (pool.to_string(), checkout_timeout.as_millis() as u64);
        if let Some(client) = self.clients.read().get(&key) {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .connect_timeout(checkout_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(32)
            .gzip(true)
            .brotli(true)
            .user_agent(concat!("strata-http/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| HttpClientError::Transport(error.to_string()))?;

        Ok(self
            .clients
            .write()
            .entry(key)
            .or_insert(client)
            .clone())
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn call(&self, request: TransportRequest) -> Result<TransportResponse> {
        let pool = request.pool.as_deref().unwrap_or("default");
        let client = self.client_for(pool, request.checkout_timeout)?;

        let mut builder = client
            .request(request.method.clone(), request.url.clone())
            .timeout(request.receive_timeout)
            .headers(request.headers.clone());
        if let Some(body) = request.body.clone() {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|error| classify_engine_error(error, &request))?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response
            .bytes()
            .await
            .map_err(|error| classify_engine_error(error, &request))?;

        Ok(TransportResponse {
            status,
            headers,
            url,
            body,
        })
    }
}

/// Map engine faults onto the stable taxonomy using the engine's own
/// classification, not message text.
fn classify_engine_error(error: reqwest::Error, request: &TransportRequest) -> HttpClientError {
    if error.is_connect() && error.is_timeout() {
        HttpClientError::PoolTimeout(request.checkout_timeout)
    } else if error.is_timeout() {
        HttpClientError::Timeout(request.receive_timeout)
    } else if error.is_connect() {
        HttpClientError::Connection(error.to_string())
    } else if error.is_builder() {
        HttpClientError::RequestBuild(error.to_string())
    } else {
        HttpClientError::Transport(error.to_string())
    }
}
