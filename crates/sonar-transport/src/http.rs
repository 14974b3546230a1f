//! HTTP collaborator seam.
//!
//! The engine needs HTTPS only for access-point resolution. Hosts inject an
//! implementation of [`HttpClient`] (the CLI ships a reqwest-backed one).

use crate::transport::{TransportError, TransportResult};
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
}

/// HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Method
    pub method: HttpMethod,
    /// Absolute URL
    pub url: String,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// Optional body
    pub body: Option<Bytes>,
    /// Per-request timeout
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Create a request
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// Shorthand for a GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the body
    #[must_use]
    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// HTTP response
#[derive(Debug)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// Response body
    pub body: Bytes,
}

impl HttpResponse {
    /// Parse response body as JSON
    ///
    /// # Errors
    /// Returns [`TransportError::Http`] if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> TransportResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| TransportError::Http(format!("JSON deserialization failed: {e}")))
    }

    /// Check if response status is successful (2xx)
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Async HTTP client provided by the host.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute a request.
    ///
    /// # Errors
    /// Returns [`TransportError::Http`] on network or protocol failure.
    async fn execute(&self, request: HttpRequest) -> TransportResult<HttpResponse>;
}
