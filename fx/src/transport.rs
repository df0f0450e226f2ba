//! HTTP transport seam.
//!
//! Fetchers describe one upstream call as a [`ProviderRequest`] and get a
//! [`ProviderResponse`] back. Non-2xx statuses are responses, not errors;
//! classifying them is the fetcher's job.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Query parameters whose values never appear in logs.
const CREDENTIAL_PARAMS: &[&str] = &["api_key", "access_key"];

/// One upstream GET, built per fetch and discarded afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
}

impl ProviderRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Value of a query parameter.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Printable form with credentials masked.
    pub fn redacted(&self) -> String {
        let query = self
            .query
            .iter()
            .map(|(key, value)| {
                if CREDENTIAL_PARAMS.contains(&key.as_str()) {
                    format!("{key}=***")
                } else {
                    format!("{key}={value}")
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        if query.is_empty() {
            self.url.clone()
        } else {
            format!("{}?{}", self.url, query)
        }
    }
}

impl fmt::Debug for ProviderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProviderRequest")
            .field(&self.redacted())
            .finish()
    }
}

/// Status and body of one upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub status: u16,
    pub body: String,
}

impl ProviderResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Failure below the HTTP status level.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("client setup failed: {0}")]
    Build(String),
}

/// Performs upstream calls.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, request: &ProviderRequest) -> Result<ProviderResponse, TransportError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client with a per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, request: &ProviderRequest) -> Result<ProviderResponse, TransportError> {
        debug!(request = %request.redacted(), "Sending provider request");

        let response = self
            .client
            .get(&request.url)
            .query(&request.query)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.without_url().to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Request(e.without_url().to_string()))?;

        debug!(status, bytes = body.len(), "Provider responded");
        Ok(ProviderResponse { status, body })
    }
}

/// Transport that replays queued responses and records requests.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: parking_lot::Mutex<std::collections::VecDeque<Result<ProviderResponse, TransportError>>>,
    requests: parking_lot::Mutex<Vec<ProviderRequest>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response with the given status and body.
    pub fn respond(self, status: u16, body: impl Into<String>) -> Self {
        self.responses
            .lock()
            .push_back(Ok(ProviderResponse::new(status, body)));
        self
    }

    /// Queue a transport-level failure.
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.responses
            .lock()
            .push_back(Err(TransportError::Request(message.into())));
        self
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, request: &ProviderRequest) -> Result<ProviderResponse, TransportError> {
        self.requests.lock().push(request.clone());
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Request("no scripted response".to_string())))
    }
}
