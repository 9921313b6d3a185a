//! Position source - fetches the current position over HTTP
//!
//! One GET per call, bounded by the configured timeout. Transport errors are
//! classified once here so the refresh cycle only sees `FetchError`.

use crate::domain::notification::FailureKind;
use crate::domain::position::{PositionError, PositionFix};
use crate::infra::config::Config;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Why a fetch did not produce a position
#[derive(Debug)]
pub enum FetchError {
    Timeout,
    /// Non-2xx HTTP status
    Status(u16),
    /// Connection could not be established or was dropped before a response
    NoResponse(String),
    Malformed(PositionError),
    Other(String),
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Timeout => FailureKind::Timeout,
            FetchError::Status(status) => FailureKind::ServerError(*status),
            FetchError::NoResponse(_) => FailureKind::NoResponse,
            FetchError::Malformed(_) => FailureKind::MalformedResponse,
            FetchError::Other(_) => FailureKind::Other,
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Timeout => write!(f, "request timed out"),
            FetchError::Status(status) => write!(f, "server responded with status {}", status),
            FetchError::NoResponse(e) => write!(f, "no response: {}", e),
            FetchError::Malformed(e) => write!(f, "malformed response: {}", e),
            FetchError::Other(e) => write!(f, "request failed: {}", e),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Malformed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else if e.is_connect() || e.is_request() {
            FetchError::NoResponse(e.to_string())
        } else {
            FetchError::Other(e.to_string())
        }
    }
}

impl From<PositionError> for FetchError {
    fn from(e: PositionError) -> Self {
        FetchError::Malformed(e)
    }
}

/// Anything that can produce the current position
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn fetch(&self) -> Result<PositionFix, FetchError>;

    /// Human-readable origin, for logs
    fn describe(&self) -> &str;
}

/// Position source backed by an HTTP JSON endpoint
pub struct HttpPositionSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPositionSource {
    pub fn new(endpoint: &str, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(Self { client, endpoint: endpoint.to_string() })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(config.endpoint(), config.request_timeout())
    }
}

#[async_trait]
impl PositionSource for HttpPositionSource {
    async fn fetch(&self) -> Result<PositionFix, FetchError> {
        let response = self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        debug!(endpoint = %self.endpoint, bytes = %body.len(), "position_response_received");

        Ok(PositionFix::from_json(&body)?)
    }

    fn describe(&self) -> &str {
        &self.endpoint
    }
}
