//! Probe module for registry mirror availability checks.

mod http;

pub use http::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Status codes that indicate a live registry service.
///
/// 401/404 mean an access-gated or routed but live service; 301/302 mean a
/// redirecting but live host.
pub const AVAILABLE_CODES: &[u16] = &[200, 301, 302, 401, 404];

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("network error: {0}")]
    Network(String),
}

impl ProbeError {
    /// Short machine-readable reason reported in probe results.
    pub fn reason(&self) -> &'static str {
        match self {
            ProbeError::Timeout(_) => "timeout",
            ProbeError::Connect(_) => "connect-failed",
            ProbeError::Network(_) => "network-error",
        }
    }
}

/// Outcome of a single availability check against one mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub mirror: String,
    pub available: bool,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Wall-clock duration of the whole check in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
    pub test_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl ProbeResult {
    /// Result for an endpoint rejected before probing.
    pub fn invalid_url(mirror: &str) -> Self {
        Self {
            mirror: mirror.to_string(),
            available: false,
            status: "invalid URL".to_string(),
            status_code: None,
            response_time: None,
            test_time: Utc::now(),
            error_reason: Some("invalid-url".to_string()),
        }
    }
}

/// Whether a status code classifies the mirror as available.
pub fn is_available_code(code: u16) -> bool {
    AVAILABLE_CODES.contains(&code)
}

/// Validate that a mirror URL is an absolute http(s) URL with a host.
pub fn validate_mirror_url(mirror: &str) -> bool {
    match Url::parse(mirror) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https") && url.host_str().is_some()
        }
        Err(_) => false,
    }
}
