//! HTTP availability check implementation.

use super::{is_available_code, ProbeError, ProbeResult};

use chrono::Utc;
use std::time::{Duration, Instant};

/// Build the HTTP client used for availability checks.
///
/// Redirects are not followed so 301/302 responses stay observable, and the
/// timeout bounds connect plus full response for each attempt.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, ProbeError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .user_agent("mirrorwatch/0.1")
        .build()
        .map_err(|e| ProbeError::Network(e.to_string()))
}

/// Run one availability check against a mirror.
///
/// Probes `<mirror>/v2/` (the registry API root) first; if that attempt fails
/// to connect or times out, falls back to the bare mirror URL. Network errors
/// are folded into the result, never propagated.
pub async fn check_mirror(client: &reqwest::Client, mirror: &str, timeout: Duration) -> ProbeResult {
    let start = Instant::now();
    let api_url = format!("{}/v2/", mirror.trim_end_matches('/'));

    let outcome = match attempt(client, &api_url, timeout).await {
        Ok(code) => Ok(code),
        // Only a connect failure or timeout warrants the fallback; an HTTP
        // response from the API path is already an answer.
        Err(err @ (ProbeError::Timeout(_) | ProbeError::Connect(_))) => {
            tracing::debug!("API probe of {} failed ({}), trying bare URL", mirror, err);
            attempt(client, mirror, timeout).await
        }
        Err(err) => Err(err),
    };

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    let test_time = Utc::now();

    match outcome {
        Ok(code) if is_available_code(code) => ProbeResult {
            mirror: mirror.to_string(),
            available: true,
            status: if code == 200 {
                "available".to_string()
            } else {
                format!("available (HTTP {})", code)
            },
            status_code: Some(code),
            response_time: Some(elapsed_ms),
            test_time,
            error_reason: None,
        },
        Ok(code) => ProbeResult {
            mirror: mirror.to_string(),
            available: false,
            status: format!("HTTP error: {}", code),
            status_code: Some(code),
            response_time: Some(elapsed_ms),
            test_time,
            error_reason: None,
        },
        Err(err) => ProbeResult {
            mirror: mirror.to_string(),
            available: false,
            status: err.to_string(),
            status_code: None,
            response_time: Some(elapsed_ms),
            test_time,
            error_reason: Some(err.reason().to_string()),
        },
    }
}

/// Issue one GET and return the response status code.
async fn attempt(client: &reqwest::Client, url: &str, timeout: Duration) -> Result<u16, ProbeError> {
    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ProbeError::Timeout(timeout)
        } else if e.is_connect() {
            ProbeError::Connect(e.to_string())
        } else {
            ProbeError::Network(e.to_string())
        }
    })?;

    Ok(response.status().as_u16())
}
