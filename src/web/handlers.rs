//! HTTP request handlers.

use super::AppState;
use crate::daemon::DaemonConfig;
use crate::probe::{build_client, check_mirror, validate_mirror_url, ProbeResult};
use crate::ranking::{top_k, TOP_K};
use crate::scheduler::UpdateError;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// API: Mirrors
// ============================================================================

#[derive(Debug, Serialize)]
pub struct MirrorsResponse {
    pub mirrors: Vec<String>,
}

pub async fn handle_get_mirrors(State(state): State<AppState>) -> impl IntoResponse {
    Json(MirrorsResponse {
        mirrors: state.config.mirrors.clone(),
    })
}

// ============================================================================
// API: Probing
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TestSingleRequest {
    pub mirror: String,
}

pub async fn handle_test_single(
    State(state): State<AppState>,
    Json(req): Json<TestSingleRequest>,
) -> impl IntoResponse {
    if req.mirror.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "missing mirror parameter").into_response();
    }

    let result = if validate_mirror_url(&req.mirror) {
        let client = match build_client(state.config.probe_timeout) {
            Ok(c) => c,
            Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        };
        check_mirror(&client, &req.mirror, state.config.probe_timeout).await
    } else {
        ProbeResult::invalid_url(&req.mirror)
    };

    state.scheduler.record_single(&result).await;
    Json(result).into_response()
}

#[derive(Debug, Deserialize)]
pub struct TestAllRequest {
    #[serde(default)]
    pub mirrors: Option<Vec<String>>,
}

pub async fn handle_test_all(
    State(state): State<AppState>,
    Json(req): Json<TestAllRequest>,
) -> impl IntoResponse {
    let mirrors = req
        .mirrors
        .unwrap_or_else(|| state.config.mirrors.clone());

    if mirrors.is_empty() {
        return (StatusCode::BAD_REQUEST, "mirrors must be a non-empty list").into_response();
    }

    let report = state.scheduler.run_batch_now(mirrors).await;
    Json(report).into_response()
}

pub async fn handle_cached_report(State(state): State<AppState>) -> impl IntoResponse {
    match state.scheduler.latest_report().await {
        Some(report) => Json(report).into_response(),
        None => (StatusCode::NOT_FOUND, "no batch has run yet").into_response(),
    }
}

// ============================================================================
// API: Daemon config
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedResponse {
    pub config: DaemonConfig,
    pub mirrors: Vec<String>,
    pub count: usize,
    pub total_available: usize,
    pub test_time: DateTime<Utc>,
}

pub async fn handle_recommended_config(State(state): State<AppState>) -> impl IntoResponse {
    let report = match state.scheduler.latest_report().await {
        Some(r) => r,
        None => return (StatusCode::NOT_FOUND, "no probe data yet").into_response(),
    };

    let recommended = top_k(&report.results, TOP_K);
    if recommended.is_empty() {
        return (StatusCode::NOT_FOUND, "no available mirrors").into_response();
    }

    Json(RecommendedResponse {
        config: DaemonConfig {
            registry_mirrors: recommended.clone(),
            extra: Default::default(),
        },
        count: recommended.len(),
        mirrors: recommended,
        total_available: report.available_count,
        test_time: report.test_time,
    })
    .into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdateResponse {
    pub success: bool,
    pub mirrors: Vec<String>,
    pub config_path: String,
    pub backed_up: bool,
    pub backup_path: String,
}

pub async fn handle_config_update(State(state): State<AppState>) -> impl IntoResponse {
    match state.scheduler.apply_recommended().await {
        Ok(applied) => Json(ConfigUpdateResponse {
            success: true,
            mirrors: applied.config.registry_mirrors,
            config_path: state.config.daemon_json_path.clone(),
            backed_up: applied.backed_up,
            backup_path: state.config.daemon_json_backup_path.clone(),
        })
        .into_response(),
        Err(e @ (UpdateError::NoData | UpdateError::NoneAvailable)) => {
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// ============================================================================
// API: History & statistics
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub mirror: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<ProbeResult>,
}

pub async fn handle_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(100).clamp(1, 10_000);

    match state.store.get_history(query.mirror.as_deref(), limit) {
        Ok(history) => Json(HistoryResponse { history }).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Serialize)]
pub struct StatisticsResponse {
    pub statistics: Vec<crate::stats::EndpointStats>,
}

pub async fn handle_statistics(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.get_all_stats() {
        Ok(statistics) => Json(StatisticsResponse { statistics }).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_result_json_shape() {
        let result = ProbeResult {
            mirror: "https://m.example".to_string(),
            available: true,
            status: "available".to_string(),
            status_code: Some(200),
            response_time: Some(123.4),
            test_time: Utc::now(),
            error_reason: None,
        };

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["mirror"], "https://m.example");
        assert_eq!(value["statusCode"], 200);
        assert_eq!(value["responseTime"], 123.4);
        assert!(value.get("errorReason").is_none());
    }

    #[test]
    fn test_batch_report_json_shape() {
        let report = crate::batch::BatchReport {
            total_mirrors: 2,
            available_count: 1,
            unavailable_count: 1,
            results: vec![],
            test_time: Utc::now(),
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["totalMirrors"], 2);
        assert_eq!(value["availableCount"], 1);
        assert_eq!(value["unavailableCount"], 1);
        assert!(value.get("testTime").is_some());
    }
}
