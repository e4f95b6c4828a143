//! Rolling per-mirror statistics.
//!
//! The aggregator is a pure fold over probe results. Callers own the single
//! writable map, apply each result exactly once, and serialize access; the
//! fold itself never touches storage.

use crate::probe::ProbeResult;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Running counters for one mirror. Invariant: `total_tests` always equals
/// `success_count + fail_count`, and `avg_response_time` reflects only
/// latencies from reachable probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStats {
    pub mirror: String,
    pub total_tests: i64,
    pub success_count: i64,
    pub fail_count: i64,
    pub avg_response_time: f64,
    /// Successful probes that carried a latency; the mean divides by this,
    /// not by `success_count`, so a latency-less success cannot skew it.
    pub latency_samples: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fail_time: Option<DateTime<Utc>>,
    pub current_status: bool,
}

impl EndpointStats {
    /// Zeroed counters for a mirror seen for the first time.
    pub fn new(mirror: &str) -> Self {
        Self {
            mirror: mirror.to_string(),
            total_tests: 0,
            success_count: 0,
            fail_count: 0,
            avg_response_time: 0.0,
            latency_samples: 0,
            last_success_time: None,
            last_fail_time: None,
            current_status: false,
        }
    }
}

/// Fold one probe result into the stats map.
///
/// Creates a zeroed entry for unseen mirrors. Not re-appliable to the same
/// result without double-counting.
pub fn update(stats: &mut HashMap<String, EndpointStats>, result: &ProbeResult) {
    let entry = stats
        .entry(result.mirror.clone())
        .or_insert_with(|| EndpointStats::new(&result.mirror));

    entry.total_tests += 1;

    if result.available {
        entry.success_count += 1;
        if let Some(latency) = result.response_time {
            entry.latency_samples += 1;
            entry.avg_response_time = (entry.avg_response_time
                * (entry.latency_samples - 1) as f64
                + latency)
                / entry.latency_samples as f64;
        }
        entry.last_success_time = Some(result.test_time);
        entry.current_status = true;
    } else {
        entry.fail_count += 1;
        entry.last_fail_time = Some(result.test_time);
        entry.current_status = false;
    }
}
