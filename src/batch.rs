//! Batch runner: fans a mirror list out to concurrent probes and collects one
//! atomic report.

use crate::probe::{build_client, check_mirror, validate_mirror_url, ProbeResult};
use crate::ranking::rank;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// One finished round of probing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub total_mirrors: usize,
    pub available_count: usize,
    pub unavailable_count: usize,
    /// Ranked: available first by latency ascending, ties by mirror URL.
    pub results: Vec<ProbeResult>,
    pub test_time: DateTime<Utc>,
}

/// Probe every mirror in the list, at most `concurrency` at a time, and wait
/// for the full batch before reporting.
///
/// Duplicate entries are probed once. Malformed URLs are reported as
/// unavailable with an `invalid-url` reason instead of being probed. Every
/// input mirror appears exactly once in the report, so
/// `available_count + unavailable_count == total_mirrors` always holds.
pub async fn run_batch(mirrors: &[String], concurrency: usize, timeout: Duration) -> BatchReport {
    let mut seen = std::collections::HashSet::new();
    let mirrors: Vec<&String> = mirrors.iter().filter(|m| seen.insert(m.as_str())).collect();

    let mut results: Vec<ProbeResult> = Vec::with_capacity(mirrors.len());
    let mut tasks = Vec::new();

    let client = build_client(timeout);
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    for mirror in &mirrors {
        if !validate_mirror_url(mirror.as_str()) {
            results.push(ProbeResult::invalid_url(mirror.as_str()));
            continue;
        }

        let client = match &client {
            Ok(c) => c.clone(),
            Err(e) => {
                results.push(probe_failed(mirror.as_str(), &e.to_string()));
                continue;
            }
        };

        let semaphore = semaphore.clone();
        let mirror = (*mirror).clone();
        let task_mirror = mirror.clone();

        tasks.push((
            task_mirror,
            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                check_mirror(&client, &mirror, timeout).await
            }),
        ));
    }

    for (mirror, task) in tasks {
        match task.await {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::error!("Probe task for {} failed: {}", mirror, e);
                results.push(probe_failed(&mirror, "probe task failed"));
            }
        }
    }

    // Canonicalize by URL first so the stable rank gives reproducible output
    // regardless of completion order.
    results.sort_by(|a, b| a.mirror.cmp(&b.mirror));
    let results = rank(results);

    let available_count = results.iter().filter(|r| r.available).count();

    BatchReport {
        total_mirrors: results.len(),
        available_count,
        unavailable_count: results.len() - available_count,
        results,
        test_time: Utc::now(),
    }
}

fn probe_failed(mirror: &str, detail: &str) -> ProbeResult {
    ProbeResult {
        mirror: mirror.to_string(),
        available: false,
        status: detail.to_string(),
        status_code: None,
        response_time: None,
        test_time: Utc::now(),
        error_reason: Some("network-error".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Accept connections but never write a response.
    async fn serve_silent() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    tokio::time::sleep(Duration::from_secs(5)).await;
                });
            }
        });

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_timed_out_mirror_counted_once() {
        let silent = serve_silent().await;
        let mirrors = vec![
            silent.clone(),
            "http://127.0.0.1:1".to_string(),
            "http://127.0.0.1:2".to_string(),
        ];

        let report = run_batch(&mirrors, 3, Duration::from_millis(300)).await;

        assert_eq!(report.total_mirrors, 3);
        assert_eq!(report.available_count + report.unavailable_count, 3);

        let timed_out: Vec<_> = report.results.iter().filter(|r| r.mirror == silent).collect();
        assert_eq!(timed_out.len(), 1);
        assert!(!timed_out[0].available);
        assert_eq!(timed_out[0].error_reason.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_batch_counts_always_balance() {
        let mirrors = vec![
            "http://127.0.0.1:1".to_string(),
            "not a url".to_string(),
            "http://127.0.0.1:2".to_string(),
        ];

        let report = run_batch(&mirrors, 2, Duration::from_millis(500)).await;

        assert_eq!(report.total_mirrors, 3);
        assert_eq!(report.available_count + report.unavailable_count, 3);
        for mirror in &mirrors {
            assert_eq!(
                report.results.iter().filter(|r| &r.mirror == mirror).count(),
                1,
                "{} should appear exactly once",
                mirror
            );
        }
    }

    #[tokio::test]
    async fn test_invalid_url_reported_not_probed() {
        let mirrors = vec!["ftp://wrong.example".to_string()];
        let report = run_batch(&mirrors, 4, Duration::from_millis(100)).await;

        assert_eq!(report.total_mirrors, 1);
        assert_eq!(report.available_count, 0);
        let r = &report.results[0];
        assert_eq!(r.error_reason.as_deref(), Some("invalid-url"));
        assert!(r.response_time.is_none());
    }

    #[tokio::test]
    async fn test_duplicates_probed_once() {
        let mirrors = vec![
            "http://127.0.0.1:1".to_string(),
            "http://127.0.0.1:1".to_string(),
        ];
        let report = run_batch(&mirrors, 2, Duration::from_millis(300)).await;

        assert_eq!(report.total_mirrors, 1);
    }

    #[tokio::test]
    async fn test_report_order_is_deterministic() {
        let mirrors = vec![
            "http://127.0.0.1:3".to_string(),
            "http://127.0.0.1:1".to_string(),
            "http://127.0.0.1:2".to_string(),
        ];

        let a = run_batch(&mirrors, 3, Duration::from_millis(300)).await;
        let b = run_batch(&mirrors, 3, Duration::from_millis(300)).await;

        let order_a: Vec<&str> = a.results.iter().map(|r| r.mirror.as_str()).collect();
        let order_b: Vec<&str> = b.results.iter().map(|r| r.mirror.as_str()).collect();
        assert_eq!(order_a, order_b);
    }
}
