//! Ranking of probe results and top-K selection for config promotion.

use crate::probe::ProbeResult;

/// Number of mirrors promoted into the daemon configuration.
pub const TOP_K: usize = 5;

/// Sort results into promotion order.
///
/// Available results come first, ordered by latency ascending; unavailable
/// results keep their relative order at the tail. The sort is stable.
pub fn rank(mut results: Vec<ProbeResult>) -> Vec<ProbeResult> {
    results.sort_by(|a, b| {
        b.available.cmp(&a.available).then_with(|| {
            if a.available && b.available {
                let la = a.response_time.unwrap_or(f64::MAX);
                let lb = b.response_time.unwrap_or(f64::MAX);
                la.partial_cmp(&lb).unwrap_or(std::cmp::Ordering::Equal)
            } else {
                std::cmp::Ordering::Equal
            }
        })
    });
    results
}

/// The first `k` available mirrors from a ranked sequence.
///
/// Never pads with unavailable entries; returns fewer than `k` when fewer are
/// available.
pub fn top_k(ranked: &[ProbeResult], k: usize) -> Vec<String> {
    ranked
        .iter()
        .filter(|r| r.available)
        .take(k)
        .map(|r| r.mirror.clone())
        .collect()
}
