//! Scheduler module: periodic probe cycles and result recording.

use crate::batch::{run_batch, BatchReport};
use crate::config::ServerConfig;
use crate::daemon::{self, AppliedConfig, ConfigError};
use crate::db::Store;
use crate::probe::ProbeResult;
use crate::ranking::{top_k, TOP_K};
use crate::stats::{self, EndpointStats};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

/// Errors from a config update trigger.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("no probe data available yet")]
    NoData,
    #[error("no available mirrors to promote")]
    NoneAvailable,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Orchestrates probe cycles and owns the single writable stats map.
pub struct Scheduler {
    config: ServerConfig,
    store: Arc<Store>,
    stats: Mutex<HashMap<String, EndpointStats>>,
    last_report: RwLock<Option<BatchReport>>,
    // Prevents overlapping probe cycles (a slow batch must not stack).
    cycle_lock: Mutex<()>,
    // Serializes read-modify-write of the daemon config file.
    config_write_lock: Mutex<()>,
}

impl Scheduler {
    /// Create a scheduler, seeding the stats map from the store.
    pub fn new(config: ServerConfig, store: Arc<Store>) -> Result<Self, crate::db::DbError> {
        let stats = store.load_stats_map()?;
        if !stats.is_empty() {
            tracing::info!("Loaded statistics for {} mirrors", stats.len());
        }

        Ok(Self {
            config,
            store,
            stats: Mutex::new(stats),
            last_report: RwLock::new(None),
            cycle_lock: Mutex::new(()),
            config_write_lock: Mutex::new(()),
        })
    }

    /// Start the periodic probe loop. The first cycle runs immediately.
    pub fn start(self: &Arc<Self>) {
        let scheduler = self.clone();

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(scheduler.config.interval_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                scheduler.run_cycle().await;
            }
        });
    }

    /// Run one scheduled cycle: probe all configured mirrors, record the
    /// report, and rewrite the daemon config when auto-update is enabled.
    pub async fn run_cycle(&self) {
        let guard = match self.cycle_lock.try_lock() {
            Ok(g) => g,
            Err(_) => {
                tracing::warn!("Previous probe cycle still running, skipping this tick");
                return;
            }
        };

        tracing::info!("Probing {} configured mirrors", self.config.mirrors.len());
        let report = self
            .run_batch_now(self.config.mirrors.clone())
            .await;
        tracing::info!(
            "Probe cycle finished: {}/{} mirrors available",
            report.available_count,
            report.total_mirrors
        );

        if self.config.auto_update_config {
            match self.apply_recommended().await {
                Ok(applied) => tracing::info!(
                    "Daemon config updated with {} mirrors",
                    applied.config.registry_mirrors.len()
                ),
                Err(UpdateError::NoneAvailable) => {
                    tracing::warn!("No available mirrors, daemon config left unchanged")
                }
                Err(e) => tracing::error!("Failed to update daemon config: {}", e),
            }
        }

        drop(guard);
    }

    /// Probe the given mirrors now and record the finished report.
    pub async fn run_batch_now(&self, mirrors: Vec<String>) -> BatchReport {
        let report = run_batch(
            &mirrors,
            self.config.concurrency,
            self.config.probe_timeout,
        )
        .await;

        self.record(&report).await;
        report
    }

    /// Record one ad-hoc single-mirror result.
    pub async fn record_single(&self, result: &ProbeResult) {
        if let Err(e) = self.store.add_probe_results(std::slice::from_ref(result)) {
            tracing::error!("Failed to persist probe result: {}", e);
        }

        let mut stats = self.stats.lock().await;
        stats::update(&mut stats, result);
        if let Some(s) = stats.get(&result.mirror) {
            if let Err(e) = self.store.upsert_stats(s) {
                tracing::error!("Failed to persist stats for {}: {}", result.mirror, e);
            }
        }
    }

    /// Most recent finished batch report, if any.
    pub async fn latest_report(&self) -> Option<BatchReport> {
        self.last_report.read().await.clone()
    }

    /// Synthesize the daemon config from the latest report's top-K and write
    /// it, backing up the previous file first.
    pub async fn apply_recommended(&self) -> Result<AppliedConfig, UpdateError> {
        let report = self.latest_report().await.ok_or(UpdateError::NoData)?;
        let top = top_k(&report.results, TOP_K);
        if top.is_empty() {
            return Err(UpdateError::NoneAvailable);
        }

        let _guard = self.config_write_lock.lock().await;
        let applied = daemon::apply_top_k(
            &self.config.daemon_json_path,
            &self.config.daemon_json_backup_path,
            &top,
        )?;

        Ok(applied)
    }

    /// Fold a finished report into history, stats, and the report cache.
    ///
    /// A storage failure degrades to a log line; the report itself is still
    /// cached and returned to callers.
    async fn record(&self, report: &BatchReport) {
        if let Err(e) = self.store.add_probe_results(&report.results) {
            tracing::error!("Failed to persist probe history: {}", e);
        }
        if let Err(e) = self.store.add_batch(report) {
            tracing::error!("Failed to persist batch summary: {}", e);
        }

        {
            let mut stats = self.stats.lock().await;
            for result in &report.results {
                stats::update(&mut stats, result);
                if let Some(s) = stats.get(&result.mirror) {
                    if let Err(e) = self.store.upsert_stats(s) {
                        tracing::error!("Failed to persist stats for {}: {}", result.mirror, e);
                    }
                }
            }
        }

        *self.last_report.write().await = Some(report.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_scheduler(mirrors: Vec<String>) -> (Scheduler, NamedTempFile) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let config = ServerConfig {
            mirrors,
            probe_timeout: Duration::from_millis(300),
            auto_update_config: false,
            ..ServerConfig::default()
        };
        (Scheduler::new(config, store).unwrap(), tmp)
    }

    #[tokio::test]
    async fn test_batch_now_records_history_and_stats() {
        let mirrors = vec!["http://127.0.0.1:1".to_string(), "bad url".to_string()];
        let (scheduler, _tmp) = test_scheduler(mirrors);

        let report = scheduler
            .run_batch_now(scheduler.config.mirrors.clone())
            .await;
        assert_eq!(report.total_mirrors, 2);
        assert_eq!(report.available_count + report.unavailable_count, 2);

        let history = scheduler.store.get_history(None, 100).unwrap();
        assert_eq!(history.len(), 2);

        let all_stats = scheduler.store.get_all_stats().unwrap();
        assert_eq!(all_stats.len(), 2);
        assert!(all_stats.iter().all(|s| s.total_tests == 1));

        assert!(scheduler.latest_report().await.is_some());
        assert_eq!(scheduler.store.batch_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_apply_recommended_without_data() {
        let (scheduler, _tmp) = test_scheduler(vec![]);
        assert!(matches!(
            scheduler.apply_recommended().await,
            Err(UpdateError::NoData)
        ));
    }

    #[tokio::test]
    async fn test_apply_recommended_with_no_available_mirrors() {
        let (scheduler, _tmp) = test_scheduler(vec!["http://127.0.0.1:1".to_string()]);
        scheduler
            .run_batch_now(scheduler.config.mirrors.clone())
            .await;

        assert!(matches!(
            scheduler.apply_recommended().await,
            Err(UpdateError::NoneAvailable)
        ));
    }

    #[tokio::test]
    async fn test_stats_accumulate_across_batches() {
        let mirrors = vec!["http://127.0.0.1:1".to_string()];
        let (scheduler, _tmp) = test_scheduler(mirrors);

        scheduler
            .run_batch_now(scheduler.config.mirrors.clone())
            .await;
        scheduler
            .run_batch_now(scheduler.config.mirrors.clone())
            .await;

        let all_stats = scheduler.store.get_all_stats().unwrap();
        assert_eq!(all_stats.len(), 1);
        assert_eq!(all_stats[0].total_tests, 2);
        assert_eq!(
            all_stats[0].success_count + all_stats[0].fail_count,
            all_stats[0].total_tests
        );
    }
}
