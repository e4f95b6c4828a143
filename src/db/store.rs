//! SQLite database store implementation.

use crate::batch::BatchReport;
use crate::probe::ProbeResult;
use crate::stats::EndpointStats;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, Result as SqlResult};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    // --- Probe history ---

    /// Persist a batch of probe results.
    pub fn add_probe_results(&self, results: &[ProbeResult]) -> Result<(), DbError> {
        if results.is_empty() {
            return Ok(());
        }

        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO probe_history (mirror_url, available, status, status_code, response_time, error_reason, test_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;

            for r in results {
                stmt.execute(params![
                    r.mirror,
                    r.available as i64,
                    r.status,
                    r.status_code,
                    r.response_time,
                    r.error_reason,
                    r.test_time.format(TIME_FORMAT).to_string(),
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Most recent probe results, newest first, optionally filtered by mirror.
    pub fn get_history(&self, mirror: Option<&str>, limit: i64) -> Result<Vec<ProbeResult>, DbError> {
        let conn = self.conn.lock().unwrap();

        let map_row = |row: &rusqlite::Row<'_>| -> SqlResult<ProbeResult> {
            let available: i64 = row.get(1)?;
            let time_str: String = row.get(6)?;
            Ok(ProbeResult {
                mirror: row.get(0)?,
                available: available != 0,
                status: row.get(2)?,
                status_code: row.get(3)?,
                response_time: row.get(4)?,
                error_reason: row.get(5)?,
                test_time: parse_db_time(&time_str).unwrap_or_else(Utc::now),
            })
        };

        let results = if let Some(m) = mirror {
            let mut stmt = conn.prepare(
                "SELECT mirror_url, available, status, status_code, response_time, error_reason, test_time
                 FROM probe_history WHERE mirror_url = ?1 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![m, limit], map_row)?;
            rows.collect::<SqlResult<Vec<_>>>()?
        } else {
            let mut stmt = conn.prepare(
                "SELECT mirror_url, available, status, status_code, response_time, error_reason, test_time
                 FROM probe_history ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], map_row)?;
            rows.collect::<SqlResult<Vec<_>>>()?
        };

        Ok(results)
    }

    // --- Mirror statistics ---

    /// Insert or replace the counters for one mirror.
    pub fn upsert_stats(&self, stats: &EndpointStats) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO mirror_stats (mirror_url, total_tests, success_count, fail_count, avg_response_time, latency_samples, last_success_time, last_fail_time, current_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(mirror_url) DO UPDATE SET
                total_tests=excluded.total_tests,
                success_count=excluded.success_count,
                fail_count=excluded.fail_count,
                avg_response_time=excluded.avg_response_time,
                latency_samples=excluded.latency_samples,
                last_success_time=excluded.last_success_time,
                last_fail_time=excluded.last_fail_time,
                current_status=excluded.current_status",
            params![
                stats.mirror,
                stats.total_tests,
                stats.success_count,
                stats.fail_count,
                stats.avg_response_time,
                stats.latency_samples,
                stats.last_success_time.map(|t| t.format(TIME_FORMAT).to_string()),
                stats.last_fail_time.map(|t| t.format(TIME_FORMAT).to_string()),
                stats.current_status as i64,
            ],
        )?;
        Ok(())
    }

    /// All mirror counters, best performers first.
    pub fn get_all_stats(&self) -> Result<Vec<EndpointStats>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT mirror_url, total_tests, success_count, fail_count, avg_response_time, latency_samples, last_success_time, last_fail_time, current_status
             FROM mirror_stats ORDER BY success_count DESC, avg_response_time ASC",
        )?;

        let stats = stmt
            .query_map([], |row| {
                let last_success: Option<String> = row.get(6)?;
                let last_fail: Option<String> = row.get(7)?;
                let current_status: i64 = row.get(8)?;
                Ok(EndpointStats {
                    mirror: row.get(0)?,
                    total_tests: row.get(1)?,
                    success_count: row.get(2)?,
                    fail_count: row.get(3)?,
                    avg_response_time: row.get(4)?,
                    latency_samples: row.get(5)?,
                    last_success_time: last_success.as_deref().and_then(parse_db_time),
                    last_fail_time: last_fail.as_deref().and_then(parse_db_time),
                    current_status: current_status != 0,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(stats)
    }

    /// Load all counters keyed by mirror, for seeding the in-memory map.
    pub fn load_stats_map(&self) -> Result<HashMap<String, EndpointStats>, DbError> {
        let stats = self.get_all_stats()?;
        Ok(stats.into_iter().map(|s| (s.mirror.clone(), s)).collect())
    }

    // --- Batches ---

    /// Record the summary row for one finished batch.
    pub fn add_batch(&self, report: &BatchReport) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO test_batches (batch_time, total_mirrors, available_count, unavailable_count)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                report.test_time.format(TIME_FORMAT).to_string(),
                report.total_mirrors as i64,
                report.available_count as i64,
                report.unavailable_count as i64,
            ],
        )?;
        Ok(())
    }

    /// Number of recorded batches.
    pub fn batch_count(&self) -> Result<i64, DbError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row("SELECT COUNT(*) FROM test_batches", [], |r| r.get(0))?)
    }
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [TIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}
