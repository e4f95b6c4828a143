//! Configuration module for mirrorwatch.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

/// Mirrors probed when no list is configured.
pub const DEFAULT_MIRRORS: &[&str] = &[
    "https://docker.1ms.run",
    "https://docker.1panel.live",
    "https://docker.m.ixdev.cn",
    "https://hub.rat.dev",
    "https://docker.xuanyuan.me",
    "https://dockerproxy.net",
    "https://docker.hlmirror.com",
    "https://hub1.nat.tf",
    "https://hub2.nat.tf",
    "https://hub3.nat.tf",
    "https://hub4.nat.tf",
    "https://docker.m.daocloud.io",
    "https://docker.kejilion.pro",
    "https://hub.1panel.dev",
    "https://dockerproxy.cool",
    "https://proxy.vvvv.ee",
    "https://dockerproxy.com",
    "https://docker.mirrors.ustc.edu.cn",
    "https://docker.nju.edu.cn",
];

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "mirrorwatch.db")
    pub db_path: String,
    /// Path to the Docker daemon configuration file
    pub daemon_json_path: String,
    /// Path the previous daemon configuration is backed up to
    pub daemon_json_backup_path: String,
    /// Whether the scheduler rewrites the daemon config after each cycle
    pub auto_update_config: bool,
    /// Per-attempt probe timeout
    pub probe_timeout: Duration,
    /// Maximum number of concurrent probes in a batch
    pub concurrency: usize,
    /// Seconds between scheduled probe cycles
    pub interval_secs: u64,
    /// Mirror URLs probed by the scheduler
    pub mirrors: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "mirrorwatch.db".to_string(),
            daemon_json_path: "/etc/docker/daemon.json".to_string(),
            daemon_json_backup_path: "/etc/docker/daemon.json.bak".to_string(),
            auto_update_config: true,
            probe_timeout: Duration::from_secs(5),
            concurrency: 8,
            interval_secs: 3600,
            mirrors: DEFAULT_MIRRORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `MIRRORWATCH_HTTP_PORT`: HTTP port (default: 8080)
    /// - `MIRRORWATCH_DB_PATH`: database file path (default: "mirrorwatch.db")
    /// - `MIRRORWATCH_DAEMON_JSON`: daemon config path (default: "/etc/docker/daemon.json")
    /// - `MIRRORWATCH_DAEMON_JSON_BACKUP`: backup path (default: "/etc/docker/daemon.json.bak")
    /// - `MIRRORWATCH_AUTO_UPDATE`: rewrite daemon config after each cycle (default: "true")
    /// - `MIRRORWATCH_PROBE_TIMEOUT_SECS`: per-attempt probe timeout (default: 5)
    /// - `MIRRORWATCH_CONCURRENCY`: concurrent probe limit (default: 8)
    /// - `MIRRORWATCH_INTERVAL_SECS`: seconds between scheduled cycles (default: 3600)
    /// - `MIRRORWATCH_MIRRORS`: comma-separated mirror URLs (default: built-in list)
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("MIRRORWATCH_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }

        if let Ok(db_path) = env::var("MIRRORWATCH_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Ok(path) = env::var("MIRRORWATCH_DAEMON_JSON") {
            cfg.daemon_json_path = path;
        }

        if let Ok(path) = env::var("MIRRORWATCH_DAEMON_JSON_BACKUP") {
            cfg.daemon_json_backup_path = path;
        }

        if let Ok(flag) = env::var("MIRRORWATCH_AUTO_UPDATE") {
            cfg.auto_update_config = flag.eq_ignore_ascii_case("true") || flag == "1";
        }

        if let Ok(secs_str) = env::var("MIRRORWATCH_PROBE_TIMEOUT_SECS") {
            if let Ok(secs) = secs_str.parse::<u64>() {
                if secs > 0 {
                    cfg.probe_timeout = Duration::from_secs(secs);
                }
            }
        }

        if let Ok(n_str) = env::var("MIRRORWATCH_CONCURRENCY") {
            if let Ok(n) = n_str.parse::<usize>() {
                if n > 0 {
                    cfg.concurrency = n;
                }
            }
        }

        if let Ok(secs_str) = env::var("MIRRORWATCH_INTERVAL_SECS") {
            if let Ok(secs) = secs_str.parse::<u64>() {
                if secs > 0 {
                    cfg.interval_secs = secs;
                }
            }
        }

        if let Ok(list) = env::var("MIRRORWATCH_MIRRORS") {
            let mirrors: Vec<String> = list
                .split(',')
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !mirrors.is_empty() {
                cfg.mirrors = mirrors;
            }
        }

        cfg
    }
}
