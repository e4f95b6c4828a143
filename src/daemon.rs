//! Docker daemon configuration synthesis.
//!
//! The daemon config is treated as a partial document: one recognized key,
//! `registry-mirrors`, plus a pass-through bag for everything else so unknown
//! keys survive a rewrite. Synthesis itself is pure; the file helpers at the
//! bottom do the reading, backup, and writing. Callers must not run two
//! synthesis writes concurrently against the same file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Errors from reading or writing the daemon config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The daemon configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(rename = "registry-mirrors", default)]
    pub registry_mirrors: Vec<String>,
    /// All keys this service does not manage, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Merge the ranked top-K mirrors into an existing daemon config.
///
/// Returns the new document and a verbatim backup of the old one. The merged
/// `registry-mirrors` list keeps the existing entries in their original order
/// and appends any ranked mirror not already present; previously configured
/// mirrors are never removed. All other keys pass through unchanged.
pub fn synthesize(existing: &DaemonConfig, ranked_top_k: &[String]) -> (DaemonConfig, DaemonConfig) {
    let backup = existing.clone();

    let mut mirrors = existing.registry_mirrors.clone();
    for mirror in ranked_top_k {
        if !mirrors.contains(mirror) {
            mirrors.push(mirror.clone());
        }
    }

    let new_config = DaemonConfig {
        registry_mirrors: mirrors,
        extra: existing.extra.clone(),
    };

    (new_config, backup)
}

/// Read the daemon config from disk.
///
/// A missing file is an empty document, not an error. An unparseable file is
/// also treated as empty so a corrupt config never blocks an update.
pub fn load_daemon_config<P: AsRef<Path>>(path: P) -> Result<DaemonConfig, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(DaemonConfig::default());
    }

    let contents = fs::read_to_string(path)?;
    match serde_json::from_str(&contents) {
        Ok(config) => Ok(config),
        Err(e) => {
            tracing::warn!("Unparseable daemon config at {}: {}", path.display(), e);
            Ok(DaemonConfig::default())
        }
    }
}

/// Result of applying a synthesized config to disk.
#[derive(Debug)]
pub struct AppliedConfig {
    pub config: DaemonConfig,
    pub backup: DaemonConfig,
    /// Whether a pre-existing file was copied to the backup path.
    pub backed_up: bool,
}

/// Synthesize against the on-disk config and write the result.
///
/// The existing file, when present, is copied byte-for-byte to the backup path
/// before the new document is written.
pub fn apply_top_k<P: AsRef<Path>, Q: AsRef<Path>>(
    daemon_path: P,
    backup_path: Q,
    ranked_top_k: &[String],
) -> Result<AppliedConfig, ConfigError> {
    let daemon_path = daemon_path.as_ref();
    let existing = load_daemon_config(daemon_path)?;
    let (new_config, backup) = synthesize(&existing, ranked_top_k);

    if let Some(dir) = daemon_path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }

    let backed_up = daemon_path.exists();
    if backed_up {
        fs::copy(daemon_path, backup_path.as_ref())?;
    }

    let rendered = serde_json::to_string_pretty(&new_config)?;
    fs::write(daemon_path, rendered)?;

    Ok(AppliedConfig {
        config: new_config,
        backup,
        backed_up,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mirrors(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_merge_keeps_existing_order_and_dedupes() {
        let existing = DaemonConfig {
            registry_mirrors: mirrors(&["https://a.example"]),
            extra: Default::default(),
        };
        let top_k = mirrors(&["https://b.example", "https://a.example", "https://c.example"]);

        let (new_config, backup) = synthesize(&existing, &top_k);

        assert_eq!(
            new_config.registry_mirrors,
            mirrors(&["https://a.example", "https://b.example", "https://c.example"])
        );
        assert_eq!(backup, existing);
    }

    #[test]
    fn test_synthesize_is_idempotent() {
        let existing = DaemonConfig {
            registry_mirrors: mirrors(&["https://a.example"]),
            extra: Default::default(),
        };
        let top_k = mirrors(&["https://b.example", "https://c.example"]);

        let (first, _) = synthesize(&existing, &top_k);
        let (second, second_backup) = synthesize(&first, &top_k);

        assert_eq!(second, first);
        assert_eq!(second_backup, first);
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let raw = json!({
            "registry-mirrors": ["https://a.example"],
            "log-driver": "json-file",
            "storage-driver": "overlay2",
            "insecure-registries": ["10.0.0.1:5000"]
        });
        let existing: DaemonConfig = serde_json::from_value(raw).unwrap();

        let (new_config, _) = synthesize(&existing, &mirrors(&["https://b.example"]));

        assert_eq!(new_config.extra["log-driver"], json!("json-file"));
        assert_eq!(new_config.extra["storage-driver"], json!("overlay2"));
        assert_eq!(new_config.extra["insecure-registries"], json!(["10.0.0.1:5000"]));

        let rendered = serde_json::to_value(&new_config).unwrap();
        assert_eq!(rendered["log-driver"], json!("json-file"));
        assert_eq!(
            rendered["registry-mirrors"],
            json!(["https://a.example", "https://b.example"])
        );
    }

    #[test]
    fn test_missing_file_is_empty_document() {
        let config = load_daemon_config("/nonexistent/daemon.json").unwrap();
        assert!(config.registry_mirrors.is_empty());
        assert!(config.extra.is_empty());
    }

    #[test]
    fn test_apply_writes_backup_and_new_config() {
        let dir = tempfile::tempdir().unwrap();
        let daemon_path = dir.path().join("daemon.json");
        let backup_path = dir.path().join("daemon.json.bak");

        fs::write(
            &daemon_path,
            r#"{"registry-mirrors":["https://a.example"],"debug":true}"#,
        )
        .unwrap();

        let applied = apply_top_k(&daemon_path, &backup_path, &mirrors(&["https://b.example"])).unwrap();

        assert!(applied.backed_up);
        assert_eq!(
            applied.config.registry_mirrors,
            mirrors(&["https://a.example", "https://b.example"])
        );
        assert_eq!(applied.backup.registry_mirrors, mirrors(&["https://a.example"]));

        // Backup is the pre-call file, verbatim.
        let backup_raw = fs::read_to_string(&backup_path).unwrap();
        assert!(backup_raw.contains("https://a.example"));
        assert!(!backup_raw.contains("https://b.example"));

        let written = load_daemon_config(&daemon_path).unwrap();
        assert_eq!(written, applied.config);
        assert_eq!(written.extra["debug"], serde_json::json!(true));
    }

    #[test]
    fn test_apply_without_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let daemon_path = dir.path().join("docker").join("daemon.json");
        let backup_path = dir.path().join("docker").join("daemon.json.bak");

        let applied = apply_top_k(&daemon_path, &backup_path, &mirrors(&["https://a.example"])).unwrap();

        assert!(!applied.backed_up);
        assert!(!backup_path.exists());
        assert_eq!(applied.backup, DaemonConfig::default());
        assert_eq!(applied.config.registry_mirrors, mirrors(&["https://a.example"]));
    }
}
