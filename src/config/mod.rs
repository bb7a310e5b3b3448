use std::path::PathBuf;

use serde::Deserialize;

use crate::errors::SyncError;

/// Raw JSON shape as read off disk, before validation. Mirrors the
/// teacher's `RawJsonConfig` → validated-struct split: every field is
/// optional here so a malformed or partial file fails with one
/// aggregated message instead of a serde-level parse error per field.
#[derive(Debug, Clone, Deserialize)]
pub struct RawJsonConfig {
    pub source_url: Option<String>,
    pub target_url: Option<String>,
    pub interval_minutes: Option<u32>,
    #[serde(default)]
    pub exclude_tables: Vec<String>,
    pub max_parallel_tables: Option<u32>,
    pub source_ssl_enabled: Option<bool>,
    pub target_ssl_enabled: Option<bool>,
    pub temp_root: Option<PathBuf>,
}

/// Validated configuration the rest of the engine operates on.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub source_url: String,
    pub target_url: String,
    pub interval_minutes: u32,
    pub exclude_tables: Vec<String>,
    pub max_parallel_tables: u32,
    pub source_ssl_enabled: bool,
    pub target_ssl_enabled: bool,
    pub temp_root: PathBuf,
}

impl RawJsonConfig {
    pub fn load_from_json(path: &std::path::Path) -> Result<Self, SyncError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| SyncError::Configuration(format!("failed to parse {}: {e}", path.display())))
    }
}

impl SyncConfig {
    /// Validates a raw config, aggregating every violation into a single
    /// `SyncError::Configuration` instead of failing on the first one —
    /// the teacher's `load_*_config_from_json` functions fail fast per
    /// field, but this config has enough interdependent fields (interval
    /// bounds, parallelism bounds) that reporting them all at once saves
    /// a roundtrip for an operator fixing a config file by hand.
    pub fn from_raw(raw: RawJsonConfig) -> Result<Self, SyncError> {
        let mut problems = Vec::new();

        let source_url = raw.source_url.clone().unwrap_or_default();
        if source_url.trim().is_empty() {
            problems.push("source_url must be set".to_string());
        }

        let target_url = raw.target_url.clone().unwrap_or_default();
        if target_url.trim().is_empty() {
            problems.push("target_url must be set".to_string());
        }

        let interval_minutes = raw.interval_minutes.unwrap_or(0);
        if !(1..=1440).contains(&interval_minutes) {
            problems.push(format!(
                "interval_minutes must be between 1 and 1440, got {interval_minutes}"
            ));
        }

        let max_parallel_tables = raw.max_parallel_tables.unwrap_or(3);
        if !(1..=10).contains(&max_parallel_tables) {
            problems.push(format!(
                "max_parallel_tables must be between 1 and 10, got {max_parallel_tables}"
            ));
        }

        if !problems.is_empty() {
            return Err(SyncError::Configuration(problems.join("; ")));
        }

        let source_ssl_enabled = raw.source_ssl_enabled.unwrap_or(true);
        let target_ssl_enabled = raw.target_ssl_enabled.unwrap_or(true);
        let temp_root = raw
            .temp_root
            .unwrap_or_else(|| std::env::temp_dir().join("db-sync"));

        Ok(SyncConfig {
            source_url,
            target_url,
            interval_minutes,
            exclude_tables: raw.exclude_tables,
            max_parallel_tables,
            source_ssl_enabled,
            target_ssl_enabled,
            temp_root,
        })
    }

    pub fn load_from_json(path: &std::path::Path) -> Result<Self, SyncError> {
        let raw = RawJsonConfig::load_from_json(path)?;
        Self::from_raw(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(source: &str, target: &str, interval: u32, parallel: u32) -> RawJsonConfig {
        RawJsonConfig {
            source_url: Some(source.to_string()),
            target_url: Some(target.to_string()),
            interval_minutes: Some(interval),
            exclude_tables: vec![],
            max_parallel_tables: Some(parallel),
            source_ssl_enabled: None,
            target_ssl_enabled: None,
            temp_root: None,
        }
    }

    #[test]
    fn valid_config_gets_defaults_filled_in() {
        let cfg = SyncConfig::from_raw(raw("postgres://a/db", "postgres://b/db", 15, 3)).unwrap();
        assert!(cfg.source_ssl_enabled);
        assert!(cfg.target_ssl_enabled);
        assert_eq!(cfg.temp_root, std::env::temp_dir().join("db-sync"));
    }

    #[test]
    fn missing_urls_and_bad_bounds_all_reported_together() {
        let mut r = raw("", "", 0, 99);
        r.source_url = None;
        let err = SyncConfig::from_raw(r).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("source_url"));
        assert!(msg.contains("target_url"));
        assert!(msg.contains("interval_minutes"));
        assert!(msg.contains("max_parallel_tables"));
    }

    #[test]
    fn max_parallel_tables_defaults_to_three() {
        let mut r = raw("postgres://a/db", "postgres://b/db", 15, 0);
        r.max_parallel_tables = None;
        let cfg = SyncConfig::from_raw(r).unwrap();
        assert_eq!(cfg.max_parallel_tables, 3);
    }
}
