// crates/wot-daemon/src/config.rs
//
// Runtime configuration for the web-of-trust daemon.
// Loaded from a TOML file or populated with sensible defaults.

use serde::Deserialize;
use std::fs;
use std::time::Duration;

use wot_reputation::{CapacityTable, SchedulerConfig};

/// Runtime configuration for the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Directory for local data storage (RocksDB).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Log level: "trace", "debug", "info", "warn", "error".
    /// `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// How long the recomputation worker waits after a mutation before it
    /// drains, so bursts (e.g. importing many trust lists) share one pass.
    #[serde(default = "default_coalesce_delay_ms")]
    pub coalesce_delay_ms: u64,

    /// Rank-to-capacity decay table, validated on load. A malformed table
    /// is a configuration error, not something replaced with the default.
    #[serde(default)]
    pub capacity: CapacityTable,

    /// Delete identities nothing references any more after each drain.
    #[serde(default = "default_prune_unreferenced")]
    pub prune_unreferenced: bool,
}

fn default_data_dir() -> String {
    "~/.wot/data".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_coalesce_delay_ms() -> u64 {
    250
}

fn default_prune_unreferenced() -> bool {
    true
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            coalesce_delay_ms: default_coalesce_delay_ms(),
            capacity: CapacityTable::default(),
            prune_unreferenced: default_prune_unreferenced(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file at the given path.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)?;
        let config: DaemonConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            coalesce_delay: Duration::from_millis(self.coalesce_delay_ms),
            prune_unreferenced: self.prune_unreferenced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wot_reputation::capacity::DEFAULT_MAX_RANK;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: DaemonConfig = toml::from_str("").unwrap();
        assert_eq!(config.data_dir, "~/.wot/data");
        assert_eq!(config.coalesce_delay_ms, 250);
        assert!(config.prune_unreferenced);
        assert_eq!(config.capacity, CapacityTable::default());
    }

    #[test]
    fn test_partial_capacity_section() {
        let config: DaemonConfig = toml::from_str(
            r#"
            log_level = "debug"
            coalesce_delay_ms = 10

            [capacity]
            table = [100, 100, 50]
            "#,
        )
        .unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.scheduler_config().coalesce_delay, Duration::from_millis(10));
        assert_eq!(config.capacity.capacity(1), 100);
        assert_eq!(config.capacity.capacity(2), 50);
        assert_eq!(config.capacity.max_rank(), DEFAULT_MAX_RANK);
    }

    #[test]
    fn test_bad_capacity_table_rejected() {
        let result: Result<DaemonConfig, _> = toml::from_str(
            r#"
            [capacity]
            table = [50, 100]
            "#,
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("rank 0 capacity must be 100"));
    }

    #[test]
    fn test_capacity_cutoff_only() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [capacity]
            max_rank = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.capacity.capacity(2), 16);
        assert_eq!(config.capacity.capacity(3), 0);
    }
}
