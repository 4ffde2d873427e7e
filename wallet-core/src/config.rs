//! Configuration for the transaction engine

use crate::types::Currency;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Metrics listen address
    pub metrics_listen_addr: String,

    /// Currency used when callers do not specify one
    pub default_currency: Currency,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,

    /// Account lock configuration
    pub locking: LockingConfig,

    /// Agent commission configuration
    pub commission: CommissionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/wallet"),
            service_name: "wallet-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            metrics_listen_addr: "0.0.0.0:9090".to_string(),
            default_currency: Currency::KES,
            rocksdb: RocksDbConfig::default(),
            locking: LockingConfig::default(),
            commission: CommissionConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Level 0 file num compaction trigger
    pub level0_file_num_compaction_trigger: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 128,
            max_write_buffer_number: 4,
            target_file_size_mb: 128,
            max_background_jobs: 4,
            level0_file_num_compaction_trigger: 4,
            enable_statistics: false,
        }
    }
}

/// Account lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockingConfig {
    /// Bound on lock acquisition (milliseconds); timeouts surface as a
    /// retryable busy error
    pub acquire_timeout_ms: u64,
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: 5_000,
        }
    }
}

/// Agent commission configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionConfig {
    /// Fraction of the cash amount accrued to the agent per cash-in/out
    pub rate: Decimal,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            // 2% of the cash amount
            rate: Decimal::new(2, 2),
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("WALLET_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(addr) = std::env::var("WALLET_METRICS_ADDR") {
            config.metrics_listen_addr = addr;
        }

        if let Ok(timeout) = std::env::var("WALLET_LOCK_TIMEOUT_MS") {
            config.locking.acquire_timeout_ms = timeout
                .parse()
                .map_err(|_| crate::Error::Config("WALLET_LOCK_TIMEOUT_MS must be an integer".to_string()))?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "wallet-core");
        assert_eq!(config.default_currency, Currency::KES);
        assert_eq!(config.locking.acquire_timeout_ms, 5_000);
        assert_eq!(config.commission.rate, Decimal::new(2, 2));
    }
}
