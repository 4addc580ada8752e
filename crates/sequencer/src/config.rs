//! Sequencer Configuration

use sequencer_types::ZkCounters;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("stream server filename must be set when streaming is enabled")]
    MissingStreamFile,

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-batch resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConstraints {
    /// Maximum transactions per batch
    pub max_txs_per_batch: u64,
    /// Counters a single batch may consume
    pub max_counters: ZkCounters,
}

impl Default for BatchConstraints {
    fn default() -> Self {
        Self {
            max_txs_per_batch: 300,
            max_counters: ZkCounters {
                gas_used: 30_000_000,
                keccak_hashes: 2_145,
                poseidon_hashes: 252_357,
                poseidon_paddings: 135_191,
                mem_aligns: 236_585,
                arithmetics: 236_585,
                binaries: 473_170,
                steps: 7_570_538,
                sha256_hashes: 1_596,
            },
        }
    }
}

/// Data stream server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamServerConfig {
    /// Stream blocks to the broadcast log
    pub enabled: bool,
    /// Port consumers connect to
    pub port: u16,
    /// Stream file location
    pub filename: PathBuf,
}

impl Default for StreamServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 6900,
            filename: PathBuf::from("./data/datastream"),
        }
    }
}

/// Sequencer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// How often the pool is checked for new transactions
    pub load_pool_txs_check_interval_ms: u64,
    /// How often the worker is checked for expired transactions
    pub tx_lifetime_check_interval_ms: u64,
    /// How long a transaction may stay in the worker
    pub tx_lifetime_max_ms: u64,
    /// How often old pool transactions are deleted
    pub delete_pool_txs_check_interval_ms: u64,
    /// L1 confirmations after which a transaction is deleted from the pool
    pub delete_pool_txs_l1_block_confirmations: u64,
    /// How often the reorg counter is checked
    pub state_consistency_check_interval_ms: u64,
    pub batch_constraints: BatchConstraints,
    pub stream_server: StreamServerConfig,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            load_pool_txs_check_interval_ms: 500,
            tx_lifetime_check_interval_ms: 10 * 60 * 1000,
            tx_lifetime_max_ms: 3 * 60 * 60 * 1000,
            delete_pool_txs_check_interval_ms: 60 * 60 * 1000,
            delete_pool_txs_l1_block_confirmations: 100,
            state_consistency_check_interval_ms: 5_000,
            batch_constraints: BatchConstraints::default(),
            stream_server: StreamServerConfig::default(),
        }
    }
}

impl SequencerConfig {
    /// Load a JSON config file; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("load_pool_txs_check_interval_ms", self.load_pool_txs_check_interval_ms),
            ("tx_lifetime_check_interval_ms", self.tx_lifetime_check_interval_ms),
            ("tx_lifetime_max_ms", self.tx_lifetime_max_ms),
            ("delete_pool_txs_check_interval_ms", self.delete_pool_txs_check_interval_ms),
            ("state_consistency_check_interval_ms", self.state_consistency_check_interval_ms),
            ("batch_constraints.max_txs_per_batch", self.batch_constraints.max_txs_per_batch),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero(*name));
        }
        if self.stream_server.enabled && self.stream_server.filename.as_os_str().is_empty() {
            return Err(ConfigError::MissingStreamFile);
        }
        Ok(())
    }

    pub fn load_pool_txs_check_interval(&self) -> Duration {
        Duration::from_millis(self.load_pool_txs_check_interval_ms)
    }

    pub fn tx_lifetime_check_interval(&self) -> Duration {
        Duration::from_millis(self.tx_lifetime_check_interval_ms)
    }

    pub fn tx_lifetime_max(&self) -> Duration {
        Duration::from_millis(self.tx_lifetime_max_ms)
    }

    pub fn delete_pool_txs_check_interval(&self) -> Duration {
        Duration::from_millis(self.delete_pool_txs_check_interval_ms)
    }

    pub fn state_consistency_check_interval(&self) -> Duration {
        Duration::from_millis(self.state_consistency_check_interval_ms)
    }
}
