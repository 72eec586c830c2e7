//! Node and consensus configuration

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consensus::RewardClass;
use crate::constants::{CENT, GENESIS_TIMESTAMP};
use crate::crypto::Hash;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unable to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{class:?} payout shares add up to {total}%")]
    SharesExceeded { class: RewardClass, total: u64 },
    #[error("Payout interval must be non-zero")]
    ZeroInterval,
}

/// One recipient of a periodic reserve payout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutShare {
    /// Recipient sigchain
    pub recipient: Hash,
    /// Share of the class reserve, in percent
    pub percent: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PayoutConfig {
    /// Ambassador and developer reserves pay out every `interval` blocks of a channel
    #[serde(default = "default_payout_interval")]
    pub interval: u32,
    #[serde(default)]
    pub ambassador: Vec<PayoutShare>,
    #[serde(default)]
    pub developer: Vec<PayoutShare>,
}

impl PayoutConfig {
    pub fn shares(&self, class: RewardClass) -> &[PayoutShare] {
        match class {
            RewardClass::Miner => &[],
            RewardClass::Ambassador => &self.ambassador,
            RewardClass::Developer => &self.developer,
        }
    }
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            interval: default_payout_interval(),
            ambassador: Vec::new(),
            developer: Vec::new(),
        }
    }
}

fn default_payout_interval() -> u32 {
    60
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub data_dir: PathBuf,
    /// Directory of bincode-encoded blocks imported on startup
    pub import_dir: Option<PathBuf>,
    pub testnet: bool,
    /// Allow hybrid-channel blocks
    pub hybrid: bool,
    /// Check hash-channel proof of work against the compact target
    pub verify_work: bool,
    /// Seconds a block timestamp may run ahead of local time
    pub max_drift: u64,
    pub max_orphans: usize,
    /// Seconds between checkpoints
    pub checkpoint_timespan: u64,
    /// Blocks searched backwards for the previous block of a channel
    pub channel_lookback: u32,
    /// Origin of chain age for reserve release
    pub network_timelock: u64,
    /// Reserve released per minute, per reward class
    pub release_per_minute: [u64; 3],
    /// Ceiling on a coinstake reward, in parts per million of the stake
    pub max_stake_reward_ppm: u64,
    pub payouts: PayoutConfig,
    /// Default tracing filter when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            import_dir: None,
            testnet: false,
            hybrid: false,
            verify_work: true,
            max_drift: 7_200,
            max_orphans: 1_024,
            checkpoint_timespan: 3_600,
            channel_lookback: 1_440,
            network_timelock: GENESIS_TIMESTAMP,
            release_per_minute: [38 * CENT * 100, 2 * CENT * 100, CENT * 100],
            max_stake_reward_ppm: 30_000,
            payouts: PayoutConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl ChainConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: ChainConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.payouts.interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        for class in [RewardClass::Ambassador, RewardClass::Developer] {
            let total: u64 = self
                .payouts
                .shares(class)
                .iter()
                .fold(0u64, |acc, share| acc.saturating_add(share.percent));
            if total > 100 {
                return Err(ConfigError::SharesExceeded { class, total });
            }
        }
        Ok(())
    }
}
