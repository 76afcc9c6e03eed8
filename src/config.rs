//! Configuration management for Dummycoin

use crate::error::ChainError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "dummycoin.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub mempool: MempoolConfig,
    #[serde(default)]
    pub miner: MinerConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

/// Where pending (not yet mined) transactions are kept.
#[derive(Debug, Clone, Deserialize)]
pub struct MempoolConfig {
    #[serde(default = "default_mempool_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    /// Number of leading hex characters of the digest that must equal `target_digit`.
    #[serde(default = "default_difficulty")]
    pub difficulty: usize,
    #[serde(default = "default_target_digit")]
    pub target_digit: char,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_key_bits")]
    pub key_bits: usize,
    #[serde(default = "default_kdf_memory_kib")]
    pub kdf_memory_kib: u32,
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,
    #[serde(default = "default_kdf_parallelism")]
    pub kdf_parallelism: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            path: default_mempool_path(),
        }
    }
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            target_digit: default_target_digit(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            key_bits: default_key_bits(),
            kdf_memory_kib: default_kdf_memory_kib(),
            kdf_iterations: default_kdf_iterations(),
            kdf_parallelism: default_kdf_parallelism(),
        }
    }
}

impl Config {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(s: &str) -> Result<Self, ChainError> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        if self.database.path.is_empty() {
            return Err(ChainError::ConfigError(
                "database.path must not be empty".to_string(),
            ));
        }
        if self.mempool.path.is_empty() {
            return Err(ChainError::ConfigError(
                "mempool.path must not be empty".to_string(),
            ));
        }
        self.miner.validate()?;
        self.wallet.validate()
    }
}

impl MinerConfig {
    pub fn validate(&self) -> Result<(), ChainError> {
        if !(1..=64).contains(&self.difficulty) {
            return Err(ChainError::ConfigError(format!(
                "miner.difficulty must be between 1 and 64, got {}",
                self.difficulty
            )));
        }
        if !matches!(self.target_digit, '0'..='9' | 'a'..='f') {
            return Err(ChainError::ConfigError(format!(
                "miner.target_digit must be a lowercase hex digit, got '{}'",
                self.target_digit
            )));
        }
        Ok(())
    }
}

impl WalletConfig {
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.key_bits < 1024 {
            return Err(ChainError::ConfigError(format!(
                "wallet.key_bits must be at least 1024, got {}",
                self.key_bits
            )));
        }
        if self.kdf_iterations == 0 || self.kdf_parallelism == 0 {
            return Err(ChainError::ConfigError(
                "wallet KDF iterations and parallelism must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load the configuration file at `path`, falling back to defaults when it is absent.
pub fn load_config(path: &Path) -> Result<Config, ChainError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let config_str = fs::read_to_string(path)?;
    Config::from_toml_str(&config_str)
}

fn default_database_path() -> String {
    "./data/dummycoin.db".to_string()
}

fn default_mempool_path() -> String {
    "./data/pending_transactions.json".to_string()
}

fn default_difficulty() -> usize {
    2
}

fn default_target_digit() -> char {
    '0'
}

fn default_key_bits() -> usize {
    2048
}

fn default_kdf_memory_kib() -> u32 {
    65536
}

fn default_kdf_iterations() -> u32 {
    3
}

fn default_kdf_parallelism() -> u32 {
    1
}
