use alloy::primitives::Address;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub series: SeriesConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint. May embed an API key, so it is also read from
    /// VAULTWATCH_RPC_URL.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_pool_address")]
    pub pool_address: String,
    #[serde(default = "default_vault_address")]
    pub vault_address: String,
    #[serde(default = "default_dft_address")]
    pub dft_address: String,
    #[serde(default = "default_stable_address")]
    pub stable_address: String,
    /// Largest block span the provider accepts in one eth_getLogs call.
    #[serde(default = "default_max_block_span")]
    pub max_block_span: u64,
    /// Upper bound on any single external read.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

/// Which clock an event's `observed_at` is stamped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetentionClock {
    /// Local processing time when the log was decoded.
    #[default]
    Local,
    /// Timestamp of the block that carried the log.
    Block,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Blocks scanned behind head when there is no checkpoint yet.
    #[serde(default = "default_lookback_blocks")]
    pub cold_start_lookback_blocks: u64,
    #[serde(default)]
    pub retention_clock: RetentionClock,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeriesConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PolicyConfig {
    /// Absolute daily budget in stable-equivalent wei. When unset it is
    /// derived from the vault's dailyBudgetBps.
    #[serde(default)]
    pub daily_budget_abs: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    File,
    Valkey,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Directory for the file backend.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_valkey_url")]
    pub valkey_url: String,
    /// Key namespace for the Valkey backend.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Upper bound on a single get or set.
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}
fn default_pool_address() -> String {
    "0xB051c42F15a6A8eDa92b9e7d82f1472B4740a509".to_string()
}
fn default_vault_address() -> String {
    "0x5802D420ee7Db8c2438170bFD73AF02a88499fE0".to_string()
}
fn default_dft_address() -> String {
    "0xC0AE275e1321261bA3dC9b51E62fCe7BEaA0c5d9".to_string()
}
fn default_stable_address() -> String {
    "0xcbB672B00583f12c2761dE02db20B5936c5C91f8".to_string()
}
fn default_max_block_span() -> u64 {
    1000
}
fn default_read_timeout_ms() -> u64 {
    5000
}
fn default_interval_secs() -> u64 {
    10
}
fn default_retention_secs() -> u64 {
    3600
}
fn default_capacity() -> usize {
    300
}
fn default_lookback_blocks() -> u64 {
    300
}
fn default_store_path() -> PathBuf {
    PathBuf::from("./vaultwatch-state")
}
fn default_valkey_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_prefix() -> String {
    "vaultwatch".to_string()
}
fn default_store_timeout_ms() -> u64 {
    5000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            pool_address: default_pool_address(),
            vault_address: default_vault_address(),
            dft_address: default_dft_address(),
            stable_address: default_stable_address(),
            max_block_span: default_max_block_span(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            retention_secs: default_retention_secs(),
            capacity: default_capacity(),
            cold_start_lookback_blocks: default_lookback_blocks(),
            retention_clock: RetentionClock::Local,
        }
    }
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            retention_secs: default_retention_secs(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            path: default_store_path(),
            valkey_url: default_valkey_url(),
            prefix: default_prefix(),
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Contract addresses after parsing.
#[derive(Debug, Clone, Copy)]
pub struct ContractAddresses {
    pub pool: Address,
    pub vault: Address,
    pub dft: Address,
    pub stable: Address,
}

impl PolicyConfig {
    /// Configured absolute budget, if any. Validated at load time.
    pub fn budget_override(&self) -> Option<alloy::primitives::U256> {
        self.daily_budget_abs
            .as_deref()
            .and_then(|abs| alloy::primitives::U256::from_str(abs.trim()).ok())
    }
}

impl ChainConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn addresses(&self) -> Result<ContractAddresses, ConfigError> {
        Ok(ContractAddresses {
            pool: parse_address("chain.pool_address", &self.pool_address)?,
            vault: parse_address("chain.vault_address", &self.vault_address)?,
            dft: parse_address("chain.dft_address", &self.dft_address)?,
            stable: parse_address("chain.stable_address", &self.stable_address)?,
        })
    }
}

fn parse_address(field: &str, value: &str) -> Result<Address, ConfigError> {
    Address::from_str(value.trim())
        .map_err(|e| ConfigError::Invalid(format!("{field} = {value:?}: {e}")))
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(url) = std::env::var("VAULTWATCH_RPC_URL") {
            config.chain.rpc_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a default config from environment variables only (no file needed).
    pub fn from_env() -> Result<Self, ConfigError> {
        let chain = ChainConfig {
            rpc_url: std::env::var("VAULTWATCH_RPC_URL").unwrap_or_else(|_| default_rpc_url()),
            pool_address: std::env::var("VAULTWATCH_POOL_ADDRESS")
                .unwrap_or_else(|_| default_pool_address()),
            vault_address: std::env::var("VAULTWATCH_VAULT_ADDRESS")
                .unwrap_or_else(|_| default_vault_address()),
            dft_address: std::env::var("VAULTWATCH_DFT_ADDRESS")
                .unwrap_or_else(|_| default_dft_address()),
            stable_address: std::env::var("VAULTWATCH_STABLE_ADDRESS")
                .unwrap_or_else(|_| default_stable_address()),
            ..ChainConfig::default()
        };

        let mut store = StoreConfig::default();
        if let Ok(path) = std::env::var("VAULTWATCH_STORE_PATH") {
            store.path = PathBuf::from(path);
        }
        if let Ok(url) = std::env::var("VAULTWATCH_VALKEY_URL") {
            store.backend = StoreBackend::Valkey;
            store.valkey_url = url;
        }

        let config = Config {
            chain,
            indexer: IndexerConfig::default(),
            series: SeriesConfig::default(),
            policy: PolicyConfig::default(),
            store,
            logging: LoggingConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain.max_block_span == 0 {
            return Err(ConfigError::Invalid("chain.max_block_span must be > 0".into()));
        }
        if self.indexer.capacity == 0 {
            return Err(ConfigError::Invalid("indexer.capacity must be > 0".into()));
        }
        if self.indexer.interval_secs == 0 || self.series.interval_secs == 0 {
            return Err(ConfigError::Invalid("tick intervals must be > 0".into()));
        }
        if self.store.timeout_ms == 0 {
            return Err(ConfigError::Invalid("store.timeout_ms must be > 0".into()));
        }
        if let Some(ref abs) = self.policy.daily_budget_abs {
            alloy::primitives::U256::from_str(abs.trim()).map_err(|e| {
                ConfigError::Invalid(format!("policy.daily_budget_abs = {abs:?}: {e}"))
            })?;
        }
        self.chain.addresses()?;
        Ok(())
    }
}
