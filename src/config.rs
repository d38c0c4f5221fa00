//! Configuration management for the scheduling core
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pool: PoolConfig,
    pub fees: FeeConfig,
    pub executor: ExecutorConfig,
}

/// Scheduling pool tunables
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of active (non-archived) transactions
    pub max_pool_size: usize,
    /// Maximum transactions per execution slot
    pub slot_size: usize,
    /// Maximum slots dispatched concurrently per round
    pub max_concurrent_slots: usize,
    /// Maximum transactions from one entity in a single slot
    pub per_entity_slot_cap: usize,
    /// Aggregate gas ceiling per slot
    pub slot_gas_ceiling: u64,
    /// Scheduling round cadence
    pub tick_interval_ms: u64,
    /// Linear backoff unit: retry delay = attempt * backoff_unit
    pub backoff_unit_ms: u64,
    /// Metrics snapshot recomputation cadence
    pub metrics_interval_ms: u64,
    /// Trailing window for achieved-throughput measurement
    pub throughput_window_secs: u64,
    /// Throughput target used for the gas-efficiency figure
    pub throughput_target_tps: f64,
    /// Archive cleanup cadence
    pub cleanup_interval_secs: u64,
    /// Archived entries older than this are purged
    pub archive_max_age_secs: u64,
    /// Per-element `not_before` stagger applied by `submit_batch`
    pub batch_stagger_ms: u64,
    /// Default retry budget for `submit_batch` operations
    pub default_max_retries: u32,
    /// Default gas limits per operation kind, used when a batch
    /// operation carries no explicit limit
    pub default_gas: DefaultGasConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pool_size: 1000,
            slot_size: 20,
            max_concurrent_slots: 10,
            per_entity_slot_cap: 5,
            slot_gas_ceiling: 10_000_000,
            tick_interval_ms: 100,
            backoff_unit_ms: 2000,
            metrics_interval_ms: 1000,
            throughput_window_secs: 10,
            throughput_target_tps: 2500.0,
            cleanup_interval_secs: 300,
            archive_max_age_secs: 86_400,
            batch_stagger_ms: 100,
            default_max_retries: 3,
            default_gas: DefaultGasConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DefaultGasConfig {
    pub create: u64,
    pub update: u64,
    pub record: u64,
    pub transfer: u64,
}

impl Default for DefaultGasConfig {
    fn default() -> Self {
        Self {
            create: 200_000,
            update: 120_000,
            record: 100_000,
            transfer: 150_000,
        }
    }
}

/// Fee strategist tunables
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Fee sample history ring capacity
    pub history_limit: usize,
    /// Oracle polling cadence
    pub poll_interval_secs: u64,
    /// Timeout for a single oracle call
    pub oracle_timeout_secs: u64,
    /// Minimum samples before trend fitting kicks in
    pub min_trend_samples: usize,
    /// Base block time assumed when classifying conditions
    pub base_block_time_secs: f64,
    /// Conservative floor prices in gwei, used with an empty history
    pub default_slow_gwei: u64,
    pub default_standard_gwei: u64,
    pub default_fast_gwei: u64,
    pub default_instant_gwei: u64,
    /// Bulk discount: percent per transaction and overall cap
    pub batch_discount_per_tx_percent: u64,
    pub batch_discount_cap_percent: u64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            poll_interval_secs: 15,
            oracle_timeout_secs: 10,
            min_trend_samples: 10,
            base_block_time_secs: 2.0,
            default_slow_gwei: 15,
            default_standard_gwei: 20,
            default_fast_gwei: 30,
            default_instant_gwei: 50,
            batch_discount_per_tx_percent: 2,
            batch_discount_cap_percent: 15,
        }
    }
}

/// Batch executor tunables
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Signing account the submitter uses; nonce allocation is
    /// serialized per account
    pub account: String,
    /// Timeout for a single sign-and-send call
    pub submit_timeout_secs: u64,
    /// Timeout for a single gas estimation call
    pub estimate_timeout_secs: u64,
    /// Request count at which the synthetic-batch advisory discount applies
    pub bulk_threshold: usize,
    /// Advisory discount applied to the batched estimate
    pub bulk_discount_percent: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            account: "scheduler".to_string(),
            submit_timeout_secs: 30,
            estimate_timeout_secs: 10,
            bulk_threshold: 10,
            bulk_discount_percent: 15,
        }
    }
}

impl Settings {
    /// Load settings from the configured TOML file
    pub fn load() -> Result<Self> {
        let config_path = env::var("CHAIN_SCHEDULER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&config_str)
    }

    /// Parse settings from a TOML string
    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.pool.max_pool_size == 0 {
            anyhow::bail!("pool.max_pool_size must be positive");
        }
        if self.pool.slot_size == 0 {
            anyhow::bail!("pool.slot_size must be positive");
        }
        if self.pool.max_concurrent_slots == 0 {
            anyhow::bail!("pool.max_concurrent_slots must be positive");
        }
        if self.pool.per_entity_slot_cap == 0 || self.pool.per_entity_slot_cap > self.pool.slot_size
        {
            anyhow::bail!("pool.per_entity_slot_cap must be in 1..=slot_size");
        }
        if self.pool.throughput_target_tps <= 0.0 {
            anyhow::bail!("pool.throughput_target_tps must be positive");
        }
        if self.fees.history_limit < self.fees.min_trend_samples {
            anyhow::bail!("fees.history_limit must cover min_trend_samples");
        }
        if self.executor.account.is_empty() {
            anyhow::bail!("executor.account must be set");
        }
        Ok(())
    }
}

impl PoolConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn archive_max_age(&self) -> Duration {
        Duration::from_secs(self.archive_max_age_secs)
    }

    pub fn batch_stagger(&self) -> Duration {
        Duration::from_millis(self.batch_stagger_ms)
    }

    pub fn throughput_window(&self) -> Duration {
        Duration::from_secs(self.throughput_window_secs)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
