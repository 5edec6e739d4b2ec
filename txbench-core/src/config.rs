use crate::constants::*;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
#[allow(unused)]
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Run parameters for a single benchmark.
///
/// Every key is optional in the JSON form; missing keys take the defaults
/// from [`crate::constants`]. The key spellings used by older config files
/// (`rpc_url`, `duration_seconds`, ...) are accepted as aliases.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    #[serde(alias = "rpc_url")]
    pub rpc_endpoint: String,

    #[serde(alias = "num_accounts")]
    pub account_count: usize,

    #[serde(alias = "duration_seconds")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub duration: Duration,

    pub gas_limit: u64,

    /// Wei, as a decimal string since it may exceed 64 bits.
    #[serde(alias = "transfer_amount_wei")]
    pub transfer_amount: String,

    #[serde(alias = "report_interval_seconds")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub report_interval: Duration,

    #[serde(alias = "concurrent_senders_per_account")]
    pub concurrency_per_account: usize,

    pub max_retries: u32,

    pub first_transaction_retries: u32,

    #[serde(alias = "retry_delay_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub retry_delay: Duration,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub failure_backoff: Duration,

    /// Wei, as a decimal string.
    pub min_balance: String,

    #[serde_as(as = "DurationSeconds<u64>")]
    pub start_delay: Duration,

    pub private_keys_file: PathBuf,

    #[serde(alias = "output_file")]
    pub output_destination: PathBuf,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            rpc_endpoint: DEFAULT_RPC_ENDPOINT.to_string(),
            account_count: DEFAULT_ACCOUNT_COUNT,
            duration: DEFAULT_DURATION,
            gas_limit: DEFAULT_GAS_LIMIT,
            transfer_amount: DEFAULT_TRANSFER_AMOUNT.to_string(),
            report_interval: DEFAULT_REPORT_INTERVAL,
            concurrency_per_account: DEFAULT_CONCURRENCY_PER_ACCOUNT,
            max_retries: DEFAULT_MAX_RETRIES,
            first_transaction_retries: DEFAULT_FIRST_TRANSACTION_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            failure_backoff: DEFAULT_FAILURE_BACKOFF,
            min_balance: DEFAULT_MIN_BALANCE.to_string(),
            start_delay: DEFAULT_START_DELAY,
            private_keys_file: PathBuf::from(DEFAULT_KEYS_FILE),
            output_destination: PathBuf::from(DEFAULT_OUTPUT_FILE),
        }
    }
}

impl BenchConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json)?;
        debug!("Loaded config from {}: {config:?}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_endpoint.is_empty() {
            return Err(ConfigError::Invalid("rpc_endpoint is empty".into()));
        }
        if self.duration.is_zero() {
            return Err(ConfigError::Invalid("duration must be non-zero".into()));
        }
        if self.report_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "report_interval must be non-zero".into(),
            ));
        }
        if self.gas_limit == 0 {
            return Err(ConfigError::Invalid("gas_limit must be non-zero".into()));
        }
        if !is_decimal(&self.transfer_amount) {
            return Err(ConfigError::Invalid(format!(
                "transfer_amount {:?} is not a decimal wei amount",
                self.transfer_amount
            )));
        }
        if !is_decimal(&self.min_balance) {
            return Err(ConfigError::Invalid(format!(
                "min_balance {:?} is not a decimal wei amount",
                self.min_balance
            )));
        }
        Ok(())
    }

    /// Concurrent senders spawned for each account; never less than one.
    pub fn senders_per_account(&self) -> usize {
        if self.concurrency_per_account == 0 {
            warn!("concurrency_per_account is 0, falling back to 1");
        }
        self.concurrency_per_account.max(1)
    }
}

fn is_decimal(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
