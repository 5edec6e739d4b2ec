use std::time::Duration;

pub const DEFAULT_RPC_ENDPOINT: &str = "http://localhost:8545";

pub const DEFAULT_ACCOUNT_COUNT: usize = 10;

pub const DEFAULT_DURATION: Duration = Duration::from_secs(60);

/// Gas used by a plain value transfer.
pub const DEFAULT_GAS_LIMIT: u64 = 21_000;

/// 0.001 of a whole unit, in wei.
pub const DEFAULT_TRANSFER_AMOUNT: &str = "1000000000000000";

pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(1);

pub const DEFAULT_CONCURRENCY_PER_ACCOUNT: usize = 1;

/// Retries after the first attempt of a steady-state transaction.
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Retries granted to the very first transaction of a worker, which pays for
/// connection and TLS setup.
pub const DEFAULT_FIRST_TRANSACTION_RETRIES: u32 = 7;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1);

/// Backoff per consecutive exhausted failure.
pub const DEFAULT_FAILURE_BACKOFF: Duration = Duration::from_millis(5);

/// Consecutive failures beyond this count no longer grow the backoff.
pub const MAX_BACKOFF_STEPS: u32 = 4;

/// 0.1 of a whole unit, in wei.
pub const DEFAULT_MIN_BALANCE: &str = "100000000000000000";

pub const DEFAULT_START_DELAY: Duration = Duration::from_secs(5);

pub const DEFAULT_KEYS_FILE: &str = "test_keys.json";

pub const DEFAULT_OUTPUT_FILE: &str = "benchmark_results.json";

/// Wei per whole unit of the native token.
pub const WEI_PER_UNIT: u64 = 1_000_000_000_000_000_000;
