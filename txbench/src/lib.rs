#![doc = include_str!("../README.md")]

pub mod account;
pub mod check;
pub mod client;
pub mod fund;
pub mod keys;
pub mod report;
pub mod setup;
pub mod signal;

mod benchmark;
mod error;
mod metrics;
mod reporter;
mod transaction;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use benchmark::Benchmark;
pub use error::Error;
pub use crate::metrics::{AccountTally, BenchMetrics, FrozenWindow, Snapshot};
pub use reporter::LatencyQuantiles;
pub use transaction::{target_index, SignedTransfer, SubmitError, Transfer};
pub use worker::RetryPolicy;

pub mod prelude {
    pub use crate::account::AccountSender;
    pub use crate::client::{ClientError, JsonRpcClient, NetworkClient};
    pub use crate::fund::fund_accounts;
    pub use crate::keys::{generate_keys, load_keys};
    pub use crate::report::save_report;
    pub use crate::setup::{check_balances, initialize_accounts, parse_wei, select_signers};
    pub use crate::{Benchmark, Error};

    pub use txbench_core::{BenchConfig, RunReport};
}
