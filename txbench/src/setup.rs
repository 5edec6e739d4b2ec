//! Account initialisation and pre-run checks.
use crate::account::AccountSender;
use crate::client::{ClientError, NetworkClient};
use alloy_primitives::{Address, U256};
use alloy_signer_local::PrivateKeySigner;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};
use txbench_core::WEI_PER_UNIT;

const INIT_BATCH: usize = 10;
const INIT_BATCH_PAUSE: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to get chain id: {0}")]
    ChainId(#[source] ClientError),

    #[error("failed to query account {index} ({address}): {source}")]
    AccountQuery {
        index: usize,
        address: Address,
        #[source]
        source: ClientError,
    },

    #[error("failed to get gas price: {0}")]
    GasPrice(#[source] ClientError),

    #[error("{count} account(s) below the minimum balance of {minimum} wei")]
    InsufficientBalance { count: usize, minimum: U256 },

    #[error("funder balance {available} wei is below the {needed} wei needed")]
    FunderBalance { needed: U256, available: U256 },

    #[error("invalid wei amount {0:?}")]
    InvalidAmount(String),

    #[error("no accounts to run with")]
    NoAccounts,
}

/// Parses a decimal wei amount.
pub fn parse_wei(amount: &str) -> Result<U256, SetupError> {
    U256::from_str_radix(amount.trim(), 10).map_err(|_| SetupError::InvalidAmount(amount.into()))
}

/// Renders a wei amount in whole units with six decimals.
pub fn format_units(wei: U256) -> String {
    let unit = U256::from(WEI_PER_UNIT);
    let micro = U256::from(WEI_PER_UNIT / 1_000_000);
    let whole = wei / unit;
    let fraction = (wei % unit) / micro;
    format!("{whole}.{:06}", fraction.to::<u64>())
}

/// Keeps the first `account_count` signers. Zero keeps them all.
pub fn select_signers(
    mut signers: Vec<PrivateKeySigner>,
    account_count: usize,
) -> Vec<PrivateKeySigner> {
    if account_count == 0 {
        return signers;
    }
    if account_count < signers.len() {
        info!(
            "Using {account_count} out of {} available accounts",
            signers.len()
        );
        signers.truncate(account_count);
    } else if account_count > signers.len() {
        warn!(
            "Requested {account_count} accounts but only {} keys are available",
            signers.len()
        );
    }
    signers
}

/// Reads chain id, pending sequence number and balance for every signer.
///
/// Any query failure aborts setup: a run with a wrong starting sequence
/// number would only produce nonce errors.
pub async fn initialize_accounts<C: NetworkClient>(
    client: &C,
    signers: Vec<PrivateKeySigner>,
) -> Result<Vec<Arc<AccountSender>>, SetupError> {
    if signers.is_empty() {
        return Err(SetupError::NoAccounts);
    }

    let chain_id = client.chain_id().await.map_err(SetupError::ChainId)?;
    info!("Connected to chain id {chain_id}");
    info!("Initializing {} accounts", signers.len());

    let total = signers.len();
    let mut accounts = Vec::with_capacity(total);
    for (index, signer) in signers.into_iter().enumerate() {
        let address = signer.address();
        let query_err = |source| SetupError::AccountQuery {
            index,
            address,
            source,
        };

        let nonce = client.pending_nonce(address).await.map_err(query_err)?;
        let balance = client.balance(address).await.map_err(query_err)?;

        info!(
            "Account {index}: {address} (nonce: {nonce}, balance: {})",
            format_units(balance)
        );
        accounts.push(Arc::new(AccountSender::new(
            signer, chain_id, nonce, balance,
        )));

        if (index + 1) % INIT_BATCH == 0 && index + 1 < total {
            tokio::time::sleep(INIT_BATCH_PAUSE).await;
        }
    }

    Ok(accounts)
}

/// Fails if any account holds less than `minimum`, reporting every short
/// account rather than only the first.
pub fn check_balances(accounts: &[Arc<AccountSender>], minimum: U256) -> Result<(), SetupError> {
    let short = accounts
        .iter()
        .enumerate()
        .filter(|(_, account)| account.balance() < minimum)
        .inspect(|(index, account)| {
            warn!(
                "Account {index} has insufficient balance: {} (need {})",
                format_units(account.balance()),
                format_units(minimum)
            )
        })
        .count();

    if short > 0 {
        return Err(SetupError::InsufficientBalance {
            count: short,
            minimum,
        });
    }

    info!("All accounts have sufficient balance");
    Ok(())
}
