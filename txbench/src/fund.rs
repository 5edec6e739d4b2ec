//! Funding test accounts from a single funder key.
use crate::account::AccountSender;
use crate::client::NetworkClient;
use crate::setup::{format_units, SetupError};
use crate::transaction::Transfer;
use alloy_primitives::{keccak256, Address, B256, U256};
use std::fmt;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

const RULE_WIDTH: usize = 70;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundingStatus {
    /// Accepted by the endpoint, with the transaction hash.
    Funded(B256),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingRow {
    pub index: usize,
    pub address: Address,
    pub status: FundingStatus,
}

#[derive(Debug, Default)]
pub struct FundingReport {
    pub rows: Vec<FundingRow>,
}

impl FundingReport {
    pub fn funded(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| matches!(row.status, FundingStatus::Funded(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.rows.len() - self.funded()
    }
}

/// Sends `amount` from `funder` to every recipient, one transfer each.
///
/// The funder's sequence number only advances for transfers the endpoint
/// accepted, so a rejected transfer leaves no gap for the ones after it.
/// Fails before sending anything if the funder cannot cover every transfer
/// plus its fee.
pub async fn fund_accounts<C: NetworkClient>(
    client: &C,
    funder: &AccountSender,
    recipients: &[Address],
    amount: U256,
    gas_limit: u64,
) -> Result<FundingReport, SetupError> {
    if recipients.is_empty() {
        return Err(SetupError::NoAccounts);
    }

    let gas_price = client.gas_price().await.map_err(SetupError::GasPrice)?;
    let transfer = Transfer {
        value: amount,
        gas_limit,
        gas_price,
    };

    let fee = U256::from(gas_limit).saturating_mul(U256::from(gas_price));
    let needed = amount
        .saturating_add(fee)
        .saturating_mul(U256::from(recipients.len()));
    info!(
        "Funding {} accounts with {} each from {} (needs {}, has {})",
        recipients.len(),
        format_units(amount),
        funder.address(),
        format_units(needed),
        format_units(funder.balance())
    );
    if funder.balance() < needed {
        return Err(SetupError::FunderBalance {
            needed,
            available: funder.balance(),
        });
    }

    let mut report = FundingReport::default();
    for (index, &address) in recipients.iter().enumerate() {
        let status = match transfer.sign(funder, address, funder.current_nonce()) {
            Ok(signed) => match signed.submit(client).await {
                Ok(_) => {
                    funder.allocate_next();
                    FundingStatus::Funded(keccak256(&signed.raw))
                }
                Err(err) => FundingStatus::Failed(err.to_string()),
            },
            Err(err) => FundingStatus::Failed(err.to_string()),
        };

        match &status {
            FundingStatus::Funded(hash) => info!("Account {index:2}: {address} (tx: {hash})"),
            FundingStatus::Failed(err) => warn!("Account {index:2}: {address} failed: {err}"),
        }
        report.rows.push(FundingRow {
            index,
            address,
            status,
        });
    }

    Ok(report)
}

fn short_hash(hash: &B256) -> String {
    let hex = hash.to_string();
    format!("{}...{}", &hex[..10], &hex[hex.len() - 8..])
}

impl fmt::Display for FundingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(RULE_WIDTH);
        writeln!(f, "{rule}")?;
        for row in &self.rows {
            match &row.status {
                FundingStatus::Funded(hash) => writeln!(
                    f,
                    "Account {:2}: {} (tx: {})",
                    row.index,
                    row.address,
                    short_hash(hash)
                )?,
                FundingStatus::Failed(err) => {
                    writeln!(f, "Account {:2}: {} FAILED: {err}", row.index, row.address)?
                }
            }
        }
        writeln!(f, "{rule}")?;
        write!(
            f,
            "Successfully funded {}/{} accounts",
            self.funded(),
            self.rows.len()
        )
    }
}
