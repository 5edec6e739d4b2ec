//! Sequence number diagnostic for the `check` command.
use crate::account::AccountSender;
use crate::client::NetworkClient;
use alloy_primitives::Address;
use std::fmt;
use std::sync::Arc;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

const RULE_WIDTH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceStatus {
    Synced,
    Pending(u64),
    LocalAhead,
}

impl NonceStatus {
    pub fn classify(confirmed_next: u64, pending_next: u64, local: u64) -> Self {
        if local > pending_next {
            Self::LocalAhead
        } else if pending_next > confirmed_next {
            Self::Pending(pending_next - confirmed_next)
        } else {
            Self::Synced
        }
    }
}

impl fmt::Display for NonceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synced => f.write_str("synced"),
            Self::Pending(n) => write!(f, "{n} pending"),
            Self::LocalAhead => f.write_str("local ahead"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceRow {
    pub index: usize,
    pub address: Address,
    /// Sequence number of the last included transaction (what an explorer shows).
    pub last_confirmed: u64,
    pub next_pending: u64,
    pub local: u64,
    pub status: NonceStatus,
}

#[derive(Debug, Clone, Default)]
pub struct NonceReport {
    pub rows: Vec<NonceRow>,
    pub total_pending: u64,
}

impl NonceReport {
    pub fn all_synced(&self) -> bool {
        self.rows.iter().all(|row| row.status == NonceStatus::Synced)
    }
}

/// Compares confirmed, pending and local sequence numbers for every account,
/// resynchronising each local value from the network first.
///
/// Accounts whose queries fail are logged and left out of the report.
pub async fn check_nonces<C: NetworkClient>(
    client: &C,
    accounts: &[Arc<AccountSender>],
) -> NonceReport {
    let mut report = NonceReport::default();

    for (index, account) in accounts.iter().enumerate() {
        let address = account.address();
        let confirmed_next = match client.confirmed_nonce(address).await {
            Ok(nonce) => nonce,
            Err(err) => {
                warn!("Failed to get confirmed nonce for account {index}: {err}");
                continue;
            }
        };
        let pending_next = match client.pending_nonce(address).await {
            Ok(nonce) => nonce,
            Err(err) => {
                warn!("Failed to get pending nonce for account {index}: {err}");
                continue;
            }
        };
        account.resync(pending_next);
        let local = account.current_nonce();

        report.total_pending += pending_next.saturating_sub(confirmed_next);
        report.rows.push(NonceRow {
            index,
            address,
            last_confirmed: confirmed_next.saturating_sub(1),
            next_pending: pending_next,
            local,
            status: NonceStatus::classify(confirmed_next, pending_next, local),
        });
    }

    report
}

fn short_address(address: &Address) -> String {
    let hex = address.to_string();
    format!("{}...{}", &hex[..8], &hex[hex.len() - 6..])
}

impl fmt::Display for NonceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(RULE_WIDTH);
        writeln!(f, "{rule}")?;
        writeln!(
            f,
            "{:<8} | {:<20} | {:<15} | {:<15} | {:<15} | {:<10}",
            "Account", "Address", "Confirmed Nonce", "Next Nonce", "Local Nonce", "Status"
        )?;
        writeln!(f, "{rule}")?;
        for row in &self.rows {
            writeln!(
                f,
                "{:<8} | {:<20} | {:<15} | {:<15} | {:<15} | {:<10}",
                row.index,
                short_address(&row.address),
                row.last_confirmed,
                row.next_pending,
                row.local,
                row.status.to_string(),
            )?;
        }
        writeln!(f, "{rule}")?;
        writeln!(f, "Total Accounts Checked: {}", self.rows.len())?;
        writeln!(f, "Total Pending Transactions: {}", self.total_pending)?;
        if self.all_synced() {
            write!(f, "Status: all accounts are synced")
        } else {
            write!(f, "Status: some accounts have pending transactions")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockClient;
    use alloy_primitives::U256;
    use alloy_signer_local::PrivateKeySigner;

    #[test]
    fn classification() {
        assert_eq!(NonceStatus::classify(5, 5, 5), NonceStatus::Synced);
        assert_eq!(NonceStatus::classify(5, 8, 8), NonceStatus::Pending(3));
        assert_eq!(NonceStatus::classify(5, 5, 9), NonceStatus::LocalAhead);
        assert_eq!(NonceStatus::Pending(3).to_string(), "3 pending");
    }

    #[test]
    fn shortened_address() {
        let address = Address::repeat_byte(0xab);
        assert_eq!(
            short_address(&address).to_lowercase(),
            "0xababab...ababab"
        );
    }

    #[tokio::test]
    async fn resyncs_and_reports_pending() {
        let client = MockClient::new();
        client.set_nonces(10, 14);
        let accounts: Vec<_> = (0..2)
            .map(|_| {
                Arc::new(AccountSender::new(
                    PrivateKeySigner::random(),
                    1,
                    100,
                    U256::ZERO,
                ))
            })
            .collect();

        let report = check_nonces(&client, &accounts).await;

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.total_pending, 8);
        assert!(!report.all_synced());
        let row = &report.rows[0];
        assert_eq!(row.last_confirmed, 9);
        assert_eq!(row.next_pending, 14);
        assert_eq!(row.local, 14);
        assert_eq!(row.status, NonceStatus::Pending(4));
        assert_eq!(accounts[1].current_nonce(), 14);
        // One pending reading per account feeds both the table and the resync.
        assert_eq!(client.pending_queries(), 2);

        let rendered = report.to_string();
        assert!(rendered.contains("Total Pending Transactions: 8"));
    }

    #[tokio::test]
    async fn failed_queries_skip_the_account() {
        let client = MockClient::new();
        client.set_unreachable(true);
        let accounts = vec![Arc::new(AccountSender::new(
            PrivateKeySigner::random(),
            1,
            0,
            U256::ZERO,
        ))];

        let report = check_nonces(&client, &accounts).await;
        assert!(report.rows.is_empty());
        assert!(report.all_synced());
    }
}
