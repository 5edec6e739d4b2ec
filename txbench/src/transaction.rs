use crate::account::AccountSender;
use crate::client::{ClientError, NetworkClient};
use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Address, Bytes, TxKind, U256};
use alloy_signer::SignerSync;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("failed to sign transaction: {0}")]
    Signing(#[from] alloy_signer::Error),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl SubmitError {
    /// Sequencing conflicts mean the transaction most likely reached the
    /// network through a concurrent path; they are not failures.
    pub fn is_nonce_race(&self) -> bool {
        match self {
            Self::Client(err) => err.is_nonce_race(),
            Self::Signing(_) => false,
        }
    }
}

/// Account index targeted by the account at `index`: transfers go round-robin
/// so value cycles back through the pool.
pub fn target_index(index: usize, account_count: usize) -> usize {
    (index + 1) % account_count
}

/// Transfer parameters, fixed for a whole run so the measurement is not
/// affected by fee-market movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub value: U256,
    pub gas_limit: u64,
    pub gas_price: u128,
}

impl Transfer {
    /// Allocates the next sequence number of `from` and signs a transfer to `to`.
    pub fn build(&self, from: &AccountSender, to: Address) -> Result<SignedTransfer, SubmitError> {
        let nonce = from.allocate_next();
        self.sign(from, to, nonce)
    }

    /// Signs a transfer at an explicit sequence number.
    pub fn sign(
        &self,
        from: &AccountSender,
        to: Address,
        nonce: u64,
    ) -> Result<SignedTransfer, SubmitError> {
        let tx = TxLegacy {
            chain_id: Some(from.chain_id()),
            nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            to: TxKind::Call(to),
            value: self.value,
            input: Bytes::new(),
        };

        let signature = from.signer().sign_hash_sync(&tx.signature_hash())?;
        let envelope = TxEnvelope::from(tx.into_signed(signature));

        Ok(SignedTransfer {
            nonce,
            raw: envelope.encoded_2718().into(),
        })
    }
}

/// A signed, encoded transfer ready for (re)submission.
#[derive(Debug, Clone)]
pub struct SignedTransfer {
    pub nonce: u64,
    pub raw: Bytes,
}

impl SignedTransfer {
    /// Hands the transaction to the network client, returning the submission latency.
    pub async fn submit<C: NetworkClient>(&self, client: &C) -> Result<Duration, SubmitError> {
        let start = Instant::now();
        client.submit(self.raw.clone()).await?;
        Ok(start.elapsed())
    }
}
