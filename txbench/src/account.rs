use crate::client::{ClientError, NetworkClient};
use alloy_primitives::{Address, U256};
use alloy_signer_local::PrivateKeySigner;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// One funded identity taking part in a run.
///
/// The sequence number is the only state contended by the account's workers;
/// it is advanced with a single atomic `fetch_add`, so concurrent callers of
/// [`AccountSender::allocate_next`] never observe the same value.
pub struct AccountSender {
    signer: PrivateKeySigner,
    address: Address,
    chain_id: u64,
    balance: U256,
    nonce: AtomicU64,

    sent: AtomicU64,
    errors: AtomicU64,
}

impl AccountSender {
    pub fn new(signer: PrivateKeySigner, chain_id: u64, nonce: u64, balance: U256) -> Self {
        let address = signer.address();
        Self {
            signer,
            address,
            chain_id,
            balance,
            nonce: AtomicU64::new(nonce),
            sent: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Claims the next sequence number, returning the value before the increment.
    pub fn allocate_next(&self) -> u64 {
        self.nonce.fetch_add(1, Ordering::AcqRel)
    }

    /// Overwrites the local sequence number with the network's pending value.
    ///
    /// Out-of-band recovery only; never called on the submission path.
    pub fn resync(&self, network_pending_nonce: u64) {
        self.nonce.store(network_pending_nonce, Ordering::Release);
    }

    /// Queries the pending sequence number and applies it with [`Self::resync`].
    pub async fn resync_from<C: NetworkClient>(&self, client: &C) -> Result<u64, ClientError> {
        let pending = client.pending_nonce(self.address).await?;
        self.resync(pending);
        Ok(pending)
    }

    pub fn current_nonce(&self) -> u64 {
        self.nonce.load(Ordering::Acquire)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Balance observed when the account was initialised.
    pub fn balance(&self) -> U256 {
        self.balance
    }

    pub(crate) fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Zeroes the per-account counters before a new run.
    pub(crate) fn reset_counters(&self) {
        self.sent.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}

impl fmt::Debug for AccountSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSender")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("nonce", &self.current_nonce())
            .field("sent", &self.sent())
            .field("errors", &self.errors())
            .finish_non_exhaustive()
    }
}
