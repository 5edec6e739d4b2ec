//! Scriptable in-process [`NetworkClient`] for unit tests.
use crate::client::{ClientError, NetworkClient};
use alloy_primitives::{Address, Bytes, U256};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) struct MockClient {
    chain_id: u64,
    pending_nonce: AtomicU64,
    confirmed_nonce: AtomicU64,
    balance: Mutex<U256>,
    gas_price: AtomicU64,
    latency: Mutex<Duration>,
    unreachable: AtomicBool,

    script: Mutex<VecDeque<ClientError>>,
    pending_queries: AtomicU64,
    submissions: AtomicU64,
    raws: Mutex<Vec<Bytes>>,
}

impl MockClient {
    pub(crate) fn new() -> Self {
        Self {
            chain_id: 1337,
            pending_nonce: AtomicU64::new(0),
            confirmed_nonce: AtomicU64::new(0),
            balance: Mutex::new(U256::from(10u64).pow(U256::from(18u64))),
            gas_price: AtomicU64::new(1_000_000_000),
            latency: Mutex::new(Duration::ZERO),
            unreachable: AtomicBool::new(false),
            script: Mutex::new(VecDeque::new()),
            pending_queries: AtomicU64::new(0),
            submissions: AtomicU64::new(0),
            raws: Mutex::new(vec![]),
        }
    }

    /// Queues an RPC error for the next submission. Submissions succeed once
    /// the queue is empty.
    pub(crate) fn push_failure(&self, message: &str) {
        self.script.lock().unwrap().push_back(ClientError::Rpc {
            code: -32000,
            message: message.to_string(),
        });
    }

    pub(crate) fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub(crate) fn set_nonces(&self, confirmed: u64, pending: u64) {
        self.confirmed_nonce.store(confirmed, Ordering::Relaxed);
        self.pending_nonce.store(pending, Ordering::Relaxed);
    }

    pub(crate) fn set_balance(&self, balance: U256) {
        *self.balance.lock().unwrap() = balance;
    }

    /// Makes every query fail with a transport-like error.
    pub(crate) fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::Relaxed);
    }

    pub(crate) fn pending_queries(&self) -> u64 {
        self.pending_queries.load(Ordering::Relaxed)
    }

    pub(crate) fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::Relaxed)
    }

    pub(crate) fn take_submissions(&self) -> Vec<Bytes> {
        std::mem::take(&mut *self.raws.lock().unwrap())
    }

    fn check_reachable(&self) -> Result<(), ClientError> {
        if self.unreachable.load(Ordering::Relaxed) {
            Err(ClientError::Status(503))
        } else {
            Ok(())
        }
    }
}

impl NetworkClient for MockClient {
    async fn chain_id(&self) -> Result<u64, ClientError> {
        self.check_reachable()?;
        Ok(self.chain_id)
    }

    async fn pending_nonce(&self, _address: Address) -> Result<u64, ClientError> {
        self.pending_queries.fetch_add(1, Ordering::Relaxed);
        self.check_reachable()?;
        Ok(self.pending_nonce.load(Ordering::Relaxed))
    }

    async fn confirmed_nonce(&self, _address: Address) -> Result<u64, ClientError> {
        self.check_reachable()?;
        Ok(self.confirmed_nonce.load(Ordering::Relaxed))
    }

    async fn balance(&self, _address: Address) -> Result<U256, ClientError> {
        self.check_reachable()?;
        Ok(*self.balance.lock().unwrap())
    }

    async fn gas_price(&self) -> Result<u128, ClientError> {
        self.check_reachable()?;
        Ok(self.gas_price.load(Ordering::Relaxed) as u128)
    }

    async fn submit(&self, raw_transaction: Bytes) -> Result<(), ClientError> {
        self.submissions.fetch_add(1, Ordering::Relaxed);
        self.raws.lock().unwrap().push(raw_transaction);

        let latency = *self.latency.lock().unwrap();
        if latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(latency).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
