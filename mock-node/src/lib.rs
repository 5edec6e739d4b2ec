//! In-process mock of an EVM JSON-RPC node.
//!
//! Transactions are decoded and their signer recovered, and per-sender nonce
//! ordering is enforced the way a real transaction pool does it: a stale nonce
//! is rejected with `nonce too low`, a repeated one with `already known`, and
//! a nonce ahead of the next expected value is queued until the gap closes.
//! Accepted transactions are treated as included immediately, so the pending
//! and latest transaction counts are the same.
use alloy_consensus::transaction::SignerRecoverable;
use alloy_consensus::{Transaction, TxEnvelope};
use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::{keccak256, Address, Bytes, U256};
use axum::{extract::State, routing::post, Json, Router};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::num::{NonZeroU32, NonZeroU64};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

const INVALID_PARAMS: i64 = -32602;
const METHOD_NOT_FOUND: i64 = -32601;
const SERVER_ERROR: i64 = -32000;
const LIMIT_EXCEEDED: i64 = -32005;

#[derive(Debug, Clone)]
pub struct MockNodeConfig {
    pub chain_id: u64,
    pub gas_price: u128,
    /// Balance reported for every address without an explicit override.
    pub balance: U256,
    /// Delay added to every submission.
    pub latency: Duration,
    /// Every Nth submission fails with a transient error.
    pub fail_every: Option<NonZeroU64>,
    /// Submissions above this rate fail with `rate limited`.
    pub max_tps: Option<NonZeroU32>,
}

impl Default for MockNodeConfig {
    fn default() -> Self {
        Self {
            chain_id: 1337,
            gas_price: 1_000_000_000,
            balance: U256::from(1_000_000_000_000_000_000u64),
            latency: Duration::ZERO,
            fail_every: None,
            max_tps: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockNodeStats {
    pub accepted: u64,
    /// Rejected for nonce ordering or malformed input.
    pub rejected: u64,
    /// Injected failures and rate limiting.
    pub transient: u64,
}

#[derive(Debug, Default)]
struct SenderPool {
    next: u64,
    queued: BTreeSet<u64>,
}

impl SenderPool {
    fn insert(&mut self, nonce: u64) -> Result<(), &'static str> {
        if nonce < self.next {
            return Err("nonce too low");
        }
        if nonce > self.next {
            return if self.queued.insert(nonce) {
                Ok(())
            } else {
                Err("already known")
            };
        }

        self.next += 1;
        while self.queued.remove(&self.next) {
            self.next += 1;
        }
        Ok(())
    }
}

struct NodeState {
    config: MockNodeConfig,
    limiter: Option<DefaultDirectRateLimiter>,
    pools: Mutex<HashMap<Address, SenderPool>>,
    balances: Mutex<HashMap<Address, U256>>,

    submissions: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    transient: AtomicU64,
}

/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MockNode {
    state: Arc<NodeState>,
}

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: i64,
    message: String,
}

type RpcResult = Result<Value, RpcError>;

fn rpc_error(code: i64, message: impl Into<String>) -> RpcError {
    RpcError {
        code,
        message: message.into(),
    }
}

fn quantity(value: impl Into<U256>) -> Value {
    Value::String(format!("{:#x}", value.into()))
}

fn param<T: serde::de::DeserializeOwned>(params: &[Value], index: usize) -> Result<T, RpcError> {
    let value = params
        .get(index)
        .cloned()
        .ok_or_else(|| rpc_error(INVALID_PARAMS, format!("missing param {index}")))?;
    serde_json::from_value(value).map_err(|err| rpc_error(INVALID_PARAMS, err.to_string()))
}

impl MockNode {
    pub fn new(config: MockNodeConfig) -> Self {
        let limiter = config
            .max_tps
            .map(|tps| RateLimiter::direct(Quota::per_second(tps)));
        Self {
            state: Arc::new(NodeState {
                config,
                limiter,
                pools: Mutex::new(HashMap::new()),
                balances: Mutex::new(HashMap::new()),
                submissions: AtomicU64::new(0),
                accepted: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
                transient: AtomicU64::new(0),
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", post(handle))
            .with_state(self.clone())
    }

    pub async fn serve(self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("Mock node listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router()).await
    }

    /// Serves on an ephemeral localhost port, returning its address.
    pub async fn spawn(self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                error!("Mock node stopped: {err}");
            }
        });
        Ok((addr, handle))
    }

    pub fn stats(&self) -> MockNodeStats {
        MockNodeStats {
            accepted: self.state.accepted.load(Ordering::Relaxed),
            rejected: self.state.rejected.load(Ordering::Relaxed),
            transient: self.state.transient.load(Ordering::Relaxed),
        }
    }

    /// Next nonce the node expects from `sender`.
    pub fn next_nonce(&self, sender: Address) -> u64 {
        self.lock_pools().get(&sender).map_or(0, |pool| pool.next)
    }

    /// Nonces received ahead of a gap and not yet executable.
    pub fn queued(&self, sender: Address) -> usize {
        self.lock_pools()
            .get(&sender)
            .map_or(0, |pool| pool.queued.len())
    }

    pub fn set_next_nonce(&self, sender: Address, nonce: u64) {
        self.lock_pools().entry(sender).or_default().next = nonce;
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.lock_balances().insert(address, balance);
    }

    fn balance(&self, address: Address) -> U256 {
        self.lock_balances()
            .get(&address)
            .copied()
            .unwrap_or(self.state.config.balance)
    }

    fn lock_pools(&self) -> std::sync::MutexGuard<'_, HashMap<Address, SenderPool>> {
        self.state
            .pools
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_balances(&self) -> std::sync::MutexGuard<'_, HashMap<Address, U256>> {
        self.state
            .balances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn dispatch(&self, method: &str, params: &[Value]) -> RpcResult {
        match method {
            "eth_chainId" => Ok(quantity(U256::from(self.state.config.chain_id))),
            "eth_gasPrice" => Ok(quantity(U256::from(self.state.config.gas_price))),
            "eth_getTransactionCount" => {
                let address: Address = param(params, 0)?;
                Ok(quantity(U256::from(self.next_nonce(address))))
            }
            "eth_getBalance" => {
                let address: Address = param(params, 0)?;
                Ok(quantity(self.balance(address)))
            }
            "eth_sendRawTransaction" => {
                let raw: Bytes = param(params, 0)?;
                self.send_raw_transaction(raw).await
            }
            _ => Err(rpc_error(
                METHOD_NOT_FOUND,
                format!("the method {method} does not exist/is not available"),
            )),
        }
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> RpcResult {
        let state = &self.state;
        let count = state.submissions.fetch_add(1, Ordering::Relaxed) + 1;

        if !state.config.latency.is_zero() {
            tokio::time::sleep(state.config.latency).await;
        }

        if let Some(limiter) = &state.limiter {
            if limiter.check().is_err() {
                state.transient.fetch_add(1, Ordering::Relaxed);
                return Err(rpc_error(LIMIT_EXCEEDED, "rate limited"));
            }
        }
        if let Some(every) = state.config.fail_every {
            if count % every.get() == 0 {
                state.transient.fetch_add(1, Ordering::Relaxed);
                return Err(rpc_error(SERVER_ERROR, "service temporarily unavailable"));
            }
        }

        let result = self.admit(&raw);
        match &result {
            Ok(_) => state.accepted.fetch_add(1, Ordering::Relaxed),
            Err(_) => state.rejected.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    fn admit(&self, raw: &Bytes) -> RpcResult {
        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref())
            .map_err(|err| rpc_error(INVALID_PARAMS, format!("invalid transaction: {err}")))?;
        if envelope.chain_id() != Some(self.state.config.chain_id) {
            return Err(rpc_error(SERVER_ERROR, "invalid chain id for signer"));
        }
        let sender = envelope
            .recover_signer()
            .map_err(|err| rpc_error(SERVER_ERROR, format!("invalid sender: {err}")))?;

        let nonce = envelope.nonce();
        self.lock_pools()
            .entry(sender)
            .or_default()
            .insert(nonce)
            .map_err(|message| rpc_error(SERVER_ERROR, message))?;

        trace!(%sender, nonce, "Accepted transaction");
        Ok(Value::String(keccak256(raw).to_string()))
    }
}

async fn handle(State(node): State<MockNode>, Json(request): Json<RpcRequest>) -> Json<Value> {
    let RpcRequest { id, method, params } = request;
    let response = match node.dispatch(&method, &params).await {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err(error) => {
            debug!(method = %method, code = error.code, "{}", error.message);
            json!({ "jsonrpc": "2.0", "id": id, "error": error })
        }
    };
    Json(response)
}

/// Prints the number of accepted transactions once per second.
pub async fn tps_measure_task(node: MockNode) {
    let mut last = 0;
    loop {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let accepted = node.stats().accepted;
        println!("{} TPS", accepted - last);
        last = accepted;
    }
}
