//! Network client used by the engine.
//!
//! The engine only depends on [`NetworkClient`]; [`JsonRpcClient`] is the
//! HTTP JSON-RPC implementation used by the binary.
use alloy_primitives::{Address, Bytes, U128, U256, U64};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

const NO_PARAMS: [(); 0] = [];

/// Substrings marking a submission failure as a sequencing conflict.
const NONCE_RACE_MARKERS: [&str; 3] = [
    "nonce",
    "already known",
    "replacement transaction underpriced",
];

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("http status {0}")]
    Status(u16),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ClientError {
    /// True when the failure indicates a stale, duplicate or replaced sequence
    /// number rather than a broken transaction.
    pub fn is_nonce_race(&self) -> bool {
        match self {
            Self::Rpc { message, .. } => {
                let message = message.to_lowercase();
                NONCE_RACE_MARKERS
                    .iter()
                    .any(|marker| message.contains(marker))
            }
            _ => false,
        }
    }
}

/// The capabilities the engine needs from a blockchain endpoint.
///
/// Implementations are shared by every worker and must be safe to call
/// concurrently.
pub trait NetworkClient: Send + Sync + 'static {
    fn chain_id(&self) -> impl Future<Output = Result<u64, ClientError>> + Send;

    /// Next sequence number including transactions still in the pool.
    fn pending_nonce(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<u64, ClientError>> + Send;

    /// Next sequence number counting only included transactions.
    fn confirmed_nonce(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<u64, ClientError>> + Send;

    fn balance(&self, address: Address) -> impl Future<Output = Result<U256, ClientError>> + Send;

    fn gas_price(&self) -> impl Future<Output = Result<u128, ClientError>> + Send;

    fn submit(&self, raw_transaction: Bytes)
        -> impl Future<Output = Result<(), ClientError>> + Send;
}

#[derive(Serialize)]
struct Request<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct Response<R> {
    result: Option<R>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC over pooled HTTP/1.1 connections.
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    url: Url,
    next_id: Arc<AtomicU64>,
}

impl JsonRpcClient {
    /// `max_connections` sizes the idle connection pool; it should be at least
    /// the number of concurrent workers so steady-state requests never wait
    /// on a fresh handshake.
    pub fn new(endpoint: &str, max_connections: usize) -> Result<Self, ClientError> {
        let url = Url::parse(endpoint)?;
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(max_connections)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .tcp_nodelay(true)
            .http1_only()
            .build()?;

        Ok(Self {
            http,
            url,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn request<P, R>(&self, method: &str, params: P) -> Result<R, ClientError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let request = Request {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self.http.post(self.url.clone()).json(&request).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        let response: Response<R> = serde_json::from_slice(&body).map_err(|err| {
            if status.is_success() {
                ClientError::Malformed(err.to_string())
            } else {
                ClientError::Status(status.as_u16())
            }
        })?;

        match response {
            Response {
                error: Some(error), ..
            } => Err(ClientError::Rpc {
                code: error.code,
                message: error.message,
            }),
            Response {
                result: Some(result),
                ..
            } => Ok(result),
            _ => Err(ClientError::Malformed(format!(
                "{method} returned neither result nor error"
            ))),
        }
    }
}

impl NetworkClient for JsonRpcClient {
    async fn chain_id(&self) -> Result<u64, ClientError> {
        let id: U64 = self.request("eth_chainId", NO_PARAMS).await?;
        Ok(id.to::<u64>())
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, ClientError> {
        let nonce: U64 = self
            .request("eth_getTransactionCount", (address, "pending"))
            .await?;
        Ok(nonce.to::<u64>())
    }

    async fn confirmed_nonce(&self, address: Address) -> Result<u64, ClientError> {
        let nonce: U64 = self
            .request("eth_getTransactionCount", (address, "latest"))
            .await?;
        Ok(nonce.to::<u64>())
    }

    async fn balance(&self, address: Address) -> Result<U256, ClientError> {
        self.request("eth_getBalance", (address, "latest")).await
    }

    async fn gas_price(&self) -> Result<u128, ClientError> {
        let price: U128 = self.request("eth_gasPrice", NO_PARAMS).await?;
        Ok(price.to::<u128>())
    }

    async fn submit(&self, raw_transaction: Bytes) -> Result<(), ClientError> {
        let _hash: serde_json::Value = self
            .request("eth_sendRawTransaction", [raw_transaction])
            .await?;
        Ok(())
    }
}
