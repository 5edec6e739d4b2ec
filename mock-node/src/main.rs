use alloy_primitives::U256;
use clap::Parser;
use mock_node::{tps_measure_task, MockNode, MockNodeConfig};
use std::net::SocketAddr;
use std::num::{NonZeroU32, NonZeroU64};
use std::process::ExitCode;
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::EnvFilter;

/// Mock EVM JSON-RPC node for local benchmark runs.
#[derive(Parser, Debug)]
#[command(name = "mock-node", version, about)]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:8545")]
    listen: SocketAddr,

    #[arg(long, default_value_t = 1337)]
    chain_id: u64,

    #[arg(long, default_value_t = 1_000_000_000)]
    gas_price: u128,

    /// Balance reported for every account, in wei.
    #[arg(long, default_value = "1000000000000000000")]
    balance: U256,

    /// Delay added to every submission, e.g. `10ms`.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "0s")]
    latency: Duration,

    /// Fail every Nth submission with a transient error.
    #[arg(long)]
    fail_every: Option<NonZeroU64>,

    /// Rate limit for submissions.
    #[arg(long)]
    max_tps: Option<NonZeroU32>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mock_node=info")),
        )
        .init();

    let cli = Cli::parse();
    let node = MockNode::new(MockNodeConfig {
        chain_id: cli.chain_id,
        gas_price: cli.gas_price,
        balance: cli.balance,
        latency: cli.latency,
        fail_every: cli.fail_every,
        max_tps: cli.max_tps,
    });

    tokio::task::spawn(tps_measure_task(node.clone()));

    match node.serve(cli.listen).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Failed to serve on {}: {err}", cli.listen);
            ExitCode::FAILURE
        }
    }
}
