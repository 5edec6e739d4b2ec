use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use clap::{Args, Parser, Subcommand};
#[cfg(feature = "metrics")]
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::EnvFilter;
use txbench::check::check_nonces;
use txbench::prelude::*;
use txbench::setup::SetupError;
use txbench_core::{DEFAULT_ACCOUNT_COUNT, DEFAULT_KEYS_FILE};

const DEFAULT_CONFIG_FILE: &str = "benchmark_config.json";

/// Sustained transaction throughput benchmark for EVM JSON-RPC endpoints.
#[derive(Parser, Debug)]
#[command(name = "txbench", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the benchmark.
    Run(RunArgs),
    /// Compare confirmed, pending and local nonces of every account.
    Check(CommonArgs),
    /// Write the default configuration to a file.
    GenerateConfig {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        output: PathBuf,
    },
    /// Generate fresh private keys into a key file.
    Keygen {
        /// Number of keys to generate.
        #[arg(long, default_value_t = DEFAULT_ACCOUNT_COUNT)]
        accounts: usize,

        #[arg(long, default_value = DEFAULT_KEYS_FILE)]
        output: PathBuf,

        /// Replace the output file if it already exists.
        #[arg(long)]
        overwrite: bool,
    },
    /// Send an equal transfer from a funder key to every account.
    Fund(FundArgs),
}

#[derive(Args, Debug)]
struct FundArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Private key of the account paying for the transfers.
    #[arg(long, env = "FUNDER_PRIVATE_KEY", hide_env_values = true)]
    funder_key: String,

    /// Amount sent to each account, in wei.
    #[arg(long, default_value = "1000000000000000000")]
    amount: String,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// JSON configuration file. Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// RPC endpoint URL.
    #[arg(long, env = "TXBENCH_RPC")]
    rpc: Option<String>,

    /// Private keys file.
    #[arg(long)]
    keys: Option<PathBuf>,

    /// Number of accounts to use (0 uses every key).
    #[arg(long)]
    accounts: Option<usize>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Measurement window, e.g. `60s` or `5m`.
    #[arg(long, value_parser = humantime::parse_duration)]
    duration: Option<Duration>,

    /// Concurrent senders per account.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Where to write the JSON report.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Pause between setup and the first transaction.
    #[arg(long, value_parser = humantime::parse_duration)]
    start_delay: Option<Duration>,

    /// Serve Prometheus metrics on this address.
    #[cfg(feature = "metrics")]
    #[arg(long)]
    prometheus: Option<SocketAddr>,
}

impl CommonArgs {
    fn load(&self) -> Result<BenchConfig, Error> {
        let mut config = match &self.config {
            Some(path) => BenchConfig::load(path)?,
            None => BenchConfig::default(),
        };
        if let Some(rpc) = &self.rpc {
            config.rpc_endpoint = rpc.clone();
        }
        if let Some(keys) = &self.keys {
            config.private_keys_file = keys.clone();
        }
        if let Some(accounts) = self.accounts {
            config.account_count = accounts;
        }
        Ok(config)
    }
}

impl RunArgs {
    fn load(&self) -> Result<BenchConfig, Error> {
        let mut config = self.common.load()?;
        if let Some(duration) = self.duration {
            config.duration = duration;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency_per_account = concurrency;
        }
        if let Some(output) = &self.output {
            config.output_destination = output.clone();
        }
        if let Some(start_delay) = self.start_delay {
            config.start_delay = start_delay;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("txbench=info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Check(args) => check(args).await,
        Command::GenerateConfig { output } => generate_config(output),
        Command::Keygen {
            accounts,
            output,
            overwrite,
        } => keygen(accounts, output, overwrite),
        Command::Fund(args) => fund(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn connect(config: &BenchConfig) -> Result<(JsonRpcClient, Vec<Arc<AccountSender>>), Error> {
    let signers = select_signers(load_keys(&config.private_keys_file)?, config.account_count);

    info!("Connecting to RPC: {}", config.rpc_endpoint);
    let client = JsonRpcClient::new(
        &config.rpc_endpoint,
        pool_size(signers.len(), config.senders_per_account()),
    )?;
    let accounts = initialize_accounts(&client, signers).await?;
    Ok((client, accounts))
}

async fn run(args: RunArgs) -> Result<(), Error> {
    let config = args.load()?;

    #[cfg(feature = "metrics")]
    if let Some(addr) = args.prometheus {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .map_err(|err| Error::Exporter(err.to_string()))?;
        info!("Serving metrics on http://{addr}/metrics");
    }

    let (client, accounts) = connect(&config).await?;
    check_balances(&accounts, parse_wei(&config.min_balance)?)?;

    let output = config.output_destination.clone();
    let start_delay = config.start_delay;
    let benchmark = Benchmark::new(config, Arc::new(client), accounts).await?;
    println!("\n{benchmark}\n");

    if !start_delay.is_zero() {
        info!(
            "Ready to start benchmark. Press Ctrl+C to abort, or wait {}",
            humantime::format_duration(start_delay)
        );
        tokio::select! {
            _ = tokio::time::sleep(start_delay) => {}
            _ = ctrl_c() => {
                info!("Aborted before start");
                return Ok(());
            }
        }
    }

    let report = benchmark.run_until(ctrl_c()).await;
    println!("\n{report}");

    // The run already happened; a failed write must not discard the summary above.
    if let Err(err) = save_report(&report, &output) {
        error!("Failed to save results: {err}");
    }
    Ok(())
}

async fn check(args: CommonArgs) -> Result<(), Error> {
    let config = args.load()?;
    let (client, accounts) = connect(&config).await?;

    let report = check_nonces(&client, &accounts).await;
    println!("\n{report}");
    Ok(())
}

fn generate_config(output: PathBuf) -> Result<(), Error> {
    BenchConfig::default().save(&output)?;
    info!("Default config written to {}", output.display());
    info!("Edit it and run with: txbench run --config {}", output.display());
    Ok(())
}

fn keygen(accounts: usize, output: PathBuf, overwrite: bool) -> Result<(), Error> {
    generate_keys(accounts, &output, overwrite)?;
    info!(
        "Fund the accounts before running the benchmark: txbench fund --keys {}",
        output.display()
    );
    Ok(())
}

async fn fund(args: FundArgs) -> Result<(), Error> {
    let config = args.common.load()?;
    let funder: PrivateKeySigner = args.funder_key.trim().parse().map_err(Error::FunderKey)?;
    let amount = parse_wei(&args.amount)?;
    let recipients: Vec<Address> =
        select_signers(load_keys(&config.private_keys_file)?, config.account_count)
            .iter()
            .map(|signer| signer.address())
            .collect();

    info!("Connecting to RPC: {}", config.rpc_endpoint);
    let client = JsonRpcClient::new(&config.rpc_endpoint, 1)?;
    let funder = initialize_accounts(&client, vec![funder])
        .await?
        .into_iter()
        .next()
        .ok_or(SetupError::NoAccounts)?;

    let report = fund_accounts(&client, &funder, &recipients, amount, config.gas_limit).await?;
    println!("\n{report}");
    Ok(())
}

/// One idle connection per worker, for the accounts actually in use.
fn pool_size(accounts: usize, senders_per_account: usize) -> usize {
    accounts.max(1) * senders_per_account
}

/// Resolves on Ctrl+C. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for Ctrl+C: {err}");
        std::future::pending::<()>().await;
    }
}
