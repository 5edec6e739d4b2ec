use crate::account::AccountSender;
use crate::client::NetworkClient;
use crate::metrics::BenchMetrics;
use crate::report::RunOutcome;
use crate::reporter::{Reporter, ReporterOutput};
use crate::setup::{parse_wei, SetupError};
use crate::signal::stop_signal;
use crate::transaction::{target_index, Transfer};
use crate::worker::{RetryPolicy, SenderWorker};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn};
use txbench_core::{BenchConfig, ReportConfig, RunReport};

/// A configured run over a fixed set of initialised accounts.
pub struct Benchmark<C> {
    config: BenchConfig,
    client: Arc<C>,
    accounts: Vec<Arc<AccountSender>>,
    transfer: Transfer,
    policy: RetryPolicy,
    metrics: Arc<BenchMetrics>,
}

impl<C: NetworkClient> Benchmark<C> {
    /// Reads the gas price once; it stays fixed for the whole run.
    pub async fn new(
        config: BenchConfig,
        client: Arc<C>,
        accounts: Vec<Arc<AccountSender>>,
    ) -> Result<Self, SetupError> {
        if accounts.is_empty() {
            return Err(SetupError::NoAccounts);
        }

        let value = parse_wei(&config.transfer_amount)?;
        let gas_price = client.gas_price().await.map_err(SetupError::GasPrice)?;
        let transfer = Transfer {
            value,
            gas_limit: config.gas_limit,
            gas_price,
        };
        let policy = RetryPolicy::from_config(&config);

        Ok(Self {
            config,
            client,
            accounts,
            transfer,
            policy,
            metrics: Arc::new(BenchMetrics::new()),
        })
    }

    pub fn accounts(&self) -> &[Arc<AccountSender>] {
        &self.accounts
    }

    pub fn metrics(&self) -> &Arc<BenchMetrics> {
        &self.metrics
    }

    pub fn transfer(&self) -> Transfer {
        self.transfer
    }

    pub fn workers(&self) -> usize {
        self.accounts.len() * self.config.senders_per_account()
    }

    /// Runs for the configured duration.
    pub async fn run(self) -> RunReport {
        self.run_until(std::future::pending()).await
    }

    /// Runs for the configured duration or until `shutdown` resolves,
    /// whichever comes first.
    ///
    /// A benchmark runs once. The per-account counters are zeroed on entry, so
    /// accounts carried over from an earlier run start from a clean slate.
    #[instrument(name = "benchmark", skip_all, fields(accounts = self.accounts.len(), workers = self.workers()))]
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> RunReport {
        for account in &self.accounts {
            account.reset_counters();
        }

        let senders = self.config.senders_per_account();
        let (worker_stop, worker_signal) = stop_signal();
        let (reporter_stop, reporter_signal) = stop_signal();
        let start = Instant::now();

        let reporter = tokio::spawn(
            Reporter::new(
                self.metrics.clone(),
                self.config.report_interval,
                start,
                reporter_signal,
            )
            .run(),
        );

        let mut workers = JoinSet::new();
        for (index, account) in self.accounts.iter().enumerate() {
            let target = self.accounts[target_index(index, self.accounts.len())].address();
            for slot in 0..senders {
                workers.spawn(
                    SenderWorker::new(
                        index,
                        slot,
                        self.client.clone(),
                        account.clone(),
                        target,
                        self.transfer,
                        self.policy,
                        self.metrics.clone(),
                        worker_signal.clone(),
                    )
                    .run(),
                );
            }
        }
        info!(
            "Workers: {} accounts x {senders} senders = {} concurrent workers",
            self.accounts.len(),
            workers.len()
        );

        tokio::select! {
            _ = tokio::time::sleep(self.config.duration) => {}
            _ = shutdown => info!("Shutdown requested, stopping early"),
        }

        // NOTE: The freeze must precede the stop broadcast. Increments from
        // submissions still in flight land after it and are excluded.
        let snapshot = self.metrics.freeze(&self.accounts).totals;
        let elapsed = start.elapsed();
        info!("Benchmark stopped after {elapsed:?}");

        worker_stop.stop();
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                error!("Worker failed: {err}");
            }
        }
        debug!(
            "All workers drained; {} submissions landed after the freeze",
            self.metrics.snapshot().sent.saturating_sub(snapshot.sent)
        );

        reporter_stop.stop();
        let ReporterOutput { history, latency } = match reporter.await {
            Ok(output) => output,
            Err(err) => {
                error!("Reporter failed: {err}");
                ReporterOutput::default()
            }
        };

        RunOutcome {
            config: self.report_config(),
            window: self.metrics.freeze(&self.accounts),
            elapsed,
            history,
            latency,
            accounts: &self.accounts,
        }
        .into_report()
    }

    fn report_config(&self) -> ReportConfig {
        ReportConfig {
            rpc_endpoint: self.config.rpc_endpoint.clone(),
            gas_limit: self.transfer.gas_limit,
            transfer_amount_wei: self.transfer.value.to_string(),
            gas_price_wei: self.transfer.gas_price.to_string(),
            duration_seconds: self.config.duration.as_secs_f64(),
            account_count: self.accounts.len(),
            concurrency_per_account: self.config.senders_per_account(),
        }
    }
}

impl<C> fmt::Display for Benchmark<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Benchmark Configuration:")?;
        writeln!(f, "  Transfer Mode: Round-Robin (Account i -> Account i+1)")?;
        writeln!(f, "  Transfer Value: {} wei", self.transfer.value)?;
        writeln!(f, "  Gas Price: {} wei", self.transfer.gas_price)?;
        writeln!(f, "  Gas Limit: {}", self.transfer.gas_limit)?;
        writeln!(
            f,
            "  Duration: {}",
            humantime::format_duration(self.config.duration)
        )?;
        writeln!(f, "  Accounts: {}", self.accounts.len())?;
        write!(
            f,
            "  Concurrent Senders/Account: {}",
            self.config.concurrency_per_account.max(1)
        )
    }
}
