use crate::account::AccountSender;
use crate::metrics::FrozenWindow;
use crate::reporter::LatencyQuantiles;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};
use txbench_core::{accept_rate, AccountStatistics, ReportConfig, RunReport, ThroughputStats};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything the run produced, gathered once the workers have drained.
#[derive(Debug)]
pub(crate) struct RunOutcome<'a> {
    pub config: ReportConfig,
    /// The end-of-window counters, global and per account.
    pub window: &'a FrozenWindow,
    /// Time from start to the freeze point.
    pub elapsed: Duration,
    pub history: Vec<u64>,
    pub latency: LatencyQuantiles,
    pub accounts: &'a [Arc<AccountSender>],
}

impl RunOutcome<'_> {
    pub(crate) fn into_report(self) -> RunReport {
        let RunOutcome {
            config,
            window,
            elapsed,
            history,
            latency,
            accounts,
        } = self;

        let throughput = ThroughputStats::from_history(&history);
        let elapsed_secs = elapsed.as_secs_f64();
        let snapshot = window.totals;
        let average_submitted_tps = if elapsed_secs > 0. {
            snapshot.sent as f64 / elapsed_secs
        } else {
            0.
        };

        let account_statistics = accounts
            .iter()
            .zip(&window.accounts)
            .enumerate()
            .map(|(i, (account, tally))| {
                AccountStatistics::new(i, account.address().to_string(), tally.sent, tally.errors)
            })
            .collect();

        RunReport {
            timestamp: OffsetDateTime::now_utc(),
            config,
            elapsed_seconds: elapsed_secs,
            total_submitted: snapshot.sent,
            total_errors: snapshot.errors,
            rpc_accept_rate: accept_rate(snapshot.sent, snapshot.errors),
            average_submitted_tps,
            peak_submitted_tps: throughput.max,
            min_submitted_tps: throughput.min,
            median_submitted_tps: throughput.median,
            average_latency_ms: millis(snapshot.average_latency()),
            latency_p50_ms: millis(latency.p50),
            latency_p90_ms: millis(latency.p90),
            latency_p99_ms: millis(latency.p99),
            submitted_tps_history: history,
            account_statistics,
        }
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1e3
}

/// Writes the report as pretty JSON.
pub fn save_report(report: &RunReport, path: &Path) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Results saved to {}", path.display());
    Ok(())
}
