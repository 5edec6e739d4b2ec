use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use time::OffsetDateTime;

const RULE_WIDTH: usize = 70;

/// Peak, minimum and median of a per-interval throughput history.
///
/// The median of an even-length history is the upper of the two middle
/// samples (`sorted[len / 2]`); no averaging is done, so the median is
/// always a throughput that was actually observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughputStats {
    pub min: u64,
    pub max: u64,
    pub median: u64,
}

impl ThroughputStats {
    pub fn from_history(history: &[u64]) -> Self {
        if history.is_empty() {
            return Self::default();
        }

        let mut sorted = history.to_vec();
        sorted.sort_unstable();

        Self {
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            median: sorted[sorted.len() / 2],
        }
    }
}

/// Successful submissions as a percentage of all attempted submissions.
///
/// Defined as 0.0 when nothing was attempted.
pub fn accept_rate(sent: u64, errors: u64) -> f64 {
    let attempted = sent + errors;
    if attempted == 0 {
        0.0
    } else {
        sent as f64 / attempted as f64 * 100.0
    }
}

/// The configuration subset echoed into every report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    pub rpc_endpoint: String,
    pub gas_limit: u64,
    pub transfer_amount_wei: String,
    pub gas_price_wei: String,
    pub duration_seconds: f64,
    pub account_count: usize,
    pub concurrency_per_account: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountStatistics {
    pub account_id: usize,
    pub address: String,
    pub sent: u64,
    pub errors: u64,
    pub success_rate: f64,
}

impl AccountStatistics {
    pub fn new(account_id: usize, address: String, sent: u64, errors: u64) -> Self {
        Self {
            account_id,
            address,
            sent,
            errors,
            success_rate: accept_rate(sent, errors),
        }
    }
}

/// Structured result of one benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub config: ReportConfig,
    /// Measured window length; shorter than the configured duration when the
    /// run was stopped early.
    pub elapsed_seconds: f64,
    pub total_submitted: u64,
    pub total_errors: u64,
    pub rpc_accept_rate: f64,
    pub average_submitted_tps: f64,
    pub peak_submitted_tps: u64,
    pub min_submitted_tps: u64,
    pub median_submitted_tps: u64,
    pub average_latency_ms: f64,
    pub latency_p50_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p99_ms: f64,
    pub submitted_tps_history: Vec<u64>,
    pub account_statistics: Vec<AccountStatistics>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(RULE_WIDTH);
        let duration = Duration::from_millis((self.elapsed_seconds.max(0.) * 1e3).round() as u64);

        writeln!(f, "{rule}")?;
        writeln!(f, "BENCHMARK RESULTS")?;
        writeln!(f, "{rule}")?;

        writeln!(f, "\nOverall Statistics:")?;
        writeln!(
            f,
            "  Duration:           {}",
            humantime::format_duration(duration)
        )?;
        writeln!(
            f,
            "  Total Submitted:    {} transactions",
            self.total_submitted
        )?;
        writeln!(f, "  Total Errors:       {} transactions", self.total_errors)?;
        writeln!(f, "  RPC Accept Rate:    {:.2}%", self.rpc_accept_rate)?;

        writeln!(f, "\nSubmitted TPS:")?;
        writeln!(f, "  Average TPS:        {:.2}", self.average_submitted_tps)?;
        writeln!(f, "  Peak TPS:           {}", self.peak_submitted_tps)?;
        writeln!(f, "  Minimum TPS:        {}", self.min_submitted_tps)?;
        writeln!(f, "  Median TPS:         {}", self.median_submitted_tps)?;

        writeln!(f, "\nLatency:")?;
        writeln!(f, "  Average Latency:    {:.0}ms", self.average_latency_ms)?;
        writeln!(
            f,
            "  p50/p90/p99:        {:.0}ms / {:.0}ms / {:.0}ms",
            self.latency_p50_ms, self.latency_p90_ms, self.latency_p99_ms
        )?;

        writeln!(f, "\nPer-Account Statistics:")?;
        for account in &self.account_statistics {
            writeln!(
                f,
                "  Account {:2}: {:6} sent, {:4} errors ({:.1}%)",
                account.account_id, account.sent, account.errors, account.success_rate
            )?;
        }

        write!(f, "\n{rule}")
    }
}
