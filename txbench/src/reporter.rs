use crate::metrics::{BenchMetrics, Snapshot};
use crate::signal::StopSignal;
use pdatastructs::tdigest::{TDigest, K1};
use std::sync::Arc;
use std::time::{Duration, Instant};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

mod timer;

use timer::Timer;

const TDIGEST_BACKLOG_SIZE: usize = 100;
const RULE_WIDTH: usize = 85;

#[cfg(feature = "metrics")]
const SUBMITTED_TPS: &str = "txbench_submitted_tps";

/// Submission latency quantiles over the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencyQuantiles {
    pub p50: Duration,
    pub p90: Duration,
    pub p99: Duration,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ReporterOutput {
    pub history: Vec<u64>,
    pub latency: LatencyQuantiles,
}

/// Samples the global counters once per interval, prints the live table
/// and records the throughput history.
pub(crate) struct Reporter {
    metrics: Arc<BenchMetrics>,
    interval: Duration,
    start: Instant,
    stop: StopSignal,

    history: Vec<u64>,
    last_sent: u64,
    latency: TDigest<K1>,
    latency_samples: usize,
}

impl Reporter {
    pub(crate) fn new(
        metrics: Arc<BenchMetrics>,
        interval: Duration,
        start: Instant,
        stop: StopSignal,
    ) -> Self {
        Self {
            metrics,
            interval,
            start,
            stop,
            history: vec![],
            last_sent: 0,
            latency: TDigest::new(K1::new(10.), TDIGEST_BACKLOG_SIZE),
            latency_samples: 0,
        }
    }

    pub(crate) async fn run(mut self) -> ReporterOutput {
        let mut timer = Timer::new(self.interval).await;
        debug!("Reporting every {timer}");
        print_header();

        loop {
            tokio::select! {
                biased;
                _ = self.stop.stopped() => break,
                elapsed = timer.tick() => {
                    trace!("Tick after {elapsed:?} (period {:?})", timer.interval_dur());
                    self.tick();
                }
            }
        }

        self.flush();

        ReporterOutput {
            latency: self.quantiles(),
            history: self.history,
        }
    }

    fn tick(&mut self) {
        // The measurement window is closed; anything read now would include
        // increments that the report excludes.
        if self.metrics.frozen().is_some() {
            trace!("Metrics frozen, skipping sample");
            return;
        }
        self.absorb_latencies();

        let snapshot = self.metrics.snapshot();
        let submitted = snapshot.sent.saturating_sub(self.last_sent);
        self.last_sent = snapshot.sent;
        self.history.push(submitted);

        #[cfg(feature = "metrics")]
        ::metrics::gauge!(SUBMITTED_TPS).set(submitted as f64);

        println!("{}", self.row(submitted, &snapshot));
    }

    /// Prints the trailing line from the frozen snapshot and takes in the
    /// latency samples the freeze collected.
    fn flush(&mut self) {
        let metrics = self.metrics.clone();
        let snapshot = match metrics.frozen_window() {
            Some(window) => {
                self.absorb(window.latencies.iter().copied());
                window.totals
            }
            None => {
                self.absorb_latencies();
                metrics.snapshot()
            }
        };
        let submitted = snapshot.sent.saturating_sub(self.last_sent);
        println!("{}", self.row(submitted, &snapshot));
        println!("{}", "-".repeat(RULE_WIDTH));
    }

    fn absorb_latencies(&mut self) {
        let latencies = self.metrics.drain_latencies();
        self.absorb(latencies);
    }

    fn absorb(&mut self, latencies: impl IntoIterator<Item = Duration>) {
        for latency in latencies {
            self.latency.insert(latency.as_secs_f64());
            self.latency_samples += 1;
        }
    }

    fn quantiles(&self) -> LatencyQuantiles {
        if self.latency_samples == 0 {
            return LatencyQuantiles::default();
        }
        LatencyQuantiles {
            p50: self.quantile(0.50),
            p90: self.quantile(0.90),
            p99: self.quantile(0.99),
        }
    }

    fn quantile(&self, quantile: f64) -> Duration {
        let secs = self.latency.quantile(quantile);
        if secs.is_finite() && secs >= 0. {
            Duration::from_secs_f64(secs)
        } else {
            error!("Latency quantile {quantile} is not a valid duration: {secs}");
            Duration::ZERO
        }
    }

    fn row(&self, submitted: u64, snapshot: &Snapshot) -> String {
        format!(
            "{:<10} | {:<13} | {:<15} | {:<10} | {:<12}",
            format_elapsed(self.start.elapsed()),
            submitted,
            snapshot.sent,
            snapshot.errors,
            format!("{:.0?}", round_to_millis(snapshot.average_latency())),
        )
    }
}

fn print_header() {
    println!("\n{}", "-".repeat(RULE_WIDTH));
    println!(
        "{:<10} | {:<13} | {:<15} | {:<10} | {:<12}",
        "Time", "Submitted TPS", "Total Submitted", "Errors", "Avg Latency"
    );
    println!("{}", "-".repeat(RULE_WIDTH));
}

/// `mm:ss`, rounded to the nearest second.
pub(crate) fn format_elapsed(elapsed: Duration) -> String {
    let secs = (elapsed.as_millis() + 500) / 1000;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn round_to_millis(duration: Duration) -> Duration {
    Duration::from_millis(((duration.as_micros() + 500) / 1000) as u64)
}
