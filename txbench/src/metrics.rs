use crate::account::AccountSender;
use metrics_util::AtomicBucket;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

#[cfg(feature = "metrics")]
const SUBMITTED: &str = "txbench_submitted";
#[cfg(feature = "metrics")]
const ERRORS: &str = "txbench_errors";
#[cfg(feature = "metrics")]
const NONCE_RACES: &str = "txbench_nonce_races";
#[cfg(feature = "metrics")]
const SUBMIT_LATENCY: &str = "txbench_submit_latency";

/// Point-in-time read of the global counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub sent: u64,
    pub errors: u64,
    pub total_latency: Duration,
}

impl Snapshot {
    pub fn average_latency(&self) -> Duration {
        if self.sent == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos((self.total_latency.as_nanos() / self.sent as u128) as u64)
        }
    }
}

/// One account's counters as read at the freeze.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountTally {
    pub sent: u64,
    pub errors: u64,
}

/// Everything captured at the end of the measurement window.
///
/// The totals are the sums of the per-account tallies, so a report built from
/// a window always adds up.
#[derive(Debug, Default)]
pub struct FrozenWindow {
    pub totals: Snapshot,
    pub accounts: Vec<AccountTally>,
    /// Latency samples recorded before the freeze that no reader drained yet.
    pub(crate) latencies: Vec<Duration>,
}

/// Global counters shared by every worker.
///
/// Writers only ever `fetch_add`; readers take relaxed loads and never block
/// writers. [`BenchMetrics::freeze`] captures the snapshot that defines the
/// measurement window; increments landing after it are excluded from the
/// report.
pub struct BenchMetrics {
    sent: AtomicU64,
    errors: AtomicU64,
    nonce_races: AtomicU64,
    latency_nanos: AtomicU64,
    latencies: AtomicBucket<Duration>,
    frozen: OnceLock<FrozenWindow>,
}

impl Default for BenchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BenchMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchMetrics")
            .field("live", &self.snapshot())
            .field("frozen", &self.frozen())
            .field("nonce_races", &self.nonce_races())
            .finish()
    }
}

impl BenchMetrics {
    pub fn new() -> Self {
        Self {
            sent: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            nonce_races: AtomicU64::new(0),
            latency_nanos: AtomicU64::new(0),
            latencies: AtomicBucket::new(),
            frozen: OnceLock::new(),
        }
    }

    pub(crate) fn record_success(&self, account: &AccountSender, latency: Duration) {
        account.record_sent();
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.latency_nanos
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
        if self.frozen.get().is_none() {
            self.latencies.push(latency);
        }

        #[cfg(feature = "metrics")]
        {
            ::metrics::counter!(SUBMITTED).increment(1);
            ::metrics::histogram!(SUBMIT_LATENCY).record(latency.as_secs_f64());
        }
    }

    pub(crate) fn record_error(&self, account: &AccountSender) {
        account.record_error();
        self.errors.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        ::metrics::counter!(ERRORS).increment(1);
    }

    pub(crate) fn record_nonce_race(&self) {
        self.nonce_races.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        ::metrics::counter!(NONCE_RACES).increment(1);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            sent: self.sent.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            total_latency: Duration::from_nanos(self.latency_nanos.load(Ordering::Relaxed)),
        }
    }

    /// Captures the end of the measurement window: the per-account counters
    /// of `accounts` and the latency samples not yet drained. Only the first
    /// call takes a reading; later calls return the same window.
    pub fn freeze(&self, accounts: &[Arc<AccountSender>]) -> &FrozenWindow {
        self.frozen.get_or_init(|| {
            let accounts: Vec<_> = accounts
                .iter()
                .map(|account| AccountTally {
                    sent: account.sent(),
                    errors: account.errors(),
                })
                .collect();
            let totals = Snapshot {
                sent: accounts.iter().map(|tally| tally.sent).sum(),
                errors: accounts.iter().map(|tally| tally.errors).sum(),
                total_latency: Duration::from_nanos(self.latency_nanos.load(Ordering::Relaxed)),
            };

            FrozenWindow {
                totals,
                accounts,
                latencies: self.drain_latencies(),
            }
        })
    }

    /// Totals of the frozen window, if the window has closed.
    pub fn frozen(&self) -> Option<Snapshot> {
        self.frozen.get().map(|window| window.totals)
    }

    pub fn frozen_window(&self) -> Option<&FrozenWindow> {
        self.frozen.get()
    }

    pub fn nonce_races(&self) -> u64 {
        self.nonce_races.load(Ordering::Relaxed)
    }

    /// Drains the latency samples recorded since the previous drain.
    pub(crate) fn drain_latencies(&self) -> Vec<Duration> {
        let mut drained = vec![];
        self.latencies
            .clear_with(|chunk| drained.extend_from_slice(chunk));
        drained
    }
}
