use crate::account::AccountSender;
use crate::client::NetworkClient;
use crate::metrics::BenchMetrics;
use crate::signal::StopSignal;
use crate::transaction::Transfer;
use alloy_primitives::Address;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn};
use txbench_core::{
    BenchConfig, DEFAULT_FAILURE_BACKOFF, DEFAULT_FIRST_TRANSACTION_RETRIES, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_DELAY, MAX_BACKOFF_STEPS,
};

const MAX_START_JITTER_MS: u64 = 2;

/// Retry and backoff bounds applied by every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt for a steady-state transaction.
    pub max_retries: u32,
    /// Retries for a worker's first transaction.
    pub first_transaction_retries: u32,
    /// Fixed pause between retries of the same sequence number.
    pub retry_delay: Duration,
    /// Pause added per consecutive exhausted failure.
    pub failure_backoff: Duration,
    pub max_backoff_steps: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            first_transaction_retries: DEFAULT_FIRST_TRANSACTION_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            failure_backoff: DEFAULT_FAILURE_BACKOFF,
            max_backoff_steps: MAX_BACKOFF_STEPS,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &BenchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            first_transaction_retries: config.first_transaction_retries,
            retry_delay: config.retry_delay,
            failure_backoff: config.failure_backoff,
            max_backoff_steps: MAX_BACKOFF_STEPS,
        }
    }

    /// Total submission attempts for one sequence number.
    pub fn attempts(&self, first_transaction: bool) -> u32 {
        let retries = if first_transaction {
            self.first_transaction_retries.max(self.max_retries)
        } else {
            self.max_retries
        };
        retries.saturating_add(1)
    }

    /// Grows with consecutive failures up to `max_backoff_steps`, then stays flat.
    pub fn backoff(&self, consecutive_errors: u32) -> Duration {
        self.failure_backoff * consecutive_errors.min(self.max_backoff_steps)
    }
}

/// What one pass through the worker loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Sent,
    /// Sequencing conflict; presumed accepted, not counted as an error.
    NonceRace,
    /// Retries exhausted; counted as an error.
    Failed,
    /// The stop signal fired mid-retry; the attempt is dropped uncounted.
    Abandoned,
}

/// One concurrent sender bound to an account and its round-robin target.
pub(crate) struct SenderWorker<C> {
    account_index: usize,
    slot: usize,
    client: Arc<C>,
    account: Arc<AccountSender>,
    target: Address,
    transfer: Transfer,
    policy: RetryPolicy,
    metrics: Arc<BenchMetrics>,
    stop: StopSignal,

    consecutive_errors: u32,
    first_transaction: bool,
}

impl<C: NetworkClient> SenderWorker<C> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        account_index: usize,
        slot: usize,
        client: Arc<C>,
        account: Arc<AccountSender>,
        target: Address,
        transfer: Transfer,
        policy: RetryPolicy,
        metrics: Arc<BenchMetrics>,
        stop: StopSignal,
    ) -> Self {
        Self {
            account_index,
            slot,
            client,
            account,
            target,
            transfer,
            policy,
            metrics,
            stop,
            consecutive_errors: 0,
            first_transaction: true,
        }
    }

    #[instrument(name = "worker", skip_all, fields(account = self.account_index, slot = self.slot))]
    pub(crate) async fn run(mut self) {
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=MAX_START_JITTER_MS));
        self.pause(jitter).await;

        // NOTE: The stop signal is only observed between transactions. An
        // in-flight submission always runs to completion so the fate of its
        // sequence number is known.
        while !self.stop.is_stopped() {
            self.step().await;
        }

        trace!("Worker stopped");
    }

    pub(crate) async fn step(&mut self) -> Outcome {
        let signed = match self.transfer.build(&self.account, self.target) {
            Ok(signed) => signed,
            Err(err) => {
                warn!("Failed to build transaction: {err}");
                return self.fail().await;
            }
        };

        let attempts = self.policy.attempts(self.first_transaction);
        for attempt in 1..=attempts {
            match signed.submit(&*self.client).await {
                Ok(latency) => {
                    self.metrics.record_success(&self.account, latency);
                    self.consecutive_errors = 0;
                    self.first_transaction = false;
                    return Outcome::Sent;
                }
                Err(err) if err.is_nonce_race() => {
                    trace!(nonce = signed.nonce, "Sequencing race: {err}");
                    self.metrics.record_nonce_race();
                    self.consecutive_errors = 0;
                    self.first_transaction = false;
                    return Outcome::NonceRace;
                }
                Err(err) => {
                    debug!(nonce = signed.nonce, attempt, attempts, "Submission failed: {err}");
                    if attempt < attempts {
                        self.pause(self.policy.retry_delay).await;
                        if self.stop.is_stopped() {
                            return Outcome::Abandoned;
                        }
                    }
                }
            }
        }

        self.fail().await
    }

    async fn fail(&mut self) -> Outcome {
        self.metrics.record_error(&self.account);
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.pause(self.policy.backoff(self.consecutive_errors)).await;
        Outcome::Failed
    }

    /// Sleeps for `duration`, waking early if the stop signal fires.
    async fn pause(&mut self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.stop.stopped() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{stop_signal, StopHandle};
    use crate::testing::MockClient;
    use alloy_primitives::U256;
    use alloy_signer_local::PrivateKeySigner;

    const POLICY: RetryPolicy = RetryPolicy {
        max_retries: 2,
        first_transaction_retries: 5,
        retry_delay: Duration::ZERO,
        failure_backoff: Duration::ZERO,
        max_backoff_steps: MAX_BACKOFF_STEPS,
    };

    struct Harness {
        worker: SenderWorker<MockClient>,
        client: Arc<MockClient>,
        account: Arc<AccountSender>,
        metrics: Arc<BenchMetrics>,
        stop: StopHandle,
    }

    fn harness(policy: RetryPolicy) -> Harness {
        let client = Arc::new(MockClient::new());
        let account = Arc::new(AccountSender::new(
            PrivateKeySigner::random(),
            1,
            0,
            U256::ZERO,
        ));
        let metrics = Arc::new(BenchMetrics::new());
        let (stop, signal) = stop_signal();
        let transfer = Transfer {
            value: U256::from(1u64),
            gas_limit: 21_000,
            gas_price: 1,
        };
        let worker = SenderWorker::new(
            0,
            0,
            client.clone(),
            account.clone(),
            Address::ZERO,
            transfer,
            policy,
            metrics.clone(),
            signal,
        );
        Harness {
            worker,
            client,
            account,
            metrics,
            stop,
        }
    }

    #[test]
    fn attempt_budgets() {
        assert_eq!(POLICY.attempts(true), 6);
        assert_eq!(POLICY.attempts(false), 3);

        let generous = RetryPolicy {
            max_retries: 9,
            ..POLICY
        };
        assert_eq!(generous.attempts(true), 10);

        let defaults = RetryPolicy::default();
        assert_eq!(defaults.attempts(true), 8);
        assert_eq!(defaults.attempts(false), 2);
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::ZERO);
        assert_eq!(policy.backoff(1), Duration::from_millis(5));
        assert_eq!(policy.backoff(3), Duration::from_millis(15));
        assert_eq!(policy.backoff(4), Duration::from_millis(20));
        assert_eq!(policy.backoff(1_000), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn classified_outcomes_count_errors_once() {
        let mut h = harness(POLICY);

        // Burn the first-transaction budget so the steady-state bound applies.
        assert_eq!(h.worker.step().await, Outcome::Sent);

        // Nonce race.
        h.client.push_failure("nonce too low");
        assert_eq!(h.worker.step().await, Outcome::NonceRace);

        // Transient failures that recover within the retry budget.
        h.client.push_failure("timeout");
        h.client.push_failure("timeout");
        assert_eq!(h.worker.step().await, Outcome::Sent);

        assert_eq!(h.metrics.snapshot().errors, 0);

        // max_retries + 1 transient failures exhaust the budget.
        for _ in 0..=POLICY.max_retries {
            h.client.push_failure("connection refused");
        }
        assert_eq!(h.worker.step().await, Outcome::Failed);

        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.sent, 2);
        assert_eq!(h.metrics.nonce_races(), 1);
        assert_eq!((h.account.sent(), h.account.errors()), (2, 1));
        assert_eq!(h.worker.consecutive_errors, 1);
    }

    #[tokio::test]
    async fn first_transaction_gets_larger_budget() {
        let mut h = harness(POLICY);

        for _ in 0..POLICY.first_transaction_retries {
            h.client.push_failure("tls handshake eof");
        }
        assert_eq!(h.worker.step().await, Outcome::Sent);
        assert!(!h.worker.first_transaction);

        for _ in 0..POLICY.first_transaction_retries {
            h.client.push_failure("tls handshake eof");
        }
        assert_eq!(h.worker.step().await, Outcome::Failed);
    }

    #[tokio::test]
    async fn retries_reuse_the_sequence_number() {
        let mut h = harness(POLICY);
        h.worker.step().await;
        h.client.take_submissions();

        h.client.push_failure("timeout");
        h.client.push_failure("timeout");
        assert_eq!(h.worker.step().await, Outcome::Sent);

        let raws = h.client.take_submissions();
        assert_eq!(raws.len(), 3);
        assert!(raws.iter().all(|raw| raw == &raws[0]));
        assert_eq!(h.account.current_nonce(), 2);
    }

    #[tokio::test]
    async fn success_and_race_reset_consecutive_errors() {
        let mut h = harness(POLICY);
        h.worker.step().await;

        for _ in 0..2 {
            for _ in 0..=POLICY.max_retries {
                h.client.push_failure("503");
            }
            assert_eq!(h.worker.step().await, Outcome::Failed);
        }
        assert_eq!(h.worker.consecutive_errors, 2);

        h.client.push_failure("already known");
        assert_eq!(h.worker.step().await, Outcome::NonceRace);
        assert_eq!(h.worker.consecutive_errors, 0);
    }

    #[tokio::test]
    async fn stop_abandons_in_progress_retries() {
        let mut h = harness(POLICY);
        h.worker.step().await;

        h.client.push_failure("timeout");
        h.stop.stop();

        assert_eq!(h.worker.step().await, Outcome::Abandoned);
        assert_eq!(h.metrics.snapshot().errors, 0);
        assert_eq!(h.client.submissions(), 2);
    }

    #[tracing_test::traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[ntest::timeout(5_000)]
    async fn run_exits_after_stop() {
        let h = harness(POLICY);
        h.client.set_latency(Duration::from_millis(1));

        let handle = tokio::spawn(h.worker.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.stop.stop();
        handle.await.unwrap();

        let sent = h.account.sent();
        assert!(sent > 0);
        assert_eq!(h.account.current_nonce(), sent);
        assert!(logs_contain("Worker stopped"));
    }
}
