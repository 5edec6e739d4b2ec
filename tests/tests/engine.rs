mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;

    use alloy_primitives::U256;
    use mock_node::MockNodeConfig;
    use std::num::NonZeroU64;
    use std::sync::Arc;
    use std::time::Duration;
    use txbench::check::{check_nonces, NonceStatus};
    use txbench::fund::FundingStatus;
    use txbench::prelude::*;
    use txbench::setup::SetupError;

    async fn prepare(config: &BenchConfig) -> (Arc<JsonRpcClient>, Vec<Arc<AccountSender>>) {
        let client = JsonRpcClient::new(&config.rpc_endpoint, 16).unwrap();
        let signers = select_signers(
            load_keys(&config.private_keys_file).unwrap(),
            config.account_count,
        );
        let accounts = initialize_accounts(&client, signers).await.unwrap();
        (Arc::new(client), accounts)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn sustained_run_uses_contiguous_nonces() {
        init();
        let node = start_node(MockNodeConfig {
            latency: Duration::from_millis(1),
            ..Default::default()
        })
        .await;
        let (_dir, keys, _) = key_file(4);
        let mut config = bench_config(&node.url, keys, 3, Duration::from_secs(1));
        config.concurrency_per_account = 2;

        let (client, accounts) = prepare(&config).await;
        assert_eq!(accounts.len(), 3);
        check_balances(&accounts, parse_wei(&config.min_balance).unwrap()).unwrap();

        let benchmark = Benchmark::new(config, client.clone(), accounts.clone())
            .await
            .unwrap();
        let report = benchmark.run().await;

        assert!(report.total_submitted > 0);
        assert_eq!(report.total_errors, 0);
        assert_eq!(report.rpc_accept_rate, 100.0);
        assert!(!report.submitted_tps_history.is_empty());
        assert!(report.peak_submitted_tps >= report.median_submitted_tps);
        assert!(report.median_submitted_tps >= report.min_submitted_tps);
        assert!(report.latency_p50_ms > 0.);
        assert_eq!(report.account_statistics.len(), 3);
        let per_account: u64 = report.account_statistics.iter().map(|a| a.sent).sum();
        assert_eq!(per_account, report.total_submitted);

        // Submissions completing after the freeze are accepted by the node but
        // left out of the report.
        let stats = node.node.stats();
        assert!(stats.accepted >= report.total_submitted);

        // Every sequence number that was handed out reached the node, in an
        // order the node could execute without gaps.
        for account in &accounts {
            assert_eq!(node.node.next_nonce(account.address()), account.current_nonce());
            assert_eq!(node.node.queued(account.address()), 0);
        }

        let nonces = check_nonces(client.as_ref(), &accounts).await;
        assert_eq!(nonces.rows.len(), 3);
        assert!(nonces.all_synced());
        assert!(nonces.rows.iter().all(|row| row.status == NonceStatus::Synced));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn transient_failures_are_retried() {
        init();
        let node = start_node(MockNodeConfig {
            fail_every: NonZeroU64::new(10),
            ..Default::default()
        })
        .await;
        let (_dir, keys, _) = key_file(2);
        let mut config = bench_config(&node.url, keys, 2, Duration::from_millis(500));
        config.max_retries = 8;

        let (client, accounts) = prepare(&config).await;
        let benchmark = Benchmark::new(config, client, accounts.clone())
            .await
            .unwrap();
        let report = benchmark.run().await;

        assert!(node.node.stats().transient > 0);
        assert!(report.total_submitted > 0);
        assert_eq!(report.total_errors, 0);
        for account in &accounts {
            assert_eq!(node.node.next_nonce(account.address()), account.current_nonce());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[ntest::timeout(30_000)]
    async fn exhausted_failures_are_counted() {
        init();
        let node = start_node(MockNodeConfig {
            fail_every: NonZeroU64::new(1),
            ..Default::default()
        })
        .await;
        let (_dir, keys, _) = key_file(1);
        let config = bench_config(&node.url, keys, 1, Duration::from_millis(400));

        let (client, accounts) = prepare(&config).await;
        let benchmark = Benchmark::new(config, client, accounts).await.unwrap();
        let report = benchmark.run().await;

        assert_eq!(report.total_submitted, 0);
        assert!(report.total_errors > 0);
        assert_eq!(report.rpc_accept_rate, 0.0);
        assert_eq!(report.average_submitted_tps, 0.0);
        assert!(report.submitted_tps_history.iter().all(|&tps| tps == 0));
        assert_eq!(report.account_statistics[0].success_rate, 0.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[ntest::timeout(30_000)]
    async fn stale_nonces_are_races_not_errors() {
        init();
        let node = start_node(MockNodeConfig::default()).await;
        let (_dir, keys, _) = key_file(1);
        let config = bench_config(&node.url, keys, 1, Duration::from_millis(400));

        let (client, accounts) = prepare(&config).await;
        // Three transactions land out of band after setup.
        node.node.set_next_nonce(accounts[0].address(), 3);

        let account = accounts[0].clone();
        let benchmark = Benchmark::new(config, client, accounts).await.unwrap();
        let metrics = benchmark.metrics().clone();
        let report = benchmark.run().await;

        assert_eq!(report.total_errors, 0);
        assert!(report.total_submitted > 0);
        assert_eq!(metrics.nonce_races(), 3);
        assert_eq!(node.node.next_nonce(account.address()), account.current_nonce());
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn underfunded_accounts_abort_setup() {
        init();
        let node = start_node(MockNodeConfig::default()).await;
        let (_dir, keys, signers) = key_file(3);
        node.node.set_balance(signers[0].address(), U256::from(1u64));
        node.node.set_balance(signers[2].address(), U256::ZERO);
        let config = bench_config(&node.url, keys, 3, Duration::from_secs(1));

        let (_client, accounts) = prepare(&config).await;
        let err = check_balances(&accounts, parse_wei(&config.min_balance).unwrap()).unwrap_err();
        assert!(matches!(err, SetupError::InsufficientBalance { count: 2, .. }));
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn unreachable_endpoint_fails_setup() {
        init();
        let (_dir, keys, _) = key_file(1);
        // Nothing listens on the discard port.
        let config = bench_config("http://127.0.0.1:9", keys, 1, Duration::from_secs(1));

        let client = JsonRpcClient::new(&config.rpc_endpoint, 1).unwrap();
        let signers = load_keys(&config.private_keys_file).unwrap();
        let err = initialize_accounts(&client, signers).await.unwrap_err();
        assert!(matches!(err, SetupError::ChainId(_)));
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn report_is_written_to_disk() {
        init();
        let node = start_node(MockNodeConfig::default()).await;
        let (dir, keys, _) = key_file(1);
        let mut config = bench_config(&node.url, keys, 1, Duration::from_millis(300));
        config.output_destination = dir.path().join("results.json");
        let output = config.output_destination.clone();

        let (client, accounts) = prepare(&config).await;
        let benchmark = Benchmark::new(config, client, accounts).await.unwrap();
        let report = benchmark.run().await;
        save_report(&report, &output).unwrap();

        let saved: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(saved.total_submitted, report.total_submitted);
        assert_eq!(saved.config.rpc_endpoint, node.url);
        assert_eq!(saved.config.gas_price_wei, "1000000000");
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn funder_pays_every_account() {
        init();
        let node = start_node(MockNodeConfig::default()).await;
        let (_dir, keys, _) = key_file(3);
        let config = bench_config(&node.url, keys, 0, Duration::from_secs(1));
        let funder_signer = alloy_signer_local::PrivateKeySigner::random();

        let client = JsonRpcClient::new(&config.rpc_endpoint, 1).unwrap();
        let recipients: Vec<_> = load_keys(&config.private_keys_file)
            .unwrap()
            .iter()
            .map(|signer| signer.address())
            .collect();
        let funder = initialize_accounts(&client, vec![funder_signer])
            .await
            .unwrap()
            .remove(0);

        let report = fund_accounts(
            &client,
            &funder,
            &recipients,
            U256::from(10u64).pow(U256::from(15u64)),
            config.gas_limit,
        )
        .await
        .unwrap();

        assert_eq!(report.funded(), 3);
        assert!(report
            .rows
            .iter()
            .all(|row| matches!(row.status, FundingStatus::Funded(_))));
        assert_eq!(node.node.next_nonce(funder.address()), 3);
        assert_eq!(funder.current_nonce(), 3);
        assert_eq!(node.node.stats().accepted, 3);
    }
}
