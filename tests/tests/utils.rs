use alloy_signer_local::PrivateKeySigner;
use mock_node::{MockNode, MockNodeConfig};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use tempfile::TempDir;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use txbench_core::BenchConfig;

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let _ = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::new("txbench=debug,mock_node=debug"))
            .with_test_writer()
            .try_init();
    });
}

/// A mock node serving on an ephemeral port.
#[allow(unused)]
pub struct Node {
    pub node: MockNode,
    pub url: String,
}

#[allow(unused)]
pub async fn start_node(config: MockNodeConfig) -> Node {
    let node = MockNode::new(config);
    let (addr, _handle) = node.clone().spawn().await.unwrap();
    Node {
        node,
        url: format!("http://{addr}"),
    }
}

/// Writes `count` fresh keys to a temporary key file.
#[allow(unused)]
pub fn key_file(count: usize) -> (TempDir, PathBuf, Vec<PrivateKeySigner>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test_keys.json");
    let signers: Vec<_> = (0..count).map(|_| PrivateKeySigner::random()).collect();
    txbench::keys::save_keys(&signers, &path).unwrap();
    (dir, path, signers)
}

#[allow(unused)]
pub fn bench_config(url: &str, keys: PathBuf, accounts: usize, duration: Duration) -> BenchConfig {
    BenchConfig {
        rpc_endpoint: url.to_string(),
        account_count: accounts,
        duration,
        report_interval: Duration::from_millis(200),
        start_delay: Duration::ZERO,
        private_keys_file: keys,
        ..Default::default()
    }
}
