use crate::client::ClientError;
use crate::keys::KeyError;
use crate::report::ReportError;
use crate::setup::SetupError;
use alloy_signer_local::LocalSignerError;
use thiserror::Error;
use txbench_core::ConfigError;

/// Any failure that ends a command.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Keys(#[from] KeyError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("invalid funder private key: {0}")]
    FunderKey(#[source] LocalSignerError),

    #[error("failed to install metrics exporter: {0}")]
    Exporter(String),
}
