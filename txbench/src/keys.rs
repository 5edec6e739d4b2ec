//! Private key file: `{"private_keys": ["0x..", ..]}`.
use alloy_primitives::hex;
use alloy_signer_local::{LocalSignerError, PrivateKeySigner};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to access key file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse key file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid private key at index {index}: {source}")]
    InvalidKey {
        index: usize,
        #[source]
        source: LocalSignerError,
    },

    #[error("key file {0} contains no keys")]
    Empty(PathBuf),

    #[error("key file {0} already exists")]
    Exists(PathBuf),

    #[error("number of keys to generate must be greater than zero")]
    ZeroCount,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeyStore {
    private_keys: Vec<String>,
}

pub fn load_keys(path: impl AsRef<Path>) -> Result<Vec<PrivateKeySigner>, KeyError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let store: KeyStore = serde_json::from_str(&json)?;

    if store.private_keys.is_empty() {
        return Err(KeyError::Empty(path.to_path_buf()));
    }

    let signers = store
        .private_keys
        .iter()
        .enumerate()
        .map(|(index, key)| {
            key.trim()
                .parse::<PrivateKeySigner>()
                .map_err(|source| KeyError::InvalidKey { index, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!("Loaded {} private keys from {}", signers.len(), path.display());
    Ok(signers)
}

pub fn save_keys(signers: &[PrivateKeySigner], path: impl AsRef<Path>) -> Result<(), KeyError> {
    let path = path.as_ref();
    let store = KeyStore {
        private_keys: signers
            .iter()
            .map(|signer| format!("0x{}", hex::encode(signer.to_bytes())))
            .collect(),
    };
    let json = serde_json::to_string_pretty(&store)?;
    std::fs::write(path, json).map_err(|source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Generates `count` random keys and writes them to `path`.
///
/// An existing file is only replaced when `overwrite` is set.
pub fn generate_keys(
    count: usize,
    path: impl AsRef<Path>,
    overwrite: bool,
) -> Result<Vec<PrivateKeySigner>, KeyError> {
    let path = path.as_ref();
    if count == 0 {
        return Err(KeyError::ZeroCount);
    }
    if !overwrite && path.exists() {
        return Err(KeyError::Exists(path.to_path_buf()));
    }

    let signers: Vec<_> = (0..count).map(|_| PrivateKeySigner::random()).collect();
    save_keys(&signers, path)?;
    info!("Generated {count} private keys in {}", path.display());
    Ok(signers)
}
