//! Error types for vault-loader operations

use thiserror::Error;
use vault_loader_core::ParseError;
use vaultrs::error::ClientError;

/// The main error type for vault-loader operations
///
/// This enum represents every way a single load can fail. None of them are
/// retried: the first error aborts the invocation.
#[derive(Error, Debug)]
pub enum VaultLoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    ConfigFile(#[from] ParseError),
    #[error(
        "path(s) are required: provide them with --path flag, VAULT_LOADER_PATH environment variable, or in .idot.json config file"
    )]
    MissingPaths,
    #[error("failed to {method}: {message}")]
    Authentication {
        method: &'static str,
        message: String,
        #[source]
        source: Option<ClientError>,
    },
    #[error("failed to create Vault client: {0}")]
    VaultClient(String),
    #[error("failed to read secrets from path {path}: {message}")]
    SecretRead {
        path: String,
        message: String,
        #[source]
        source: Option<ClientError>,
    },
    #[error("no secrets found at path: {0}")]
    NoSecretsFound(String),
    #[error("No command specified. Usage: vault-loader run <command> [args...]")]
    EmptyCommand,
}

impl VaultLoaderError {
    /// Whether this error happened while talking to Vault, as opposed to
    /// while reading local configuration or writing output.
    ///
    /// `run --ignore-if-fail` only downgrades these.
    pub fn is_secret_loading_failure(&self) -> bool {
        matches!(
            self,
            VaultLoaderError::Authentication { .. }
                | VaultLoaderError::VaultClient(_)
                | VaultLoaderError::SecretRead { .. }
                | VaultLoaderError::NoSecretsFound(_)
        )
    }
}

/// A type alias for `Result<T, VaultLoaderError>`
pub type Result<T> = std::result::Result<T, VaultLoaderError>;
