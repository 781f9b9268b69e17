//! HashiCorp Vault backed store and login calls.

use super::{KvStore, SecretData};
use crate::auth::{self, APPROLE_AUTH_MOUNT, AuthBackend, JWT_AUTH_MOUNT};
use crate::config::ADDR_ENV;
use crate::{Environment, Result, VaultLoaderError};
use tokio::runtime::Runtime;
use url::Url;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;

/// Address used when `VAULT_ADDR` is not set.
pub const DEFAULT_ADDRESS: &str = "http://127.0.0.1:8200";

/// Connection settings for the Vault server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultSettings {
    pub address: String,
}

impl VaultSettings {
    /// Read the server address from `VAULT_ADDR`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultLoaderError::VaultClient`] if the address is not a valid URL.
    pub fn from_env(env: &Environment) -> Result<Self> {
        let address = env.get(ADDR_ENV).unwrap_or(DEFAULT_ADDRESS);
        Url::parse(address).map_err(|e| {
            VaultLoaderError::VaultClient(format!("invalid {} '{}': {}", ADDR_ENV, address, e))
        })?;
        Ok(Self {
            address: address.to_string(),
        })
    }
}

/// Blocking facade over the async Vault client.
///
/// Requests are driven one at a time on a current-thread runtime owned by
/// the store.
pub struct VaultStore {
    runtime: Runtime,
    settings: VaultSettings,
    client: VaultClient,
}

impl std::fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultStore")
            .field("address", &self.settings.address)
            .finish_non_exhaustive()
    }
}

impl VaultStore {
    /// Create an unauthenticated store for the given server.
    pub fn connect(settings: VaultSettings) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| VaultLoaderError::VaultClient(format!("failed to start runtime: {e}")))?;
        let client = build_client(&runtime, &settings, "")?;
        Ok(Self {
            runtime,
            settings,
            client,
        })
    }
}

fn build_client(runtime: &Runtime, settings: &VaultSettings, token: &str) -> Result<VaultClient> {
    let _guard = runtime.enter();
    let client_settings = VaultClientSettingsBuilder::default()
        .address(&settings.address)
        .token(token)
        .build()
        .map_err(|e| VaultLoaderError::VaultClient(e.to_string()))?;
    VaultClient::new(client_settings).map_err(|e| VaultLoaderError::VaultClient(e.to_string()))
}

/// One-line summary of a client error, with the server's own error list
/// when Vault sent one.
fn describe(error: &ClientError) -> String {
    match error {
        ClientError::APIError { errors, .. } if !errors.is_empty() => {
            format!("{}: {}", error, errors.join("; "))
        }
        _ => error.to_string(),
    }
}

impl AuthBackend for VaultStore {
    fn jwt_login(&self, role: &str, jwt: &str) -> Result<String> {
        let auth = self
            .runtime
            .block_on(vaultrs::auth::oidc::login(
                &self.client,
                JWT_AUTH_MOUNT,
                jwt,
                Some(role.to_string()),
            ))
            .map_err(|e| VaultLoaderError::Authentication {
                method: "resolve ID token",
                message: describe(&e),
                source: Some(e),
            })?;
        Ok(auth.client_token)
    }

    fn approle_login(&self, role_id: &str, secret_id: &str) -> Result<String> {
        let auth = self
            .runtime
            .block_on(vaultrs::auth::approle::login(
                &self.client,
                APPROLE_AUTH_MOUNT,
                role_id,
                secret_id,
            ))
            .map_err(|e| VaultLoaderError::Authentication {
                method: "authenticate with AppRole",
                message: describe(&e),
                source: Some(e),
            })?;
        Ok(auth.client_token)
    }

    fn session_token(&self) -> Result<String> {
        auth::lookup_cli_session()
    }
}

impl KvStore for VaultStore {
    fn authorize(&mut self, token: &str) -> Result<()> {
        self.client = build_client(&self.runtime, &self.settings, token)?;
        Ok(())
    }

    fn read(&self, engine: &str, path: &str) -> Result<Option<SecretData>> {
        self.runtime
            .block_on(vaultrs::kv2::read::<Option<SecretData>>(
                &self.client,
                engine,
                path,
            ))
            .map_err(|e| VaultLoaderError::SecretRead {
                path: path.to_string(),
                message: describe(&e),
                source: Some(e),
            })
    }
}
