//! Selection of the credential source and exchange of it for a Vault token.

use crate::config::{ID_TOKEN_ENV, TOKEN_ENV};
use crate::{Environment, ResolvedConfig, Result, VaultLoaderError};
use colored::Colorize;
use serde::Deserialize;
use std::process::Command;

pub const JWT_AUTH_MOUNT: &str = "jwt";
pub const APPROLE_AUTH_MOUNT: &str = "approle";

const VAULT_CLI: &str = "vault";

/// The login calls a credential may need.
///
/// Every method returns the client token issued by Vault.
pub trait AuthBackend {
    /// Exchange an identity token through the JWT auth method.
    fn jwt_login(&self, role: &str, jwt: &str) -> Result<String>;

    /// Log in through the AppRole auth method.
    fn approle_login(&self, role_id: &str, secret_id: &str) -> Result<String>;

    /// Reuse the session of a locally logged-in `vault` CLI.
    fn session_token(&self) -> Result<String>;
}

/// Where the Vault token for this run comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// `VAULT_TOKEN`, used as is
    StaticToken(String),
    /// `VAULT_ID_TOKEN`, exchanged through a JWT login
    IdentityToken { token: String, role: String },
    /// AppRole role and secret ids
    AppRole { role_id: String, secret_id: String },
    /// The token cached by the `vault` CLI
    AmbientSession,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::StaticToken(_) => f.write_str("StaticToken(..)"),
            Credentials::IdentityToken { role, .. } => f
                .debug_struct("IdentityToken")
                .field("role", role)
                .finish_non_exhaustive(),
            Credentials::AppRole { role_id, .. } => f
                .debug_struct("AppRole")
                .field("role_id", role_id)
                .finish_non_exhaustive(),
            Credentials::AmbientSession => f.write_str("AmbientSession"),
        }
    }
}

impl Credentials {
    /// Pick the first available credential source, in priority order:
    /// static token, identity token, AppRole, CLI session.
    ///
    /// When an identity token is present but no role was configured, the role
    /// is derived from the first path and a warning is printed.
    pub fn select(config: &ResolvedConfig, env: &Environment) -> Self {
        if let Some(token) = env.get(TOKEN_ENV) {
            return Credentials::StaticToken(token.to_string());
        }

        if let Some(token) = env.get(ID_TOKEN_ENV) {
            let role = match &config.role {
                Some(role) => role.clone(),
                None => {
                    let role = config
                        .paths
                        .first()
                        .map(|path| derive_role(path))
                        .unwrap_or_default();
                    eprintln!(
                        "{} No role specified, using calculated role name: {}",
                        "!".yellow(),
                        role
                    );
                    role
                }
            };
            return Credentials::IdentityToken {
                token: token.to_string(),
                role,
            };
        }

        if let (Some(role_id), Some(secret_id)) = (&config.role_id, &config.secret_id) {
            return Credentials::AppRole {
                role_id: role_id.clone(),
                secret_id: secret_id.clone(),
            };
        }

        Credentials::AmbientSession
    }

    /// Short name of the credential source, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Credentials::StaticToken(_) => "static-token",
            Credentials::IdentityToken { .. } => "identity-token",
            Credentials::AppRole { .. } => "approle",
            Credentials::AmbientSession => "cli-session",
        }
    }

    /// Turn these credentials into a client token.
    pub fn login(&self, backend: &impl AuthBackend) -> Result<String> {
        tracing::debug!(method = self.kind(), "authenticating");
        match self {
            Credentials::StaticToken(token) => Ok(token.clone()),
            Credentials::IdentityToken { token, role } => backend.jwt_login(role, token),
            Credentials::AppRole {
                role_id,
                secret_id,
            } => backend.approle_login(role_id, secret_id),
            Credentials::AmbientSession => backend.session_token(),
        }
    }
}

/// Role name derived from a KV path: every `/` becomes `_`.
pub fn derive_role(path: &str) -> String {
    path.replace('/', "_")
}

#[derive(Debug, Deserialize)]
struct TokenLookup {
    data: TokenLookupData,
}

#[derive(Debug, Deserialize)]
struct TokenLookupData {
    id: String,
}

/// Extract the token id from `vault token lookup -format=json` output.
pub fn parse_session_lookup(output: &[u8]) -> Result<String> {
    let lookup: TokenLookup =
        serde_json::from_slice(output).map_err(|e| VaultLoaderError::Authentication {
            method: "parse vault CLI output",
            message: e.to_string(),
            source: None,
        })?;
    if lookup.data.id.is_empty() {
        return Err(VaultLoaderError::Authentication {
            method: "parse vault CLI output",
            message: "token id is empty".to_string(),
            source: None,
        });
    }
    Ok(lookup.data.id)
}

/// Ask the `vault` CLI for the token of its current session.
pub fn lookup_cli_session() -> Result<String> {
    let output = match Command::new(VAULT_CLI)
        .args(["token", "lookup", "-format=json"])
        .output()
    {
        Ok(output) => output,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(VaultLoaderError::Authentication {
                method: "get token from vault CLI",
                message: "vault CLI is not installed and no VAULT_TOKEN, VAULT_ID_TOKEN or AppRole credentials were provided".to_string(),
                source: None,
            });
        }
        Err(e) => {
            return Err(VaultLoaderError::Authentication {
                method: "get token from vault CLI",
                message: e.to_string(),
                source: None,
            });
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VaultLoaderError::Authentication {
            method: "get token from vault CLI",
            message: stderr.trim().to_string(),
            source: None,
        });
    }

    parse_session_lookup(&output.stdout)
}
