//! Load secrets from HashiCorp Vault into a process environment.
//!
//! A run resolves its configuration ([`ResolvedConfig`]), picks a credential
//! source ([`Credentials`]), reads every configured KV path into one
//! [`SecretMap`] and hands that map to one of the output sinks in [`output`].

use colored::Colorize;
use std::io::Write;
use std::path::Path;

pub mod auth;
pub mod config;
mod error;
pub mod output;
pub mod store;

pub use auth::{AuthBackend, Credentials};
pub use config::{CliOverrides, Environment, ResolvedConfig};
pub use error::{Result, VaultLoaderError};
pub use output::DotenvStyle;
pub use store::{KvStore, SecretMap, VaultSettings, VaultStore, fetch_secrets};

/// One configured invocation of the loader.
#[derive(Debug, Clone)]
pub struct VaultLoader {
    config: ResolvedConfig,
    env: Environment,
}

impl VaultLoader {
    pub fn new(config: ResolvedConfig, env: Environment) -> Self {
        Self { config, env }
    }

    /// Resolve the configuration from `overrides`, the project file found from
    /// the working directory, and the process environment.
    pub fn load(overrides: &CliOverrides) -> Result<Self> {
        let env = Environment::from_process();
        let config = ResolvedConfig::load(overrides, &env)?;
        Ok(Self::new(config, env))
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Authenticate against `store` and read every configured path from it.
    pub fn load_secrets<S>(&self, store: &mut S) -> Result<SecretMap>
    where
        S: AuthBackend + KvStore,
    {
        let credentials = Credentials::select(&self.config, &self.env);
        let token = credentials.login(&*store)?;
        store.authorize(&token)?;
        fetch_secrets(&*store, &self.config.engine, &self.config.paths)
    }

    /// Read the configured secrets from the Vault server named by `VAULT_ADDR`.
    pub fn secrets(&self) -> Result<SecretMap> {
        let mut store = VaultStore::connect(VaultSettings::from_env(&self.env)?)?;
        self.load_secrets(&mut store)
    }

    /// Print `export` statements for every secret.
    pub fn export(&self, out: impl Write) -> Result<()> {
        let secrets = self.secrets()?;
        output::write_exports(&secrets, out)
    }

    /// Write every secret to the dotenv file at `path`.
    pub fn write_env(&self, path: &Path, style: DotenvStyle) -> Result<()> {
        let secrets = self.secrets()?;
        output::write_dotenv(path, &secrets, style)
    }

    /// Run `command` with the secrets in its environment and return its exit code.
    ///
    /// With `ignore_if_fail`, a failure to authenticate or read secrets is
    /// reported as a warning and the command runs without them.
    pub fn run(&self, command: &[String], ignore_if_fail: bool) -> Result<i32> {
        if command.is_empty() {
            return Err(VaultLoaderError::EmptyCommand);
        }
        let secrets = secrets_or_skip(self.secrets(), ignore_if_fail)?;
        output::run_command(command, &secrets)
    }
}

/// Downgrade a secret loading failure to an empty map when `ignore_if_fail`
/// is set. Configuration and output errors are always returned.
pub fn secrets_or_skip(result: Result<SecretMap>, ignore_if_fail: bool) -> Result<SecretMap> {
    match result {
        Ok(secrets) => Ok(secrets),
        Err(e) if ignore_if_fail && e.is_secret_loading_failure() => {
            tracing::debug!(error = %e, "ignoring secret loading failure");
            eprintln!(
                "{} skipped secret loading from hc-vault: {}",
                "!".yellow(),
                e
            );
            Ok(SecretMap::new())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ID_TOKEN_ENV, TOKEN_ENV};
    use crate::store::SecretData;
    use serde_json::json;
    use std::collections::HashMap;

    /// Fake Vault that accepts one JWT role and serves fixed paths.
    struct FakeVault {
        data: HashMap<String, SecretData>,
        token: Option<String>,
    }

    impl FakeVault {
        fn new(entries: &[(&str, serde_json::Value)]) -> Self {
            Self {
                data: entries
                    .iter()
                    .map(|(path, value)| {
                        (path.to_string(), serde_json::from_value(value.clone()).unwrap())
                    })
                    .collect(),
                token: None,
            }
        }
    }

    impl AuthBackend for FakeVault {
        fn jwt_login(&self, role: &str, _jwt: &str) -> Result<String> {
            if role == "team_app" {
                Ok("hvs.from-jwt".to_string())
            } else {
                Err(VaultLoaderError::Authentication {
                    method: "resolve ID token",
                    message: format!("role \"{}\" could not be found", role),
                    source: None,
                })
            }
        }

        fn approle_login(&self, _role_id: &str, _secret_id: &str) -> Result<String> {
            Err(VaultLoaderError::Authentication {
                method: "authenticate with AppRole",
                message: "invalid role or secret ID".to_string(),
                source: None,
            })
        }

        fn session_token(&self) -> Result<String> {
            Ok("hvs.session".to_string())
        }
    }

    impl KvStore for FakeVault {
        fn authorize(&mut self, token: &str) -> Result<()> {
            self.token = Some(token.to_string());
            Ok(())
        }

        fn read(&self, engine: &str, path: &str) -> Result<Option<SecretData>> {
            assert!(self.token.is_some(), "read before authorize");
            assert_eq!(engine, "kv");
            Ok(self.data.get(path).cloned())
        }
    }

    fn loader(paths: &[&str], env: &[(&str, &str)]) -> VaultLoader {
        let env: Environment = env.iter().copied().collect();
        let overrides = CliOverrides {
            paths: paths.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        };
        let config = ResolvedConfig::resolve(&overrides, None, &env).unwrap();
        VaultLoader::new(config, env)
    }

    #[test]
    fn test_load_secrets_with_derived_jwt_role() {
        let mut vault = FakeVault::new(&[
            ("team/app", json!({"db_user": "app", "port": 5432})),
            ("team/app/prod", json!({"db_user": "prod"})),
        ]);
        let loader = loader(&["team/app", "team/app/prod"], &[(ID_TOKEN_ENV, "eyJ")]);

        let secrets = loader.load_secrets(&mut vault).unwrap();
        assert_eq!(vault.token.as_deref(), Some("hvs.from-jwt"));
        assert_eq!(secrets.get("DB_USER").unwrap(), "prod");
        assert_eq!(secrets.get("PORT").unwrap(), "5432");
    }

    #[test]
    fn test_load_secrets_uses_static_token() {
        let mut vault = FakeVault::new(&[("a", json!({"k": "v"}))]);
        let loader = loader(&["a"], &[(TOKEN_ENV, "s.static")]);
        loader.load_secrets(&mut vault).unwrap();
        assert_eq!(vault.token.as_deref(), Some("s.static"));
    }

    #[test]
    fn test_load_secrets_stops_on_login_failure() {
        let mut vault = FakeVault::new(&[("a", json!({"k": "v"}))]);
        let loader = loader(&["a"], &[("VAULT_ROLE_ID", "r"), ("VAULT_SECRET_ID", "s")]);
        let err = loader.load_secrets(&mut vault).unwrap_err();
        assert!(err.is_secret_loading_failure());
        assert!(vault.token.is_none());
    }

    #[test]
    fn test_secrets_or_skip() {
        let failure = || -> Result<SecretMap> {
            Err(VaultLoaderError::NoSecretsFound("a".to_string()))
        };
        assert!(secrets_or_skip(failure(), true).unwrap().is_empty());
        assert!(secrets_or_skip(failure(), false).is_err());

        let config_error = secrets_or_skip(Err(VaultLoaderError::MissingPaths), true);
        assert!(matches!(config_error, Err(VaultLoaderError::MissingPaths)));

        let mut secrets = SecretMap::new();
        secrets.insert("A".to_string(), "1".to_string());
        assert_eq!(secrets_or_skip(Ok(secrets.clone()), true).unwrap(), secrets);
    }

    #[test]
    fn test_run_rejects_empty_command() {
        let loader = loader(&["a"], &[]);
        assert!(matches!(
            loader.run(&[], true),
            Err(VaultLoaderError::EmptyCommand)
        ));
    }
}
