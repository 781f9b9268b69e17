//! Resolution of the effective configuration from flags, the project file
//! and environment variables.
//!
//! Every field is looked up in the same order: an explicit CLI flag, then
//! `.idot.json`, then the environment, then the built-in default (only the
//! engine has one).

use crate::{Result, VaultLoaderError};
use std::collections::HashMap;
use std::env;
use std::path::Path;
use vault_loader_core::{SecretsConfig, normalize_paths, split_path_list};

pub const PATH_ENV: &str = "VAULT_LOADER_PATH";
pub const ROLE_ENV: &str = "VAULT_LOADER_ROLE";
pub const ENGINE_ENV: &str = "VAULT_LOADER_ENGINE";
pub const TOKEN_ENV: &str = "VAULT_TOKEN";
pub const ID_TOKEN_ENV: &str = "VAULT_ID_TOKEN";
pub const ROLE_ID_ENV: &str = "VAULT_ROLE_ID";
pub const SECRET_ID_ENV: &str = "VAULT_SECRET_ID";
pub const ADDR_ENV: &str = "VAULT_ADDR";

/// Mount name used when no engine is configured anywhere.
pub const DEFAULT_ENGINE: &str = "kv";

/// An immutable snapshot of environment variables.
///
/// Empty values are treated as unset, matching how shells usually clear a
/// variable with `FOO=`.
#[derive(Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.vars.keys().collect();
        keys.sort();
        f.debug_struct("Environment").field("keys", &keys).finish()
    }
}

impl Environment {
    /// Capture the current process environment. Variables that are not valid
    /// UTF-8 are skipped.
    pub fn from_process() -> Self {
        env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect()
    }

    /// Look up a variable, returning `None` if it is missing or empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

impl<K, V> FromIterator<(K, V)> for Environment
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Values given explicitly on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub paths: Vec<String>,
    pub role: Option<String>,
    pub engine: Option<String>,
    pub role_id: Option<String>,
    pub secret_id: Option<String>,
}

/// The effective configuration for one invocation.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// KV paths in load order, never empty
    pub paths: Vec<String>,
    pub role: Option<String>,
    pub engine: String,
    pub role_id: Option<String>,
    pub secret_id: Option<String>,
}

impl std::fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("paths", &self.paths)
            .field("role", &self.role)
            .field("engine", &self.engine)
            .field("role_id", &self.role_id)
            .field("secret_id", &self.secret_id.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ResolvedConfig {
    /// Resolve the configuration, discovering `.idot.json` from the current
    /// working directory upward.
    pub fn load(overrides: &CliOverrides, env: &Environment) -> Result<Self> {
        let cwd = env::current_dir()?;
        Self::load_from(&cwd, overrides, env)
    }

    /// Like [`ResolvedConfig::load`] but starts the config file search at `start`.
    pub fn load_from(start: &Path, overrides: &CliOverrides, env: &Environment) -> Result<Self> {
        let discovered = vault_loader_core::discover(start)?;
        if let Some(found) = &discovered {
            tracing::debug!(path = %found.path.display(), "using project config file");
        }
        Self::resolve(
            overrides,
            discovered.as_ref().map(|found| &found.config.secrets),
            env,
        )
    }

    /// Merge the three sources with flag > file > environment precedence.
    ///
    /// # Errors
    ///
    /// Returns [`VaultLoaderError::MissingPaths`] when no source yields a path.
    pub fn resolve(
        overrides: &CliOverrides,
        file: Option<&SecretsConfig>,
        env: &Environment,
    ) -> Result<Self> {
        let mut paths = normalize_paths(overrides.paths.iter().flat_map(|p| p.split(',')));
        if paths.is_empty() {
            paths = file.map(SecretsConfig::paths).unwrap_or_default();
        }
        if paths.is_empty() {
            paths = env.get(PATH_ENV).map(split_path_list).unwrap_or_default();
        }
        if paths.is_empty() {
            return Err(VaultLoaderError::MissingPaths);
        }

        let role = flag(&overrides.role)
            .or_else(|| file.and_then(SecretsConfig::role))
            .or_else(|| env.get(ROLE_ENV))
            .map(str::to_string);

        let engine = flag(&overrides.engine)
            .or_else(|| file.and_then(SecretsConfig::engine))
            .or_else(|| env.get(ENGINE_ENV))
            .unwrap_or(DEFAULT_ENGINE)
            .to_string();

        let role_id = flag(&overrides.role_id)
            .or_else(|| env.get(ROLE_ID_ENV))
            .map(str::to_string);
        let secret_id = flag(&overrides.secret_id)
            .or_else(|| env.get(SECRET_ID_ENV))
            .map(str::to_string);

        Ok(Self {
            paths,
            role,
            engine,
            role_id,
            secret_id,
        })
    }
}

fn flag(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
