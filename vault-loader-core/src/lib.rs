//! # vault-loader core
//!
//! Types and parsing for the project-local `.idot.json` file that tells
//! `vault-loader` which Vault paths to load.
//!
//! The file is optional and is discovered by walking up the directory tree
//! from the working directory, so a single file at the root of a repository
//! covers every subdirectory.
//!
//! ```json
//! {
//!   "secrets": {
//!     "paths": ["myapp/common", "myapp/production"],
//!     "role": "myapp_production",
//!     "engine": "kv"
//!   }
//! }
//! ```
//!
//! The legacy singular form `"path": "myapp/production"` is still accepted and
//! wins over `paths` when both are present.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Name of the project configuration file searched for on discovery.
pub const CONFIG_FILE_NAME: &str = ".idot.json";

/// The root structure of an `.idot.json` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Secret loading settings
    #[serde(default)]
    pub secrets: SecretsConfig,
}

/// The `secrets` section of the project configuration.
///
/// Every field is optional. Empty strings are treated the same as a missing
/// field so that a half-filled template does not shadow environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Single KV path, kept for backward compatibility
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Ordered list of KV paths; later paths override earlier ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,
    /// Role used for the JWT login when an identity token is present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Mount name of the KV v2 secrets engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
}

impl SecretsConfig {
    /// The paths declared by this file, trimmed and with empty entries removed.
    ///
    /// A non-empty singular `path` takes precedence over `paths`.
    pub fn paths(&self) -> Vec<String> {
        let single = self.path.as_deref().map(str::trim).filter(|p| !p.is_empty());
        match single {
            Some(path) => vec![path.to_string()],
            None => normalize_paths(self.paths.iter().flatten()),
        }
    }

    /// The configured role, if any.
    pub fn role(&self) -> Option<&str> {
        non_empty(self.role.as_deref())
    }

    /// The configured engine mount, if any.
    pub fn engine(&self) -> Option<&str> {
        non_empty(self.engine.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Trim every entry and drop the ones left empty, keeping the original order.
pub fn normalize_paths<I, S>(paths: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    paths
        .into_iter()
        .map(|p| p.as_ref().trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Split a comma-separated path list such as `"a, b ,"` into `["a", "b"]`.
pub fn split_path_list(raw: &str) -> Vec<String> {
    normalize_paths(raw.split(','))
}

impl FromStr for ProjectConfig {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s).map_err(|source| ParseError::Json { path: None, source })
    }
}

impl TryFrom<&Path> for ProjectConfig {
    type Error = ParseError;

    /// Load configuration from a file path.
    fn try_from(path: &Path) -> Result<Self, Self::Error> {
        let content = fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse_at(&content, path)
    }
}

fn parse_at(content: &str, path: &Path) -> Result<ProjectConfig, ParseError> {
    serde_json::from_str(content).map_err(|source| ParseError::Json {
        path: Some(path.to_path_buf()),
        source,
    })
}

/// A configuration file found on disk together with where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredConfig {
    /// Location of the `.idot.json` file that was loaded
    pub path: PathBuf,
    /// Its parsed contents
    pub config: ProjectConfig,
}

/// Search `start` and then each of its ancestors for [`CONFIG_FILE_NAME`].
///
/// Returns `Ok(None)` once the filesystem root has been checked without a
/// match. Only a missing file moves the search upward; any other read error
/// and malformed JSON are reported.
///
/// # Errors
///
/// Returns a [`ParseError`] if a candidate file exists but cannot be read or
/// does not contain valid JSON.
pub fn discover(start: &Path) -> Result<Option<DiscoveredConfig>, ParseError> {
    for dir in start.ancestors() {
        let candidate = dir.join(CONFIG_FILE_NAME);
        match fs::read_to_string(&candidate) {
            Ok(content) => {
                let config = parse_at(&content, &candidate)?;
                return Ok(Some(DiscoveredConfig {
                    path: candidate,
                    config,
                }));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(source) => {
                return Err(ParseError::Io {
                    path: candidate,
                    source,
                });
            }
        }
    }
    Ok(None)
}

/// Errors raised while loading a project configuration file.
#[derive(Debug)]
pub enum ParseError {
    /// The file exists but could not be read
    Io { path: PathBuf, source: io::Error },
    /// The file is not valid JSON or does not match the schema
    Json {
        path: Option<PathBuf>,
        source: serde_json::Error,
    },
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Io { path, source } => {
                write!(f, "failed to read config file {}: {}", path.display(), source)
            }
            ParseError::Json {
                path: Some(path),
                source,
            } => write!(f, "failed to parse config file {}: {}", path.display(), source),
            ParseError::Json { path: None, source } => {
                write!(f, "failed to parse config file: {}", source)
            }
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Io { source, .. } => Some(source),
            ParseError::Json { source, .. } => Some(source),
        }
    }
}
