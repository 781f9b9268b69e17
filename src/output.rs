//! The three ways secrets leave the process: shell exports, a dotenv file,
//! or the environment of a child command.

use crate::store::SecretMap;
use crate::{Result, VaultLoaderError};
use std::fs::{self, OpenOptions};
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;
use std::process::Command;

/// File written by `vault-loader env`.
pub const DOTENV_FILE: &str = ".env";

/// How values are written to a dotenv file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DotenvStyle {
    /// `KEY="value"` with quotes, backslashes and newlines escaped
    #[default]
    Quoted,
    /// `KEY=value`, written verbatim
    Unquoted,
}

/// Escape a value for use inside single quotes in a POSIX shell.
///
/// Newlines, carriage returns and tabs become the two-character sequences
/// `\n`, `\r` and `\t` so every export stays on one line.
pub fn escape_single_quoted(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\'' => escaped.push_str("'\\''"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Escape a value for use inside double quotes in a dotenv file.
pub fn escape_double_quoted(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Write one `export KEY='value'` line per secret.
pub fn write_exports(secrets: &SecretMap, mut out: impl Write) -> Result<()> {
    for (key, value) in secrets {
        writeln!(out, "export {}='{}'", key, escape_single_quoted(value))?;
    }
    out.flush()?;
    Ok(())
}

/// Render the contents of a dotenv file.
pub fn render_dotenv(secrets: &SecretMap, style: DotenvStyle) -> String {
    let mut content = String::new();
    for (key, value) in secrets {
        match style {
            DotenvStyle::Quoted => {
                content.push_str(&format!("{}=\"{}\"\n", key, escape_double_quoted(value)))
            }
            DotenvStyle::Unquoted => content.push_str(&format!("{}={}\n", key, value)),
        }
    }
    content
}

/// Create or truncate the dotenv file at `path` and fill it with `secrets`.
///
/// On Unix the file is readable by its owner only before any secret is
/// written to it, including when it already existed with wider permissions.
pub fn write_dotenv(path: &Path, secrets: &SecretMap, style: DotenvStyle) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path)?;

    #[cfg(unix)]
    file.set_permissions(fs::Permissions::from_mode(0o600))?;

    file.write_all(render_dotenv(secrets, style).as_bytes())?;
    Ok(())
}

/// Run `command` with the current environment plus `secrets`, wait for it,
/// and return its exit code.
///
/// The child shares this process's stdin, stdout and stderr. Secrets shadow
/// inherited variables of the same name. A child killed by a signal reports 1.
pub fn run_command(command: &[String], secrets: &SecretMap) -> Result<i32> {
    let (program, args) = command.split_first().ok_or(VaultLoaderError::EmptyCommand)?;

    tracing::debug!(program = %program, secrets = secrets.len(), "running command");
    let status = Command::new(program).args(args).envs(secrets).status()?;
    Ok(status.code().unwrap_or(1))
}
