#![allow(dead_code)]

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use vault_loader_core::CONFIG_FILE_NAME;

/// Address nothing listens on, so every Vault call fails fast.
pub const UNREACHABLE_VAULT: &str = "http://127.0.0.1:1";

/// Test helper for running the binary inside a temporary project directory
pub struct TestFixture {
    _temp_dir: TempDir,
    pub base_path: PathBuf,
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let base_path = temp_dir.path().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            base_path,
        }
    }

    /// Write an `.idot.json` into `dir` (relative to the fixture root),
    /// creating the directory if needed.
    pub fn write_config(&self, dir: &str, content: &str) -> PathBuf {
        let dir = self.base_path.join(dir);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE_NAME);
        fs::write(&path, content).unwrap();
        path
    }

    /// Create a subdirectory of the fixture root.
    pub fn mkdir(&self, dir: &str) -> PathBuf {
        let dir = self.base_path.join(dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Install an executable `vault` shell script into `bin/` under the
    /// fixture root and return that directory.
    #[cfg(unix)]
    pub fn install_vault_cli(&self, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let bin = self.mkdir("bin");
        let script = bin.join("vault");
        fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        bin
    }

    /// The inherited `PATH` with `dir` searched first.
    pub fn path_with(&self, dir: &Path) -> OsString {
        let inherited = std::env::var_os("PATH").unwrap_or_default();
        let dirs = std::iter::once(dir.to_path_buf()).chain(std::env::split_paths(&inherited));
        std::env::join_paths(dirs).unwrap()
    }

    /// The vault-loader binary with a clean environment, run from the
    /// fixture root and pointed at an unreachable Vault.
    pub fn command(&self) -> Command {
        self.command_in(&self.base_path)
    }

    pub fn command_in(&self, dir: &Path) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_vault-loader"));
        cmd.env_clear()
            .env("PATH", std::env::var_os("PATH").unwrap_or_default())
            .env("VAULT_ADDR", UNREACHABLE_VAULT)
            .current_dir(dir);
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
