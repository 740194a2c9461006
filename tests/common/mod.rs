// Common test utilities shared across acceptance tests
//
// ## Test Isolation Strategy
//
// Every test gets its own temporary YAS_HOME, so the RocksDB cache, the optional
// config.toml and any script fixtures live in a directory that is deleted when the
// TestHome is dropped. Nothing touches ~/.yas.tools and no process-wide environment
// variables are modified; the environment is handed to the runtime (or the child
// process) explicitly.

#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use url::Url;
use yas::config::Overrides;
use yas::RuntimeEnvironment;

/// Isolated home directory plus a scratch directory for scripts
pub struct TestHome {
    temp_dir: TempDir,
    home: PathBuf,
    scripts: PathBuf,
}

impl TestHome {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let home = temp_dir.path().join("home");
        let scripts = temp_dir.path().join("scripts");
        fs::create_dir_all(&scripts).unwrap();

        Self {
            temp_dir,
            home,
            scripts,
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn scripts(&self) -> &Path {
        &self.scripts
    }

    /// Write a script below the scripts directory and return its `file://` URL
    pub fn write_script(&self, name: &str, source: &str) -> Url {
        let path = self.scripts.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, source).unwrap();
        Url::from_file_path(path).unwrap()
    }

    /// Environment for an in-process runtime
    pub fn env(&self) -> Vec<(String, String)> {
        vec![("YAS_HOME".to_string(), self.home.display().to_string())]
    }

    /// In-process runtime for `tool_ref`
    pub fn runtime(&self, tool_ref: &str, args: &[&str]) -> RuntimeEnvironment {
        RuntimeEnvironment::new(
            tool_ref,
            args.iter().map(|arg| arg.to_string()).collect(),
            self.env(),
            &Overrides::default(),
        )
        .unwrap()
    }

    /// The `yas` binary with this home and no inherited yas settings
    pub fn yas(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_yas"));
        cmd.env("YAS_HOME", &self.home)
            .env_remove("YAS_BASE")
            .env_remove("YAS_TIMEOUT")
            .env_remove("RUST_LOG");
        cmd
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}

/// Run a blocking closure off the async test runtime
///
/// The blocking HTTP client must not be created or dropped on a runtime worker thread.
pub async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.unwrap()
}
