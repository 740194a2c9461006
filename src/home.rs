//! Home directory for yas
//!
//! Everything yas persists lives under one directory:
//! - `$YAS_HOME` when set and non-empty
//! - otherwise `~/.yas.tools`
//!
//! Layout:
//! - `config.toml` - optional configuration file
//! - `db/` - RocksDB holding the HTTP cache

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable overriding the home directory
pub const HOME_ENV: &str = "YAS_HOME";

/// Directory name under the user's home
pub const HOME_DIRNAME: &str = ".yas.tools";

pub const CONFIG_FILENAME: &str = "config.toml";

pub const DB_DIRNAME: &str = "db";

/// Resolve the home directory from the given environment mapping
///
/// Fails when `YAS_HOME` is unset and the user's home directory cannot be determined.
///
/// # Example
/// ```
/// let env = [("YAS_HOME".to_string(), "/tmp/yas".to_string())].into_iter().collect();
/// assert_eq!(yas::home::home_dir(&env).unwrap(), std::path::PathBuf::from("/tmp/yas"));
/// ```
pub fn home_dir(env: &BTreeMap<String, String>) -> Result<PathBuf> {
    match env.get(HOME_ENV) {
        Some(home) if !home.is_empty() => Ok(PathBuf::from(home)),
        _ => user_home_dir(dirs::home_dir()),
    }
}

fn user_home_dir(user_home: Option<PathBuf>) -> Result<PathBuf> {
    user_home
        .map(|home| home.join(HOME_DIRNAME))
        .with_context(|| format!("failed to determine home directory (set {})", HOME_ENV))
}

pub fn config_path(home: &Path) -> PathBuf {
    home.join(CONFIG_FILENAME)
}

/// Location of the HTTP cache database
pub fn db_path(home: &Path) -> PathBuf {
    home.join(DB_DIRNAME)
}
