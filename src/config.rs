use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::home;

/// Host used for tool references without one
pub const DEFAULT_HOST: &str = "oh.yas.tools";

/// Environment variable overriding the default host
pub const BASE_ENV: &str = "YAS_BASE";

/// Configuration file contents (`<home>/config.toml`)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct YasConfig {
    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub runtime: RuntimeSection,
}

/// `[fetch]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchConfig {
    /// Per-request HTTP timeout
    #[serde(default = "default_fetch_timeout")]
    pub timeout: String,

    /// User-Agent header (defaults to `yas/<version>`)
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Use the persistent HTTP cache
    #[serde(default = "default_true")]
    pub cache: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: default_fetch_timeout(),
            user_agent: None,
            cache: true,
        }
    }
}

/// `[runtime]` section
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RuntimeSection {
    /// Overall deadline for a run (no deadline when absent)
    #[serde(default)]
    pub deadline: Option<String>,

    /// Host for tool references without one; `YAS_BASE` takes precedence
    #[serde(default)]
    pub default_host: Option<String>,
}

fn default_fetch_timeout() -> String {
    "30s".to_string()
}

fn default_true() -> bool {
    true
}

pub fn default_user_agent() -> String {
    format!("yas/{}", env!("CARGO_PKG_VERSION"))
}

impl YasConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: YasConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load the file if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Settings given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Overall deadline (`--timeout`)
    pub timeout: Option<String>,
    /// Bypass the HTTP cache (`--no-cache`)
    pub no_cache: bool,
}

/// Resolved settings for one runtime instance
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub default_host: String,
    pub home: PathBuf,
    pub http_timeout: Duration,
    pub deadline: Option<Duration>,
    pub cache: bool,
    pub user_agent: String,
}

impl RuntimeConfig {
    /// Layer defaults, `<home>/config.toml`, environment and command line, in that order
    pub fn resolve(env: &BTreeMap<String, String>, overrides: &Overrides) -> Result<Self> {
        let home = home::home_dir(env)?;
        let file = YasConfig::load_or_default(&home::config_path(&home))?;

        let default_host = match (env.get(BASE_ENV), &file.runtime.default_host) {
            (Some(base), _) if !base.is_empty() => {
                default_host_from(base).with_context(|| format!("Invalid {}", BASE_ENV))?
            }
            (_, Some(host)) => {
                default_host_from(host).context("Invalid runtime.default_host")?
            }
            _ => DEFAULT_HOST.to_string(),
        };

        let http_timeout = parse_duration(&file.fetch.timeout).context("Invalid fetch.timeout")?;

        let deadline = match (&overrides.timeout, &file.runtime.deadline) {
            (Some(timeout), _) => Some(parse_duration(timeout).context("Invalid --timeout")?),
            (None, Some(deadline)) => {
                Some(parse_duration(deadline).context("Invalid runtime.deadline")?)
            }
            (None, None) => None,
        };

        let config = Self {
            default_host,
            home,
            http_timeout,
            deadline,
            cache: file.fetch.cache && !overrides.no_cache,
            user_agent: file.fetch.user_agent.unwrap_or_else(default_user_agent),
        };
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.default_host.is_empty() {
            bail!("default host must not be empty");
        }

        if self.http_timeout.is_zero() {
            bail!("fetch.timeout must be greater than zero");
        }

        if self.deadline.is_some_and(|deadline| deadline.is_zero()) {
            bail!("deadline must be greater than zero");
        }

        if self.user_agent.is_empty() {
            bail!("fetch.user_agent must not be empty");
        }

        Ok(())
    }
}

/// Default host from a bare `host[:port]` or from a URL's host and port
pub fn default_host_from(value: &str) -> Result<String> {
    let value = value.trim();

    if value.contains("://") {
        let url = Url::parse(value).with_context(|| format!("Invalid URL: {}", value))?;
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| anyhow!("URL has no host: {}", value))?;
        return Ok(match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        });
    }

    let host = value.trim_end_matches('/');
    if host.is_empty() || host.contains('/') {
        bail!("Invalid host: {:?}", value);
    }

    Ok(host.to_string())
}

/// Parse duration string (e.g., "500ms", "30s", "10m", "1h", "7d")
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        bail!("Empty duration string");
    }

    if let Some(num) = s.strip_suffix("ms") {
        let num: u64 = num.trim().parse().context("Invalid duration number")?;
        return Ok(Duration::from_millis(num));
    }

    let (num_str, multiplier) = if let Some(num) = s.strip_suffix('d') {
        (num, 86400)
    } else if let Some(num) = s.strip_suffix('h') {
        (num, 3600)
    } else if let Some(num) = s.strip_suffix('m') {
        (num, 60)
    } else if let Some(num) = s.strip_suffix('s') {
        (num, 1)
    } else {
        bail!("Invalid duration: {}. Use: ms, s, m, h, d", s);
    };

    let num: u64 = num_str.trim().parse().context("Invalid duration number")?;
    let seconds = num
        .checked_mul(multiplier)
        .ok_or_else(|| anyhow!("Duration too large: {}", s))?;

    Ok(Duration::from_secs(seconds))
}
