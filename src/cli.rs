use clap::Parser;

use crate::config::Overrides;

/// yas - run JavaScript tools straight from a URL
///
/// Tool references are resolved to canonical URIs (`hello` becomes `https://oh.yas.tools/hello`),
/// fetched through a persistent HTTP cache and executed. The reserved reference `repl` starts
/// an interactive session instead.
#[derive(Parser, Debug)]
#[command(name = "yas")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run JavaScript tools straight from a URL", long_about = None)]
pub struct Cli {
    /// Overall deadline for the run (e.g., "30s", "5m")
    #[arg(long, env = "YAS_TIMEOUT")]
    pub timeout: Option<String>,

    /// Bypass the HTTP cache for this run
    #[arg(long)]
    pub no_cache: bool,

    /// Tool reference (host/path[#entry], URL, or "repl") followed by the tool's arguments
    ///
    /// Everything after the tool reference belongs to the tool, flags included.
    #[arg(
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        value_name = "TOOL [ARGS]..."
    )]
    command: Vec<String>,
}

impl Cli {
    /// Tool reference as given on the command line
    pub fn tool(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or_default()
    }

    /// Arguments passed verbatim to the tool
    pub fn args(&self) -> &[String] {
        self.command.get(1..).unwrap_or_default()
    }

    pub fn overrides(&self) -> Overrides {
        Overrides {
            timeout: self.timeout.clone(),
            no_cache: self.no_cache,
        }
    }
}
