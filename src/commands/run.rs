/// `yas <tool>` command implementation
///
/// Resolves the tool reference, fetches the script (and everything it loads) and executes it.
use anyhow::Result;

use crate::cli::Cli;
use crate::runtime::RuntimeEnvironment;

pub fn run(runtime: &RuntimeEnvironment, cli: &Cli) -> Result<()> {
    tracing::debug!(tool = %cli.tool(), args = cli.args().len(), "run");
    runtime.run()
}
