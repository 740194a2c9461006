use clap::Parser;
use std::process::ExitCode;

use yas::cli::Cli;
use yas::cli_utils::error_line;
use yas::commands;
use yas::logging;
use yas::runtime::RuntimeEnvironment;

fn main() -> ExitCode {
    // Initialize structured logging
    logging::init();

    // Parse CLI arguments
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", error_line(&err));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let runtime = RuntimeEnvironment::new(
        cli.tool(),
        cli.args().to_vec(),
        process_env(),
        &cli.overrides(),
    )?;

    // Dispatch to the command handler
    let result = if runtime.is_repl() {
        commands::repl::run(&runtime)
    } else {
        commands::run::run(&runtime, cli)
    };

    runtime.shutdown();
    result
}

/// Process environment, skipping variables that are not valid UTF-8
fn process_env() -> impl Iterator<Item = (String, String)> {
    std::env::vars_os()
        .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
}
