/// `yas repl` command implementation
use anyhow::Result;
use std::io;

use crate::runtime::RuntimeEnvironment;

pub fn run(runtime: &RuntimeEnvironment) -> Result<()> {
    let stdin = io::stdin();
    runtime.repl(stdin.lock(), io::stdout())
}
