/// CLI utilities for consistent output formatting
use std::io::IsTerminal;

/// Get a colored prefix
///
/// Returns bright cyan if stderr is a TTY, plain text otherwise.
pub fn yas_prefix() -> &'static str {
    if std::io::stderr().is_terminal() {
        // Bright cyan for the entire prefix
        "\x1b[96m[yas]\x1b[0m"
    } else {
        "[yas]"
    }
}

/// Render an error with its full cause chain on one line
pub fn error_line(err: &anyhow::Error) -> String {
    format!("{} {:#}", yas_prefix(), err)
}
