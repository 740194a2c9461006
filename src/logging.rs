//! Diagnostics for yas
//!
//! stdout belongs to the tool being run, so every log line goes to stderr, and the default
//! filter only lets warnings through. Events carry these fields where they apply:
//!
//! - `operation`: "fetch", "load", "indirection", "cache.get", "cache.put", "run"
//! - `status`: "hit", "miss", "revalidated", "stored", "skipped", "cycle", "error"
//! - `uri`: absolute URI of the module or resource
//! - `size_bytes`: body or source length
//!
//! ```rust
//! let uri = "https://oh.yas.tools/hello";
//! tracing::debug!(operation = "load", status = "hit", uri = %uri, "module already loaded");
//! ```

use std::{fmt as std_fmt, io};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{
    fmt::{self, format::Writer},
    prelude::*,
    EnvFilter, Layer,
};

/// `<utc timestamp> <LEVEL>(yas): <message> <fields>`
struct LineFormatter {
    colour: bool,
}

fn level_colour(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "\x1b[31m",
        Level::WARN => "\x1b[33m",
        Level::INFO => "\x1b[32m",
        Level::DEBUG => "\x1b[34m",
        Level::TRACE => "\x1b[35m",
    }
}

impl<S, N> FormatEvent<S, N> for LineFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std_fmt::Result {
        let level = event.metadata().level();
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ");

        if self.colour {
            write!(writer, "{timestamp} {}{level:5}(yas)\x1b[0m: ", level_colour(level))?;
        } else {
            write!(writer, "{timestamp} {level:5}(yas): ")?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "warn";

/// Shape of the stderr log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Coloured lines
    Pretty,
    /// Plain lines, the default when `CI` is set
    Compact,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    /// `YAS_LOG_FORMAT`, falling back on `CI`
    pub fn from_env() -> Self {
        Self::select(
            std::env::var("YAS_LOG_FORMAT").ok().as_deref(),
            std::env::var_os("CI").is_some(),
        )
    }

    /// Requested format, else compact on CI and pretty everywhere else
    fn select(requested: Option<&str>, ci: bool) -> Self {
        match requested.map(str::to_lowercase).as_deref() {
            Some("json") => Self::Json,
            Some("compact") => Self::Compact,
            Some("pretty") => Self::Pretty,
            _ if ci => Self::Compact,
            _ => Self::Pretty,
        }
    }

    /// stderr layer writing events in this format
    fn layer<S>(self) -> Box<dyn Layer<S> + Send + Sync + 'static>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        match self {
            Self::Json => fmt::layer()
                .with_target(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(false)
                .with_writer(io::stderr)
                .json()
                .boxed(),
            text => fmt::layer()
                .event_format(LineFormatter {
                    colour: text == Self::Pretty,
                })
                .with_writer(io::stderr)
                .boxed(),
        }
    }
}

/// Install the global subscriber: `RUST_LOG` filter (default `warn`), format from
/// `YAS_LOG_FORMAT` ("pretty", "compact" or "json")
///
/// ```bash
/// RUST_LOG=yas=debug yas hello
/// YAS_LOG_FORMAT=json yas hello
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(LogFormat::from_env().layer())
        .with(filter)
        .init();
}
