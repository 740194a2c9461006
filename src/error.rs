/// Error taxonomy for resolving, fetching and loading tool scripts
///
/// Every variant carries the URI (or raw reference) it concerns. The type is `Clone` because a
/// failed module load is memoized and handed to every importer that asks for it again.
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// The tool reference (or a module reference) could not be turned into a URI
    #[error("invalid reference {reference:?}: {reason}")]
    Reference { reference: String, reason: String },

    /// Fetch scheme outside http, https and file
    #[error("fetching {scheme} URIs is not supported ({uri})")]
    UnsupportedScheme { scheme: String, uri: String },

    /// Non-200 status, transport failure or filesystem failure
    #[error("failed to fetch {uri}: {cause}")]
    Fetch { uri: String, cause: String },

    /// HTML landing page without a usable `<link rel="yas">` marker
    #[error("{uri} is an HTML page without a yas link: {reason}")]
    Indirection { uri: String, reason: String },

    /// The load graph revisited a module that is still loading
    #[error("cycle in load graph: {uri} is already being loaded")]
    Cycle { uri: String },

    /// The script engine reported a failure while executing a module
    #[error("executing {uri} failed: {message}")]
    Execution { uri: String, message: String },

    /// The load context deadline passed
    #[error("deadline exceeded while processing {uri}")]
    Timeout { uri: String },

    /// The load context was cancelled
    #[error("cancelled while processing {uri}")]
    Cancelled { uri: String },
}

impl Error {
    pub fn fetch(uri: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Error::Fetch {
            uri: uri.into(),
            cause: cause.to_string(),
        }
    }

    /// URI or reference the error is about
    pub fn uri(&self) -> &str {
        match self {
            Error::Reference { reference, .. } => reference,
            Error::UnsupportedScheme { uri, .. }
            | Error::Fetch { uri, .. }
            | Error::Indirection { uri, .. }
            | Error::Cycle { uri }
            | Error::Execution { uri, .. }
            | Error::Timeout { uri }
            | Error::Cancelled { uri } => uri,
        }
    }
}
