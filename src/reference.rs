// Tool reference normalization
//
// Turns short, human-typed references into canonical URIs:
// - `example.com` → `https://example.com`
// - `example.com:8080` → `https://example.com:8080`
// - `path#frag` → `https://<default-host>/path` + fragment `frag`
// - `some/complex.path` → `https://<default-host>/some/complex.path`

use url::Url;

use crate::error::{Error, Result};

/// Raw reference value that selects the interactive mode
pub const REPL: &str = "repl";

/// Scheme used when a reference does not name one
pub const DEFAULT_SCHEME: &str = "https";

/// A reference split into its RFC 3986 components
#[derive(Debug, Default)]
struct Parts<'a> {
    scheme: Option<&'a str>,
    authority: Option<&'a str>,
    path: &'a str,
    query: Option<&'a str>,
}

impl<'a> Parts<'a> {
    fn host_is_empty(&self) -> bool {
        match self.authority {
            // userinfo is not a host
            Some(authority) => authority.rsplit('@').next().unwrap_or("").is_empty(),
            None => true,
        }
    }
}

enum Parsed<'a> {
    Hierarchical(Parts<'a>),
    /// `scheme:rest` where rest does not start with `/`, e.g. `example.com:8080`
    Opaque,
}

/// Normalize a raw tool reference into `(canonical URI, fragment)`
///
/// The fragment is returned separately and is empty when the reference has none.
pub fn normalize(raw: &str, default_host: &str) -> Result<(String, String)> {
    let (without_fragment, fragment) = match raw.split_once('#') {
        Some((rest, fragment)) => (rest, fragment),
        None => (raw, ""),
    };

    let reparsed;
    let parts = match parse(without_fragment, raw)? {
        Parsed::Hierarchical(parts) => parts,
        Parsed::Opaque => {
            reparsed = format!("{DEFAULT_SCHEME}://{without_fragment}");
            match parse(&reparsed, raw)? {
                Parsed::Hierarchical(parts) => parts,
                Parsed::Opaque => return Err(reference_error(raw, "opaque URI")),
            }
        }
    };

    let scheme = parts
        .scheme
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| DEFAULT_SCHEME.to_string());

    let (authority, path) = if parts.host_is_empty() && scheme != "file" {
        let (first, rest) = match parts.path.split_once('/') {
            Some((first, rest)) => (first, Some(rest)),
            None => (parts.path, None),
        };
        if looks_like_host(first) {
            (first, rest.unwrap_or(""))
        } else {
            (default_host, parts.path)
        }
    } else {
        (parts.authority.unwrap_or(""), parts.path)
    };

    let mut uri = format!("{scheme}://{authority}");
    if !path.is_empty() {
        if !path.starts_with('/') {
            uri.push('/');
        }
        uri.push_str(path);
    }
    if let Some(query) = parts.query {
        uri.push('?');
        uri.push_str(query);
    }

    Url::parse(&uri).map_err(|e| reference_error(raw, e))?;

    tracing::debug!(reference = raw, uri = %uri, fragment, "normalized tool reference");

    Ok((uri, fragment.to_string()))
}

/// Parse the canonical form of a normalized reference
pub fn to_url(uri: &str) -> Result<Url> {
    Url::parse(uri).map_err(|e| reference_error(uri, e))
}

fn parse<'a>(input: &'a str, raw: &str) -> Result<Parsed<'a>> {
    let (input, query) = match input.split_once('?') {
        Some((rest, query)) => (rest, Some(query)),
        None => (input, None),
    };

    let (scheme, rest) = match split_scheme(input) {
        Some((scheme, rest)) => {
            if !rest.is_empty() && !rest.starts_with('/') {
                return Ok(Parsed::Opaque);
            }
            (Some(scheme), rest)
        }
        None => {
            if input.starts_with(':') {
                return Err(reference_error(raw, "missing scheme"));
            }
            // `1.2.3.4:80` has no valid scheme but a colon in its first segment
            let first_segment = input.split('/').next().unwrap_or("");
            if first_segment.contains(':') {
                return Ok(Parsed::Opaque);
            }
            (None, input)
        }
    };

    let (authority, path) = match rest.strip_prefix("//") {
        Some(rest) => {
            let end = rest.find('/').unwrap_or(rest.len());
            (Some(&rest[..end]), &rest[end..])
        }
        None => (None, rest),
    };

    Ok(Parsed::Hierarchical(Parts {
        scheme,
        authority,
        path,
        query,
    }))
}

/// Split `scheme:rest` when the prefix is a syntactically valid scheme
fn split_scheme(input: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = input.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        return None;
    }
    Some((scheme, rest))
}

/// First path segment counts as a host when it contains a dot (and is not `.` or `..`)
fn looks_like_host(segment: &str) -> bool {
    segment.contains('.') && segment.chars().any(|c| c != '.')
}

fn reference_error(raw: &str, reason: impl std::fmt::Display) -> Error {
    Error::Reference {
        reference: raw.to_string(),
        reason: reason.to_string(),
    }
}
