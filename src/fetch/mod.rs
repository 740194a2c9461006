/// Content fetching for tool scripts and their modules
///
/// Dispatches on the URI scheme: `http`/`https` go through the (cache-aware) HTTP transport and
/// are subject to HTML landing page indirection, `file` reads the local filesystem.
pub mod cache;
pub mod http;
pub mod indirection;

pub use cache::{CacheRecord, CachingTransport};
pub use http::{HttpResponse, HttpTransport, ReqwestTransport};

use percent_encoding::percent_decode_str;
use std::collections::HashSet;
use std::path::PathBuf;
use url::Url;

use crate::context::LoadContext;
use crate::error::{Error, Result};
use indirection::{find_indirection_href, LANDING_MEDIA_TYPE, MAX_INDIRECTIONS};

/// File read when a `file` URI names a directory
pub const ENTRY_FILENAME: &str = "index.js";

/// Source text provider used by the module loader
pub trait SourceFetcher {
    /// Fetch the final (post-indirection) source text of `uri`
    fn fetch_source(&self, uri: &Url, ctx: &LoadContext) -> Result<String>;
}

/// Scheme-dispatched fetcher
pub struct ContentFetcher {
    http: Box<dyn HttpTransport>,
}

impl ContentFetcher {
    pub fn new(http: Box<dyn HttpTransport>) -> Self {
        Self { http }
    }

    /// Raw bytes of `uri`, without indirection
    pub fn fetch(&self, uri: &Url, ctx: &LoadContext) -> Result<Fetched> {
        ctx.check(uri.as_str())?;

        match uri.scheme() {
            "http" | "https" => {
                let response = self.http.get(uri, &[], ctx)?;
                if response.status != 200 {
                    return Err(Error::fetch(uri.as_str(), response.status_text()));
                }
                let media_type = response.media_type();
                let final_url = Url::parse(&response.url).unwrap_or_else(|_| uri.clone());
                Ok(Fetched {
                    url: final_url,
                    media_type,
                    body: response.body,
                })
            }
            "file" => {
                let body = read_file(uri)?;
                Ok(Fetched {
                    url: uri.clone(),
                    media_type: None,
                    body,
                })
            }
            scheme => Err(Error::UnsupportedScheme {
                scheme: scheme.to_string(),
                uri: uri.to_string(),
            }),
        }
    }

    /// Fetch `uri`, following landing pages until a non-HTML resource is reached
    pub fn fetch_resolved(&self, uri: &Url, ctx: &LoadContext) -> Result<Fetched> {
        let mut current = uri.clone();
        let mut visited = HashSet::new();

        loop {
            if !visited.insert(cache::cache_key(&current)) {
                return Err(Error::Indirection {
                    uri: current.to_string(),
                    reason: "indirection loop".to_string(),
                });
            }

            let fetched = self.fetch(&current, ctx)?;
            if !fetched.is_landing_page() {
                return Ok(fetched);
            }

            if visited.len() > MAX_INDIRECTIONS {
                return Err(Error::Indirection {
                    uri: current.to_string(),
                    reason: format!("more than {MAX_INDIRECTIONS} indirections"),
                });
            }

            let html = String::from_utf8_lossy(&fetched.body);
            let href = find_indirection_href(&html).ok_or_else(|| Error::Indirection {
                uri: current.to_string(),
                reason: "no <link rel=\"yas\"> element".to_string(),
            })?;
            let target = fetched.url.join(&href).map_err(|e| Error::Indirection {
                uri: current.to_string(),
                reason: format!("invalid href {href:?}: {e}"),
            })?;

            tracing::debug!(
                operation = "indirection",
                uri = %current,
                target = %target,
                "following landing page"
            );

            current = target;
        }
    }
}

impl SourceFetcher for ContentFetcher {
    fn fetch_source(&self, uri: &Url, ctx: &LoadContext) -> Result<String> {
        let fetched = self.fetch_resolved(uri, ctx)?;
        let size_bytes = fetched.body.len();
        let source = String::from_utf8(fetched.body)
            .map_err(|_| Error::fetch(uri.as_str(), "content is not valid UTF-8"))?;

        tracing::debug!(operation = "fetch", status = "success", uri = %uri, size_bytes, "fetched source");

        Ok(source)
    }
}

/// Fetched resource
#[derive(Debug, Clone)]
pub struct Fetched {
    /// URL the content was served from (after redirects)
    pub url: Url,
    /// Media type for HTTP responses
    pub media_type: Option<String>,
    pub body: Vec<u8>,
}

impl Fetched {
    fn is_landing_page(&self) -> bool {
        self.media_type.as_deref() == Some(LANDING_MEDIA_TYPE)
    }
}

/// Local path named by a `file` URI; a host component is prefixed to the path
pub fn file_path(uri: &Url) -> PathBuf {
    let path = percent_decode_str(uri.path()).decode_utf8_lossy();
    match uri.host_str() {
        Some(host) if !host.is_empty() => PathBuf::from(format!("{host}{path}")),
        _ => PathBuf::from(path.as_ref()),
    }
}

fn read_file(uri: &Url) -> Result<Vec<u8>> {
    let mut path = file_path(uri);
    if path.is_dir() {
        path.push(ENTRY_FILENAME);
    }

    std::fs::read(&path).map_err(|e| Error::fetch(uri.as_str(), format!("{}: {}", path.display(), e)))
}
