/// Cache-aware HTTP transport
///
/// Decorates any `HttpTransport` with a `CacheStore`. Freshness follows RFC 7234 through
/// `http_cache_semantics::CachePolicy` (`max-age`, `Age`, `Expires`, `Pragma`, `no-cache`,
/// heuristics), stale records are revalidated with a conditional request, and a
/// `304 Not Modified` keeps the stored body while refreshing its policy and headers.
use anyhow::{bail, Context};
use http::header::HeaderMap;
use http_cache_semantics::{AfterResponse, BeforeRequest, CacheOptions, CachePolicy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;
use url::Url;

use super::http::{header_value, HttpResponse, HttpTransport};
use crate::context::LoadContext;
use crate::error::Result;
use crate::storage::CacheStore;

/// Stored HTTP response together with the policy that decides its freshness
#[derive(Debug)]
pub struct CacheRecord {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub policy: CachePolicy,
}

#[derive(Serialize)]
struct RecordHeadRef<'a> {
    url: &'a str,
    status: u16,
    headers: &'a [(String, String)],
    policy: &'a CachePolicy,
}

/// JSON head of a serialized record; the body follows it raw
#[derive(Deserialize)]
struct RecordHead {
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    policy: CachePolicy,
}

impl CacheRecord {
    fn from_response(response: &HttpResponse, policy: CachePolicy) -> Self {
        Self {
            url: response.url.clone(),
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            policy,
        }
    }

    /// Format:
    /// - head_len: u32 little-endian (4 bytes)
    /// - head: JSON (`url`, `status`, `headers`, `policy`)
    /// - body: remaining bytes
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let head = serde_json::to_vec(&RecordHeadRef {
            url: &self.url,
            status: self.status,
            headers: &self.headers,
            policy: &self.policy,
        })
        .context("Failed to serialize cache record")?;
        let head_len = u32::try_from(head.len()).context("Cache record head too large")?;

        let mut bytes = Vec::with_capacity(4 + head.len() + self.body.len());
        bytes.extend_from_slice(&head_len.to_le_bytes());
        bytes.extend_from_slice(&head);
        bytes.extend_from_slice(&self.body);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        if bytes.len() < 4 {
            bail!("Invalid cache record: {} bytes", bytes.len());
        }
        let head_len = u32::from_le_bytes(bytes[0..4].try_into()?) as usize;
        let Some(head_bytes) = bytes.get(4..4 + head_len) else {
            bail!("Invalid cache record: truncated head");
        };
        let head: RecordHead =
            serde_json::from_slice(head_bytes).context("Failed to parse cache record head")?;

        Ok(Self {
            url: head.url,
            status: head.status,
            headers: head.headers,
            body: bytes[4 + head_len..].to_vec(),
            policy: head.policy,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    /// Same body under a revalidated policy and the merged headers of a `304`
    fn refreshed(self, policy: CachePolicy, headers: &HeaderMap) -> Self {
        Self {
            headers: header_pairs(headers),
            policy,
            ..self
        }
    }

    fn to_response(&self, headers: &HeaderMap) -> HttpResponse {
        HttpResponse {
            url: self.url.clone(),
            status: self.status,
            headers: header_pairs(headers),
            body: self.body.clone(),
        }
    }
}

/// yas keeps a private, per-user cache
fn cache_options() -> CacheOptions {
    CacheOptions {
        shared: false,
        ..CacheOptions::default()
    }
}

fn request_parts(key: &str, headers: &[(String, String)]) -> anyhow::Result<http::request::Parts> {
    let mut builder = http::Request::get(key);
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let (parts, ()) = builder
        .body(())
        .with_context(|| format!("Invalid request for {}", key))?
        .into_parts();
    Ok(parts)
}

fn response_parts(response: &HttpResponse) -> anyhow::Result<http::response::Parts> {
    let mut builder = http::Response::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let (parts, ()) = builder
        .body(())
        .with_context(|| format!("Invalid response from {}", response.url))?
        .into_parts();
    Ok(parts)
}

/// Header pairs with lowercase names, skipping values that are not visible ASCII
fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Cache key: the absolute request URL without fragment
pub fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

/// HTTP transport that consults and updates a `CacheStore` around each network call
pub struct CachingTransport<T> {
    inner: T,
    store: Arc<dyn CacheStore>,
}

impl<T: HttpTransport> CachingTransport<T> {
    pub fn new(inner: T, store: Arc<dyn CacheStore>) -> Self {
        Self { inner, store }
    }

    fn lookup(&self, key: &str) -> Option<CacheRecord> {
        let bytes = match self.store.get(key.as_bytes()) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(operation = "cache.get", status = "error", uri = key, "{:#}", e);
                return None;
            }
        };
        match CacheRecord::from_bytes(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(operation = "cache.get", status = "error", uri = key, "{:#}", e);
                None
            }
        }
    }

    fn store(&self, key: &str, record: &CacheRecord) {
        let result = record
            .to_bytes()
            .and_then(|bytes| self.store.set(key.as_bytes(), &bytes));
        match result {
            Ok(()) => tracing::debug!(
                operation = "cache.put",
                status = "stored",
                uri = key,
                size_bytes = record.body.len(),
                "cached response"
            ),
            Err(e) => {
                tracing::warn!(operation = "cache.put", status = "error", uri = key, "{:#}", e)
            }
        }
    }

    /// Store a `200` response when its policy allows it
    fn store_response(
        &self,
        key: &str,
        request: &http::request::Parts,
        response: &HttpResponse,
        now: SystemTime,
    ) {
        if response.status != 200 {
            return;
        }
        let parts = match response_parts(response) {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(operation = "cache.put", status = "error", uri = key, "{:#}", e);
                return;
            }
        };

        let policy = CachePolicy::new_options(request, &parts, now, cache_options());
        if policy.is_storable() {
            self.store(key, &CacheRecord::from_response(response, policy));
        } else {
            tracing::debug!(operation = "cache.put", status = "skipped", uri = key, "not storable");
        }
    }

    /// Cache-aware GET as seen at `now`
    fn get_at(
        &self,
        url: &Url,
        headers: &[(String, String)],
        ctx: &LoadContext,
        now: SystemTime,
    ) -> Result<HttpResponse> {
        let key = cache_key(url);
        let request = match request_parts(&key, headers) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(operation = "cache.get", status = "bypass", uri = %key, "{:#}", e);
                return self.inner.get(url, headers, ctx);
            }
        };

        let cached = self.lookup(&key);
        let mut request_headers = headers.to_vec();
        if let Some(record) = &cached {
            match record.policy.before_request(&request, now) {
                BeforeRequest::Fresh(parts) => {
                    tracing::debug!(operation = "cache.get", status = "hit", uri = %key, "cache hit");
                    return Ok(record.to_response(&parts.headers));
                }
                BeforeRequest::Stale {
                    request: revalidation,
                    matches,
                } => {
                    if matches {
                        request_headers = header_pairs(&revalidation.headers);
                    }
                }
            }
        }

        let response = self.inner.get(url, &request_headers, ctx)?;

        if response.status == 304 {
            if let Some(record) = cached {
                let not_modified = match response_parts(&response) {
                    Ok(parts) => parts,
                    Err(e) => {
                        tracing::warn!(operation = "cache.get", status = "error", uri = %key, "{:#}", e);
                        return Ok(response);
                    }
                };
                if let AfterResponse::NotModified(policy, parts) =
                    record.policy.after_response(&request, &not_modified, now)
                {
                    tracing::debug!(
                        operation = "cache.get",
                        status = "revalidated",
                        uri = %key,
                        "not modified"
                    );
                    let record = record.refreshed(policy, &parts.headers);
                    self.store(&key, &record);
                    return Ok(HttpResponse {
                        url: record.url.clone(),
                        status: record.status,
                        headers: record.headers.clone(),
                        body: record.body.clone(),
                    });
                }
            }
            return Ok(response);
        }

        tracing::debug!(operation = "cache.get", status = "miss", uri = %key, "cache miss");
        self.store_response(&key, &request, &response, now);

        Ok(response)
    }
}

impl<T: HttpTransport> HttpTransport for CachingTransport<T> {
    fn get(
        &self,
        url: &Url,
        headers: &[(String, String)],
        ctx: &LoadContext,
    ) -> Result<HttpResponse> {
        self.get_at(url, headers, ctx, SystemTime::now())
    }
}
