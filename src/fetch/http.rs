// Plain HTTP transport
//
// Blocking reqwest client; every request gets a timeout derived from the load context.

use reqwest::blocking::Client;
use std::time::Duration;
use url::Url;

use crate::context::LoadContext;
use crate::error::{Error, Result};

/// Default per-request timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fully buffered HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Final URL (after redirects)
    pub url: String,
    pub status: u16,
    /// Header names are lowercase
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// First value of a header, by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    /// Status line text, e.g. "404 Not Found"
    pub fn status_text(&self) -> String {
        let reason = reqwest::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason());
        match reason {
            Some(reason) => format!("{} {}", self.status, reason),
            None => self.status.to_string(),
        }
    }

    /// Media type without parameters, lowercased (`text/html; charset=utf-8` → `text/html`)
    pub fn media_type(&self) -> Option<String> {
        self.header("content-type").map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or("")
                .trim()
                .to_ascii_lowercase()
        })
    }
}

pub(crate) fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Something that can perform a GET request
///
/// The cache layer decorates a transport with a store, so the fetcher never knows whether a
/// response came from the network or from disk.
pub trait HttpTransport: Send + Sync {
    fn get(
        &self,
        url: &Url,
        headers: &[(String, String)],
        ctx: &LoadContext,
    ) -> Result<HttpResponse>;
}

/// Network transport backed by `reqwest`
pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client, timeout })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(
        &self,
        url: &Url,
        headers: &[(String, String)],
        ctx: &LoadContext,
    ) -> Result<HttpResponse> {
        ctx.check(url.as_str())?;

        let mut request = self
            .client
            .get(url.clone())
            .timeout(ctx.request_timeout(self.timeout));
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        tracing::debug!(operation = "fetch", uri = %url, "GET");

        let response = request.send().map_err(|e| {
            if e.is_timeout() && ctx.is_expired() {
                Error::Timeout {
                    uri: url.to_string(),
                }
            } else {
                Error::fetch(url.as_str(), e)
            }
        })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .map_err(|e| Error::fetch(url.as_str(), e))?
            .to_vec();

        Ok(HttpResponse {
            url: final_url,
            status,
            headers,
            body,
        })
    }
}
