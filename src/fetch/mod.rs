//! HTTP fetch layer for the portal session
//!
//! This module wraps the HTTP client used by every phase:
//! - One cookie-carrying client per crawl session
//! - Request descriptors built fresh per call (query template + form body)
//! - Redirects followed manually so the hop status chain is recorded; the
//!   authentication heuristics need it to tell a stale cached page from a
//!   real session bounce

use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{redirect::Policy, Client};
use std::borrow::Cow;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum redirect hops before giving up on a request
const MAX_REDIRECTS: usize = 10;

static USER_AGENT: &str = concat!("bookfetch/", env!("CARGO_PKG_VERSION"));

/// Errors raised by the fetch layer
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Build(reqwest::Error),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("too many redirects from {url}")]
    RedirectLimit { url: String },

    #[error("redirect without a Location header at {url}")]
    MissingLocation { url: String },

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

/// A request descriptor for one portal endpoint.
///
/// Always constructed fresh per call; the fixed query templates live in
/// [`crate::crawl::extract`] and are cloned into a new descriptor each time.
#[derive(Debug, Clone)]
pub struct PortalRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub form: Option<Vec<(String, String)>>,
}

impl PortalRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
            form: None,
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    /// A form submission (POST); redirected hops downgrade to GET.
    pub fn form(path: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
            form: Some(fields),
        }
    }
}

/// A completed portal response.
///
/// `redirects` holds the status code of every redirect hop taken before the
/// final response, in order.
#[derive(Debug)]
pub struct PortalResponse {
    pub url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub redirects: Vec<u16>,
}

impl PortalResponse {
    /// The response body decoded as text (lossy).
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// True if the raw body contains the given byte pattern.
    pub fn body_contains(&self, marker: &[u8]) -> bool {
        !marker.is_empty() && self.body.windows(marker.len()).any(|window| window == marker)
    }

    /// A header value as text, if present and representable.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// HTTP client bound to one portal base URL and one session cookie jar.
#[derive(Debug, Clone)]
pub struct PortalClient {
    client: Client,
    base_url: Url,
}

impl PortalClient {
    pub fn new(base_url: Url) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .redirect(Policy::none()) // followed manually, see open()
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(FetchError::Build)?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Executes a request, following redirects manually and recording the
    /// status code of each hop.
    pub async fn open(&self, request: &PortalRequest) -> Result<PortalResponse, FetchError> {
        let mut url = self.base_url.join(&request.path)?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(
                request
                    .query
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.as_str())),
            );
        }

        let mut redirects = Vec::new();
        let mut form = request.form.clone();

        loop {
            let builder = match &form {
                Some(fields) => self.client.post(url.clone()).form(fields),
                None => self.client.get(url.clone()),
            };

            let response = builder.send().await.map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;

            let status = response.status();
            tracing::debug!(url = %response.url(), status = status.as_u16(), "response received");

            if status.is_redirection() {
                if redirects.len() >= MAX_REDIRECTS {
                    return Err(FetchError::RedirectLimit {
                        url: url.to_string(),
                    });
                }
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .ok_or_else(|| FetchError::MissingLocation {
                        url: url.to_string(),
                    })?;
                redirects.push(status.as_u16());
                url = url.join(location)?;
                form = None; // form is only submitted on the first hop
                continue;
            }

            let final_url = response.url().clone();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|source| FetchError::Http {
                    url: final_url.to_string(),
                    source,
                })?
                .to_vec();

            return Ok(PortalResponse {
                url: final_url,
                status: status.as_u16(),
                headers,
                body,
                redirects,
            });
        }
    }
}

/// Convenience for building test and synthetic responses.
impl PortalResponse {
    pub fn synthetic(url: Url, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url,
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            redirects: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client() {
        let base = Url::parse("https://portal.example/").unwrap();
        assert!(PortalClient::new(base).is_ok());
    }

    #[test]
    fn test_body_contains() {
        let url = Url::parse("https://portal.example/").unwrap();
        let response = PortalResponse::synthetic(url, 200, b"<form id_login id_senha>".to_vec());
        assert!(response.body_contains(b"id_login"));
        assert!(!response.body_contains(b"id_token"));
        assert!(!response.body_contains(b""));
    }

    #[test]
    fn test_request_descriptors_are_fresh() {
        let first = PortalRequest::get("/a").with_query(vec![("k".into(), "1".into())]);
        let second = PortalRequest::get("/a").with_query(vec![("k".into(), "2".into())]);
        assert_ne!(first.query, second.query);
    }
}
