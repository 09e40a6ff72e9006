//! Static document fetch.
//!
//! Detail pages are fetched once as plain HTML; no script execution is
//! needed. [`HttpFetcher`] is the production implementation. Failures are
//! reported as [`FetchError`] and never retried here: callers skip the entry
//! and a re-run of the phase picks it up again.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::ScrapeError;

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Browser-like user agent. Several retailers reject the `reqwest` default.
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// Why a document could not be retrieved.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, timeout, body read).
    #[error("request to {url} failed: {source}")]
    Http {
        /// Requested URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },
}

/// One-shot retrieval of a raw HTML document.
#[async_trait]
pub trait DocumentFetch: Send + Sync {
    /// Fetches `url` and returns the response body.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on transport failure or a non-success status.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Settings for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Extra headers sent with every request.
    pub headers: BTreeMap<String, String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            headers: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl FetchConfig {
    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds an HTTP header to include in requests.
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_owned(), value.to_owned());
        self
    }
}

/// [`DocumentFetch`] over a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Builds a fetcher from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError`] if a header is invalid or the client cannot
    /// be constructed.
    pub fn new(config: &FetchConfig) -> Result<Self, ScrapeError> {
        let mut header_map = reqwest::header::HeaderMap::new();
        for (key, value) in &config.headers {
            let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| ScrapeError::Header(key.clone()))?;
            let val = reqwest::header::HeaderValue::from_str(value)
                .map_err(|_| ScrapeError::Header(key.clone()))?;
            header_map.insert(name, val);
        }

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(header_map)
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentFetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        log::debug!("GET {url}");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_owned(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|source| FetchError::Http {
            url: url.to_owned(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_custom_headers() {
        let config = FetchConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_header("Accept-Language", "en-GB");
        assert!(HttpFetcher::new(&config).is_ok());
    }

    #[test]
    fn rejects_invalid_header_name() {
        let config = FetchConfig::default().with_header("bad header", "x");
        assert!(matches!(
            HttpFetcher::new(&config),
            Err(ScrapeError::Header(name)) if name == "bad header"
        ));
    }

    #[test]
    fn status_error_message_names_url() {
        let err = FetchError::Status {
            url: "https://example.com/p".to_owned(),
            status: 404,
        };
        assert_eq!(err.to_string(), "https://example.com/p returned HTTP 404");
    }
}
