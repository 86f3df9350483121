//! HTTP client used for page and image fetches.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::FetchError;
use crate::retry::RetryPolicy;

/// Sent when no user agent is configured. Image hosts commonly refuse
/// unknown clients, so this looks like a desktop browser.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Source of raw bytes for a URL.
///
/// Implementations apply their own timeout and retry policy; a returned
/// error means the budget is spent.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// HTTP client with a per-request timeout and bounded retries.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl HttpClient {
    /// Create a client sending `user_agent`, or [`DEFAULT_USER_AGENT`] when unset.
    pub fn new(
        timeout: Duration,
        user_agent: Option<&str>,
        retry: RetryPolicy,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client, retry })
    }

    /// Single GET attempt; non-success statuses become errors.
    async fn get_once(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| classify(url, e))?;
        debug!(
            "GET {} -> {} ({} bytes in {:?})",
            url,
            status.as_u16(),
            body.len(),
            start.elapsed()
        );
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.retry
            .run(url, FetchError::is_transient, || self.get_once(url))
            .await
    }
}

fn classify(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            source: e,
        }
    }
}
