//! HTTP client for web crawling with rate limiting and error handling
//!
//! Wraps reqwest with a global request-rate limiter and a randomized
//! browser User-Agent per request. Errors keep the response status and any
//! `Retry-After` value so callers can apply their own retry policies.

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::{
    Client, Response, StatusCode,
    header::{REFERER, RETRY_AFTER, USER_AGENT},
};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

/// Browser User-Agent pool; one entry is picked at random for every request.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:126.0) Gecko/20100101 Firefox/126.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

fn random_user_agent() -> &'static str {
    USER_AGENTS[fastrand::usize(..USER_AGENTS.len())]
}

/// Fetch failure with enough structure for retry decisions.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP {status} for {url}")]
    Status {
        status: StatusCode,
        url: String,
        /// Parsed numeric `Retry-After` header, when the server sent one.
        retry_after: Option<u64>,
    },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl HttpError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport { .. } => None,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| s.is_server_error())
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(StatusCode::TOO_MANY_REQUESTS)
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => retry_after.map(Duration::from_secs),
            Self::Transport { .. } => None,
        }
    }
}

/// HTTP client configuration for crawling
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HttpClientConfig {
    pub timeout_seconds: u64,
    pub max_requests_per_second: u32,
    pub follow_redirects: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            max_requests_per_second: 5,
            follow_redirects: true,
        }
    }
}

/// Rate-limited HTTP client shared by all fetch stages.
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .cookie_store(true)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second)
                .ok_or_else(|| anyhow::anyhow!("Rate limit must be greater than 0"))?,
        );

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(quota),
            config,
        })
    }

    /// Fetch a URL and return the body as text.
    pub async fn get_text(&self, url: &str) -> Result<String, HttpError> {
        let response = self.execute(url, None).await?;
        response.text().await.map_err(|source| HttpError::Transport {
            url: url.to_string(),
            source,
        })
    }

    /// Fetch a URL and parse the body as JSON, optionally sending a
    /// `Referer` header (the phone-disclosure endpoint requires one).
    pub async fn get_json(
        &self,
        url: &str,
        referer: Option<&str>,
    ) -> Result<serde_json::Value, HttpError> {
        let response = self.execute(url, referer).await?;
        response.json().await.map_err(|source| HttpError::Transport {
            url: url.to_string(),
            source,
        })
    }

    async fn execute(&self, url: &str, referer: Option<&str>) -> Result<Response, HttpError> {
        self.rate_limiter.until_ready().await;

        tracing::debug!("Fetching URL: {}", url);

        let mut request = self.client.get(url).header(USER_AGENT, random_user_agent());
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }

        let response = request.send().await.map_err(|source| HttpError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok());
            return Err(HttpError::Status {
                status,
                url: url.to_string(),
                retry_after,
            });
        }

        tracing::debug!("Successfully fetched: {} ({})", url, status);
        Ok(response)
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn client_creation_succeeds_with_defaults() {
        let client = HttpClient::new(HttpClientConfig::default());
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn zero_rate_limit_is_rejected() {
        let config = HttpClientConfig {
            max_requests_per_second: 0,
            ..Default::default()
        };
        assert!(HttpClient::new(config).is_err());
    }

    #[tokio::test]
    async fn non_success_status_carries_retry_after() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/limited")
            .with_status(429)
            .with_header("Retry-After", "7")
            .create_async()
            .await;

        let client = HttpClient::new(HttpClientConfig {
            max_requests_per_second: 100,
            ..Default::default()
        })
        .unwrap();

        let err = client
            .get_text(&format!("{}/limited", server.url()))
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[tokio::test]
    async fn non_numeric_retry_after_is_dropped() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/limited")
            .with_status(429)
            .with_header("Retry-After", "Wed, 21 Oct 2026 07:28:00 GMT")
            .create_async()
            .await;

        let client = HttpClient::new(HttpClientConfig {
            max_requests_per_second: 100,
            ..Default::default()
        })
        .unwrap();

        let err = client
            .get_text(&format!("{}/limited", server.url()))
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(err.retry_after(), None);
    }
}
