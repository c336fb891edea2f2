//! Seller phone retrieval via the phone-disclosure endpoint
//!
//! The detail page only embeds a short-lived token (`data-hash` /
//! `data-expires`); the formatted number comes from a secondary JSON
//! endpoint that rate-limits aggressively. The resolver honors
//! `Retry-After` on 429, pauses with jitter on other errors, and gives up
//! after a fixed attempt cap — the caller then drops the record.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};
use url::Url;

use crate::domain::car::PhoneToken;
use crate::domain::phone::normalize_phone;
use crate::infrastructure::http_client::HttpClient;

static LISTING_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/auto_\w+_(\d+)\.html").expect("static regex"));

/// Retry/backoff tuning for the phone endpoint.
#[derive(Debug, Clone)]
pub struct PhoneRetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Wait on 429 when `Retry-After` is absent or non-numeric.
    pub rate_limit_fallback: Duration,
    /// Jittered pause bounds, used both after any response (politeness)
    /// and before retrying a non-429 failure.
    pub pause_min: Duration,
    pub pause_max: Duration,
}

impl Default for PhoneRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            rate_limit_fallback: Duration::from_secs(10),
            pause_min: Duration::from_secs(2),
            pause_max: Duration::from_secs(3),
        }
    }
}

impl PhoneRetryPolicy {
    pub fn from_settings(retry: &crate::infrastructure::config::RetrySettings) -> Self {
        Self {
            max_attempts: retry.phone_max_attempts,
            rate_limit_fallback: Duration::from_secs(retry.phone_rate_limit_wait_secs),
            pause_min: Duration::from_millis(retry.phone_pause_min_ms),
            pause_max: Duration::from_millis(retry.phone_pause_max_ms),
        }
    }

    fn jitter(&self) -> Duration {
        let min = self.pause_min.as_millis() as u64;
        let max = self.pause_max.as_millis() as u64;
        Duration::from_millis(if max > min { fastrand::u64(min..=max) } else { min })
    }
}

/// Resolves the seller phone number for one listing.
pub struct PhoneResolver {
    http: Arc<HttpClient>,
    policy: PhoneRetryPolicy,
}

impl PhoneResolver {
    pub fn new(http: Arc<HttpClient>, policy: PhoneRetryPolicy) -> Self {
        Self { http, policy }
    }

    /// Fetch and normalize the phone number, or `None` when it cannot be
    /// obtained. Absence of a phone is a terminal outcome for the record,
    /// so no error is surfaced.
    pub async fn resolve(&self, listing_url: &str, token: &PhoneToken) -> Option<String> {
        let endpoint = match phone_endpoint(listing_url, token) {
            Ok(endpoint) => endpoint,
            Err(reason) => {
                error!("{reason}");
                return None;
            }
        };

        for attempt in 1..=self.policy.max_attempts {
            match self.http.get_json(&endpoint, Some(listing_url)).await {
                Ok(payload) => {
                    sleep(self.policy.jitter()).await;
                    return match phone_from_payload(&payload) {
                        Some(phone) => {
                            debug!("Phone obtained for {}: {}", listing_url, phone);
                            Some(normalize_phone(&phone))
                        }
                        None => {
                            error!("Phone endpoint returned no number for {}", listing_url);
                            None
                        }
                    };
                }
                Err(err) if err.is_rate_limited() => {
                    let wait = err.retry_after().unwrap_or(self.policy.rate_limit_fallback);
                    warn!(
                        "429 Too Many Requests for {} (attempt {}/{}), waiting {:?}",
                        listing_url, attempt, self.policy.max_attempts, wait
                    );
                    if attempt < self.policy.max_attempts {
                        sleep(wait).await;
                    }
                }
                Err(err) => {
                    warn!(
                        "Phone request failed for {} (attempt {}/{}): {}",
                        listing_url, attempt, self.policy.max_attempts, err
                    );
                    if attempt < self.policy.max_attempts {
                        sleep(self.policy.jitter()).await;
                    }
                }
            }
        }

        error!("Failed to get phone for {}", listing_url);
        None
    }
}

/// Build the disclosure endpoint URL from the listing URL's origin, its
/// numeric id and the token pair.
fn phone_endpoint(listing_url: &str, token: &PhoneToken) -> Result<String, String> {
    let id = LISTING_ID
        .captures(listing_url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| format!("Failed to extract listing id from url: {listing_url}"))?;

    let base =
        Url::parse(listing_url).map_err(|e| format!("Invalid listing url {listing_url}: {e}"))?;
    let mut endpoint = base
        .join(&format!("/users/phones/{id}"))
        .map_err(|e| format!("Failed to build phone endpoint for {listing_url}: {e}"))?;
    endpoint
        .query_pairs_mut()
        .append_pair("hash", &token.hash)
        .append_pair("expires", &token.expires);
    Ok(endpoint.into())
}

/// The endpoint answers in one of two shapes: a `phones` array of
/// formatted entries, or a single `formattedPhoneNumber` field.
fn phone_from_payload(payload: &serde_json::Value) -> Option<String> {
    payload
        .get("phones")
        .and_then(|phones| phones.as_array())
        .and_then(|phones| phones.first())
        .and_then(|entry| entry.get("phoneFormatted"))
        .and_then(|value| value.as_str())
        .map(str::to_string)
        .or_else(|| {
            payload
                .get("formattedPhoneNumber")
                .and_then(|value| value.as_str())
                .map(str::to_string)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http_client::HttpClientConfig;
    use serde_json::json;

    fn fast_policy() -> PhoneRetryPolicy {
        PhoneRetryPolicy {
            max_attempts: 5,
            rate_limit_fallback: Duration::from_millis(1),
            pause_min: Duration::from_millis(1),
            pause_max: Duration::from_millis(2),
        }
    }

    fn resolver(policy: PhoneRetryPolicy) -> PhoneResolver {
        let http = HttpClient::new(HttpClientConfig {
            max_requests_per_second: 1000,
            ..Default::default()
        })
        .unwrap();
        PhoneResolver::new(Arc::new(http), policy)
    }

    fn token() -> PhoneToken {
        PhoneToken {
            hash: "h1".into(),
            expires: "e1".into(),
        }
    }

    #[test]
    fn builds_endpoint_from_listing_origin() {
        let endpoint =
            phone_endpoint("https://auto.ria.com/auto_audi_q7_38309788.html", &token()).unwrap();
        assert_eq!(
            endpoint,
            "https://auto.ria.com/users/phones/38309788?hash=h1&expires=e1"
        );
    }

    #[test]
    fn rejects_url_without_listing_id() {
        assert!(phone_endpoint("https://auto.ria.com/news/", &token()).is_err());
    }

    #[test]
    fn reads_both_payload_shapes() {
        let phones = json!({"phones": [{"phoneFormatted": "(067) 123 45 67"}]});
        assert_eq!(
            phone_from_payload(&phones).as_deref(),
            Some("(067) 123 45 67")
        );

        let single = json!({"formattedPhoneNumber": "(050) 765 43 21"});
        assert_eq!(
            phone_from_payload(&single).as_deref(),
            Some("(050) 765 43 21")
        );

        assert!(phone_from_payload(&json!({"phones": []})).is_none());
    }

    #[tokio::test]
    async fn resolves_and_normalizes_phone() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/users/phones/123")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"phones": [{"phoneFormatted": "(067) 123 45 67"}]}"#)
            .create_async()
            .await;

        let listing_url = format!("{}/auto_test_car_123.html", server.url());
        let phone = resolver(fast_policy()).resolve(&listing_url, &token()).await;
        assert_eq!(phone.as_deref(), Some("+380671234567"));
    }

    #[tokio::test]
    async fn rate_limiting_exhausts_attempt_cap() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/users/phones/9")
            .match_query(mockito::Matcher::Any)
            .with_status(429)
            .with_header("Retry-After", "0")
            .expect(5)
            .create_async()
            .await;

        let listing_url = format!("{}/auto_some_car_9.html", server.url());
        let phone = resolver(fast_policy()).resolve(&listing_url, &token()).await;
        assert!(phone.is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn generic_errors_retry_until_cap() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/users/phones/77")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .expect(5)
            .create_async()
            .await;

        let listing_url = format!("{}/auto_other_car_77.html", server.url());
        let phone = resolver(fast_policy()).resolve(&listing_url, &token()).await;
        assert!(phone.is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn empty_payload_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/users/phones/55")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"phones": []}"#)
            .expect(1)
            .create_async()
            .await;

        let listing_url = format!("{}/auto_third_car_55.html", server.url());
        let phone = resolver(fast_policy()).resolve(&listing_url, &token()).await;
        assert!(phone.is_none());
        mock.assert_async().await;
    }
}
