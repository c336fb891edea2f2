//! Per-listing detail pipeline
//!
//! Each admitted link runs through: a last-moment existence re-check, the
//! detail page fetch with retries, field extraction, phone resolution and
//! finally dedup-safe insertion. Failures abandon the one link; nothing
//! here can abort the run.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::application::stats::RunStats;
use crate::domain::repositories::{CarRepository, InsertOutcome};
use crate::domain::services::DetailExtractor;
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::phone::PhoneResolver;

/// Retry tuning for detail page fetches.
#[derive(Debug, Clone)]
pub struct DetailRetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for DetailRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskOutcome {
    /// A new record was persisted.
    Saved,
    /// The listing already existed, at the re-check or at insertion.
    Duplicate,
    /// The link was abandoned: fetch exhausted, removed listing, no phone,
    /// or a save error.
    Dropped,
}

/// One detail-fetch pipeline execution, cheap to clone per spawned task.
#[derive(Clone)]
pub struct DetailTask {
    http: Arc<HttpClient>,
    extractor: Arc<dyn DetailExtractor>,
    resolver: Arc<PhoneResolver>,
    repo: Arc<dyn CarRepository>,
    stats: Arc<RunStats>,
    retry: DetailRetryPolicy,
}

impl DetailTask {
    pub fn new(
        http: Arc<HttpClient>,
        extractor: Arc<dyn DetailExtractor>,
        resolver: Arc<PhoneResolver>,
        repo: Arc<dyn CarRepository>,
        stats: Arc<RunStats>,
        retry: DetailRetryPolicy,
    ) -> Self {
        Self {
            http,
            extractor,
            resolver,
            repo,
            stats,
            retry,
        }
    }

    /// Run the pipeline for one link and record its outcome.
    pub async fn process(&self, url: &str) {
        let outcome = self.process_inner(url).await;
        self.stats.add_processed();
        match outcome {
            TaskOutcome::Saved => self.stats.add_saved(),
            TaskOutcome::Duplicate => self.stats.add_skipped(1),
            TaskOutcome::Dropped => {}
        }
    }

    async fn process_inner(&self, url: &str) -> TaskOutcome {
        // The batched page check ran before this task was scheduled; another
        // writer may have stored the listing since. A hit is a skip.
        match self.repo.exists_by_url(url).await {
            Ok(true) => {
                debug!("Car with URL {} already exists in DB, skipping", url);
                return TaskOutcome::Duplicate;
            }
            Ok(false) => {}
            Err(e) => {
                // The insertion lock still guarantees uniqueness.
                warn!("Existence re-check failed for {}: {:#}", url, e);
            }
        }

        let Some(html) = self.fetch_detail_page(url).await else {
            return TaskOutcome::Dropped;
        };

        let details = match self.extractor.extract(&html, url) {
            Ok(details) => details,
            Err(e) => {
                error!("Extraction failed for {}: {:#}", url, e);
                return TaskOutcome::Dropped;
            }
        };

        if details.removed {
            info!("Listing removed, skipping: {}", url);
            return TaskOutcome::Dropped;
        }

        let Some(token) = details.phone_token.clone() else {
            error!("Failed to find hash/expires for phone on {}", url);
            return TaskOutcome::Dropped;
        };

        // A record without a verified phone is never persisted.
        let Some(phone) = self.resolver.resolve(url, &token).await else {
            error!("Phone not obtained, car will not be saved: {}", url);
            return TaskOutcome::Dropped;
        };

        let car = details.into_new_car(phone, Utc::now());
        match self.repo.insert_car(&car).await {
            Ok(InsertOutcome::Inserted(id)) => {
                info!("Saved car {} with ID {}", url, id);
                TaskOutcome::Saved
            }
            Ok(InsertOutcome::AlreadyExists) => TaskOutcome::Duplicate,
            Err(e) => {
                error!("Error saving car {}: {:#}", url, e);
                TaskOutcome::Dropped
            }
        }
    }

    async fn fetch_detail_page(&self, url: &str) -> Option<String> {
        for attempt in 1..=self.retry.max_attempts {
            match self.http.get_text(url).await {
                Ok(html) => return Some(html),
                Err(e) if attempt < self.retry.max_attempts => {
                    warn!(
                        "Attempt {} failed for {}: {}. Retrying in {:?}",
                        attempt, url, e, self.retry.delay
                    );
                    sleep(self.retry.delay).await;
                }
                Err(e) => {
                    error!(
                        "Failed to get HTML for URL {} after {} attempts: {}",
                        url, self.retry.max_attempts, e
                    );
                }
            }
        }
        None
    }
}
