//! Catalog crawl orchestration
//!
//! `CatalogCrawler::run` walks the paginated catalog, filters discovered
//! links through both dedup layers, and spawns one semaphore-gated detail
//! task per surviving link as soon as its page is filtered — pagination and
//! detail fetching overlap. The run never fails: whatever happens, the
//! accumulated statistics are returned.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::detail_task::{DetailRetryPolicy, DetailTask};
use crate::application::stats::{CrawlSummary, RunStats};
use crate::domain::repositories::CarRepository;
use crate::domain::services::DetailExtractor;
use crate::infrastructure::config::Settings;
use crate::infrastructure::html_parser::{ListingPageParser, next_page_url};
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::phone::PhoneResolver;

/// Retry tuning for catalog page fetches.
#[derive(Debug, Clone)]
pub struct PageRetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Linear backoff: `base + step * attempt`.
    pub backoff_base: Duration,
    pub backoff_step: Duration,
}

impl Default for PageRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(5),
            backoff_step: Duration::from_secs(5),
        }
    }
}

/// Limits and tuning for one crawl run.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Simultaneous detail fetches.
    pub concurrency: usize,
    /// Catalog page cap, 0 = unbounded.
    pub max_pages: u32,
    /// Cap on discovered-plus-skipped listings, 0 = unbounded. Already
    /// scheduled tasks are not cancelled when the cap is reached.
    pub max_cars: u32,
    /// Pause between catalog page fetches.
    pub page_delay: Duration,
    pub page_retry: PageRetryPolicy,
    pub detail_retry: DetailRetryPolicy,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_pages: 0,
            max_cars: 0,
            page_delay: Duration::from_secs(1),
            page_retry: PageRetryPolicy::default(),
            detail_retry: DetailRetryPolicy::default(),
        }
    }
}

impl CrawlOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        let retry = &settings.retry;
        Self {
            concurrency: settings.concurrency,
            max_pages: settings.max_pages_to_parse,
            max_cars: settings.max_cars_to_process,
            page_delay: Duration::from_millis(retry.page_delay_ms),
            page_retry: PageRetryPolicy {
                max_attempts: retry.page_max_attempts,
                backoff_base: Duration::from_secs(retry.page_backoff_base_secs),
                backoff_step: Duration::from_secs(retry.page_backoff_step_secs),
            },
            detail_retry: DetailRetryPolicy {
                max_attempts: retry.detail_max_attempts,
                delay: Duration::from_secs(retry.detail_delay_secs),
            },
        }
    }
}

/// Crawl orchestrator for one catalog.
pub struct CatalogCrawler {
    http: Arc<HttpClient>,
    extractor: Arc<dyn DetailExtractor>,
    resolver: Arc<PhoneResolver>,
    repo: Arc<dyn CarRepository>,
    parser: ListingPageParser,
    options: CrawlOptions,
}

impl CatalogCrawler {
    pub fn new(
        http: Arc<HttpClient>,
        extractor: Arc<dyn DetailExtractor>,
        resolver: Arc<PhoneResolver>,
        repo: Arc<dyn CarRepository>,
        options: CrawlOptions,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            http,
            extractor,
            resolver,
            repo,
            parser: ListingPageParser::new()?,
            options,
        })
    }

    /// Run one crawl from `start_url` to catalog exhaustion or a configured
    /// limit. Always returns the accumulated statistics, degraded if the
    /// walk ended early.
    pub async fn run(&self, start_url: &str) -> CrawlSummary {
        let run_id = Uuid::new_v4();
        info!("Starting crawl {} from {}", run_id, start_url);

        let stats = Arc::new(RunStats::new());
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency));
        let task = DetailTask::new(
            Arc::clone(&self.http),
            Arc::clone(&self.extractor),
            Arc::clone(&self.resolver),
            Arc::clone(&self.repo),
            Arc::clone(&stats),
            self.options.detail_retry.clone(),
        );

        let mut seen: HashSet<String> = HashSet::new();
        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        // Counts both scheduled and store-skipped links against max_cars.
        let mut links_accounted: u32 = 0;
        let mut pages_walked: u32 = 0;
        let mut cursor = Some(start_url.to_string());

        'walk: while let Some(page_url) = cursor.take() {
            if self.options.max_pages > 0 && pages_walked >= self.options.max_pages {
                info!("Reached limit of {} pages", self.options.max_pages);
                break;
            }

            let Some(html) = self.fetch_catalog_page(&page_url).await else {
                break;
            };
            pages_walked += 1;

            let links = self.parser.extract_links(&html, &page_url);
            if links.is_empty() {
                info!("No ads found on {}. Reached end of list", page_url);
                break;
            }
            info!("Found {} links on page {}", links.len(), pages_walked);

            // The advance is speculative; only a later empty page proves the
            // catalog exhausted.
            let next = match next_page_url(&page_url) {
                Ok(next) => next,
                Err(e) => {
                    error!("Cannot compute next page after {}: {:#}", page_url, e);
                    break;
                }
            };

            // Dedup layer 1: links already seen this run.
            let fresh: Vec<String> = links
                .into_iter()
                .filter(|link| seen.insert(link.clone()))
                .collect();

            // Dedup layer 2: one batched store check per page.
            let existing = match self.repo.filter_existing(&fresh).await {
                Ok(existing) => existing,
                Err(e) => {
                    warn!("Batch URL check failed, treating links as new: {:#}", e);
                    HashSet::new()
                }
            };
            if !existing.is_empty() {
                info!("Found {} URLs that already exist in DB", existing.len());
                stats.add_skipped(existing.len() as u32);
            }

            for link in fresh {
                if self.options.max_cars > 0 && links_accounted >= self.options.max_cars {
                    info!(
                        "Reached limit of {} URLs (processed + skipped)",
                        self.options.max_cars
                    );
                    break 'walk;
                }
                links_accounted += 1;

                if existing.contains(&link) {
                    continue;
                }

                let task = task.clone();
                let semaphore = Arc::clone(&semaphore);
                handles.push(tokio::spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return;
                    };
                    task.process(&link).await;
                }));
            }

            cursor = Some(next);
            sleep(self.options.page_delay).await;
        }

        if !handles.is_empty() {
            info!("Waiting for {} detail tasks to finish", handles.len());
            join_all(handles).await;
        }

        let summary = stats.summary(pages_walked);
        info!("Crawl {} completed. {}", run_id, summary);
        summary
    }

    /// Fetch one catalog page, retrying transient server errors with linear
    /// backoff. `None` ends the walk early; statistics gathered so far are
    /// preserved by the caller.
    async fn fetch_catalog_page(&self, url: &str) -> Option<String> {
        let policy = &self.options.page_retry;
        for attempt in 1..=policy.max_attempts {
            match self.http.get_text(url).await {
                Ok(html) => return Some(html),
                Err(e) if e.is_server_error() && attempt < policy.max_attempts => {
                    let wait = policy.backoff_base + policy.backoff_step * attempt;
                    warn!(
                        "Server error for {} (attempt {}/{}), retrying in {:?}: {}",
                        url, attempt, policy.max_attempts, wait, e
                    );
                    sleep(wait).await;
                }
                Err(e) => {
                    error!("Failed to get HTML for URL {}: {}", url, e);
                    return None;
                }
            }
        }
        error!("All attempts exhausted for getting HTML for URL {}", url);
        None
    }
}
