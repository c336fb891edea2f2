//! autoria-scraper - auto.ria.com listing crawler
//!
//! Walks the paginated search catalog, fetches every newly discovered
//! detail page under a concurrency gate, resolves the token-protected
//! seller phone number, and persists deduplicated records in PostgreSQL.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{CatalogCrawler, CrawlOptions, CrawlSummary};
pub use infrastructure::Settings;
