//! Run-scoped crawl statistics
//!
//! Counters are shared by every concurrently scheduled detail task, so they
//! are atomics; Relaxed ordering is enough since they are tallies, not
//! synchronization.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Default)]
pub struct RunStats {
    processed: AtomicU32,
    saved: AtomicU32,
    skipped: AtomicU32,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// One admitted detail task finished, whatever its outcome.
    pub fn add_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_saved(&self) {
        self.saved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_skipped(&self, count: u32) {
        self.skipped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn summary(&self, pages: u32) -> CrawlSummary {
        CrawlSummary {
            processed: self.processed.load(Ordering::Relaxed),
            saved: self.saved.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            pages,
        }
    }
}

/// Final tallies of one crawl run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CrawlSummary {
    /// Detail tasks that ran to completion (saved, skipped or dropped).
    pub processed: u32,
    /// Newly persisted records.
    pub saved: u32,
    /// Listings skipped as duplicates at any dedup layer.
    pub skipped: u32,
    /// Catalog pages walked.
    pub pages: u32,
}

impl fmt::Display for CrawlSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pages: {}, processed: {}, saved: {}, skipped: {}",
            self.pages, self.processed, self.saved, self.skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_snapshots_counters() {
        let stats = RunStats::new();
        stats.add_processed();
        stats.add_processed();
        stats.add_saved();
        stats.add_skipped(3);

        let summary = stats.summary(2);
        assert_eq!(
            summary,
            CrawlSummary {
                processed: 2,
                saved: 1,
                skipped: 3,
                pages: 2
            }
        );
    }
}
