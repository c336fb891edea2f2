//! Repository interfaces for car persistence
//!
//! Contains trait definitions for data access. The crawl pipeline only
//! depends on this seam, so storage backends (and test doubles) are
//! interchangeable.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

use crate::domain::car::NewCar;

/// Outcome of a dedup-safe insertion attempt.
///
/// `AlreadyExists` is a normal result, never an error: it covers both the
/// in-transaction re-check and the unique-violation fallback path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was inserted; carries its identifier.
    Inserted(i64),
    /// A row with the same url or VIN already existed (or won the race).
    AlreadyExists,
}

#[async_trait]
pub trait CarRepository: Send + Sync {
    /// Single-URL existence probe, used by detail tasks immediately before
    /// fetching to close the race window left by the batched page check.
    async fn exists_by_url(&self, url: &str) -> Result<bool>;

    /// Batched existence check for all links discovered on one catalog
    /// page. Returns the subset of `urls` that is already stored.
    async fn filter_existing(&self, urls: &[String]) -> Result<HashSet<String>>;

    /// Insert a record under the at-most-one-per-url / at-most-one-per-VIN
    /// invariant, safe against concurrent writers.
    async fn insert_car(&self, car: &NewCar) -> Result<InsertOutcome>;
}
