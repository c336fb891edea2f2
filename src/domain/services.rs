//! Domain service interfaces.

use anyhow::Result;

use crate::domain::car::ListingDetails;

/// Page-markup-specific field extraction, pluggable so that the crawl
/// pipeline stays independent of any one site's HTML structure.
///
/// Implementations are expected to log (not fail on) missing individual
/// fields and to flag removed listings via [`ListingDetails::removed`];
/// only unparseable input should produce an `Err`.
pub trait DetailExtractor: Send + Sync {
    fn extract(&self, html: &str, url: &str) -> Result<ListingDetails>;
}
