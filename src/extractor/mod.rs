//! Record extraction from rendered detail pages.

pub mod listing;

pub use listing::ListingExtractor;

use crate::record::ListingRecord;

/// Maps one rendered page to zero-or-one structured record.
///
/// Implementations are pure functions of the page HTML: the worker fetches
/// the rendered DOM once and hands it over, so extraction logic stays
/// testable without a browser.
pub trait RecordExtractor: Send + Sync {
    /// Returns `None` when the page does not contain a recognizable record.
    fn extract(&self, html: &str) -> Option<ListingRecord>;
}
