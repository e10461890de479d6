//! listascrape: resumable, deduplicating extraction engine for paginated,
//! JavaScript-rendered business directories.
//!
//! Two acquisition strategies share one engine: a linear sweep over a
//! numeric identifier space (`engine::run_bulk`) and a filter-driven crawl
//! that exhausts a "load more" result list per (category, locality)
//! combination (`engine::run_sequential`). Both resume across runs via the
//! sink-backed dedup ledger and partition work across browser-owning
//! workers with partial-result durability.

pub mod browser;
pub mod config;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod frontier;
pub mod ledger;
pub mod pagination;
pub mod record;
pub mod scheduler;
pub mod sink;
pub mod worker;

pub use config::HarvestConfig;
pub use error::{FailureKind, HarvestError, HarvestResult};
pub use extractor::{ListingExtractor, RecordExtractor};
pub use frontier::{Combination, Frontier};
pub use ledger::DedupLedger;
pub use pagination::{DiscoveryOutcome, PaginationDriver, PaginationState};
pub use record::{ExtractionResult, RecordStatus, RunReport, RunStatus, WorkItem};
pub use sink::{OutputTarget, ResultSink};
pub use worker::{ChunkOutcome, ExtractionWorker};
