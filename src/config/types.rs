//! Core configuration types for harvest runs.
//!
//! A `HarvestConfig` is built once per run and passed by reference (or
//! `Arc`) into every component. There is no global mutable state: the
//! config's lifetime is scoped to a single crawl invocation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::sink::OutputTarget;

/// Main configuration struct for harvest runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Site root, used to resolve relative detail links.
    pub(crate) base_url: String,

    /// Detail-URL template: the numeric identifier is appended verbatim.
    pub(crate) detail_url_template: String,

    /// Search page that hosts the growable result list.
    pub(crate) search_url: String,

    /// Where extracted records are appended (file, database, or both).
    pub(crate) output: OutputTarget,

    /// Maximum work items per chunk. The last chunk may be smaller.
    pub(crate) chunk_size: usize,

    /// Number of concurrent extraction workers. Each worker owns its own
    /// Chromium process for the lifetime of one chunk.
    pub(crate) worker_count: usize,

    pub(crate) headless: bool,

    /// Attempt identifiers even when the ledger already contains them.
    pub(crate) force_rescrape: bool,

    /// Consecutive no-growth checks before a pagination run terminates.
    pub(crate) stall_threshold: u32,

    /// Hard cap on "load more" rounds per combination. Safety valve against
    /// a page that keeps reporting growth without ever exhausting.
    pub(crate) max_load_more_rounds: u32,

    /// Timeout in seconds for page navigation and loading-indicator waits.
    pub(crate) load_timeout_secs: u64,

    /// Seconds to wait for the record markers on a detail page before
    /// classifying the item as `NotFound`.
    pub(crate) detail_wait_secs: u64,

    /// Per-item retry bound for transient failures.
    pub(crate) max_item_retries: u32,

    /// Base delay for exponential per-item backoff, in milliseconds.
    pub(crate) retry_base_delay_ms: u64,

    /// Found results are flushed to the sink (and the ledger marked) every
    /// this many records, and again at chunk end.
    pub(crate) flush_interval: usize,

    /// Base pause after a successful "load more" click, in milliseconds.
    /// Actual pauses are jittered around this value.
    pub(crate) click_delay_ms: u64,

    /// Optional fixed Chromium profile directory. When unset, each session
    /// creates (and removes) a unique temp profile.
    #[serde(skip)]
    pub(crate) chrome_data_dir: Option<PathBuf>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.guiacores.com.ar".to_string(),
            detail_url_template: "https://www.guiacores.com.ar/index.php?r=search/detail&id="
                .to_string(),
            search_url: "https://www.guiacores.com.ar/index.php?r=search%2Findex&b=&R=&L=&Tm=1"
                .to_string(),
            output: OutputTarget::File(PathBuf::from("data/listings.csv")),
            chunk_size: 100,
            worker_count: 4,
            headless: true,
            force_rescrape: false,
            stall_threshold: 3,
            max_load_more_rounds: 500,
            load_timeout_secs: 30,
            detail_wait_secs: 10,
            max_item_retries: 3,
            retry_base_delay_ms: 500,
            flush_interval: 25,
            click_delay_ms: 1000,
            chrome_data_dir: None,
        }
    }
}

impl HarvestConfig {
    /// Set a fixed Chromium profile directory for session isolation.
    #[must_use]
    pub fn with_chrome_data_dir(mut self, dir: PathBuf) -> Self {
        self.chrome_data_dir = Some(dir);
        self
    }

    /// Get the Chromium profile directory if configured.
    #[must_use]
    pub fn chrome_data_dir(&self) -> Option<&PathBuf> {
        self.chrome_data_dir.as_ref()
    }

    /// Build the deterministic detail URL for a numeric identifier.
    #[must_use]
    pub fn detail_url(&self, identifier: &str) -> String {
        format!("{}{identifier}", self.detail_url_template)
    }
}
