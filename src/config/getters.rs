//! Accessor methods for `HarvestConfig`.

use std::time::Duration;

use super::types::HarvestConfig;
use crate::sink::OutputTarget;

impl HarvestConfig {
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn detail_url_template(&self) -> &str {
        &self.detail_url_template
    }

    #[must_use]
    pub fn search_url(&self) -> &str {
        &self.search_url
    }

    #[must_use]
    pub fn output(&self) -> &OutputTarget {
        &self.output
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }

    #[must_use]
    pub fn force_rescrape(&self) -> bool {
        self.force_rescrape
    }

    #[must_use]
    pub fn stall_threshold(&self) -> u32 {
        self.stall_threshold
    }

    #[must_use]
    pub fn max_load_more_rounds(&self) -> u32 {
        self.max_load_more_rounds
    }

    #[must_use]
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    #[must_use]
    pub fn detail_wait(&self) -> Duration {
        Duration::from_secs(self.detail_wait_secs)
    }

    #[must_use]
    pub fn max_item_retries(&self) -> u32 {
        self.max_item_retries
    }

    #[must_use]
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    #[must_use]
    pub fn flush_interval(&self) -> usize {
        self.flush_interval
    }

    #[must_use]
    pub fn click_delay(&self) -> Duration {
        Duration::from_millis(self.click_delay_ms)
    }
}
