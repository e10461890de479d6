//! Type-safe builder for `HarvestConfig` using the typestate pattern
//!
//! The output target is the one field without a safe default (writing to an
//! implicit location would silently scatter data), so `build()` is only
//! available once `output()` has been called.

use std::marker::PhantomData;
use std::path::PathBuf;

use anyhow::{Result, anyhow};

use super::types::HarvestConfig;
use crate::sink::OutputTarget;

/// Type state: the output target has been provided.
pub struct WithOutput;

pub struct HarvestConfigBuilder<State = ()> {
    base_url: String,
    detail_url_template: String,
    search_url: String,
    output: Option<OutputTarget>,
    chunk_size: usize,
    worker_count: usize,
    headless: bool,
    force_rescrape: bool,
    stall_threshold: u32,
    max_load_more_rounds: u32,
    load_timeout_secs: u64,
    detail_wait_secs: u64,
    max_item_retries: u32,
    retry_base_delay_ms: u64,
    flush_interval: usize,
    click_delay_ms: u64,
    chrome_data_dir: Option<PathBuf>,
    _phantom: PhantomData<State>,
}

impl Default for HarvestConfigBuilder<()> {
    fn default() -> Self {
        let defaults = HarvestConfig::default();
        Self {
            base_url: defaults.base_url,
            detail_url_template: defaults.detail_url_template,
            search_url: defaults.search_url,
            output: None,
            chunk_size: defaults.chunk_size,
            worker_count: defaults.worker_count,
            headless: defaults.headless,
            force_rescrape: defaults.force_rescrape,
            stall_threshold: defaults.stall_threshold,
            max_load_more_rounds: defaults.max_load_more_rounds,
            load_timeout_secs: defaults.load_timeout_secs,
            detail_wait_secs: defaults.detail_wait_secs,
            max_item_retries: defaults.max_item_retries,
            retry_base_delay_ms: defaults.retry_base_delay_ms,
            flush_interval: defaults.flush_interval,
            click_delay_ms: defaults.click_delay_ms,
            chrome_data_dir: None,
            _phantom: PhantomData,
        }
    }
}

impl HarvestConfig {
    /// Create a builder for configuring a `HarvestConfig` with a fluent interface.
    #[must_use]
    pub fn builder() -> HarvestConfigBuilder<()> {
        HarvestConfigBuilder::default()
    }
}

impl<State> HarvestConfigBuilder<State> {
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn detail_url_template(mut self, template: impl Into<String>) -> Self {
        self.detail_url_template = template.into();
        self
    }

    #[must_use]
    pub fn search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = url.into();
        self
    }

    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    #[must_use]
    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    #[must_use]
    pub fn force_rescrape(mut self, force: bool) -> Self {
        self.force_rescrape = force;
        self
    }

    #[must_use]
    pub fn stall_threshold(mut self, threshold: u32) -> Self {
        self.stall_threshold = threshold;
        self
    }

    #[must_use]
    pub fn max_load_more_rounds(mut self, rounds: u32) -> Self {
        self.max_load_more_rounds = rounds;
        self
    }

    #[must_use]
    pub fn load_timeout_secs(mut self, secs: u64) -> Self {
        self.load_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn detail_wait_secs(mut self, secs: u64) -> Self {
        self.detail_wait_secs = secs;
        self
    }

    #[must_use]
    pub fn max_item_retries(mut self, retries: u32) -> Self {
        self.max_item_retries = retries;
        self
    }

    #[must_use]
    pub fn retry_base_delay_ms(mut self, millis: u64) -> Self {
        self.retry_base_delay_ms = millis;
        self
    }

    #[must_use]
    pub fn flush_interval(mut self, interval: usize) -> Self {
        self.flush_interval = interval;
        self
    }

    #[must_use]
    pub fn click_delay_ms(mut self, millis: u64) -> Self {
        self.click_delay_ms = millis;
        self
    }

    #[must_use]
    pub fn chrome_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.chrome_data_dir = Some(dir.into());
        self
    }
}

impl HarvestConfigBuilder<()> {
    /// Provide the output target, unlocking `build()`.
    #[must_use]
    pub fn output(self, target: OutputTarget) -> HarvestConfigBuilder<WithOutput> {
        HarvestConfigBuilder {
            base_url: self.base_url,
            detail_url_template: self.detail_url_template,
            search_url: self.search_url,
            output: Some(target),
            chunk_size: self.chunk_size,
            worker_count: self.worker_count,
            headless: self.headless,
            force_rescrape: self.force_rescrape,
            stall_threshold: self.stall_threshold,
            max_load_more_rounds: self.max_load_more_rounds,
            load_timeout_secs: self.load_timeout_secs,
            detail_wait_secs: self.detail_wait_secs,
            max_item_retries: self.max_item_retries,
            retry_base_delay_ms: self.retry_base_delay_ms,
            flush_interval: self.flush_interval,
            click_delay_ms: self.click_delay_ms,
            chrome_data_dir: self.chrome_data_dir,
            _phantom: PhantomData,
        }
    }
}

impl HarvestConfigBuilder<WithOutput> {
    /// Validate and build the final configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for zero-valued partitioning or termination
    /// parameters, which would stall or spin the engine.
    pub fn build(self) -> Result<HarvestConfig> {
        if self.chunk_size == 0 {
            return Err(anyhow!("chunk_size must be at least 1"));
        }
        if self.worker_count == 0 {
            return Err(anyhow!("worker_count must be at least 1"));
        }
        if self.stall_threshold == 0 {
            return Err(anyhow!("stall_threshold must be at least 1"));
        }
        if self.max_load_more_rounds == 0 {
            return Err(anyhow!("max_load_more_rounds must be at least 1"));
        }

        let output = self
            .output
            .ok_or_else(|| anyhow!("output target missing despite typestate"))?;

        Ok(HarvestConfig {
            base_url: self.base_url,
            detail_url_template: self.detail_url_template,
            search_url: self.search_url,
            output,
            chunk_size: self.chunk_size,
            worker_count: self.worker_count,
            headless: self.headless,
            force_rescrape: self.force_rescrape,
            stall_threshold: self.stall_threshold,
            max_load_more_rounds: self.max_load_more_rounds,
            load_timeout_secs: self.load_timeout_secs,
            detail_wait_secs: self.detail_wait_secs,
            max_item_retries: self.max_item_retries,
            retry_base_delay_ms: self.retry_base_delay_ms,
            flush_interval: self.flush_interval,
            click_delay_ms: self.click_delay_ms,
            chrome_data_dir: self.chrome_data_dir,
        })
    }
}
