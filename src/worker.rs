//! Extraction worker: processes one chunk with one browser session.
//!
//! The session is launched when the chunk starts and released when it ends
//! (or when the worker bails out), amortizing Chromium startup across the
//! chunk while keeping sessions strictly per-worker. Found results are
//! flushed to the sink in batches and the ledger is marked only after a
//! flush succeeds, since marking first could lose a record to a crash between
//! the two steps and make it unrecoverable on resume.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use chromiumoxide::page::Page;
use log::{debug, error, info, warn};
use rand::Rng;
use tokio::sync::watch;

use crate::browser::{BrowserSession, wait_for_selector, with_page_timeout};
use crate::config::HarvestConfig;
use crate::error::FailureKind;
use crate::extractor::listing::RECORD_MARKER_SELECTOR;
use crate::extractor::{ListingExtractor, RecordExtractor};
use crate::ledger::DedupLedger;
use crate::record::{ExtractionResult, WorkItem};
use crate::sink::ResultSink;

/// What one chunk produced. Returned even when the chunk failed partway,
/// so already-flushed partial results are always accounted for.
#[derive(Debug, Default, Clone)]
pub struct ChunkOutcome {
    /// Found records committed to the sink.
    pub flushed: usize,
    /// Seeds that resolved to no record (expected in the sparse ID space).
    pub not_found: usize,
    /// Items skipped because the ledger already contained them.
    pub skipped: usize,
    /// Items abandoned after exhausting their retry budget.
    pub abandoned: usize,
    /// Set when the session died or the final flush was lost.
    pub failed: bool,
}

/// Exponential backoff for per-item retries, scaled by failure kind and
/// capped so a retry storm cannot stall a worker for minutes.
#[must_use]
pub fn backoff_delay(base: Duration, attempt: u32, kind: FailureKind) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt));
    let scaled = exp.mul_f64(kind.delay_multiplier());
    scaled.min(Duration::from_secs(30))
}

/// One worker per chunk dispatch. Releasing
/// its session at chunk end bounds memory growth from long-lived Chromium
/// processes.
pub struct ExtractionWorker {
    cfg: Arc<HarvestConfig>,
    ledger: Arc<DedupLedger>,
    sink: Arc<ResultSink>,
    cancel: watch::Receiver<bool>,
    extractor: ListingExtractor,
}

impl ExtractionWorker {
    #[must_use]
    pub fn new(
        cfg: Arc<HarvestConfig>,
        ledger: Arc<DedupLedger>,
        sink: Arc<ResultSink>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            cfg,
            ledger,
            sink,
            cancel,
            extractor: ListingExtractor,
        }
    }

    /// Process every item in the chunk, in order.
    pub async fn process_chunk(self, chunk_index: usize, chunk: Vec<WorkItem>) -> ChunkOutcome {
        let mut outcome = ChunkOutcome::default();

        let session = match BrowserSession::launch(
            self.cfg.headless(),
            self.cfg.chrome_data_dir().cloned(),
        )
        .await
        {
            Ok(session) => session,
            Err(e) => {
                error!("Chunk {chunk_index}: failed to launch browser session: {e:#}");
                outcome.failed = true;
                return outcome;
            }
        };
        let page = match session.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                error!("Chunk {chunk_index}: failed to open page: {e:#}");
                outcome.failed = true;
                session.close().await;
                return outcome;
            }
        };
        info!("Chunk {chunk_index}: session ready, {} items", chunk.len());

        let mut pending: Vec<ExtractionResult> = Vec::new();

        for item in &chunk {
            if *self.cancel.borrow() {
                info!("Chunk {chunk_index}: cancellation requested, stopping dispatch");
                break;
            }
            // The scheduler filters against the ledger before dispatch; this
            // re-check covers identifiers completed by a sibling worker since.
            if !self.ledger.should_attempt(&item.identifier) {
                debug!("Skipping already-committed identifier {}", item.identifier);
                outcome.skipped += 1;
                continue;
            }

            match self.extract_with_retry(&page, item).await {
                Ok(result) => {
                    if result.is_found() {
                        debug!("Extracted record {}", result.identifier);
                        pending.push(result);
                    } else {
                        debug!("No record at identifier {}", item.identifier);
                        outcome.not_found += 1;
                    }
                }
                Err(e) => {
                    let kind = FailureKind::classify(&e);
                    if kind.is_session_fatal() {
                        error!(
                            "Chunk {chunk_index}: session failure at identifier {}: {e:#}",
                            item.identifier
                        );
                        outcome.failed = true;
                        break;
                    }
                    warn!(
                        "Abandoning identifier {} after {} retries: {e:#}",
                        item.identifier,
                        self.cfg.max_item_retries()
                    );
                    outcome.abandoned += 1;
                }
            }

            if pending.len() >= self.cfg.flush_interval() {
                self.flush(&mut pending, &mut outcome).await;
            }
        }

        self.flush(&mut pending, &mut outcome).await;
        if !pending.is_empty() {
            error!(
                "Chunk {chunk_index}: {} extracted records could not be persisted",
                pending.len()
            );
            outcome.failed = true;
        }

        session.close().await;
        info!(
            "Chunk {chunk_index} done: {} flushed, {} not found, {} skipped, {} abandoned",
            outcome.flushed, outcome.not_found, outcome.skipped, outcome.abandoned
        );
        outcome
    }

    /// Attempt one item, retrying transient failures with backoff. Errors
    /// returned here have exhausted the retry budget or killed the session.
    async fn extract_with_retry(
        &self,
        page: &Page,
        item: &WorkItem,
    ) -> Result<ExtractionResult> {
        let mut attempt = 0;
        loop {
            match self.extract_once(page, item).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    let kind = FailureKind::classify(&e);
                    if !kind.is_retryable() || attempt >= self.cfg.max_item_retries() {
                        return Err(e);
                    }
                    let delay = backoff_delay(self.cfg.retry_base_delay(), attempt, kind);
                    warn!(
                        "Transient failure on identifier {} (attempt {}): {e:#}; retrying in {delay:?}",
                        item.identifier,
                        attempt + 1
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn extract_once(&self, page: &Page, item: &WorkItem) -> Result<ExtractionResult> {
        let load_timeout = self.cfg.load_timeout();

        with_page_timeout(
            async {
                page.goto(item.seed.as_str())
                    .await
                    .map(|_| ())
                    .map_err(|e| anyhow!("{e}"))
            },
            load_timeout,
            "Detail navigation",
        )
        .await?;
        with_page_timeout(
            async {
                page.wait_for_navigation()
                    .await
                    .map(|_| ())
                    .map_err(|e| anyhow!("{e}"))
            },
            load_timeout,
            "Detail page load",
        )
        .await?;

        // Absent markers within the wait window mean the seed points at
        // nothing, the normal case for most bulk IDs, not an error.
        if wait_for_selector(page, RECORD_MARKER_SELECTOR, self.cfg.detail_wait())
            .await
            .is_err()
        {
            return Ok(ExtractionResult::not_found(item));
        }

        // Brief settle pause so late-arriving dynamic content lands.
        let settle = rand::rng().random_range(1000..2000);
        tokio::time::sleep(Duration::from_millis(settle)).await;

        let html = page.content().await.map_err(|e| anyhow!("{e}"))?;
        match self.extractor.extract(&html) {
            Some(fields) => Ok(ExtractionResult::found(item, fields)),
            None => Ok(ExtractionResult::not_found(item)),
        }
    }

    /// Flush pending results, then mark the ledger. On a failed append the
    /// results stay pending for the next flush attempt.
    async fn flush(&self, pending: &mut Vec<ExtractionResult>, outcome: &mut ChunkOutcome) {
        if pending.is_empty() {
            return;
        }
        match self.sink.append(pending).await {
            Ok(()) => {
                for result in pending.iter() {
                    self.ledger.mark_done(&result.identifier);
                }
                outcome.flushed += pending.len();
                pending.clear();
            }
            Err(e) => {
                error!("Failed to flush {} results: {e:#}", pending.len());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let base = Duration::from_millis(500);
        assert_eq!(
            backoff_delay(base, 0, FailureKind::Network),
            Duration::from_millis(500)
        );
        assert_eq!(
            backoff_delay(base, 1, FailureKind::Network),
            Duration::from_millis(1000)
        );
        assert_eq!(
            backoff_delay(base, 2, FailureKind::Network),
            Duration::from_millis(2000)
        );
    }

    #[test]
    fn backoff_is_capped() {
        let base = Duration::from_millis(500);
        assert_eq!(
            backoff_delay(base, 20, FailureKind::Network),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn rate_limited_backoff_is_longer() {
        let base = Duration::from_millis(500);
        let network = backoff_delay(base, 1, FailureKind::Network);
        let limited = backoff_delay(base, 1, FailureKind::RateLimited);
        assert!(limited > network);
    }
}
