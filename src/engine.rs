//! Top-level run orchestration for the bulk, sequential and manual paths.
//!
//! Failures are contained at the smallest unit that can absorb them
//! (item -> chunk -> combination -> run); only conditions that prevent the
//! run from starting at all (no browser runtime, unusable sink) produce
//! an `error` report.

use std::path::Path;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::watch;

use crate::browser::{self, BrowserSession};
use crate::config::HarvestConfig;
use crate::extractor::{ListingExtractor, RecordExtractor};
use crate::frontier::{self, Frontier};
use crate::ledger::DedupLedger;
use crate::pagination::PaginationDriver;
use crate::record::{ExtractionResult, RunReport, WorkItem};
use crate::scheduler;
use crate::sink::ResultSink;
use crate::worker::{ChunkOutcome, ExtractionWorker};

/// Sweep the inclusive identifier range `[start_id, end_id]`.
pub async fn run_bulk(
    cfg: &HarvestConfig,
    start_id: u64,
    end_id: u64,
    cancel: watch::Receiver<bool>,
) -> RunReport {
    if start_id > end_id {
        return RunReport::error(format!(
            "start_id {start_id} is greater than end_id {end_id}"
        ));
    }

    let (sink, ledger) = match open_sink_and_ledger(cfg).await {
        Ok(pair) => pair,
        Err(report) => return report,
    };

    let items: Vec<WorkItem> = frontier::bulk_items(start_id, end_id, cfg.detail_url_template())
        .filter(|item| ledger.should_attempt(&item.identifier))
        .collect();
    let range_len = (end_id - start_id + 1) as usize;
    info!(
        "Bulk frontier: {} of {range_len} identifiers to attempt ({} already committed)",
        items.len(),
        range_len - items.len()
    );
    if items.is_empty() {
        return RunReport::warning(
            format!("all {range_len} identifiers in range already committed; nothing to do"),
            0,
        );
    }

    let chunks = scheduler::partition(items, cfg.chunk_size());
    let outcomes = scheduler::run_chunks(
        Arc::new(cfg.clone()),
        chunks,
        ledger,
        sink,
        cancel.clone(),
    )
    .await;

    finalize_report(&outcomes, 0, *cancel.borrow())
}

/// Crawl every (category, locality) combination, then extract the merged
/// frontier.
pub async fn run_sequential(
    cfg: &HarvestConfig,
    categories: &[String],
    localities: &[String],
    cancel: watch::Receiver<bool>,
) -> RunReport {
    let (sink, ledger) = match open_sink_and_ledger(cfg).await {
        Ok(pair) => pair,
        Err(report) => return report,
    };

    let combos = frontier::combinations(categories, localities);
    info!("Sequential crawl over {} combinations", combos.len());

    let mut frontier = Frontier::new();
    let mut unmatched_filters = 0u32;
    let mut session: Option<BrowserSession> = None;

    for combo in &combos {
        if *cancel.borrow() {
            warn!("Cancellation requested; skipping remaining combinations");
            break;
        }

        if session.is_none() {
            match BrowserSession::launch(cfg.headless(), cfg.chrome_data_dir().cloned()).await {
                Ok(launched) => session = Some(launched),
                Err(e) => {
                    error!("Could not launch discovery session: {e:#}");
                    break;
                }
            }
        }
        let Some(live_session) = session.as_ref() else {
            break;
        };

        match live_session.new_page("about:blank").await {
            Ok(page) => {
                let outcome = PaginationDriver::new(cfg, combo.clone())
                    .discover(&page)
                    .await;
                unmatched_filters += outcome.unmatched_filters;
                let session_failed = outcome.aborted.is_some();
                let added = frontier.merge(outcome.items);
                info!(
                    "Merged {added} new identifiers from ({}); frontier now {}",
                    combo.label(),
                    frontier.len()
                );
                if session_failed {
                    // The session may be wedged; start fresh for the next
                    // combination. The partial set above is already merged.
                    if let Some(dead) = session.take() {
                        dead.close().await;
                    }
                }
            }
            Err(e) => {
                warn!(
                    "Combination ({}) aborted: could not open page: {e:#}",
                    combo.label()
                );
                if let Some(dead) = session.take() {
                    dead.close().await;
                }
            }
        }
    }
    if let Some(live_session) = session.take() {
        live_session.close().await;
    }

    if frontier.is_empty() {
        return RunReport::warning(
            format!(
                "no identifiers discovered across {} combinations ({unmatched_filters} filters unmatched)",
                combos.len()
            ),
            0,
        );
    }

    let items: Vec<WorkItem> = frontier
        .into_items()
        .into_iter()
        .filter(|item| ledger.should_attempt(&item.identifier))
        .collect();
    if items.is_empty() {
        return RunReport::warning("all discovered identifiers already committed", 0);
    }
    info!("Sequential frontier: {} identifiers to attempt", items.len());

    let chunks = scheduler::partition(items, cfg.chunk_size());
    let outcomes = scheduler::run_chunks(
        Arc::new(cfg.clone()),
        chunks,
        ledger,
        sink,
        cancel.clone(),
    )
    .await;

    finalize_report(&outcomes, unmatched_filters, *cancel.borrow())
}

/// Extract a single listing from a live detail URL.
pub async fn run_manual_url(cfg: &HarvestConfig, url: &str) -> RunReport {
    let (sink, ledger) = match open_sink_and_ledger(cfg).await {
        Ok(pair) => pair,
        Err(report) => return report,
    };

    let identifier = match identifier_from_url(url) {
        Some(id) => id,
        None => {
            warn!("URL carries no id parameter; using the URL itself as identifier");
            url.to_string()
        }
    };
    if !ledger.should_attempt(&identifier) {
        return RunReport::warning(format!("identifier {identifier} already committed"), 0);
    }

    let item = WorkItem::new(identifier, url);
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let worker = ExtractionWorker::new(Arc::new(cfg.clone()), ledger, sink, cancel_rx);
    let outcome = worker.process_chunk(0, vec![item]).await;

    if outcome.failed {
        RunReport::error("manual extraction failed; see log for details")
    } else if outcome.flushed == 1 {
        RunReport::success("1 record committed", 1)
    } else {
        RunReport::warning("no record found at the given URL", 0)
    }
}

/// Extract a single listing from a locally saved page. Pure file I/O, no
/// browser session is involved.
pub async fn run_manual_file(cfg: &HarvestConfig, path: &Path) -> RunReport {
    let html = match tokio::fs::read_to_string(path).await {
        Ok(html) => html,
        Err(e) => return RunReport::error(format!("could not read {}: {e}", path.display())),
    };

    let sink = match ResultSink::open(cfg.output()).await {
        Ok(sink) => sink,
        Err(e) => return RunReport::error(format!("could not open output target: {e:#}")),
    };

    let identifier = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let item = WorkItem::new(identifier, format!("file://{}", path.display()));

    match ListingExtractor.extract(&html) {
        Some(fields) => {
            let result = ExtractionResult::found(&item, fields);
            match sink.append(&[result]).await {
                Ok(()) => RunReport::success("1 record committed", 1),
                Err(e) => RunReport::error(format!("could not persist record: {e:#}")),
            }
        }
        None => RunReport::warning("file does not contain a recognizable record", 0),
    }
}

/// Resolve the browser runtime, open the sink and load the dedup ledger.
/// Any failure here means no worker could proceed, so the run aborts with a
/// fatal report before any work is scheduled.
async fn open_sink_and_ledger(
    cfg: &HarvestConfig,
) -> Result<(Arc<ResultSink>, Arc<DedupLedger>), RunReport> {
    if let Err(e) = browser::resolve_browser().await {
        return Err(RunReport::error(format!(
            "no browser runtime available: {e:#}"
        )));
    }

    let sink = match ResultSink::open(cfg.output()).await {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            return Err(RunReport::error(format!(
                "could not open output target: {e:#}"
            )));
        }
    };

    let snapshot = match sink.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            return Err(RunReport::error(format!(
                "could not load dedup snapshot: {e:#}"
            )));
        }
    };
    info!("Dedup ledger loaded with {} identifiers", snapshot.len());
    let ledger = Arc::new(DedupLedger::load(snapshot, cfg.force_rescrape()));

    Ok((sink, ledger))
}

fn identifier_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.into_owned())
        .filter(|id| !id.is_empty())
}

/// Collapse chunk outcomes into the terminal report.
fn finalize_report(
    outcomes: &[ChunkOutcome],
    unmatched_filters: u32,
    cancelled: bool,
) -> RunReport {
    let records: usize = outcomes.iter().map(|o| o.flushed).sum();
    let not_found: usize = outcomes.iter().map(|o| o.not_found).sum();
    let abandoned: usize = outcomes.iter().map(|o| o.abandoned).sum();
    let skipped: usize = outcomes.iter().map(|o| o.skipped).sum();
    let failed_chunks = outcomes.iter().filter(|o| o.failed).count();

    let mut message = format!(
        "{records} records committed, {not_found} not found, {skipped} skipped, {abandoned} abandoned"
    );
    if failed_chunks > 0 {
        message.push_str(&format!(", {failed_chunks} chunks failed"));
    }
    if unmatched_filters > 0 {
        message.push_str(&format!(", {unmatched_filters} filters unmatched"));
    }

    if cancelled {
        RunReport::warning(format!("cancelled: {message}"), records)
    } else if records == 0 {
        RunReport::warning(format!("completed with zero records: {message}"), records)
    } else if unmatched_filters > 0 {
        RunReport::warning(message, records)
    } else {
        RunReport::success(message, records)
    }
}
