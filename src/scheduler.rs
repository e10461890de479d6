//! Chunk scheduler: partitions the frontier and dispatches a bounded pool
//! of extraction workers.
//!
//! Chunks complete in whatever order the pool finishes them; there is no
//! ordering guarantee across chunks, only in-order processing within each
//! worker's chunk. A failing chunk is logged and contributes whatever it
//! flushed before failing; siblings are never aborted.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use log::{error, info, warn};
use tokio::sync::{Semaphore, watch};

use crate::config::HarvestConfig;
use crate::ledger::DedupLedger;
use crate::record::WorkItem;
use crate::sink::ResultSink;
use crate::worker::{ChunkOutcome, ExtractionWorker};

/// Split work items into contiguous chunks of at most `chunk_size`.
///
/// Produces `ceil(N / chunk_size)` chunks that partition the input exactly:
/// nothing lost, nothing duplicated, the last chunk possibly smaller.
#[must_use]
pub fn partition(items: Vec<WorkItem>, chunk_size: usize) -> Vec<Vec<WorkItem>> {
    debug_assert!(chunk_size > 0);
    let mut chunks = Vec::with_capacity(items.len().div_ceil(chunk_size.max(1)));
    let mut current = Vec::with_capacity(chunk_size.min(items.len()));
    for item in items {
        current.push(item);
        if current.len() == chunk_size {
            chunks.push(std::mem::replace(
                &mut current,
                Vec::with_capacity(chunk_size),
            ));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Dispatch chunks to a fixed-size worker pool and collect outcomes as they
/// complete.
///
/// The semaphore bounds in-flight workers at `worker_count`; dispatch stops
/// early when the cancellation flag is raised, but workers already running
/// finish (or time out) naturally and their sessions are released.
pub async fn run_chunks(
    cfg: Arc<HarvestConfig>,
    chunks: Vec<Vec<WorkItem>>,
    ledger: Arc<DedupLedger>,
    sink: Arc<ResultSink>,
    cancel: watch::Receiver<bool>,
) -> Vec<ChunkOutcome> {
    let total = chunks.len();
    info!(
        "Dispatching {total} chunks across {} workers",
        cfg.worker_count()
    );

    let semaphore = Arc::new(Semaphore::new(cfg.worker_count()));
    let mut tasks = FuturesUnordered::new();

    for (index, chunk) in chunks.into_iter().enumerate() {
        if *cancel.borrow() {
            warn!(
                "Cancellation requested; not dispatching remaining {} chunks",
                total - index
            );
            break;
        }
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            error!("Worker pool semaphore closed unexpectedly");
            break;
        };

        let worker = ExtractionWorker::new(
            Arc::clone(&cfg),
            Arc::clone(&ledger),
            Arc::clone(&sink),
            cancel.clone(),
        );
        tasks.push(tokio::spawn(async move {
            let _permit = permit;
            worker.process_chunk(index, chunk).await
        }));
    }

    let mut outcomes = Vec::with_capacity(total);
    while let Some(joined) = tasks.next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                error!("Chunk worker panicked: {e}");
                outcomes.push(ChunkOutcome {
                    failed: true,
                    ..ChunkOutcome::default()
                });
            }
        }
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn items(n: usize) -> Vec<WorkItem> {
        (1..=n)
            .map(|i| WorkItem::new(i.to_string(), format!("https://example.com/detail?id={i}")))
            .collect()
    }

    #[test]
    fn partition_produces_ceil_n_over_c_chunks() {
        let chunks = partition(items(10), 3);
        assert_eq!(chunks.len(), 4);
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, [3, 3, 3, 1]);
    }

    #[test]
    fn partition_is_exact_no_loss_no_duplication() {
        let source = items(25);
        let expected: HashSet<String> = source.iter().map(|i| i.identifier.clone()).collect();

        let chunks = partition(source, 7);
        let mut seen = HashSet::new();
        for chunk in &chunks {
            for item in chunk {
                assert!(
                    seen.insert(item.identifier.clone()),
                    "identifier {} appeared in two chunks",
                    item.identifier
                );
            }
        }
        assert_eq!(seen, expected);
    }

    #[test]
    fn partition_of_exact_multiple_has_no_runt_chunk() {
        let chunks = partition(items(9), 3);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() == 3));
    }

    #[test]
    fn partition_of_empty_frontier_is_empty() {
        assert!(partition(Vec::new(), 5).is_empty());
    }

    #[test]
    fn partition_preserves_input_order_within_chunks() {
        let chunks = partition(items(5), 2);
        assert_eq!(chunks[0][0].identifier, "1");
        assert_eq!(chunks[0][1].identifier, "2");
        assert_eq!(chunks[2][0].identifier, "5");
    }
}
