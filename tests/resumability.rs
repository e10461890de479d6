//! Resume semantics across runs: an interrupted run plus a follow-up run
//! must cover exactly the same identifiers as a single uninterrupted run,
//! without re-attempting anything already committed.

use std::collections::HashSet;

use listascrape::frontier::bulk_items;
use listascrape::ledger::DedupLedger;
use listascrape::record::{ExtractionResult, ListingRecord, WorkItem};
use listascrape::scheduler::partition;
use listascrape::sink::{CsvSink, OutputTarget, ResultSink};

const TEMPLATE: &str = "https://example.com/index.php?r=search/detail&id=";

fn committed(item: &WorkItem) -> ExtractionResult {
    let mut fields = ListingRecord::new();
    fields.insert("name".to_string(), format!("Business {}", item.identifier));
    ExtractionResult::found(item, fields)
}

#[tokio::test]
async fn second_run_skips_committed_identifiers_and_completes_the_range() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("listings.csv");

    // First run: commits identifiers 1..=10, then is "interrupted".
    {
        let sink = CsvSink::open(&path).expect("open sink");
        let first_batch: Vec<ExtractionResult> = bulk_items(1, 10, TEMPLATE)
            .map(|item| committed(&item))
            .collect();
        sink.append(&first_batch).await.expect("first run flush");
    }

    // Second run: loads the snapshot, filters the frontier against it.
    let sink = CsvSink::open(&path).expect("reopen sink");
    let snapshot = sink.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.len(), 10);

    let ledger = DedupLedger::load(snapshot.clone(), false);
    let remaining: Vec<WorkItem> = bulk_items(1, 25, TEMPLATE)
        .filter(|item| ledger.should_attempt(&item.identifier))
        .collect();

    // Nothing from the committed subset reaches a worker.
    for item in &remaining {
        assert!(
            !snapshot.contains(&item.identifier),
            "identifier {} would be re-attempted",
            item.identifier
        );
    }
    assert_eq!(remaining.len(), 15);

    // The second run commits the rest; the union equals one full run.
    let second_batch: Vec<ExtractionResult> =
        remaining.iter().map(committed).collect();
    sink.append(&second_batch).await.expect("second run flush");

    let finished = sink.snapshot().await.expect("final snapshot");
    let expected: HashSet<String> = (1..=25).map(|id| id.to_string()).collect();
    assert_eq!(finished, expected);
}

#[tokio::test]
async fn ledger_filter_then_partition_covers_exactly_the_uncommitted_items() {
    let committed_ids: HashSet<String> = ["2", "4", "6", "8"]
        .into_iter()
        .map(str::to_string)
        .collect();
    let ledger = DedupLedger::load(committed_ids.clone(), false);

    let items: Vec<WorkItem> = bulk_items(1, 10, TEMPLATE)
        .filter(|item| ledger.should_attempt(&item.identifier))
        .collect();
    let chunks = partition(items, 4);

    assert_eq!(chunks.len(), 2); // ceil(6 / 4)
    let dispatched: HashSet<String> = chunks
        .iter()
        .flatten()
        .map(|item| item.identifier.clone())
        .collect();
    let expected: HashSet<String> = ["1", "3", "5", "7", "9", "10"]
        .into_iter()
        .map(str::to_string)
        .collect();
    assert_eq!(dispatched, expected);
    assert!(dispatched.is_disjoint(&committed_ids));
}

#[tokio::test]
async fn duplicate_attempts_do_not_duplicate_persisted_records() {
    // Two "processes" with the same snapshot both complete identifier 3.
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("listings.csv");

    let target = OutputTarget::File(path.clone());
    let sink_a = ResultSink::open(&target).await.expect("open sink a");
    let sink_b = ResultSink::open(&target).await.expect("open sink b");

    let item = WorkItem::new("3", format!("{TEMPLATE}3"));
    sink_a.append(&[committed(&item)]).await.expect("a flush");
    sink_b.append(&[committed(&item)]).await.expect("b flush");

    let merged = ResultSink::open(&target).await.expect("reopen");
    let snapshot = merged.snapshot().await.expect("snapshot");
    assert_eq!(snapshot, HashSet::from(["3".to_string()]));
}
