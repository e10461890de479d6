//! Cross-run deduplication ledger.
//!
//! A set of identifiers whose `Found` results are already committed to
//! durable storage. The ledger is loaded once per run from the sink's
//! snapshot and updated as workers flush; it is how a restarted run skips
//! everything it already captured.
//!
//! The snapshot is a point-in-time copy: two independent processes can both
//! attempt an identifier that completed in one after the other's snapshot
//! was taken. That is accepted best-effort dedup; the sink's upsert
//! contract absorbs the resulting at-least-once writes.

use std::collections::HashSet;

use dashmap::DashSet;

/// Concurrent set of completed identifiers, shared by all workers of a run.
#[derive(Debug, Default)]
pub struct DedupLedger {
    done: DashSet<String>,
    force_rescrape: bool,
}

impl DedupLedger {
    /// Empty ledger (fresh run with no prior output).
    #[must_use]
    pub fn new(force_rescrape: bool) -> Self {
        Self {
            done: DashSet::new(),
            force_rescrape,
        }
    }

    /// Build a ledger from the identifiers already present in durable
    /// storage.
    #[must_use]
    pub fn load(snapshot: HashSet<String>, force_rescrape: bool) -> Self {
        let done = DashSet::with_capacity(snapshot.len());
        for identifier in snapshot {
            done.insert(identifier);
        }
        Self {
            done,
            force_rescrape,
        }
    }

    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.done.contains(identifier)
    }

    /// Whether a work item should be attempted. False only when the
    /// identifier is already committed and the force override is off.
    #[must_use]
    pub fn should_attempt(&self, identifier: &str) -> bool {
        self.force_rescrape || !self.done.contains(identifier)
    }

    /// Record an identifier as committed. Call only after the matching
    /// results were appended to the sink (flush-then-mark).
    pub fn mark_done(&self, identifier: &str) {
        self.done.insert(identifier.to_string());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.done.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loaded_identifiers_are_not_attempted_again() {
        let snapshot: HashSet<String> = ["12".to_string(), "00034".to_string()].into();
        let ledger = DedupLedger::load(snapshot, false);

        assert!(ledger.contains("12"));
        assert!(!ledger.should_attempt("12"));
        // Identifiers compare as strings: "34" and "00034" are distinct.
        assert!(ledger.should_attempt("34"));
        assert!(ledger.should_attempt("99"));
    }

    #[test]
    fn mark_done_is_visible_to_later_checks() {
        let ledger = DedupLedger::new(false);
        assert!(ledger.should_attempt("5"));
        ledger.mark_done("5");
        assert!(!ledger.should_attempt("5"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn force_rescrape_overrides_the_ledger() {
        let snapshot: HashSet<String> = ["7".to_string()].into();
        let ledger = DedupLedger::load(snapshot, true);
        assert!(ledger.contains("7"));
        assert!(ledger.should_attempt("7"));
    }

    #[test]
    fn concurrent_marking_from_many_tasks() {
        use std::sync::Arc;

        let ledger = Arc::new(DedupLedger::new(false));
        let mut handles = Vec::new();
        for t in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    ledger.mark_done(&format!("{}", t * 100 + i));
                }
            }));
        }
        for handle in handles {
            handle.join().expect("marker thread should not panic");
        }
        assert_eq!(ledger.len(), 800);
    }
}
