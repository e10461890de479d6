//! Append-only CSV sink.
//!
//! The file is the durable store the original pipeline feeds downstream, so
//! the layout is fixed: `identifier,seed_url,extracted_at` followed by the
//! canonical field columns. The header is written exactly once, when the
//! file is first created.
//!
//! CSV cannot update rows in place, so upsert idempotence is enforced at
//! append time: identifiers already present in the file (or appended
//! earlier in this process) are skipped. Across independent processes the
//! skip set is best-effort: duplicate rows are possible and are collapsed
//! by `snapshot`, with downstream loaders taking the last row per
//! identifier.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use tokio::sync::Mutex;

use crate::record::{ExtractionResult, FIELD_KEYS};

fn header() -> Vec<&'static str> {
    let mut columns = vec!["identifier", "seed_url", "extracted_at"];
    columns.extend_from_slice(FIELD_KEYS);
    columns
}

/// CSV-backed result sink.
pub struct CsvSink {
    path: PathBuf,
    /// Identifiers known to be in the file. Guards both the write handle
    /// and the skip set, serializing appends from concurrent workers.
    written: Mutex<HashSet<String>>,
}

impl CsvSink {
    /// Open the sink, loading the identifiers already present so resumed
    /// runs and repeated appends stay idempotent.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let existing = if path.exists() {
            read_identifiers(path)?
        } else {
            HashSet::new()
        };
        if !existing.is_empty() {
            info!(
                "Resuming CSV sink {} with {} existing records",
                path.display(),
                existing.len()
            );
        }

        Ok(Self {
            path: path.to_path_buf(),
            written: Mutex::new(existing),
        })
    }

    /// Append `Found` results not yet present, flushing before returning.
    pub async fn append(&self, results: &[ExtractionResult]) -> Result<()> {
        let mut written = self.written.lock().await;

        let fresh: Vec<&ExtractionResult> = results
            .iter()
            .filter(|r| r.is_found() && !written.contains(&r.identifier))
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }

        let needs_header =
            !self.path.exists() || std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0) == 0;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let mut writer = ::csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            writer
                .write_record(header())
                .context("Failed to write CSV header")?;
        }

        for result in &fresh {
            let mut row = vec![
                result.identifier.clone(),
                result.seed.clone(),
                result.extracted_at.to_rfc3339(),
            ];
            for key in FIELD_KEYS {
                row.push(result.fields.get(*key).cloned().unwrap_or_default());
            }
            writer
                .write_record(&row)
                .with_context(|| format!("Failed to write record {}", result.identifier))?;
        }
        writer.flush().context("Failed to flush CSV sink")?;

        let appended = fresh.len();
        for result in fresh {
            written.insert(result.identifier.clone());
        }
        debug!("Appended {appended} records to {}", self.path.display());
        Ok(())
    }

    /// Identifiers currently persisted in the file.
    pub async fn snapshot(&self) -> Result<HashSet<String>> {
        Ok(self.written.lock().await.clone())
    }
}

/// Scan the identifier column of an existing output file.
fn read_identifiers(path: &Path) -> Result<HashSet<String>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = ::csv::Reader::from_reader(file);
    let mut identifiers = HashSet::new();
    for record in reader.records() {
        let record = record.context("Malformed row in existing output file")?;
        if let Some(identifier) = record.get(0)
            && !identifier.is_empty()
        {
            identifiers.insert(identifier.to_string());
        }
    }
    Ok(identifiers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ListingRecord, WorkItem};

    fn sample(id: &str, name: &str) -> ExtractionResult {
        let item = WorkItem::new(id, format!("https://example.com/detail?id={id}"));
        let mut fields = ListingRecord::new();
        fields.insert("name".to_string(), name.to_string());
        ExtractionResult::found(&item, fields)
    }

    #[tokio::test]
    async fn append_twice_yields_same_durable_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.csv");
        let sink = CsvSink::open(&path).expect("open sink");

        let record = sample("5", "Acme");
        sink.append(std::slice::from_ref(&record)).await.expect("first append");
        sink.append(std::slice::from_ref(&record)).await.expect("second append");

        let snapshot = sink.snapshot().await.expect("snapshot");
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains("5"));

        // One header line plus exactly one data row on disk.
        let contents = std::fs::read_to_string(&path).expect("read file");
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn reopening_resumes_existing_identifiers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.csv");

        {
            let sink = CsvSink::open(&path).expect("open sink");
            sink.append(&[sample("1", "A"), sample("2", "B")])
                .await
                .expect("append");
        }

        let reopened = CsvSink::open(&path).expect("reopen sink");
        let snapshot = reopened.snapshot().await.expect("snapshot");
        assert_eq!(snapshot, HashSet::from(["1".to_string(), "2".to_string()]));

        // A later append must not repeat the header.
        reopened.append(&[sample("3", "C")]).await.expect("append");
        let contents = std::fs::read_to_string(&path).expect("read file");
        assert_eq!(contents.lines().count(), 4);
        assert_eq!(contents.matches("identifier").count(), 1);
    }

    #[tokio::test]
    async fn non_found_results_are_not_persisted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.csv");
        let sink = CsvSink::open(&path).expect("open sink");

        let item = WorkItem::new("9", "https://example.com/detail?id=9");
        sink.append(&[ExtractionResult::not_found(&item)])
            .await
            .expect("append");

        assert!(sink.snapshot().await.expect("snapshot").is_empty());
        assert!(!path.exists() || std::fs::read_to_string(&path).expect("read").is_empty());
    }
}
