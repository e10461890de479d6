//! Durable result sinks.
//!
//! A sink has two jobs: `append` extracted records incrementally so partial
//! progress survives a crash, and `snapshot` the identifiers already
//! persisted so a run can resume without re-fetching. Appends must be
//! idempotent under identifier-keyed upsert: overlapping writes from
//! best-effort dedup may deliver the same record twice, and the second
//! write simply wins.

pub mod csv;
pub mod sqlite;

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use csv::CsvSink;
pub use sqlite::SqliteSink;

use crate::record::ExtractionResult;

/// Where a run's records go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputTarget {
    /// Append to a CSV file.
    File(PathBuf),
    /// Upsert into a SQLite database (connection URL, e.g.
    /// `sqlite://data/listings.db`).
    Database(String),
    /// Both of the above.
    Both { csv: PathBuf, database: String },
}

/// Concrete sink dispatch for the configured output target.
pub enum ResultSink {
    Csv(CsvSink),
    Sqlite(SqliteSink),
    Both(CsvSink, SqliteSink),
}

impl ResultSink {
    /// Open (and if necessary create) the configured sink(s).
    pub async fn open(target: &OutputTarget) -> Result<Self> {
        match target {
            OutputTarget::File(path) => Ok(Self::Csv(CsvSink::open(path)?)),
            OutputTarget::Database(url) => Ok(Self::Sqlite(SqliteSink::open(url).await?)),
            OutputTarget::Both { csv, database } => Ok(Self::Both(
                CsvSink::open(csv)?,
                SqliteSink::open(database).await?,
            )),
        }
    }

    /// Append `Found` results. Results with any other status are ignored;
    /// only committed records belong in durable storage.
    pub async fn append(&self, results: &[ExtractionResult]) -> Result<()> {
        match self {
            Self::Csv(csv) => csv.append(results).await,
            Self::Sqlite(db) => db.append(results).await,
            Self::Both(csv, db) => {
                csv.append(results).await?;
                db.append(results).await
            }
        }
    }

    /// Identifiers already persisted. For `Both`, the union: an identifier
    /// committed to either store counts as done.
    pub async fn snapshot(&self) -> Result<HashSet<String>> {
        match self {
            Self::Csv(csv) => csv.snapshot().await,
            Self::Sqlite(db) => db.snapshot().await,
            Self::Both(csv, db) => {
                let mut ids = csv.snapshot().await?;
                ids.extend(db.snapshot().await?);
                Ok(ids)
            }
        }
    }
}
