//! SQLite sink with identifier-keyed upsert.
//!
//! The table is created on open. Appends use `ON CONFLICT .. DO UPDATE`,
//! so replayed or overlapping writes settle on the last write per
//! identifier, the exact contract the best-effort dedup ledger relies on.

use std::collections::HashSet;
use std::str::FromStr;

use anyhow::{Context, Result};
use log::debug;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::record::{ExtractionResult, FIELD_KEYS};

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS listings (
    identifier TEXT PRIMARY KEY,
    seed_url TEXT NOT NULL,
    extracted_at TEXT NOT NULL,
    name TEXT,
    address TEXT,
    phones TEXT,
    whatsapp TEXT,
    website TEXT,
    email TEXT,
    facebook TEXT,
    instagram TEXT,
    hours TEXT,
    categories TEXT,
    description TEXT,
    latitude TEXT,
    longitude TEXT
)";

const UPSERT_SQL: &str = "INSERT INTO listings (
    identifier, seed_url, extracted_at,
    name, address, phones, whatsapp, website, email, facebook,
    instagram, hours, categories, description, latitude, longitude
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT(identifier) DO UPDATE SET
    seed_url = excluded.seed_url,
    extracted_at = excluded.extracted_at,
    name = excluded.name,
    address = excluded.address,
    phones = excluded.phones,
    whatsapp = excluded.whatsapp,
    website = excluded.website,
    email = excluded.email,
    facebook = excluded.facebook,
    instagram = excluded.instagram,
    hours = excluded.hours,
    categories = excluded.categories,
    description = excluded.description,
    latitude = excluded.latitude,
    longitude = excluded.longitude";

/// SQLite-backed result sink.
pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    /// Connect and ensure the listings table exists.
    ///
    /// Accepts a sqlx URL (`sqlite://path/to.db`) or a bare filesystem path.
    pub async fn open(url: &str) -> Result<Self> {
        let options = if url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(url)
                .with_context(|| format!("Invalid database URL: {url}"))?
        } else {
            SqliteConnectOptions::new().filename(url)
        }
        .create_if_missing(true);

        if let Some(parent) = std::path::Path::new(url.trim_start_matches("sqlite://")).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {url}"))?;

        sqlx::query(CREATE_TABLE_SQL)
            .execute(&pool)
            .await
            .context("Failed to create listings table")?;

        Ok(Self { pool })
    }

    /// Upsert `Found` results in a single transaction.
    pub async fn append(&self, results: &[ExtractionResult]) -> Result<()> {
        let found: Vec<&ExtractionResult> = results.iter().filter(|r| r.is_found()).collect();
        if found.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin append transaction")?;
        for result in &found {
            let mut query = sqlx::query(UPSERT_SQL)
                .bind(&result.identifier)
                .bind(&result.seed)
                .bind(result.extracted_at.to_rfc3339());
            for key in FIELD_KEYS {
                query = query.bind(result.fields.get(*key).cloned());
            }
            query
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to upsert record {}", result.identifier))?;
        }
        tx.commit().await.context("Failed to commit append")?;

        debug!("Upserted {} records", found.len());
        Ok(())
    }

    /// Identifiers already present in the table.
    pub async fn snapshot(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT identifier FROM listings")
            .fetch_all(&self.pool)
            .await
            .context("Failed to read ledger snapshot")?;
        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("identifier")
                    .context("listings row missing identifier")
            })
            .collect()
    }
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
    async fn upsert_is_idempotent_with_last_write_winning() {
        let sink = SqliteSink::open("sqlite::memory:").await.expect("open db");

        sink.append(&[sample("5", "Old Name")]).await.expect("first");
        sink.append(&[sample("5", "New Name")]).await.expect("second");

        let snapshot = sink.snapshot().await.expect("snapshot");
        assert_eq!(snapshot.len(), 1);

        let row = sqlx::query("SELECT name FROM listings WHERE identifier = '5'")
            .fetch_one(&sink.pool)
            .await
            .expect("row present");
        let name: String = row.try_get("name").expect("name column");
        assert_eq!(name, "New Name");
    }

    #[tokio::test]
    async fn snapshot_reflects_all_committed_identifiers() {
        let sink = SqliteSink::open("sqlite::memory:").await.expect("open db");
        sink.append(&[sample("1", "A"), sample("2", "B"), sample("3", "C")])
            .await
            .expect("append");

        let snapshot = sink.snapshot().await.expect("snapshot");
        assert_eq!(
            snapshot,
            HashSet::from(["1".to_string(), "2".to_string(), "3".to_string()])
        );
    }
}
