//! Core data types shared across the extraction pipeline.
//!
//! Everything here is plain data: work items produced by the frontier,
//! extraction results produced by workers, and the terminal run report
//! surfaced by the CLI and HTTP API.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical field keys for an extracted listing record.
///
/// The sink writes CSV columns and database columns in exactly this order,
/// so the set must stay stable across runs.
pub const FIELD_KEYS: &[&str] = &[
    "name",
    "address",
    "phones",
    "whatsapp",
    "website",
    "email",
    "facebook",
    "instagram",
    "hours",
    "categories",
    "description",
    "latitude",
    "longitude",
];

/// Extracted field map for one listing. Missing fields are simply absent.
pub type ListingRecord = BTreeMap<String, String>;

/// Where a work item was discovered (sequential mode only).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub category: Option<String>,
    pub locality: Option<String>,
}

/// One unit of extraction work.
///
/// Identity is `identifier`, compared as a normalized string: the engine
/// never relies on numeric equality since the source system may encode
/// leading zeros or mixed types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub identifier: String,
    /// Detail-page URL to navigate to.
    pub seed: String,
    #[serde(default)]
    pub origin: Origin,
}

impl WorkItem {
    #[must_use]
    pub fn new(identifier: impl Into<String>, seed: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            seed: seed.into(),
            origin: Origin::default(),
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }
}

/// Outcome classification for a single attempted item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    /// The seed resolved to a real listing and fields were extracted.
    Found,
    /// The seed does not correspond to a listing. Expected for most of the
    /// sparse bulk ID space; recorded but never retried or logged as error.
    NotFound,
    /// A page/session hiccup exhausted its retry budget.
    TransientError,
}

/// Immutable result of attempting one work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub identifier: String,
    pub seed: String,
    pub fields: ListingRecord,
    pub extracted_at: DateTime<Utc>,
    pub status: RecordStatus,
}

impl ExtractionResult {
    #[must_use]
    pub fn found(item: &WorkItem, fields: ListingRecord) -> Self {
        Self {
            identifier: item.identifier.clone(),
            seed: item.seed.clone(),
            fields,
            extracted_at: Utc::now(),
            status: RecordStatus::Found,
        }
    }

    #[must_use]
    pub fn not_found(item: &WorkItem) -> Self {
        Self {
            identifier: item.identifier.clone(),
            seed: item.seed.clone(),
            fields: ListingRecord::new(),
            extracted_at: Utc::now(),
            status: RecordStatus::NotFound,
        }
    }

    #[must_use]
    pub fn is_found(&self) -> bool {
        self.status == RecordStatus::Found
    }
}

/// Terminal status of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Work completed and all expected items were attempted.
    Success,
    /// Completed, but zero records were produced, some filters went
    /// unmatched, or the run was cancelled partway.
    Warning,
    /// The run could not start or hit a fatal configuration/runtime issue.
    Error,
}

/// Structured report returned by every top-level run.
///
/// The CLI maps this to an exit code and the HTTP API returns it verbatim
/// as the response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub message: String,
    pub records_processed: usize,
}

impl RunReport {
    #[must_use]
    pub fn success(message: impl Into<String>, records_processed: usize) -> Self {
        Self {
            status: RunStatus::Success,
            message: message.into(),
            records_processed,
        }
    }

    #[must_use]
    pub fn warning(message: impl Into<String>, records_processed: usize) -> Self {
        Self {
            status: RunStatus::Warning,
            message: message.into(),
            records_processed,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            message: message.into(),
            records_processed: 0,
        }
    }

    /// Success and warning both exit 0; only a fatal run exits 1.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self.status {
            RunStatus::Success | RunStatus::Warning => 0,
            RunStatus::Error => 1,
        }
    }
}
