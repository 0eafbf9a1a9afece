//! Integrity digest records and verification report types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Stored horizontal digest (DVH) for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct HorizontalDigest {
    pub table_name: String,
    pub record_id: i64,
    pub digest: String,
}

/// How a record or column failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Live record or populated column without a stored digest.
    MissingDigest,
    /// Record fields no longer match the stored digest.
    Modified,
    /// Stored digest references a record that no longer exists.
    Deleted,
    /// Column values no longer match the stored vertical digest.
    ColumnTampered,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::MissingDigest => "missing_digest",
            ViolationKind::Modified => "modified",
            ViolationKind::Deleted => "deleted",
            ViolationKind::ColumnTampered => "column_tampered",
        }
    }
}

/// One integrity violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub table: String,
    /// Record id for horizontal checks, column name for vertical checks.
    pub record_or_column: String,
    pub kind: ViolationKind,
}

impl Violation {
    pub fn record(table: &str, record_id: i64, kind: ViolationKind) -> Self {
        Self {
            table: table.to_string(),
            record_or_column: record_id.to_string(),
            kind,
        }
    }

    pub fn column(table: &str, column: &str, kind: ViolationKind) -> Self {
        Self {
            table: table.to_string(),
            record_or_column: column.to_string(),
            kind,
        }
    }
}

/// A table whose verification could not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableError {
    pub table: String,
    pub message: String,
}

/// Aggregated result of verifying every tracked table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub violations: Vec<Violation>,
    pub errors: Vec<TableError>,
    pub checked_utc: DateTime<Utc>,
}

impl IntegrityReport {
    pub fn new(violations: Vec<Violation>, errors: Vec<TableError>) -> Self {
        Self {
            valid: violations.is_empty() && errors.is_empty(),
            violations,
            errors,
            checked_utc: Utc::now(),
        }
    }
}

/// Counts written by one recalculation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalculationSummary {
    pub tables: usize,
    pub horizontal_digests: usize,
    pub vertical_digests: usize,
}
