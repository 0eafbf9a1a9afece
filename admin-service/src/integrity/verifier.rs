use std::collections::{HashMap, HashSet};
use tracing::instrument;

use super::{column_digest, IntegrityEngine, IntegrityError, RecordSnapshot, TrackedTable};
use crate::models::{HorizontalDigest, IntegrityReport, TableError, Violation, ViolationKind};
use crate::services::metrics::record_violation;

/// Compare live records of `table` with their stored horizontal digests.
///
/// Violations come out ordered by record id: live records first, then digests whose
/// record is gone.
pub fn verify_table(
    table: TrackedTable,
    live_records: &[RecordSnapshot],
    stored: &[HorizontalDigest],
) -> Vec<Violation> {
    let stored_by_id: HashMap<i64, &str> = stored
        .iter()
        .map(|d| (d.record_id, d.digest.as_str()))
        .collect();

    let mut live: Vec<&RecordSnapshot> = live_records.iter().collect();
    live.sort_by_key(|r| r.id);

    let mut violations = Vec::new();
    for record in &live {
        match stored_by_id.get(&record.id) {
            None => violations.push(Violation::record(
                table.name(),
                record.id,
                ViolationKind::MissingDigest,
            )),
            Some(expected) if *expected != record.digest() => violations.push(
                Violation::record(table.name(), record.id, ViolationKind::Modified),
            ),
            Some(_) => {}
        }
    }

    let live_ids: HashSet<i64> = live.iter().map(|r| r.id).collect();
    let mut deleted: Vec<i64> = stored
        .iter()
        .map(|d| d.record_id)
        .filter(|id| !live_ids.contains(id))
        .collect();
    deleted.sort_unstable();
    deleted.dedup();
    violations.extend(
        deleted
            .into_iter()
            .map(|id| Violation::record(table.name(), id, ViolationKind::Deleted)),
    );

    violations
}

/// Compare one column of `table` with its stored vertical digest.
///
/// An empty table without a stored digest is consistent: recalculation writes no
/// vertical digest for a table that has no rows.
pub fn verify_column(
    table: TrackedTable,
    column: &str,
    live_records: &[RecordSnapshot],
    stored: Option<&str>,
) -> Option<Violation> {
    match stored {
        None if live_records.is_empty() => None,
        None => Some(Violation::column(
            table.name(),
            column,
            ViolationKind::MissingDigest,
        )),
        Some(expected) if expected != column_digest(column, live_records) => Some(
            Violation::column(table.name(), column, ViolationKind::ColumnTampered),
        ),
        Some(_) => None,
    }
}

impl IntegrityEngine {
    /// Verify every tracked table.
    ///
    /// A table that cannot be read is reported in `errors`; the remaining tables are
    /// still verified.
    #[instrument(skip(self))]
    pub async fn verify_all(&self) -> IntegrityReport {
        let _shared = self.sweep_lock.read().await;

        let mut violations = Vec::new();
        let mut errors = Vec::new();
        for table in self.tables.iter().copied() {
            match self.verify_stored_table(table).await {
                Ok(found) => violations.extend(found),
                Err(e) => {
                    tracing::error!(table = %table, error = %e, "Integrity verification failed for table");
                    errors.push(TableError {
                        table: table.name().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        for violation in &violations {
            record_violation(violation.kind.as_str());
        }

        tracing::info!(
            violations = violations.len(),
            errors = errors.len(),
            "Integrity verification finished"
        );

        IntegrityReport::new(violations, errors)
    }

    /// Verify a single table's horizontal and vertical digests against the store.
    pub async fn verify_stored_table(
        &self,
        table: TrackedTable,
    ) -> Result<Vec<Violation>, IntegrityError> {
        let records = self
            .store
            .list_records(table)
            .await
            .map_err(IntegrityError::store(table))?;
        let stored = self
            .store
            .list_horizontal_digests(table)
            .await
            .map_err(IntegrityError::store(table))?;

        let mut violations = verify_table(table, &records, &stored);

        for column in table.columns() {
            let stored = self
                .store
                .get_vertical_digest(table, column)
                .await
                .map_err(IntegrityError::store(table))?;
            violations.extend(verify_column(table, column, &records, stored.as_deref()));
        }

        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: i64, name: &str, price: &str) -> RecordSnapshot {
        RecordSnapshot::from_fields(
            id,
            [
                ("id".to_string(), id.to_string()),
                ("name".to_string(), name.to_string()),
                ("price".to_string(), price.to_string()),
            ],
        )
    }

    fn stored(record: &RecordSnapshot) -> HorizontalDigest {
        HorizontalDigest {
            table_name: "products".to_string(),
            record_id: record.id,
            digest: record.digest(),
        }
    }

    #[test]
    fn clean_table_has_no_violations() {
        let atlas = product(7, "Atlas", "9.99");
        assert!(verify_table(TrackedTable::Products, &[atlas.clone()], &[stored(&atlas)]).is_empty());
    }

    #[test]
    fn detects_modified_record() {
        let original = product(7, "Atlas", "9.99");
        let edited = product(7, "Atlas", "12.99");
        assert_ne!(original.digest(), edited.digest());

        let violations = verify_table(TrackedTable::Products, &[edited], &[stored(&original)]);
        assert_eq!(
            violations,
            vec![Violation::record("products", 7, ViolationKind::Modified)]
        );
    }

    #[test]
    fn detects_deleted_record() {
        let atlas = product(7, "Atlas", "9.99");
        let violations = verify_table(TrackedTable::Products, &[], &[stored(&atlas)]);
        assert_eq!(
            violations,
            vec![Violation::record("products", 7, ViolationKind::Deleted)]
        );
    }

    #[test]
    fn detects_missing_digest() {
        let atlas = product(7, "Atlas", "9.99");
        let violations = verify_table(TrackedTable::Products, &[atlas], &[]);
        assert_eq!(
            violations,
            vec![Violation::record("products", 7, ViolationKind::MissingDigest)]
        );
    }

    #[test]
    fn column_tampering_is_detected() {
        let before = vec![product(1, "A", "5"), product(2, "B", "7")];
        let digest = column_digest("price", &before);
        assert_eq!(
            verify_column(TrackedTable::Products, "price", &before, Some(&digest)),
            None
        );

        let after = vec![product(1, "A", "5"), product(2, "B", "1")];
        assert_eq!(
            verify_column(TrackedTable::Products, "price", &after, Some(&digest)),
            Some(Violation::column(
                "products",
                "price",
                ViolationKind::ColumnTampered
            ))
        );
    }

    #[test]
    fn characters_moved_between_rows_are_column_tampering() {
        let before = vec![product(1, "ab", "5"), product(2, "c", "7")];
        let digest = column_digest("name", &before);

        let after = vec![product(1, "a", "5"), product(2, "bc", "7")];
        assert_eq!(
            verify_column(TrackedTable::Products, "name", &after, Some(&digest)),
            Some(Violation::column(
                "products",
                "name",
                ViolationKind::ColumnTampered
            ))
        );
    }

    #[test]
    fn empty_table_without_column_digest_is_consistent() {
        assert_eq!(verify_column(TrackedTable::Orders, "total", &[], None), None);
        assert_eq!(
            verify_column(TrackedTable::Orders, "total", &[product(1, "A", "5")], None),
            Some(Violation::column(
                "orders",
                "total",
                ViolationKind::MissingDigest
            ))
        );
    }
}
