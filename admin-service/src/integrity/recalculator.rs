use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::instrument;

use super::{column_digest, IntegrityEngine, IntegrityError, RecordSnapshot, TrackedTable};
use crate::models::{AuditEvent, AuditEventType, RecalculationSummary};
use crate::services::metrics::record_recalculation;

/// Clears the single-flight flag when the background task ends, including by panic.
struct FlightGuard(Arc<AtomicBool>);

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl IntegrityEngine {
    /// Whether a background recalculation is in flight.
    pub fn is_recalculating(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start [`recalculate_all`](Self::recalculate_all) on a detached task and return
    /// immediately.
    ///
    /// Outcome is reported only to the audit sink. Fails with
    /// [`IntegrityError::AlreadyRunning`] while another sweep is in flight.
    pub fn trigger_recalculation(&self, actor: Option<String>) -> Result<(), IntegrityError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("Integrity recalculation requested while one is running");
            return Err(IntegrityError::AlreadyRunning);
        }

        let engine = self.clone();
        tokio::spawn(async move {
            let _flight = FlightGuard(engine.running.clone());

            engine
                .audit_quietly(
                    AuditEvent::system_action(
                        AuditEventType::IntegrityRecalculationStarted,
                        Some("integrity"),
                        None,
                    )
                    .with_actor(actor.clone()),
                )
                .await;

            let outcome = AssertUnwindSafe(engine.recalculate_all())
                .catch_unwind()
                .await;

            let event = match outcome {
                Ok(Ok(summary)) => {
                    record_recalculation("completed");
                    AuditEvent::system_action(
                        AuditEventType::IntegrityRecalculationCompleted,
                        Some("integrity"),
                        serde_json::to_value(&summary).ok(),
                    )
                }
                Ok(Err(e)) => {
                    record_recalculation("failed");
                    tracing::error!(error = %e, "Integrity recalculation failed");
                    AuditEvent::system_action(
                        AuditEventType::IntegrityRecalculationFailed,
                        Some("integrity"),
                        Some(serde_json::json!({ "error": e.to_string() })),
                    )
                }
                Err(_) => {
                    record_recalculation("panicked");
                    tracing::error!("Integrity recalculation panicked");
                    AuditEvent::system_action(
                        AuditEventType::IntegrityRecalculationFailed,
                        Some("integrity"),
                        Some(serde_json::json!({ "error": "recalculation task panicked" })),
                    )
                }
            };
            engine.audit_quietly(event.with_actor(actor)).await;
        });

        Ok(())
    }

    /// Recompute and store every horizontal and vertical digest.
    ///
    /// Idempotent: without intervening data changes, two runs store identical digests.
    /// Stored digests of records deleted outside the application are left in place so
    /// verification keeps reporting them.
    #[instrument(skip(self))]
    pub async fn recalculate_all(&self) -> Result<RecalculationSummary, IntegrityError> {
        let _exclusive = self.sweep_lock.write().await;

        let mut summary = RecalculationSummary::default();
        for table in self.tables.iter().copied() {
            let records = self
                .store
                .list_records(table)
                .await
                .map_err(IntegrityError::store(table))?;

            for record in &records {
                self.store
                    .put_horizontal_digest(table, record.id, &record.digest())
                    .await
                    .map_err(IntegrityError::store(table))?;
            }

            summary.horizontal_digests += records.len();
            summary.vertical_digests += self.write_column_digests(table, &records).await?;
            summary.tables += 1;

            tracing::debug!(table = %table, records = records.len(), "Table digests recalculated");
        }

        tracing::info!(
            tables = summary.tables,
            horizontal = summary.horizontal_digests,
            vertical = summary.vertical_digests,
            "Integrity recalculation finished"
        );
        Ok(summary)
    }

    /// Re-sign one record after it was written, then refresh the table's column digests.
    #[instrument(skip(self))]
    pub async fn refresh_record(
        &self,
        table: TrackedTable,
        record_id: i64,
    ) -> Result<String, IntegrityError> {
        let _exclusive = self.sweep_lock.write().await;

        let record = self
            .store
            .find_record(table, record_id)
            .await
            .map_err(IntegrityError::store(table))?
            .ok_or(IntegrityError::RecordNotFound { table, record_id })?;

        let digest = record.digest();
        self.store
            .put_horizontal_digest(table, record_id, &digest)
            .await
            .map_err(IntegrityError::store(table))?;

        self.refresh_columns(table).await?;
        Ok(digest)
    }

    /// Drop a deleted record's digest, then refresh the table's column digests.
    #[instrument(skip(self))]
    pub async fn purge_record(
        &self,
        table: TrackedTable,
        record_id: i64,
    ) -> Result<(), IntegrityError> {
        let _exclusive = self.sweep_lock.write().await;

        self.store
            .delete_horizontal_digest(table, record_id)
            .await
            .map_err(IntegrityError::store(table))?;

        self.refresh_columns(table).await
    }

    async fn refresh_columns(&self, table: TrackedTable) -> Result<(), IntegrityError> {
        let records = self
            .store
            .list_records(table)
            .await
            .map_err(IntegrityError::store(table))?;
        self.write_column_digests(table, &records).await?;
        Ok(())
    }

    /// Write vertical digests for `table`. An empty table only overwrites digests that
    /// already exist, so a fresh empty dataset stays digest-free.
    async fn write_column_digests(
        &self,
        table: TrackedTable,
        records: &[RecordSnapshot],
    ) -> Result<usize, IntegrityError> {
        let mut written = 0;
        for column in table.columns() {
            if records.is_empty()
                && self
                    .store
                    .get_vertical_digest(table, column)
                    .await
                    .map_err(IntegrityError::store(table))?
                    .is_none()
            {
                continue;
            }

            self.store
                .put_vertical_digest(table, column, &column_digest(column, records))
                .await
                .map_err(IntegrityError::store(table))?;
            written += 1;
        }
        Ok(written)
    }

    async fn audit_quietly(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(event).await {
            tracing::error!(error = %e, "Failed to write integrity audit event");
        }
    }
}
