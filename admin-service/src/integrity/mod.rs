//! Integrity verification engine.
//!
//! Every tracked record carries a horizontal digest (DVH) over its significant fields,
//! and every tracked column carries a vertical digest (DVV) over its values across the
//! table. Edits, deletions or bulk rewrites made outside the application break one of
//! the two and surface as violations in [`IntegrityEngine::verify_all`].
//!
//! Digests are rewritten only by [`IntegrityEngine::recalculate_all`] (usually started
//! in the background via [`IntegrityEngine::trigger_recalculation`]) and by the targeted
//! [`IntegrityEngine::refresh_record`] / [`IntegrityEngine::purge_record`] calls made
//! after an entity write.

mod digest;
mod recalculator;
mod store;
mod tracked;
mod verifier;

pub use digest::{column_digest, digest_entity, hash_hex, Digestible, FieldValue, RecordSnapshot};
pub use store::{InMemoryIntegrityStore, IntegrityStore};
pub use tracked::TrackedTable;
pub use verifier::{verify_column, verify_table};

use service_core::error::AppError;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::services::AuditSink;

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("Integrity recalculation is already running")]
    AlreadyRunning,

    #[error("Record {record_id} not found in {table}")]
    RecordNotFound { table: TrackedTable, record_id: i64 },

    #[error("Integrity store failed on {table}: {source}")]
    Store {
        table: TrackedTable,
        #[source]
        source: anyhow::Error,
    },
}

impl IntegrityError {
    fn store(table: TrackedTable) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| IntegrityError::Store { table, source }
    }
}

impl From<IntegrityError> for AppError {
    fn from(err: IntegrityError) -> Self {
        match err {
            IntegrityError::AlreadyRunning => AppError::Conflict(anyhow::anyhow!(err.to_string())),
            IntegrityError::RecordNotFound { .. } => {
                AppError::NotFound(anyhow::anyhow!(err.to_string()))
            }
            IntegrityError::Store { .. } => AppError::DatabaseError(anyhow::Error::new(err)),
        }
    }
}

/// Shared handle to the integrity engine. Cheap to clone.
#[derive(Clone)]
pub struct IntegrityEngine {
    store: Arc<dyn IntegrityStore>,
    audit: Arc<dyn AuditSink>,
    tables: Arc<[TrackedTable]>,
    /// Sweeps write-lock, verification read-locks.
    sweep_lock: Arc<RwLock<()>>,
    /// Single-flight flag for background recalculation.
    running: Arc<AtomicBool>,
}

impl IntegrityEngine {
    /// Engine over every [`TrackedTable`].
    pub fn new(store: Arc<dyn IntegrityStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self::with_tables(store, audit, &TrackedTable::ALL)
    }

    pub fn with_tables(
        store: Arc<dyn IntegrityStore>,
        audit: Arc<dyn AuditSink>,
        tables: &[TrackedTable],
    ) -> Self {
        Self {
            store,
            audit,
            tables: tables.into(),
            sweep_lock: Arc::new(RwLock::new(())),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn tables(&self) -> &[TrackedTable] {
        &self.tables
    }

    pub fn store(&self) -> &Arc<dyn IntegrityStore> {
        &self.store
    }
}
