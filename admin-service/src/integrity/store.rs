//! Storage seam for digests and the live records they protect.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::{Digestible, RecordSnapshot, TrackedTable};
use crate::models::HorizontalDigest;

#[async_trait]
pub trait IntegrityStore: Send + Sync {
    async fn get_horizontal_digest(
        &self,
        table: TrackedTable,
        record_id: i64,
    ) -> Result<Option<String>, anyhow::Error>;

    async fn list_horizontal_digests(
        &self,
        table: TrackedTable,
    ) -> Result<Vec<HorizontalDigest>, anyhow::Error>;

    async fn put_horizontal_digest(
        &self,
        table: TrackedTable,
        record_id: i64,
        digest: &str,
    ) -> Result<(), anyhow::Error>;

    async fn delete_horizontal_digest(
        &self,
        table: TrackedTable,
        record_id: i64,
    ) -> Result<(), anyhow::Error>;

    async fn get_vertical_digest(
        &self,
        table: TrackedTable,
        column: &str,
    ) -> Result<Option<String>, anyhow::Error>;

    async fn put_vertical_digest(
        &self,
        table: TrackedTable,
        column: &str,
        digest: &str,
    ) -> Result<(), anyhow::Error>;

    /// Every live record of `table`.
    async fn list_records(&self, table: TrackedTable)
        -> Result<Vec<RecordSnapshot>, anyhow::Error>;

    async fn find_record(
        &self,
        table: TrackedTable,
        record_id: i64,
    ) -> Result<Option<RecordSnapshot>, anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

#[derive(Default)]
struct MemoryState {
    records: HashMap<TrackedTable, BTreeMap<i64, RecordSnapshot>>,
    horizontal: HashMap<TrackedTable, BTreeMap<i64, String>>,
    vertical: HashMap<(TrackedTable, String), String>,
    failing: Vec<TrackedTable>,
}

/// Process-local store used by tests and local runs without Postgres.
#[derive(Default)]
pub struct InMemoryIntegrityStore {
    state: Mutex<MemoryState>,
}

impl InMemoryIntegrityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, anyhow::Error> {
        self.state
            .lock()
            .map_err(|_| anyhow::anyhow!("integrity store lock poisoned"))
    }

    /// Insert or replace a live record, bypassing digest maintenance.
    pub fn upsert_record<T: Digestible>(&self, table: TrackedTable, entity: &T) {
        if let Ok(mut state) = self.lock() {
            state
                .records
                .entry(table)
                .or_default()
                .insert(entity.record_id(), RecordSnapshot::capture(entity));
        }
    }

    /// Remove a live record, leaving any stored digest in place.
    pub fn remove_record(&self, table: TrackedTable, record_id: i64) {
        if let Ok(mut state) = self.lock() {
            if let Some(rows) = state.records.get_mut(&table) {
                rows.remove(&record_id);
            }
        }
    }

    /// Make every read of `table` fail, to exercise error isolation.
    pub fn fail_table(&self, table: TrackedTable) {
        if let Ok(mut state) = self.lock() {
            state.failing.push(table);
        }
    }

    pub fn horizontal_count(&self) -> usize {
        self.lock()
            .map(|s| s.horizontal.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }

    pub fn vertical_count(&self) -> usize {
        self.lock().map(|s| s.vertical.len()).unwrap_or(0)
    }

    /// Every stored digest, for comparing two sweeps.
    pub fn digest_snapshot(&self) -> BTreeMap<String, String> {
        let Ok(state) = self.lock() else {
            return BTreeMap::new();
        };
        let horizontal = state.horizontal.iter().flat_map(|(table, rows)| {
            rows.iter()
                .map(move |(id, d)| (format!("h:{}:{}", table, id), d.clone()))
        });
        let vertical = state
            .vertical
            .iter()
            .map(|((table, column), d)| (format!("v:{}:{}", table, column), d.clone()));
        horizontal.chain(vertical).collect()
    }

    fn check_available(state: &MemoryState, table: TrackedTable) -> Result<(), anyhow::Error> {
        if state.failing.contains(&table) {
            return Err(anyhow::anyhow!("{} is unavailable", table));
        }
        Ok(())
    }
}

#[async_trait]
impl IntegrityStore for InMemoryIntegrityStore {
    async fn get_horizontal_digest(
        &self,
        table: TrackedTable,
        record_id: i64,
    ) -> Result<Option<String>, anyhow::Error> {
        let state = self.lock()?;
        Self::check_available(&state, table)?;
        Ok(state
            .horizontal
            .get(&table)
            .and_then(|rows| rows.get(&record_id))
            .cloned())
    }

    async fn list_horizontal_digests(
        &self,
        table: TrackedTable,
    ) -> Result<Vec<HorizontalDigest>, anyhow::Error> {
        let state = self.lock()?;
        Self::check_available(&state, table)?;
        Ok(state
            .horizontal
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .map(|(id, digest)| HorizontalDigest {
                        table_name: table.name().to_string(),
                        record_id: *id,
                        digest: digest.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn put_horizontal_digest(
        &self,
        table: TrackedTable,
        record_id: i64,
        digest: &str,
    ) -> Result<(), anyhow::Error> {
        let mut state = self.lock()?;
        Self::check_available(&state, table)?;
        state
            .horizontal
            .entry(table)
            .or_default()
            .insert(record_id, digest.to_string());
        Ok(())
    }

    async fn delete_horizontal_digest(
        &self,
        table: TrackedTable,
        record_id: i64,
    ) -> Result<(), anyhow::Error> {
        let mut state = self.lock()?;
        Self::check_available(&state, table)?;
        if let Some(rows) = state.horizontal.get_mut(&table) {
            rows.remove(&record_id);
        }
        Ok(())
    }

    async fn get_vertical_digest(
        &self,
        table: TrackedTable,
        column: &str,
    ) -> Result<Option<String>, anyhow::Error> {
        let state = self.lock()?;
        Self::check_available(&state, table)?;
        Ok(state.vertical.get(&(table, column.to_string())).cloned())
    }

    async fn put_vertical_digest(
        &self,
        table: TrackedTable,
        column: &str,
        digest: &str,
    ) -> Result<(), anyhow::Error> {
        let mut state = self.lock()?;
        Self::check_available(&state, table)?;
        state
            .vertical
            .insert((table, column.to_string()), digest.to_string());
        Ok(())
    }

    async fn list_records(
        &self,
        table: TrackedTable,
    ) -> Result<Vec<RecordSnapshot>, anyhow::Error> {
        let state = self.lock()?;
        Self::check_available(&state, table)?;
        Ok(state
            .records
            .get(&table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn find_record(
        &self,
        table: TrackedTable,
        record_id: i64,
    ) -> Result<Option<RecordSnapshot>, anyhow::Error> {
        let state = self.lock()?;
        Self::check_available(&state, table)?;
        Ok(state
            .records
            .get(&table)
            .and_then(|rows| rows.get(&record_id))
            .cloned())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        self.lock().map(|_| ())
    }
}
