//! Storage backends besides PostgreSQL: an in-memory store for dry runs and
//! tests, and a SQLite store behind the `sqlite` feature.

#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use wxlog_core::{
    apply_batch, BucketTimestamp, MergePlan, Observation, ObservationStore, StorageError,
    StoredRow,
};

type Table = BTreeMap<BucketTimestamp, StoredRow>;

/// Keeps every table in memory; batches apply all-or-nothing
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<BTreeMap<String, Table>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following batch fail with a storage error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// All rows of a table, oldest first
    pub fn rows(&self, table: &str) -> Vec<StoredRow> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn row(&self, table: &str, timestamp: BucketTimestamp) -> Option<StoredRow> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.get(table).and_then(|rows| rows.get(&timestamp)).cloned()
    }

    fn write(&self, plan: &MergePlan, batch: &[Observation]) -> Result<usize, StorageError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(StorageError::Rejected {
                table: plan.table().to_string(),
                message: "writes disabled".to_string(),
            });
        }
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let rows = tables.entry(plan.table().to_string()).or_default();
        apply_batch(rows, plan, batch).map_err(|e| StorageError::Rejected {
            table: plan.table().to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ObservationStore for MemoryStore {
    async fn ensure_table(&self, plan: &MergePlan) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.entry(plan.table().to_string()).or_default();
        Ok(())
    }

    async fn upsert_batch(
        &self,
        plan: &MergePlan,
        batch: &[Observation],
    ) -> Result<usize, StorageError> {
        let written = self.write(plan, batch)?;
        tracing::debug!(table = plan.table(), written, "memory batch applied");
        Ok(written)
    }
}
