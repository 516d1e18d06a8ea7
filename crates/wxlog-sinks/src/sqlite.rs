use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use wxlog_core::sql::{self, Dialect};
use wxlog_core::{
    validate, BucketTimestamp, FieldMap, MergePlan, Observation, ObservationStore, StorageError,
    StoredRow,
};

/// SQLite-backed store; keys are stored as RFC 3339 UTC text
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    pub fn create_table(&self, plan: &MergePlan) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute_batch(&sql::create_table_statement(plan, Dialect::Sqlite))?;
        Ok(())
    }

    /// Write a batch inside one transaction
    pub fn write_batch(&self, plan: &MergePlan, batch: &[Observation]) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn.transaction()?;
        for observation in batch {
            validate(plan, observation)?;
            let columns: Vec<&str> = observation.fields.keys().map(String::as_str).collect();
            let statement = sql::upsert_statement(plan, &columns, Dialect::Sqlite)?;

            let mut params = Vec::with_capacity(columns.len() + 1);
            params.push(SqlValue::Text(key_text(&observation.timestamp)));
            params.extend(observation.fields.values().map(|v| match v {
                Some(f) => SqlValue::Real(*f),
                None => SqlValue::Null,
            }));

            tx.prepare_cached(&statement)?
                .execute(params_from_iter(params.iter()))
                .with_context(|| format!("upsert at {}", observation.timestamp))?;
        }
        // Dropping the transaction without commit rolls it back.
        tx.commit()?;
        Ok(batch.len())
    }

    /// All rows, oldest first
    pub fn rows(&self, plan: &MergePlan) -> Result<Vec<StoredRow>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let statement = format!(
            "SELECT {} FROM {} ORDER BY {} ASC",
            sql::select_list(plan),
            plan.table(),
            plan.key_column()
        );
        let mut stmt = conn.prepare(&statement)?;
        let columns: Vec<String> = plan.columns().map(str::to_string).collect();
        let rows = stmt.query_map([], |row| read_row(row, &columns))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }

    pub fn row(&self, plan: &MergePlan, timestamp: BucketTimestamp) -> Result<Option<StoredRow>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let statement = sql::select_row_statement(plan, Dialect::Sqlite);
        let columns: Vec<String> = plan.columns().map(str::to_string).collect();
        let row = conn
            .query_row(&statement, [key_text(&timestamp)], |row| {
                read_row(row, &columns)
            })
            .optional()?;
        row.transpose()
    }
}

// Fixed-width fraction keeps text order equal to time order.
fn key_text(ts: &BucketTimestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn read_row(row: &rusqlite::Row<'_>, columns: &[String]) -> rusqlite::Result<Result<StoredRow>> {
    let key: String = row.get(0)?;
    let mut values = FieldMap::new();
    for (i, column) in columns.iter().enumerate() {
        values.insert(column.clone(), row.get::<_, Option<f64>>(i + 1)?);
    }
    let timestamp = DateTime::parse_from_rfc3339(&key)
        .map(|ts| ts.with_timezone(&Utc))
        .with_context(|| format!("stored key {:?} is not RFC 3339", key));
    Ok(timestamp.map(|timestamp| StoredRow {
        timestamp,
        columns: values,
    }))
}

#[async_trait::async_trait]
impl ObservationStore for SqliteStore {
    async fn ensure_table(&self, plan: &MergePlan) -> Result<(), StorageError> {
        self.create_table(plan)
            .map_err(|e| StorageError::backend(plan.table(), e.to_string()))
    }

    async fn upsert_batch(
        &self,
        plan: &MergePlan,
        batch: &[Observation],
    ) -> Result<usize, StorageError> {
        self.write_batch(plan, batch)
            .map_err(|e| StorageError::backend(plan.table(), format!("{:#}", e)))
    }
}
