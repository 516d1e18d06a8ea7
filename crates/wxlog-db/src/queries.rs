//! Database query operations for observation tables

use crate::{DbClient, DbError, DbResult};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::{debug, instrument};
use wxlog_core::sql::{self, Dialect};
use wxlog_core::{
    validate, BucketTimestamp, FieldMap, MergePlan, Observation, ObservationStore, StorageError,
    StoredRow,
};

impl DbClient {
    /// Create the plan's table if it does not exist
    #[instrument(skip(self, plan), fields(table = plan.table()))]
    pub async fn create_table(&self, plan: &MergePlan) -> DbResult<()> {
        sqlx::query(&sql::create_table_statement(plan, Dialect::Postgres))
            .execute(self.pool())
            .await?;
        debug!("Ensured table {}", plan.table());
        Ok(())
    }

    /// Upsert a batch of observations in one transaction.
    ///
    /// Observations are applied in order, one statement each, so repeated
    /// timestamps within a batch merge just like separate runs would. Any
    /// failure rolls the whole batch back.
    #[instrument(skip(self, plan, batch), fields(table = plan.table(), size = batch.len()))]
    pub async fn upsert_batch(&self, plan: &MergePlan, batch: &[Observation]) -> DbResult<usize> {
        for observation in batch {
            validate(plan, observation)?;
        }

        let mut tx = self.pool().begin().await?;
        for observation in batch {
            let columns: Vec<&str> = observation.fields.keys().map(String::as_str).collect();
            let statement = sql::upsert_statement(plan, &columns, Dialect::Postgres)?;

            let mut query = sqlx::query(&statement).bind(observation.timestamp);
            for value in observation.fields.values() {
                query = query.bind(*value);
            }
            query.execute(&mut *tx).await?;
        }
        tx.commit().await?;

        debug!("Upserted {} observations into {}", batch.len(), plan.table());
        Ok(batch.len())
    }

    /// Get a single row by its bucket timestamp
    #[instrument(skip(self, plan), fields(table = plan.table()))]
    pub async fn fetch_row(
        &self,
        plan: &MergePlan,
        timestamp: BucketTimestamp,
    ) -> DbResult<Option<StoredRow>> {
        let row = sqlx::query(&sql::select_row_statement(plan, Dialect::Postgres))
            .bind(timestamp)
            .fetch_optional(self.pool())
            .await?;

        row.map(|row| read_row(&row, plan)).transpose()
    }

    /// Get rows within an inclusive time range, oldest first
    #[instrument(skip(self, plan), fields(table = plan.table()))]
    pub async fn fetch_range(
        &self,
        plan: &MergePlan,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<Vec<StoredRow>> {
        let rows = sqlx::query(&sql::select_range_statement(plan, Dialect::Postgres))
            .bind(start)
            .bind(end)
            .fetch_all(self.pool())
            .await?;

        let rows = rows
            .iter()
            .map(|row| read_row(row, plan))
            .collect::<DbResult<Vec<_>>>()?;
        debug!(
            "Retrieved {} rows from {} between {} and {}",
            rows.len(),
            plan.table(),
            start,
            end
        );
        Ok(rows)
    }

    /// Count all rows in the plan's table
    #[instrument(skip(self, plan), fields(table = plan.table()))]
    pub async fn count_rows(&self, plan: &MergePlan) -> DbResult<i64> {
        let row = sqlx::query(&format!("SELECT COUNT(*) FROM {}", plan.table()))
            .fetch_one(self.pool())
            .await?;
        Ok(row.try_get(0)?)
    }
}

fn read_row(row: &PgRow, plan: &MergePlan) -> DbResult<StoredRow> {
    let timestamp: DateTime<Utc> = row.try_get(0)?;
    let mut columns = FieldMap::new();
    for (i, column) in plan.columns().enumerate() {
        let value: Option<f64> = row.try_get(i + 1)?;
        columns.insert(column.to_string(), value);
    }
    Ok(StoredRow { timestamp, columns })
}

#[async_trait::async_trait]
impl ObservationStore for DbClient {
    async fn ensure_table(&self, plan: &MergePlan) -> Result<(), StorageError> {
        self.create_table(plan)
            .await
            .map_err(|e| StorageError::backend(plan.table(), e))
    }

    async fn upsert_batch(
        &self,
        plan: &MergePlan,
        batch: &[Observation],
    ) -> Result<usize, StorageError> {
        DbClient::upsert_batch(self, plan, batch)
            .await
            .map_err(|e| match e {
                DbError::Merge(e) => StorageError::Rejected {
                    table: plan.table().to_string(),
                    message: e.to_string(),
                },
                other => StorageError::backend(plan.table(), other),
            })
    }
}
