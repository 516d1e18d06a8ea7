//! Stage seams: fetchers produce raw records, stores apply merge plans

use serde_json::Value;

use crate::policy::MergePlan;
use crate::types::{FetchWindow, Observation};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Transport or payload failure at a source
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {source_name} failed: {message}")]
    Transport {
        source_name: String,
        message: String,
    },

    #[error("{source_name} answered with HTTP {status}")]
    Status { source_name: String, status: u16 },

    #[error("{source_name} returned an unexpected payload: {message}")]
    Payload {
        source_name: String,
        message: String,
    },

    #[error("{source_name} is misconfigured: {message}")]
    Config {
        source_name: String,
        message: String,
    },
}

/// Batch write failure; nothing from the batch was applied
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("batch write to {table} failed: {source}")]
    Backend {
        table: String,
        #[source]
        source: BoxError,
    },

    #[error("batch for {table} rejected: {message}")]
    Rejected { table: String, message: String },
}

impl StorageError {
    pub fn backend(table: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StorageError::Backend {
            table: table.into(),
            source: source.into(),
        }
    }
}

/// What a fetch produced, so callers can tell "no data" from "failed"
#[derive(Debug)]
pub enum FetchOutcome {
    Records(Vec<Value>),
    Empty,
    Failed(FetchError),
}

impl FetchOutcome {
    pub fn from_result(result: Result<Vec<Value>, FetchError>) -> Self {
        match result {
            Ok(records) if records.is_empty() => FetchOutcome::Empty,
            Ok(records) => FetchOutcome::Records(records),
            Err(e) => FetchOutcome::Failed(e),
        }
    }

    /// Records to process; a failure counts as none
    pub fn into_records(self) -> Vec<Value> {
        match self {
            FetchOutcome::Records(records) => records,
            FetchOutcome::Empty | FetchOutcome::Failed(_) => Vec::new(),
        }
    }
}

/// Produces raw JSON records for a time window
#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, window: &FetchWindow) -> Result<Vec<Value>, FetchError>;
}

/// Timestamp-keyed storage with per-column merge policies
#[async_trait::async_trait]
pub trait ObservationStore: Send + Sync {
    /// Create the plan's table if it does not exist yet
    async fn ensure_table(&self, plan: &MergePlan) -> Result<(), StorageError>;

    /// Upsert a batch atomically; returns the number of observations written
    async fn upsert_batch(
        &self,
        plan: &MergePlan,
        batch: &[Observation],
    ) -> Result<usize, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fetch_outcome_from_result() {
        assert!(matches!(
            FetchOutcome::from_result(Ok(vec![])),
            FetchOutcome::Empty
        ));
        assert!(matches!(
            FetchOutcome::from_result(Ok(vec![json!({})])),
            FetchOutcome::Records(ref r) if r.len() == 1
        ));

        let failed = FetchOutcome::from_result(Err(FetchError::Status {
            source_name: "ow".into(),
            status: 503,
        }));
        assert!(matches!(failed, FetchOutcome::Failed(_)));
        assert!(failed.into_records().is_empty());
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::backend("weather_data", "connection reset");
        assert_eq!(
            err.to_string(),
            "batch write to weather_data failed: connection reset"
        );
    }
}
