//! Core data types for weather and solar observations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical bucket key for a stored row
pub type BucketTimestamp = DateTime<Utc>;

/// A metric value; `None` means "known absent"
pub type FieldValue = Option<f64>;

/// Canonical field name -> value
pub type FieldMap = BTreeMap<String, FieldValue>;

/// One measurement snapshot from one source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    /// Normalized bucket timestamp
    pub timestamp: BucketTimestamp,

    /// Producing source, used for log context only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Metric values keyed by canonical column name
    pub fields: FieldMap,
}

impl Observation {
    pub fn new(timestamp: BucketTimestamp) -> Self {
        Self {
            timestamp,
            source: None,
            fields: FieldMap::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Value of a field, flattening "not present" and "no value"
    pub fn value(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied().flatten()
    }
}

/// One destination row, keyed uniquely by its bucket timestamp
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRow {
    pub timestamp: BucketTimestamp,
    pub columns: FieldMap,
}

impl StoredRow {
    /// A row with every known column set to "no value"
    pub fn empty<'a, I>(timestamp: BucketTimestamp, columns: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self {
            timestamp,
            columns: columns.into_iter().map(|c| (c.to_string(), None)).collect(),
        }
    }

    pub fn value(&self, column: &str) -> Option<f64> {
        self.columns.get(column).copied().flatten()
    }
}

/// Inclusive request window handed to source fetchers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}
