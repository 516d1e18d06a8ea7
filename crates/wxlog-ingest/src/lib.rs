//! Source fetchers
//!
//! Sources are described in configuration rather than coded per vendor:
//! an HTTP endpoint returning JSON, or a JSON file replayed from disk. Each
//! fetcher turns a [`wxlog_core::FetchWindow`] into raw JSON records.

pub mod file;
pub mod http;
pub mod registry;
pub mod window;

pub use file::*;
pub use http::*;
pub use registry::*;
pub use window::*;

use serde_json::Value;
use thiserror::Error;
use wxlog_config::ConfigError;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Invalid source {source_name}: {message}")]
    InvalidSource {
        source_name: String,
        message: String,
    },

    #[error("Cannot resolve fetch window: {0}")]
    Window(String),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Pull the record list out of a response body.
///
/// With a JSON pointer, the value it names is used; without one, the whole
/// body is. Arrays yield their items, `null` yields nothing and any other
/// value is a single record.
pub fn extract_records(body: Value, pointer: Option<&str>) -> Result<Vec<Value>, String> {
    let value = match pointer {
        Some(p) => {
            let mut body = body;
            match body.pointer_mut(p) {
                Some(v) => v.take(),
                None => return Err(format!("no value at {}", p)),
            }
        }
        None => body,
    };
    Ok(match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_records_with_pointer() {
        let body = json!({"Result": {"HistoricalObservations": [{"a": 1}, {"a": 2}]}});
        let records = extract_records(body, Some("/Result/HistoricalObservations")).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_extract_records_shapes() {
        assert!(extract_records(json!(null), None).unwrap().is_empty());
        assert_eq!(extract_records(json!({"a": 1}), None).unwrap().len(), 1);
        assert!(extract_records(json!({"data": null}), Some("/data"))
            .unwrap()
            .is_empty());
        assert!(extract_records(json!({"Result": {}}), Some("/Result/Missing")).is_err());
    }
}
