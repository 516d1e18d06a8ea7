//! Replay of saved JSON responses

use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;
use wxlog_core::{FetchError, FetchWindow, SourceFetcher};

use crate::extract_records;

/// Reads records from a JSON file instead of the network.
///
/// The window is ignored; every record in the file is returned.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    name: String,
    path: PathBuf,
    records: Option<String>,
}

impl FileFetcher {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, records: Option<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            records,
        }
    }
}

#[async_trait::async_trait]
impl SourceFetcher for FileFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _window: &FetchWindow) -> Result<Vec<Value>, FetchError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| FetchError::Transport {
                source_name: self.name.clone(),
                message: format!("{}: {}", self.path.display(), e),
            })?;
        let payload = |message: String| FetchError::Payload {
            source_name: self.name.clone(),
            message,
        };
        let body: Value = serde_json::from_str(&text).map_err(|e| payload(e.to_string()))?;
        let records = extract_records(body, self.records.as_deref()).map_err(payload)?;
        debug!("Read {} records from {}", records.len(), self.path.display());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::io::Write;

    fn window() -> FetchWindow {
        FetchWindow::new(Utc::now(), Utc::now())
    }

    #[tokio::test]
    async fn test_reads_records_at_pointer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"data": [{{"ts": "a"}}, {{"ts": "b"}}]}}"#).unwrap();

        let fetcher = FileFetcher::new("solar", file.path(), Some("/data".to_string()));
        let records = fetcher.fetch(&window()).await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_transport_error() {
        let fetcher = FileFetcher::new("solar", "/nonexistent/solar.json", None);
        assert!(matches!(
            fetcher.fetch(&window()).await.unwrap_err(),
            FetchError::Transport { .. }
        ));
    }

    #[tokio::test]
    async fn test_invalid_json_is_payload_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let fetcher = FileFetcher::new("solar", file.path(), None);
        assert!(matches!(
            fetcher.fetch(&window()).await.unwrap_err(),
            FetchError::Payload { .. }
        ));
    }
}
