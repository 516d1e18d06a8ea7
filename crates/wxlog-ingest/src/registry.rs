//! Fetcher construction from configuration

use crate::{FileFetcher, HttpJsonFetcher, IngestResult};
use std::sync::Arc;
use wxlog_config::{FetchConfig, SourceConfig};
use wxlog_core::SourceFetcher;

/// Build the fetcher a source's configuration describes
pub fn build_fetcher(name: &str, config: &SourceConfig) -> IngestResult<Arc<dyn SourceFetcher>> {
    let fetcher: Arc<dyn SourceFetcher> = match &config.fetch {
        FetchConfig::Http(http) => Arc::new(HttpJsonFetcher::from_config(
            name,
            http,
            config.window_timezone()?,
        )?),
        FetchConfig::File(file) => Arc::new(FileFetcher::new(
            name,
            file.path.clone(),
            file.records.clone(),
        )),
    };
    Ok(fetcher)
}
