//! Declarative HTTP JSON source

use chrono::{DateTime, Duration, DurationRound, Utc};
use chrono_tz::Tz;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;
use wxlog_config::{env_var, HttpFetchConfig, RequestConfig};
use wxlog_core::{FetchError, FetchWindow, SourceFetcher};

use crate::{extract_records, IngestError, IngestResult};

type Params = Vec<(String, String)>;

/// Fetches JSON records from one endpoint
#[derive(Debug, Clone)]
pub struct HttpJsonFetcher {
    name: String,
    client: Client,
    url: Url,
    query: Params,
    records: Option<String>,
    request: RequestConfig,
    timezone: Tz,
}

impl HttpJsonFetcher {
    /// Build a fetcher, resolving every environment indirection up front
    pub fn from_config(name: &str, config: &HttpFetchConfig, timezone: Tz) -> IngestResult<Self> {
        let invalid = |message: String| IngestError::InvalidSource {
            source_name: name.to_string(),
            message,
        };

        let raw_url = match (&config.url_env, &config.url) {
            (Some(var), _) => env_var(var)?,
            (None, Some(url)) => url.clone(),
            (None, None) => return Err(invalid("no url or url_env".to_string())),
        };
        let url = Url::parse(&raw_url).map_err(|e| invalid(format!("bad url: {}", e)))?;

        let mut query: Params = config
            .query
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (param, var) in &config.query_env {
            query.push((param.clone(), env_var(var)?));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let env_headers = config
            .header_env
            .iter()
            .map(|(h, var)| env_var(var).map(|v| (h.clone(), v)))
            .collect::<Result<Vec<_>, _>>()?;
        for (header, value) in config
            .headers
            .iter()
            .map(|(h, v)| (h.clone(), v.clone()))
            .chain(env_headers)
        {
            let header_name = HeaderName::from_bytes(header.as_bytes())
                .map_err(|e| invalid(format!("bad header {}: {}", header, e)))?;
            let header_value = HeaderValue::from_str(&value)
                .map_err(|e| invalid(format!("bad value for header {}: {}", header, e)))?;
            headers.insert(header_name, header_value);
        }
        if let Some(var) = &config.bearer_env {
            let mut token = HeaderValue::from_str(&format!("Bearer {}", env_var(var)?))
                .map_err(|e| invalid(format!("bad bearer token: {}", e)))?;
            token.set_sensitive(true);
            headers.insert(AUTHORIZATION, token);
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs()))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            name: name.to_string(),
            client,
            url,
            query,
            records: config.records.clone(),
            request: config.request.clone(),
            timezone,
        })
    }

    /// Query parameters for each request needed to cover `window`
    pub fn request_params(&self, window: &FetchWindow) -> Vec<Params> {
        match &self.request {
            RequestConfig::Plain => vec![self.query.clone()],
            RequestConfig::Window {
                start_param,
                end_param,
                format,
            } => {
                let mut params = self.query.clone();
                params.push((start_param.clone(), self.local(window.start, format)));
                params.push((end_param.clone(), self.local(window.end, format)));
                vec![params]
            }
            RequestConfig::PerHour { epoch_param } => whole_hours(window)
                .into_iter()
                .map(|hour| {
                    let mut params = self.query.clone();
                    params.push((epoch_param.clone(), hour.timestamp().to_string()));
                    params
                })
                .collect(),
        }
    }

    fn local(&self, ts: DateTime<Utc>, format: &str) -> String {
        ts.with_timezone(&self.timezone).format(format).to_string()
    }

    async fn get(&self, params: &Params) -> Result<Vec<Value>, FetchError> {
        // Query strings can carry API keys; keep URLs out of messages.
        let transport = |e: reqwest::Error| FetchError::Transport {
            source_name: self.name.clone(),
            message: e.without_url().to_string(),
        };

        let response = self
            .client
            .get(self.url.clone())
            .query(params)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                source_name: self.name.clone(),
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await.map_err(|e| FetchError::Payload {
            source_name: self.name.clone(),
            message: e.without_url().to_string(),
        })?;
        extract_records(body, self.records.as_deref()).map_err(|message| FetchError::Payload {
            source_name: self.name.clone(),
            message,
        })
    }
}

/// Every whole hour inside the window, in order
pub fn whole_hours(window: &FetchWindow) -> Vec<DateTime<Utc>> {
    let mut hours = Vec::new();
    let mut hour = match window.start.duration_trunc(Duration::hours(1)) {
        Ok(h) if h < window.start => h + Duration::hours(1),
        Ok(h) => h,
        Err(_) => return hours,
    };
    while hour <= window.end {
        hours.push(hour);
        hour += Duration::hours(1);
    }
    hours
}

#[async_trait::async_trait]
impl SourceFetcher for HttpJsonFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(source = %self.name))]
    async fn fetch(&self, window: &FetchWindow) -> Result<Vec<Value>, FetchError> {
        let requests = self.request_params(window);
        let total = requests.len();
        let mut records = Vec::new();
        let mut last_error = None;
        let mut failed = 0;

        for (i, params) in requests.iter().enumerate() {
            match self.get(params).await {
                Ok(batch) => {
                    debug!("Fetched {} records from {}", batch.len(), self.url);
                    records.extend(batch);
                }
                // A single request failing only costs its own records.
                Err(e) if total > 1 => {
                    warn!("Request {} of {} failed: {}", i + 1, total, e);
                    failed += 1;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        match last_error {
            Some(e) if failed == total => Err(e),
            _ => Ok(records),
        }
    }
}
