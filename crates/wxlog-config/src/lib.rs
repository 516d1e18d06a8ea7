//! TOML configuration for wxlog
//!
//! A config file declares destination tables with their per-column merge
//! policies and the sources that feed them. Secrets never live in the file:
//! URLs, headers, query parameters and bearer tokens can all be pulled from
//! environment variables instead.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use wxlog_core::{
    FieldMapping, MergePolicy, ObservationDecoder, RoundingPolicy, SchemaError, TableSchema,
    TimestampFormat, TimestampNormalizer, DEFAULT_PATTERN,
};

/// Config file used when neither `--config` nor `WXLOG_CONFIG` is given
pub const DEFAULT_CONFIG_PATH: &str = "wxlog.toml";

/// Default per-request timeout for HTTP sources
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown timezone {0:?}")]
    UnknownTimezone(String),

    #[error("environment variable {0} is not set")]
    MissingEnv(String),

    #[error("source {source_name}: {message}")]
    Source {
        source_name: String,
        message: String,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Table layouts; built-in tables may be left out
    #[serde(default)]
    pub tables: BTreeMap<String, TableConfig>,

    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default = "default_key_column")]
    pub key_column: String,

    /// Column name -> merge policy
    pub columns: BTreeMap<String, MergePolicy>,
}

fn default_key_column() -> String {
    "date".to_string()
}

impl TableConfig {
    pub fn schema(&self, name: &str) -> TableSchema {
        TableSchema {
            name: name.to_string(),
            key_column: self.key_column.clone(),
            columns: self.columns.clone(),
        }
    }
}

/// One source: where records come from and how they map onto a table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Destination table
    pub table: String,

    /// IANA timezone the fetch window is computed in (default UTC)
    #[serde(default)]
    pub timezone: Option<String>,

    #[serde(default)]
    pub window: WindowSpec,

    pub fetch: FetchConfig,

    /// Nested object each record is read from, e.g. `Observation`
    #[serde(default)]
    pub record_field: Option<String>,

    pub timestamp: TimestampConfig,

    #[serde(default)]
    pub fields: FieldsConfig,

    /// Per-column policy overrides for this source
    #[serde(default)]
    pub merge: BTreeMap<String, MergePolicy>,
}

/// Time span requested from a source on each run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowSpec {
    /// 00:00:00 to 23:59:59 of yesterday in the source timezone
    PreviousDay,
    /// 00:00:00 to 23:59:59 of today in the source timezone
    CurrentDay,
    /// `[now - lag - span, now - lag]`
    Trailing { lag_minutes: i64, span_minutes: i64 },
}

impl Default for WindowSpec {
    fn default() -> Self {
        WindowSpec::PreviousDay
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchConfig {
    Http(HttpFetchConfig),
    /// Replay records saved to a JSON file
    File(FileFetchConfig),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpFetchConfig {
    #[serde(default)]
    pub url: Option<String>,

    /// Environment variable holding the URL; wins over `url`
    #[serde(default)]
    pub url_env: Option<String>,

    /// JSON pointer to the record array, e.g. `/Result/HistoricalObservations`
    #[serde(default)]
    pub records: Option<String>,

    #[serde(default)]
    pub query: BTreeMap<String, String>,

    /// Query parameter -> environment variable
    #[serde(default)]
    pub query_env: BTreeMap<String, String>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Header name -> environment variable
    #[serde(default)]
    pub header_env: BTreeMap<String, String>,

    /// Environment variable holding a bearer token
    #[serde(default)]
    pub bearer_env: Option<String>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub request: RequestConfig,
}

impl HttpFetchConfig {
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }
}

/// How the fetch window is put into requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RequestConfig {
    /// One request, window not sent
    Plain,
    /// One request with start/end formatted in the source timezone
    Window {
        start_param: String,
        end_param: String,
        #[serde(default = "default_pattern")]
        format: String,
    },
    /// One request per whole hour of the window, passing Unix seconds
    PerHour { epoch_param: String },
}

impl Default for RequestConfig {
    fn default() -> Self {
        RequestConfig::Plain
    }
}

fn default_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFetchConfig {
    pub path: PathBuf,

    #[serde(default)]
    pub records: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampKind {
    #[default]
    Rfc3339,
    Utc,
    Local,
    Epoch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampConfig {
    /// Record key (or JSON pointer) holding the timestamp
    pub key: String,

    #[serde(default)]
    pub format: TimestampKind,

    /// strftime pattern for `utc` and `local`
    #[serde(default)]
    pub pattern: Option<String>,

    /// Timezone for `local`; falls back to the source timezone
    #[serde(default)]
    pub timezone: Option<String>,

    #[serde(default)]
    pub rounding: RoundingPolicy,

    #[serde(default)]
    pub hour_ending_only: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldsConfig {
    /// Key read from object-shaped values such as `{"Value": 80}`
    #[serde(default)]
    pub value_key: Option<String>,

    /// Vendor key -> canonical column
    #[serde(default)]
    pub map: BTreeMap<String, String>,
}

impl AppConfig {
    /// Load from `WXLOG_CONFIG`, else `wxlog.toml`; a missing file yields
    /// an empty config
    pub fn load() -> ConfigResult<Self> {
        let path =
            std::env::var("WXLOG_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        if Path::new(&path).exists() {
            Self::from_path(&path)
        } else {
            Ok(AppConfig::default())
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&s)
    }

    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        Ok(toml::from_str::<AppConfig>(s)?)
    }

    /// Check everything that can be checked without a network or database
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, table) in &self.tables {
            table.schema(name).validate()?;
        }
        for (name, source) in &self.sources {
            source.window_timezone()?;
            source.decoder(name)?;
            if source.timestamp.hour_ending_only
                && source.timestamp.rounding != RoundingPolicy::HourEnding
            {
                return Err(ConfigError::Source {
                    source_name: name.clone(),
                    message: "hour_ending_only needs rounding = \"hour_ending\"".to_string(),
                });
            }
            if let WindowSpec::Trailing {
                lag_minutes,
                span_minutes,
            } = source.window
            {
                if lag_minutes < 0 || span_minutes <= 0 {
                    return Err(ConfigError::Source {
                        source_name: name.clone(),
                        message: "trailing window needs lag >= 0 and span > 0".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl SourceConfig {
    pub fn window_timezone(&self) -> ConfigResult<Tz> {
        match &self.timezone {
            Some(name) => parse_timezone(name),
            None => Ok(Tz::UTC),
        }
    }

    pub fn normalizer(&self, name: &str) -> ConfigResult<TimestampNormalizer> {
        let ts = &self.timestamp;
        let pattern = ts
            .pattern
            .clone()
            .unwrap_or_else(|| DEFAULT_PATTERN.to_string());
        let format = match ts.format {
            TimestampKind::Rfc3339 => TimestampFormat::Rfc3339,
            TimestampKind::Epoch => TimestampFormat::Epoch,
            TimestampKind::Utc => TimestampFormat::Utc { pattern },
            TimestampKind::Local => {
                let zone = ts
                    .timezone
                    .as_ref()
                    .or(self.timezone.as_ref())
                    .ok_or_else(|| ConfigError::Source {
                        source_name: name.to_string(),
                        message: "local timestamps need a timezone".to_string(),
                    })?;
                TimestampFormat::Local {
                    pattern,
                    timezone: parse_timezone(zone)?,
                }
            }
        };
        Ok(TimestampNormalizer::new(format, ts.rounding))
    }

    pub fn mapping(&self) -> FieldMapping {
        let mut mapping = FieldMapping::new();
        if let Some(key) = &self.fields.value_key {
            mapping = mapping.value_key(key.clone());
        }
        for (vendor, canonical) in &self.fields.map {
            mapping = mapping.map(vendor.clone(), canonical.clone());
        }
        mapping
    }

    /// Decoder for this source's raw records
    pub fn decoder(&self, name: &str) -> ConfigResult<ObservationDecoder> {
        if self.fields.map.is_empty() {
            return Err(ConfigError::Source {
                source_name: name.to_string(),
                message: "no fields mapped".to_string(),
            });
        }
        let mut decoder = ObservationDecoder::new(
            name,
            self.timestamp.key.clone(),
            self.normalizer(name)?,
            self.mapping(),
        )
        .hour_ending_only(self.timestamp.hour_ending_only);
        if let Some(field) = &self.record_field {
            decoder = decoder.record_field(field.clone());
        }
        Ok(decoder)
    }
}

pub fn parse_timezone(name: &str) -> ConfigResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| ConfigError::UnknownTimezone(name.to_string()))
}

/// Read a required environment variable
pub fn env_var(name: &str) -> ConfigResult<String> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnv(name.to_string()))
}
