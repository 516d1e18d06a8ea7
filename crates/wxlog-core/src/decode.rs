//! Raw source record -> observation

use serde_json::{Map, Value};

use crate::extract::{lookup, FieldMapping};
use crate::merge::MergeError;
use crate::timestamp::{FormatError, TimestampNormalizer};
use crate::types::Observation;

/// Why a record was dropped
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Malformed(#[from] MergeError),
}

/// Records that are deliberately not turned into observations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The configured wrapper object (e.g. `Observation`) is absent or null
    MissingWrapper,
    /// Source keeps hour-ending samples only and this one is not
    NotHourEnding,
}

/// Outcome of decoding a single record
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Observation(Observation),
    Skipped(SkipReason),
}

/// Decodes one source's records: unwrap, normalize the timestamp, extract
/// the canonical fields.
#[derive(Debug, Clone)]
pub struct ObservationDecoder {
    source: String,
    record_field: Option<String>,
    timestamp_key: String,
    normalizer: TimestampNormalizer,
    hour_ending_only: bool,
    mapping: FieldMapping,
}

impl ObservationDecoder {
    pub fn new(
        source: impl Into<String>,
        timestamp_key: impl Into<String>,
        normalizer: TimestampNormalizer,
        mapping: FieldMapping,
    ) -> Self {
        Self {
            source: source.into(),
            record_field: None,
            timestamp_key: timestamp_key.into(),
            normalizer,
            hour_ending_only: false,
            mapping,
        }
    }

    /// Read each record from this nested object instead of the top level
    pub fn record_field(mut self, field: impl Into<String>) -> Self {
        self.record_field = Some(field.into());
        self
    }

    /// Keep only samples that the hour-ending rule rounded forward
    pub fn hour_ending_only(mut self, enabled: bool) -> Self {
        self.hour_ending_only = enabled;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    pub fn decode(&self, record: &Value) -> Result<Decoded, RecordError> {
        let object = as_object(record)?;
        let object = match &self.record_field {
            Some(field) => match object.get(field) {
                None | Some(Value::Null) => return Ok(Decoded::Skipped(SkipReason::MissingWrapper)),
                Some(inner) => as_object(inner)?,
            },
            None => object,
        };

        let raw_ts = match lookup(object, &self.timestamp_key) {
            None | Some(Value::Null) => {
                return Err(MergeError::MissingKey(self.timestamp_key.clone()).into())
            }
            Some(v) => v,
        };
        let normalized = self.normalizer.normalize_value(raw_ts)?;
        if self.hour_ending_only && !normalized.rounded {
            return Ok(Decoded::Skipped(SkipReason::NotHourEnding));
        }

        let fields = self.mapping.extract(object)?;
        Ok(Decoded::Observation(Observation {
            timestamp: normalized.bucket,
            source: Some(self.source.clone()),
            fields,
        }))
    }
}

fn as_object(value: &Value) -> Result<&Map<String, Value>, MergeError> {
    value.as_object().ok_or_else(|| {
        let shown: String = value.to_string().chars().take(80).collect();
        MergeError::NotAnObject(shown)
    })
}
