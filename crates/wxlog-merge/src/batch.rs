//! Decoding of one fetch's records into a batch

use serde_json::Value;
use tracing::{debug, warn};
use wxlog_core::{Decoded, Observation, ObservationDecoder, RecordError};

/// Per-record counters for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub records: usize,
    pub decoded: usize,
    pub skipped: usize,
    pub format_errors: usize,
    pub malformed: usize,
}

/// Observations decoded from one source, in record order
#[derive(Debug, Clone, Default)]
pub struct ObservationBatch {
    observations: Vec<Observation>,
    stats: BatchStats,
}

impl ObservationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode every record; bad records are logged and counted, never fatal
    pub fn decode(decoder: &ObservationDecoder, records: &[Value]) -> Self {
        let mut batch = Self::new();
        for (index, record) in records.iter().enumerate() {
            batch.push_record(decoder, index, record);
        }
        debug!(
            source = decoder.source(),
            records = batch.stats.records,
            decoded = batch.stats.decoded,
            skipped = batch.stats.skipped,
            "decoded batch"
        );
        batch
    }

    fn push_record(&mut self, decoder: &ObservationDecoder, index: usize, record: &Value) {
        self.stats.records += 1;
        match decoder.decode(record) {
            Ok(Decoded::Observation(observation)) => {
                self.stats.decoded += 1;
                self.observations.push(observation);
            }
            Ok(Decoded::Skipped(_)) => self.stats.skipped += 1,
            Err(RecordError::Format(e)) => {
                warn!(source = decoder.source(), index, "dropping record: {}", e);
                self.stats.format_errors += 1;
            }
            Err(RecordError::Malformed(e)) => {
                warn!(source = decoder.source(), index, "dropping record: {}", e);
                self.stats.malformed += 1;
            }
        }
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Observation>, BatchStats) {
        (self.observations, self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wxlog_core::{FieldMapping, RoundingPolicy, TimestampFormat, TimestampNormalizer};

    fn decoder() -> ObservationDecoder {
        ObservationDecoder::new(
            "lville",
            "ObservationTimeUtc",
            TimestampNormalizer::new(TimestampFormat::utc(), RoundingPolicy::HourEnding),
            FieldMapping::new()
                .value_key("Value")
                .map("Humidity", "humidity"),
        )
        .record_field("Observation")
        .hour_ending_only(true)
    }

    #[test]
    fn test_bad_records_do_not_stop_the_batch() {
        let records = vec![
            json!({"Observation": {"ObservationTimeUtc": "2024-01-01T00:59:00Z", "Humidity": {"Value": 80}}}),
            json!({"Observation": null}),
            json!({"Observation": {"ObservationTimeUtc": "2024-01-01T01:14:00Z"}}),
            json!({"Observation": {"ObservationTimeUtc": "yesterday"}}),
            json!({"Observation": {"Humidity": {"Value": 81}}}),
            json!({"Observation": {"ObservationTimeUtc": "2024-01-01T01:59:00Z", "Humidity": {"Value": "n/a"}}}),
            json!({"Observation": {"ObservationTimeUtc": "2024-01-01T01:59:00Z", "Humidity": {"Value": 75}}}),
        ];

        let batch = ObservationBatch::decode(&decoder(), &records);
        assert_eq!(
            batch.stats(),
            BatchStats {
                records: 7,
                decoded: 2,
                skipped: 2,
                format_errors: 2,
                malformed: 1,
            }
        );
        let values: Vec<_> = batch
            .observations()
            .iter()
            .map(|o| o.value("humidity"))
            .collect();
        assert_eq!(values, vec![Some(80.0), Some(75.0)]);
    }

    #[test]
    fn test_empty_input() {
        let batch = ObservationBatch::decode(&decoder(), &[]);
        assert!(batch.is_empty());
        assert_eq!(batch.stats(), BatchStats::default());
    }
}
