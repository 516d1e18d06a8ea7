//! Merge contract between incoming observations and stored rows
//!
//! Backends that speak SQL express this contract in their upsert statement
//! (see [`crate::sql`]); the in-memory functions here are the reference the
//! SQL must agree with.

use std::collections::BTreeMap;

use crate::policy::MergePlan;
use crate::types::{BucketTimestamp, FieldMap, Observation, StoredRow};

/// A pair that cannot be merged; the caller drops it and moves on
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MergeError {
    #[error("record is missing required key {0:?}")]
    MissingKey(String),

    #[error("record is not a JSON object: {0}")]
    NotAnObject(String),

    #[error("observation at {0} carries no fields")]
    EmptyObservation(BucketTimestamp),

    #[error("column {column:?} is not part of table {table:?}")]
    UnknownColumn { table: String, column: String },
}

/// Check that an observation can be written under `plan`
pub fn validate(plan: &MergePlan, observation: &Observation) -> Result<(), MergeError> {
    if observation.fields.is_empty() {
        return Err(MergeError::EmptyObservation(observation.timestamp));
    }
    for column in observation.fields.keys() {
        if !plan.contains(column) {
            return Err(MergeError::UnknownColumn {
                table: plan.table().to_string(),
                column: column.clone(),
            });
        }
    }
    Ok(())
}

/// Merge `incoming` into an existing row.
///
/// Only columns present in `incoming` are touched; each follows its policy.
pub fn merge_into(
    row: &mut StoredRow,
    incoming: &FieldMap,
    plan: &MergePlan,
) -> Result<(), MergeError> {
    for (column, value) in incoming {
        let policy = plan.policy(column).ok_or_else(|| MergeError::UnknownColumn {
            table: plan.table().to_string(),
            column: column.clone(),
        })?;
        let slot = row.columns.entry(column.clone()).or_insert(None);
        *slot = policy.merge(*slot, *value);
    }
    Ok(())
}

/// Apply a batch to a keyed set of rows, in order.
///
/// Missing rows are created with every plan column set to "no value".
/// The batch is applied to a copy first, so an error leaves `rows` as it
/// was.
pub fn apply_batch(
    rows: &mut BTreeMap<BucketTimestamp, StoredRow>,
    plan: &MergePlan,
    batch: &[Observation],
) -> Result<usize, MergeError> {
    let mut staged = rows.clone();
    for observation in batch {
        validate(plan, observation)?;
        let row = staged
            .entry(observation.timestamp)
            .or_insert_with(|| StoredRow::empty(observation.timestamp, plan.columns()));
        merge_into(row, &observation.fields, plan)?;
    }
    *rows = staged;
    Ok(batch.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{MergePolicy, TableSchema};
    use chrono::{TimeZone, Utc};

    fn plan() -> MergePlan {
        TableSchema::new("weather_data", "date")
            .column("humidity", MergePolicy::Overwrite)
            .column("temp", MergePolicy::Overwrite)
            .column("cloud_cover", MergePolicy::Coalesce)
            .plan(&BTreeMap::new())
            .unwrap()
    }

    fn at(h: u32) -> BucketTimestamp {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn test_disjoint_fields_union_into_one_row() {
        let plan = plan();
        let mut rows = BTreeMap::new();

        let lville = Observation::new(at(1))
            .with_field("humidity", Some(80.0))
            .with_field("temp", Some(3.5));
        let clouds = Observation::new(at(1)).with_field("cloud_cover", Some(55.0));

        apply_batch(&mut rows, &plan, &[lville]).unwrap();
        apply_batch(&mut rows, &plan, &[clouds]).unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[&at(1)];
        assert_eq!(row.value("humidity"), Some(80.0));
        assert_eq!(row.value("temp"), Some(3.5));
        assert_eq!(row.value("cloud_cover"), Some(55.0));
    }

    #[test]
    fn test_new_row_fills_unknown_columns_with_none() {
        let plan = plan();
        let mut rows = BTreeMap::new();
        apply_batch(
            &mut rows,
            &plan,
            &[Observation::new(at(2)).with_field("temp", Some(1.0))],
        )
        .unwrap();

        let row = &rows[&at(2)];
        assert_eq!(row.columns.len(), 3);
        assert_eq!(row.columns.get("cloud_cover"), Some(&None));
    }

    #[test]
    fn test_coalesce_keeps_value_on_none() {
        let plan = plan();
        let mut rows = BTreeMap::new();
        apply_batch(
            &mut rows,
            &plan,
            &[Observation::new(at(3)).with_field("cloud_cover", Some(55.0))],
        )
        .unwrap();
        apply_batch(
            &mut rows,
            &plan,
            &[Observation::new(at(3)).with_field("cloud_cover", None)],
        )
        .unwrap();

        assert_eq!(rows[&at(3)].value("cloud_cover"), Some(55.0));
    }

    #[test]
    fn test_overwrite_replaces_including_none() {
        let plan = plan();
        let mut rows = BTreeMap::new();
        let first = Observation::new(at(4)).with_field("humidity", Some(60.0));
        let second = Observation::new(at(4)).with_field("humidity", Some(65.0));
        let third = Observation::new(at(4)).with_field("humidity", None);

        apply_batch(&mut rows, &plan, &[first, second]).unwrap();
        assert_eq!(rows[&at(4)].value("humidity"), Some(65.0));

        apply_batch(&mut rows, &plan, &[third]).unwrap();
        assert_eq!(rows[&at(4)].value("humidity"), None);
    }

    #[test]
    fn test_rerunning_batch_is_idempotent() {
        let plan = plan();
        let batch = vec![
            Observation::new(at(5))
                .with_field("humidity", Some(70.0))
                .with_field("cloud_cover", Some(20.0)),
            Observation::new(at(6)).with_field("cloud_cover", None),
        ];

        let mut once = BTreeMap::new();
        apply_batch(&mut once, &plan, &batch).unwrap();
        let mut twice = once.clone();
        apply_batch(&mut twice, &plan, &batch).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_failed_batch_leaves_rows_untouched() {
        let plan = plan();
        let mut rows = BTreeMap::new();
        apply_batch(
            &mut rows,
            &plan,
            &[Observation::new(at(7)).with_field("temp", Some(2.0))],
        )
        .unwrap();
        let before = rows.clone();

        let batch = vec![
            Observation::new(at(7)).with_field("temp", Some(9.0)),
            Observation::new(at(8)).with_field("wind", Some(4.0)),
        ];
        let err = apply_batch(&mut rows, &plan, &batch).unwrap_err();

        assert!(matches!(err, MergeError::UnknownColumn { .. }));
        assert_eq!(rows, before);
    }

    #[test]
    fn test_validate_rejects_empty_observation() {
        let plan = plan();
        assert_eq!(
            validate(&plan, &Observation::new(at(9))),
            Err(MergeError::EmptyObservation(at(9)))
        );
    }
}
