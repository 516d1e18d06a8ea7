//! Layouts of the tables the logging jobs write to
//!
//! Both tables are keyed by a unique `date TIMESTAMPTZ` column holding the
//! bucket timestamp. Column names must stay in step with the dashboards
//! reading these tables.

use wxlog_core::{MergePolicy, TableSchema};

/// Table names
pub mod tables {
    pub const WEATHER_DATA: &str = "weather_data";
    pub const SOLAR_DATA: &str = "solar_data";
}

/// Key column shared by both tables
pub const KEY_COLUMN: &str = "date";

/// Hourly weather conditions merged from several providers.
///
/// `cloud_cover` and `heat_index` come from providers that often report
/// nothing for a bucket, so a missing value never clears a stored one.
pub fn weather_data() -> TableSchema {
    TableSchema::new(tables::WEATHER_DATA, KEY_COLUMN)
        .column("cloud_cover", MergePolicy::Coalesce)
        .column("heat_index", MergePolicy::Coalesce)
        .column("humidity", MergePolicy::Overwrite)
        .column("rain", MergePolicy::Overwrite)
        .column("snow", MergePolicy::Overwrite)
        .column("solar_irr", MergePolicy::Overwrite)
        .column("temp", MergePolicy::Overwrite)
        .column("wind", MergePolicy::Overwrite)
}

/// Solar inverter production in 5-minute buckets
pub fn solar_data() -> TableSchema {
    TableSchema::new(tables::SOLAR_DATA, KEY_COLUMN)
        .column("wh_sum", MergePolicy::Overwrite)
        .column("w_avg", MergePolicy::Overwrite)
}

/// Built-in layout for a table name, if there is one
pub fn builtin(name: &str) -> Option<TableSchema> {
    match name {
        tables::WEATHER_DATA => Some(weather_data()),
        tables::SOLAR_DATA => Some(solar_data()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_builtin_tables_are_valid() {
        for schema in [weather_data(), solar_data()] {
            schema.validate().unwrap();
            assert_eq!(schema.key_column, KEY_COLUMN);
        }
    }

    #[test]
    fn test_weather_policies() {
        let plan = weather_data().plan(&BTreeMap::new()).unwrap();
        assert_eq!(plan.policy("cloud_cover"), Some(MergePolicy::Coalesce));
        assert_eq!(plan.policy("heat_index"), Some(MergePolicy::Coalesce));
        assert_eq!(plan.policy("humidity"), Some(MergePolicy::Overwrite));
        assert_eq!(plan.columns().count(), 8);
    }

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(builtin("solar_data"), Some(solar_data()));
        assert!(builtin("archive").is_none());
    }
}
