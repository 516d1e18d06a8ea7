//! SQL text for the merge contract
//!
//! Identifiers come from a [`MergePlan`], which only exists after
//! validation, so they are spliced in without quoting.

use crate::merge::MergeError;
use crate::policy::{MergePlan, MergePolicy};

/// SQL flavour of a storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    fn placeholder(self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", n),
            Dialect::Sqlite => format!("?{}", n),
        }
    }

    fn key_type(self) -> &'static str {
        match self {
            Dialect::Postgres => "TIMESTAMPTZ",
            Dialect::Sqlite => "TEXT",
        }
    }

    fn value_type(self) -> &'static str {
        match self {
            Dialect::Postgres => "DOUBLE PRECISION",
            Dialect::Sqlite => "REAL",
        }
    }
}

/// `INSERT ... ON CONFLICT` for one observation.
///
/// Binds: `1` is the key, then `columns` in order. Overwrite columns take
/// `EXCLUDED.col`; coalesce columns keep the stored value when the incoming
/// one is NULL.
pub fn upsert_statement(
    plan: &MergePlan,
    columns: &[&str],
    dialect: Dialect,
) -> Result<String, MergeError> {
    let table = plan.table();
    let key = plan.key_column();

    let mut assignments = Vec::with_capacity(columns.len());
    for column in columns {
        let policy = plan
            .policy(column)
            .ok_or_else(|| MergeError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            })?;
        assignments.push(match policy {
            MergePolicy::Overwrite => format!("{c} = EXCLUDED.{c}", c = column),
            MergePolicy::Coalesce => {
                format!("{c} = COALESCE(EXCLUDED.{c}, {t}.{c})", c = column, t = table)
            }
        });
    }

    let names: Vec<&str> = std::iter::once(key).chain(columns.iter().copied()).collect();
    let placeholders: Vec<String> = (1..=names.len()).map(|n| dialect.placeholder(n)).collect();

    let conflict = if assignments.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", assignments.join(", "))
    };

    Ok(format!(
        "INSERT INTO {table} ({names}) VALUES ({values}) ON CONFLICT ({key}) {conflict}",
        table = table,
        names = names.join(", "),
        values = placeholders.join(", "),
        key = key,
        conflict = conflict,
    ))
}

/// `CREATE TABLE IF NOT EXISTS` for the plan's table
pub fn create_table_statement(plan: &MergePlan, dialect: Dialect) -> String {
    let mut defs = vec![format!(
        "{} {} PRIMARY KEY",
        plan.key_column(),
        dialect.key_type()
    )];
    defs.extend(
        plan.columns()
            .map(|c| format!("{} {}", c, dialect.value_type())),
    );
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        plan.table(),
        defs.join(", ")
    )
}

/// Column list used by the row readers: key first, then value columns
pub fn select_list(plan: &MergePlan) -> String {
    std::iter::once(plan.key_column())
        .chain(plan.columns())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rows with `start <= key <= end`, oldest first. Binds: `1` start, `2` end.
pub fn select_range_statement(plan: &MergePlan, dialect: Dialect) -> String {
    format!(
        "SELECT {cols} FROM {table} WHERE {key} >= {p1} AND {key} <= {p2} ORDER BY {key} ASC",
        cols = select_list(plan),
        table = plan.table(),
        key = plan.key_column(),
        p1 = dialect.placeholder(1),
        p2 = dialect.placeholder(2),
    )
}

/// A single row by key. Binds: `1` key.
pub fn select_row_statement(plan: &MergePlan, dialect: Dialect) -> String {
    format!(
        "SELECT {cols} FROM {table} WHERE {key} = {p1}",
        cols = select_list(plan),
        table = plan.table(),
        key = plan.key_column(),
        p1 = dialect.placeholder(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::TableSchema;
    use std::collections::BTreeMap;

    fn plan() -> MergePlan {
        TableSchema::new("weather_data", "date")
            .column("humidity", MergePolicy::Overwrite)
            .column("cloud_cover", MergePolicy::Coalesce)
            .plan(&BTreeMap::new())
            .unwrap()
    }

    #[test]
    fn test_postgres_upsert() {
        let sql = upsert_statement(&plan(), &["cloud_cover", "humidity"], Dialect::Postgres)
            .unwrap();
        assert_eq!(
            sql,
            "INSERT INTO weather_data (date, cloud_cover, humidity) VALUES ($1, $2, $3) \
             ON CONFLICT (date) DO UPDATE SET \
             cloud_cover = COALESCE(EXCLUDED.cloud_cover, weather_data.cloud_cover), \
             humidity = EXCLUDED.humidity"
        );
    }

    #[test]
    fn test_sqlite_placeholders() {
        let sql = upsert_statement(&plan(), &["humidity"], Dialect::Sqlite).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO weather_data (date, humidity) VALUES (?1, ?2) \
             ON CONFLICT (date) DO UPDATE SET humidity = EXCLUDED.humidity"
        );
    }

    #[test]
    fn test_unknown_column_rejected() {
        let err = upsert_statement(&plan(), &["wind"], Dialect::Postgres).unwrap_err();
        assert!(matches!(err, MergeError::UnknownColumn { .. }));
    }

    #[test]
    fn test_no_columns_does_nothing_on_conflict() {
        let sql = upsert_statement(&plan(), &[], Dialect::Postgres).unwrap();
        assert!(sql.ends_with("ON CONFLICT (date) DO NOTHING"));
    }

    #[test]
    fn test_create_table() {
        assert_eq!(
            create_table_statement(&plan(), Dialect::Postgres),
            "CREATE TABLE IF NOT EXISTS weather_data (date TIMESTAMPTZ PRIMARY KEY, \
             cloud_cover DOUBLE PRECISION, humidity DOUBLE PRECISION)"
        );
    }

    #[test]
    fn test_select_range() {
        assert_eq!(
            select_range_statement(&plan(), Dialect::Sqlite),
            "SELECT date, cloud_cover, humidity FROM weather_data \
             WHERE date >= ?1 AND date <= ?2 ORDER BY date ASC"
        );
    }
}
