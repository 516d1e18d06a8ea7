//! Per-column merge policies and table layouts

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::FieldValue;

/// What happens to a stored column when a new value arrives for it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Newest write wins, including "no value"
    #[default]
    Overwrite,
    /// "No value" never replaces a stored value
    Coalesce,
}

impl MergePolicy {
    pub fn merge(self, existing: FieldValue, incoming: FieldValue) -> FieldValue {
        match self {
            MergePolicy::Overwrite => incoming,
            MergePolicy::Coalesce => incoming.or(existing),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SchemaError {
    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("key column {0:?} cannot also be a value column")]
    KeyColumnAsValue(String),

    #[error("table {table:?} has no column {column:?}")]
    UnknownColumn { table: String, column: String },

    #[error("table {0:?} has no value columns")]
    NoColumns(String),
}

/// A destination table: unique timestamp key plus value columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub key_column: String,
    pub columns: BTreeMap<String, MergePolicy>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, key_column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_column: key_column.into(),
            columns: BTreeMap::new(),
        }
    }

    pub fn column(mut self, name: impl Into<String>, policy: MergePolicy) -> Self {
        self.columns.insert(name.into(), policy);
        self
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        check_identifier(&self.name)?;
        check_identifier(&self.key_column)?;
        if self.columns.is_empty() {
            return Err(SchemaError::NoColumns(self.name.clone()));
        }
        for column in self.columns.keys() {
            check_identifier(column)?;
            if *column == self.key_column {
                return Err(SchemaError::KeyColumnAsValue(column.clone()));
            }
        }
        Ok(())
    }

    /// Resolve the policies one source writes with.
    ///
    /// `overrides` replaces the table policy for individual columns; every
    /// override must name a column of this table.
    pub fn plan(&self, overrides: &BTreeMap<String, MergePolicy>) -> Result<MergePlan, SchemaError> {
        self.validate()?;
        let mut columns = self.columns.clone();
        for (column, policy) in overrides {
            match columns.get_mut(column) {
                Some(slot) => *slot = *policy,
                None => {
                    return Err(SchemaError::UnknownColumn {
                        table: self.name.clone(),
                        column: column.clone(),
                    })
                }
            }
        }
        Ok(MergePlan {
            table: self.name.clone(),
            key_column: self.key_column.clone(),
            columns,
        })
    }
}

/// Validated table layout with per-column policies resolved for one source.
///
/// Only [`TableSchema::plan`] builds one, so every identifier in it is safe
/// to splice into SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    table: String,
    key_column: String,
    columns: BTreeMap<String, MergePolicy>,
}

impl MergePlan {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn policy(&self, column: &str) -> Option<MergePolicy> {
        self.columns.get(column).copied()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }
}

fn check_identifier(name: &str) -> Result<(), SchemaError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid && name.len() <= 63 {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier(name.to_string()))
    }
}
