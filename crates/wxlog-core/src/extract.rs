//! Field extraction from loosely-typed source records

use serde_json::{Map, Value};

use crate::timestamp::FormatError;
use crate::types::{FieldMap, FieldValue};

/// Vendor key -> canonical field name, plus how to unwrap nested values.
///
/// Vendor keys starting with `/` are treated as JSON pointers into the
/// record (`/clouds/all`); anything else is a top-level key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldMapping {
    entries: Vec<(String, String)>,
    value_key: Option<String>,
}

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key read from object-shaped values such as `{"Value": 80}`
    pub fn value_key(mut self, key: impl Into<String>) -> Self {
        self.value_key = Some(key.into());
        self
    }

    pub fn map(mut self, vendor_key: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.entries.push((vendor_key.into(), canonical.into()));
        self
    }

    /// Canonical names in mapping order
    pub fn canonical_fields(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, c)| c.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pull every canonical field out of `record`.
    ///
    /// The result always carries the full canonical set; vendor keys the
    /// record lacks come back as `None`.
    pub fn extract(&self, record: &Map<String, Value>) -> Result<FieldMap, FormatError> {
        let mut fields = FieldMap::new();
        for (vendor_key, canonical) in &self.entries {
            let raw = lookup(record, vendor_key);
            let value = self.numeric(vendor_key, raw)?;
            fields.insert(canonical.clone(), value);
        }
        Ok(fields)
    }

    fn numeric(&self, field: &str, raw: Option<&Value>) -> Result<FieldValue, FormatError> {
        let raw = match raw {
            Some(Value::Object(inner)) => match &self.value_key {
                Some(key) => inner.get(key),
                None => {
                    return Err(FormatError::NonNumeric {
                        field: field.to_string(),
                        found: Value::Object(inner.clone()).to_string(),
                    })
                }
            },
            other => other,
        };

        match raw {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => {
                match s.trim().parse::<f64>() {
                    Ok(v) if v.is_finite() => Ok(Some(v)),
                    _ => Err(FormatError::NonNumeric {
                        field: field.to_string(),
                        found: s.clone(),
                    }),
                }
            }
            Some(other) => Err(FormatError::NonNumeric {
                field: field.to_string(),
                found: other.to_string(),
            }),
        }
    }
}

/// Look up a top-level key or a JSON pointer
pub fn lookup<'a>(record: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    if let Some(pointer) = key.strip_prefix('/') {
        let mut segments = pointer.split('/');
        let first = segments.next()?;
        let mut current = record.get(&unescape(first))?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(&unescape(segment))?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    } else {
        record.get(key)
    }
}

fn unescape(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}
