//! Extracted records and record batches.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::cursor::ReplicationValue;

/// A cell value already coerced to its column's canonical type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Number(f64),
    String(String),
    Boolean(bool),
}

impl FieldValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

/// One extracted row: column name to canonical value, in column order.
///
/// Serializes as a JSON object whose keys keep declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: FieldValue) {
        self.fields.push((column.into(), value));
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// An immutable, ordered batch of records produced by one page query.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    table: String,
    first_row: u64,
    records: Vec<Record>,
    high_water: Option<ReplicationValue>,
}

impl RecordBatch {
    /// Build a batch.
    ///
    /// `first_row` is the 0-based extraction position of the first record;
    /// `high_water` is the largest raw replication key value in the batch
    /// (always `None` for FULL_TABLE reads).
    #[must_use]
    pub fn new(
        table: impl Into<String>,
        first_row: u64,
        records: Vec<Record>,
        high_water: Option<ReplicationValue>,
    ) -> Self {
        Self {
            table: table.into(),
            first_row,
            records,
            high_water,
        }
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn first_row(&self) -> u64 {
        self.first_row
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn high_water(&self) -> Option<&ReplicationValue> {
        self.high_water.as_ref()
    }

    /// Hand the records over for emission.
    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_in_column_order() {
        let mut record = Record::with_capacity(3);
        record.push("zeta", FieldValue::Integer(1));
        record.push("alpha", FieldValue::String("a".into()));
        record.push("mid", FieldValue::Null);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"zeta":1,"alpha":"a","mid":null}"#);
    }

    #[test]
    fn field_values_serialize_untagged() {
        assert_eq!(serde_json::to_string(&FieldValue::Boolean(true)).unwrap(), "true");
        assert_eq!(serde_json::to_string(&FieldValue::Number(1.5)).unwrap(), "1.5");
    }

    #[test]
    fn record_lookup_by_name() {
        let mut record = Record::default();
        record.push("id", FieldValue::Integer(7));
        assert_eq!(record.get("id").and_then(FieldValue::as_i64), Some(7));
        assert!(record.get("missing").is_none());
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn batch_exposes_high_water() {
        let batch = RecordBatch::new(
            "events",
            0,
            vec![Record::default()],
            Some(ReplicationValue::Integer(20)),
        );
        assert_eq!(batch.table(), "events");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.high_water(), Some(&ReplicationValue::Integer(20)));
    }
}
