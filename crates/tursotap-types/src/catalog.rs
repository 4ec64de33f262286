//! Table schema and primary key types.
//!
//! A [`TableSchema`] is the runtime-discovered shape of one source table:
//! an ordered list of [`ColumnSchema`] entries, each already mapped to a
//! [`CanonicalType`]. The engine never hardcodes column sets; every table
//! flows through the same extraction path parameterized by this value.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Normalized type every source column type maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalType {
    Integer,
    Number,
    String,
    Boolean,
}

impl CanonicalType {
    /// JSON Schema type keyword for this canonical type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column definition within a table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name.
    pub name: String,
    /// Raw declared type string from the database (may be empty).
    pub source_type: String,
    /// Canonical type values of this column are coerced to.
    pub canonical_type: CanonicalType,
    /// True only for BLOB-origin columns; values are base64 strings.
    pub is_base64_encoded: bool,
    /// Date/time-origin column; values are normalized to ISO-8601 strings.
    #[serde(default)]
    pub is_temporal: bool,
    /// Whether the column permits null values.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// 1-based position within the declared primary key, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key_ordinal: Option<u32>,
}

fn default_nullable() -> bool {
    true
}

/// Kind of schema object a table name resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Table,
    View,
}

/// Column stamped on every record with its extraction time, unless the
/// table already has a column of that name.
pub const EXTRACTED_AT_COLUMN: &str = "_sdc_extracted_at";

/// Discovered shape of one source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name, case-sensitive, exactly as configured.
    pub table: String,
    pub kind: TableKind,
    /// Columns in declaration order.
    pub columns: Vec<ColumnSchema>,
    /// False for views and `WITHOUT ROWID` tables.
    pub has_rowid: bool,
}

impl TableSchema {
    /// Look up a column by exact name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Position of a column by exact name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Primary key declared in the table definition, ordered by key position.
    #[must_use]
    pub fn declared_primary_key(&self) -> PrimaryKey {
        let mut keyed: Vec<(u32, &str)> = self
            .columns
            .iter()
            .filter_map(|c| c.primary_key_ordinal.map(|ord| (ord, c.name.as_str())))
            .collect();
        keyed.sort_by_key(|(ord, _)| *ord);
        PrimaryKey::new(keyed.into_iter().map(|(_, name)| name.to_string()).collect())
    }

    /// Whether records carry the [`EXTRACTED_AT_COLUMN`] stamp.
    #[must_use]
    pub fn stamps_extracted_at(&self) -> bool {
        self.column(EXTRACTED_AT_COLUMN).is_none()
    }

    /// Render the schema as a JSON Schema object for the SCHEMA message.
    #[must_use]
    pub fn to_json_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        for column in &self.columns {
            let mut prop = serde_json::Map::new();
            let type_value = if column.nullable {
                serde_json::json!([column.canonical_type.as_str(), "null"])
            } else {
                serde_json::json!(column.canonical_type.as_str())
            };
            prop.insert("type".to_string(), type_value);
            if column.is_base64_encoded {
                prop.insert("contentEncoding".to_string(), "base64".into());
            }
            if column.is_temporal {
                prop.insert("format".to_string(), "date-time".into());
            }
            properties.insert(column.name.clone(), serde_json::Value::Object(prop));
        }
        if self.stamps_extracted_at() {
            properties.insert(
                EXTRACTED_AT_COLUMN.to_string(),
                serde_json::json!({"type": ["string", "null"], "format": "date-time"}),
            );
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "additionalProperties": false,
        })
    }
}

/// Ordered primary key column names.
///
/// An empty key is legal and means no natural key is known; downstream
/// must treat every record of such a table as append-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrimaryKey(Vec<String>);

impl PrimaryKey {
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self(columns)
    }

    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, canonical_type: CanonicalType, pk: Option<u32>) -> ColumnSchema {
        ColumnSchema {
            name: name.to_string(),
            source_type: String::new(),
            canonical_type,
            is_base64_encoded: false,
            is_temporal: false,
            nullable: pk.is_none(),
            primary_key_ordinal: pk,
        }
    }

    fn schema(columns: Vec<ColumnSchema>) -> TableSchema {
        TableSchema {
            table: "orders".to_string(),
            kind: TableKind::Table,
            columns,
            has_rowid: true,
        }
    }

    #[test]
    fn declared_primary_key_follows_key_ordinal_not_column_order() {
        let s = schema(vec![
            column("b", CanonicalType::Integer, Some(2)),
            column("note", CanonicalType::String, None),
            column("a", CanonicalType::Integer, Some(1)),
        ]);
        assert_eq!(s.declared_primary_key().columns(), ["a", "b"]);
    }

    #[test]
    fn declared_primary_key_empty_without_key_columns() {
        let s = schema(vec![column("note", CanonicalType::String, None)]);
        assert!(s.declared_primary_key().is_empty());
    }

    #[test]
    fn column_lookup_is_case_sensitive() {
        let s = schema(vec![column("Id", CanonicalType::Integer, None)]);
        assert!(s.column("Id").is_some());
        assert!(s.column("id").is_none());
        assert_eq!(s.column_index("Id"), Some(0));
    }

    #[test]
    fn json_schema_marks_nullability_and_formats() {
        let mut blob = column("payload", CanonicalType::String, None);
        blob.is_base64_encoded = true;
        let mut ts = column("created_at", CanonicalType::String, None);
        ts.is_temporal = true;
        let s = schema(vec![column("id", CanonicalType::Integer, Some(1)), blob, ts]);

        let json = s.to_json_schema();
        assert_eq!(json["properties"]["id"]["type"], "integer");
        assert_eq!(
            json["properties"]["payload"]["type"],
            serde_json::json!(["string", "null"])
        );
        assert_eq!(json["properties"]["payload"]["contentEncoding"], "base64");
        assert_eq!(json["properties"]["created_at"]["format"], "date-time");
        assert_eq!(json["additionalProperties"], false);
        assert_eq!(
            json["properties"][EXTRACTED_AT_COLUMN],
            serde_json::json!({"type": ["string", "null"], "format": "date-time"})
        );
    }

    #[test]
    fn source_column_named_like_extraction_stamp_is_kept() {
        let mut stamp = column(EXTRACTED_AT_COLUMN, CanonicalType::Integer, None);
        stamp.nullable = false;
        let s = schema(vec![stamp]);
        assert!(!s.stamps_extracted_at());
        assert_eq!(s.to_json_schema()["properties"][EXTRACTED_AT_COLUMN]["type"], "integer");
    }

    #[test]
    fn primary_key_serializes_as_plain_list() {
        let pk = PrimaryKey::new(vec!["id".into()]);
        assert_eq!(serde_json::to_value(&pk).unwrap(), serde_json::json!(["id"]));
    }
}
