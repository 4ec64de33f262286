//! Output message model.
//!
//! The engine emits, per table, one SCHEMA message before any records,
//! one RECORD message per extracted row, and STATE messages after each
//! batch and at finalize. The JSON shape follows the Singer convention so
//! the stream can be piped straight into existing loaders.

use serde::Serialize;

use crate::catalog::{PrimaryKey, TableSchema};
use crate::record::Record;
use crate::state::Bookmarks;

/// One message in the ordered output stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    Schema(SchemaMessage),
    Record(RecordMessage),
    State(StateMessage),
}

/// Schema description for a table, emitted once before its records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaMessage {
    pub stream: String,
    pub schema: serde_json::Value,
    pub key_properties: Vec<String>,
    pub bookmark_properties: Vec<String>,
}

impl SchemaMessage {
    #[must_use]
    pub fn new(schema: &TableSchema, primary_key: &PrimaryKey, replication_key: Option<&str>) -> Self {
        Self {
            stream: schema.table.clone(),
            schema: schema.to_json_schema(),
            key_properties: primary_key.columns().to_vec(),
            bookmark_properties: replication_key.map(str::to_string).into_iter().collect(),
        }
    }
}

/// A single extracted row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordMessage {
    pub stream: String,
    pub record: Record,
    /// ISO-8601 UTC extraction time.
    pub time_extracted: String,
}

/// Checkpoint carrying the run's full bookmark map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateMessage {
    pub value: Bookmarks,
}

impl Message {
    /// Stream the message belongs to; `None` for STATE.
    #[must_use]
    pub fn stream(&self) -> Option<&str> {
        match self {
            Self::Schema(m) => Some(&m.stream),
            Self::Record(m) => Some(&m.stream),
            Self::State(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CanonicalType, ColumnSchema, TableKind};
    use crate::cursor::ReplicationValue;
    use crate::record::FieldValue;
    use crate::state::Bookmark;

    fn events_schema() -> TableSchema {
        TableSchema {
            table: "events".into(),
            kind: TableKind::Table,
            columns: vec![ColumnSchema {
                name: "id".into(),
                source_type: "INTEGER".into(),
                canonical_type: CanonicalType::Integer,
                is_base64_encoded: false,
                is_temporal: false,
                nullable: false,
                primary_key_ordinal: Some(1),
            }],
            has_rowid: true,
        }
    }

    #[test]
    fn schema_message_json_shape() {
        let schema = events_schema();
        let msg = Message::Schema(SchemaMessage::new(
            &schema,
            &schema.declared_primary_key(),
            Some("id"),
        ));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "SCHEMA");
        assert_eq!(json["stream"], "events");
        assert_eq!(json["key_properties"], serde_json::json!(["id"]));
        assert_eq!(json["bookmark_properties"], serde_json::json!(["id"]));
        assert_eq!(json["schema"]["properties"]["id"]["type"], "integer");
    }

    #[test]
    fn record_message_json_shape() {
        let mut record = Record::default();
        record.push("id", FieldValue::Integer(1));
        let msg = Message::Record(RecordMessage {
            stream: "events".into(),
            record,
            time_extracted: "2026-01-01T00:00:00Z".into(),
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"type":"RECORD","stream":"events","record":{"id":1},"time_extracted":"2026-01-01T00:00:00Z"}"#
        );
        assert_eq!(msg.stream(), Some("events"));
    }

    #[test]
    fn state_message_json_shape() {
        let mut bookmarks = Bookmarks::new();
        bookmarks.advance(
            "events".into(),
            Bookmark::new("created_at", ReplicationValue::Integer(30)),
        );
        let msg = Message::State(StateMessage { value: bookmarks });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "STATE");
        assert_eq!(
            json["value"]["bookmarks"]["events"]["replication_key_value"],
            30
        );
        assert!(msg.stream().is_none());
    }
}
