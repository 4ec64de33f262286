//! Bookmark and run-tracking model types.
//!
//! Pure data types shared by the state backends and the engine so neither
//! depends on the other.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cursor::ReplicationValue;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque tap identifier namespacing persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TapId(String);

impl TapId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Case-sensitive source table name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableName(String);

impl TableName {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for TableName {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

// ---------------------------------------------------------------------------
// Bookmarks
// ---------------------------------------------------------------------------

/// Persisted high-water mark of one table's replication key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub replication_key: String,
    pub replication_key_value: ReplicationValue,
}

impl Bookmark {
    #[must_use]
    pub fn new(replication_key: impl Into<String>, value: ReplicationValue) -> Self {
        Self {
            replication_key: replication_key.into(),
            replication_key_value: value,
        }
    }
}

/// Bookmark map for one run, keyed by table.
///
/// Serializes in Singer state shape: `{"bookmarks": {"t": {...}}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bookmarks {
    #[serde(default)]
    bookmarks: BTreeMap<TableName, Bookmark>,
}

impl Bookmarks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, table: &TableName) -> Option<&Bookmark> {
        self.bookmarks.get(table)
    }

    /// Replace a table's bookmark only if it does not move backwards.
    ///
    /// Returns `true` when the value was accepted. A bookmark for a
    /// different replication key always replaces the old one.
    pub fn advance(&mut self, table: TableName, bookmark: Bookmark) -> bool {
        if let Some(current) = self.bookmarks.get(&table) {
            if current.replication_key == bookmark.replication_key
                && bookmark.replication_key_value < current.replication_key_value
            {
                return false;
            }
        }
        self.bookmarks.insert(table, bookmark);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TableName, &Bookmark)> {
        self.bookmarks.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bookmarks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }
}

/// Snapshot of a persisted bookmark with its write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmarkState {
    pub bookmark: Bookmark,
    /// ISO-8601 UTC timestamp of the last write.
    pub updated_at: String,
}

// ---------------------------------------------------------------------------
// Run tracking
// ---------------------------------------------------------------------------

/// Status of one table's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Wire-format string for storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate statistics for a finished table run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub records_read: u64,
    pub batches_read: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn int_bookmark(v: i64) -> Bookmark {
        Bookmark::new("created_at", ReplicationValue::Integer(v))
    }

    #[test]
    fn advance_accepts_equal_and_greater() {
        let mut bm = Bookmarks::new();
        assert!(bm.advance("events".into(), int_bookmark(20)));
        assert!(bm.advance("events".into(), int_bookmark(20)));
        assert!(bm.advance("events".into(), int_bookmark(30)));
        assert_eq!(
            bm.get(&"events".into()).unwrap().replication_key_value,
            ReplicationValue::Integer(30)
        );
    }

    #[test]
    fn advance_rejects_lower_value() {
        let mut bm = Bookmarks::new();
        bm.advance("events".into(), int_bookmark(30));
        assert!(!bm.advance("events".into(), int_bookmark(10)));
        assert_eq!(
            bm.get(&"events".into()).unwrap().replication_key_value,
            ReplicationValue::Integer(30)
        );
    }

    #[test]
    fn advance_replaces_on_key_change() {
        let mut bm = Bookmarks::new();
        bm.advance("events".into(), int_bookmark(30));
        let other = Bookmark::new("id", ReplicationValue::Integer(1));
        assert!(bm.advance("events".into(), other.clone()));
        assert_eq!(bm.get(&"events".into()), Some(&other));
    }

    #[test]
    fn bookmarks_serialize_in_singer_shape() {
        let mut bm = Bookmarks::new();
        bm.advance("events".into(), int_bookmark(20));
        let json = serde_json::to_value(&bm).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "bookmarks": {
                    "events": {"replication_key": "created_at", "replication_key_value": 20}
                }
            })
        );
        let back: Bookmarks = serde_json::from_value(json).unwrap();
        assert_eq!(back, bm);
    }

    #[test]
    fn run_status_as_str() {
        assert_eq!(RunStatus::Running.as_str(), "running");
        assert_eq!(RunStatus::Completed.as_str(), "completed");
        assert_eq!(RunStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn table_name_display() {
        let t = TableName::from("Events");
        assert_eq!(t.as_str(), "Events");
        assert_eq!(t.to_string(), "Events");
    }

    proptest! {
        #[test]
        fn bookmark_never_decreases(values in proptest::collection::vec(any::<i64>(), 1..32)) {
            let mut bm = Bookmarks::new();
            let mut high: Option<i64> = None;
            for v in values {
                bm.advance("t".into(), int_bookmark(v));
                high = Some(high.map_or(v, |h| h.max(v)));
                let stored = &bm.get(&"t".into()).unwrap().replication_key_value;
                prop_assert_eq!(stored, &ReplicationValue::Integer(high.unwrap()));
            }
        }
    }
}
