//! Per-table replication settings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Replication strategy for a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationMethod {
    /// Re-extract every row on each run.
    #[default]
    FullTable,
    /// Extract only rows newer than the last committed bookmark.
    Incremental,
}

impl ReplicationMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullTable => "FULL_TABLE",
            Self::Incremental => "INCREMENTAL",
        }
    }
}

impl fmt::Display for ReplicationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of one table to extract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Table name (case-sensitive).
    pub name: String,
    #[serde(default)]
    pub replication_method: ReplicationMethod,
    /// Column ordering and bounding incremental reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_key: Option<String>,
    /// Override for the primary key; empty means infer from the schema.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
}

impl TableConfig {
    /// Full-table config with no overrides.
    #[must_use]
    pub fn full_table(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            replication_method: ReplicationMethod::FullTable,
            replication_key: None,
            primary_key: Vec::new(),
        }
    }

    /// Incremental config bounded by `replication_key`.
    #[must_use]
    pub fn incremental(name: impl Into<String>, replication_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            replication_method: ReplicationMethod::Incremental,
            replication_key: Some(replication_key.into()),
            primary_key: Vec::new(),
        }
    }

    /// Builder-style primary key override.
    #[must_use]
    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// The replication key when the table replicates incrementally.
    ///
    /// FULL_TABLE tables never expose a key, even if one is configured.
    #[must_use]
    pub fn effective_replication_key(&self) -> Option<&str> {
        match self.replication_method {
            ReplicationMethod::Incremental => self
                .replication_key
                .as_deref()
                .filter(|k| !k.trim().is_empty()),
            ReplicationMethod::FullTable => None,
        }
    }
}
