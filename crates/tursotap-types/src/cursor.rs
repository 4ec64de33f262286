//! Replication key values used as bookmarks.
//!
//! A [`ReplicationValue`] is the raw source value of a replication key
//! column. Values compare with the source's native ordering: numeric
//! values (integer and real compare numerically with each other) sort
//! before text, and text compares bytewise.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque comparable scalar stored as a table's high-water mark.
///
/// Serialized untagged so bookmarks read naturally in state files:
/// `20`, `1.5` or `"2024-06-15 10:00:00"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplicationValue {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl ReplicationValue {
    /// Total order following the source's native comparison rules.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Self::Integer(a), Self::Number(b)) => (*a as f64).total_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Self::Number(a), Self::Integer(b)) => a.total_cmp(&(*b as f64)),
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Self::Text(_), _) => Ordering::Greater,
            (_, Self::Text(_)) => Ordering::Less,
        }
    }

    /// Short type tag used by storage backends.
    #[must_use]
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
        }
    }

    /// Rebuild a value from a storage type tag and its text rendering.
    ///
    /// Returns `None` when the tag is unknown or the text does not parse.
    #[must_use]
    pub fn from_tagged(tag: &str, raw: &str) -> Option<Self> {
        match tag {
            "integer" => raw.parse().ok().map(Self::Integer),
            "number" => raw.parse().ok().map(Self::Number),
            "text" => Some(Self::Text(raw.to_string())),
            _ => None,
        }
    }
}

impl PartialOrd for ReplicationValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl fmt::Display for ReplicationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}
