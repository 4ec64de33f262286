//! Database connections.
//!
//! Every connection mode answers the same narrow query interface: run one
//! statement with positional parameters and return all of its rows as raw
//! [`SqlValue`]s. Type interpretation happens later, in the reader.

mod local;
mod remote;
mod replica;

use async_trait::async_trait;
use tursotap_types::error::ExtractError;

pub use local::LocalConnection;
pub use remote::RemoteConnection;
pub(crate) use replica::sync_replica;

/// A raw value as stored by the database, before any type coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    /// TEXT storage whose bytes are not valid UTF-8, kept verbatim.
    MalformedText(Vec<u8>),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Storage class name, matching SQL `typeof()`.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) | Self::MalformedText(_) => "text",
            Self::Blob(_) => "blob",
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Result set of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRows {
    /// Result column names, in select-list order.
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl QueryRows {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Query interface shared by all connection modes.
///
/// A connection is owned by a single table worker and is never shared.
#[async_trait]
pub trait SourceConnection: Send {
    /// Execute `sql` with positional `?` parameters and collect every row.
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<QueryRows, ExtractError>;

    /// Short label for logs.
    fn describe(&self) -> String;
}
