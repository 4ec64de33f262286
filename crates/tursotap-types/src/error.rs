//! Extraction error taxonomy.
//!
//! [`ExtractError`] covers everything that can stop one table's
//! replication. Configuration errors for the whole run are reported by the
//! engine's validator before any table starts and never appear here.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Phase of a table's replication in which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Discovering,
    Extracting,
    Finalizing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Discovering => "DISCOVERING",
            Self::Extracting => "EXTRACTING",
            Self::Finalizing => "FINALIZING",
        };
        f.write_str(s)
    }
}

/// Error raised while discovering or extracting a single table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    /// The configured table does not exist in the source.
    #[error("table '{table}' not found")]
    TableNotFound { table: String },

    /// A configured primary key column is not in the table.
    #[error("invalid primary key for table '{table}': column(s) {} not found", .missing.join(", "))]
    InvalidPrimaryKey { table: String, missing: Vec<String> },

    /// The configured replication key column is not in the table.
    #[error("replication key '{column}' not found in table '{table}'")]
    InvalidReplicationKey { table: String, column: String },

    /// A cell could not be coerced to its column's canonical type.
    #[error("cannot coerce {table}.{column} at row {row}: {reason}")]
    TypeCoercion {
        table: String,
        column: String,
        row: u64,
        reason: String,
    },

    /// Transport or authentication failure talking to the database.
    #[error("connection error: {0}")]
    Connection(String),

    /// A statement failed to execute.
    #[error("query failed: {0}")]
    Query(String),

    /// The state collaborator failed to load or save a bookmark.
    #[error("state error: {0}")]
    State(String),

    /// The run was interrupted between batches.
    #[error("extraction cancelled")]
    Cancelled,
}

impl ExtractError {
    /// Whether a connection-management layer could reasonably retry.
    ///
    /// Informational only: the engine itself never retries.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Stable machine-readable code for logs and summaries.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::TableNotFound { .. } => "TABLE_NOT_FOUND",
            Self::InvalidPrimaryKey { .. } => "INVALID_PRIMARY_KEY",
            Self::InvalidReplicationKey { .. } => "INVALID_REPLICATION_KEY",
            Self::TypeCoercion { .. } => "TYPE_COERCION",
            Self::Connection(_) => "CONNECTION",
            Self::Query(_) => "QUERY",
            Self::State(_) => "STATE",
            Self::Cancelled => "CANCELLED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_not_found_names_table() {
        let err = ExtractError::TableNotFound {
            table: "orders".into(),
        };
        assert_eq!(err.to_string(), "table 'orders' not found");
        assert_eq!(err.code(), "TABLE_NOT_FOUND");
    }

    #[test]
    fn invalid_primary_key_lists_missing_columns() {
        let err = ExtractError::InvalidPrimaryKey {
            table: "orders".into(),
            missing: vec!["order_id".into(), "line".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("orders"), "got: {msg}");
        assert!(msg.contains("order_id, line"), "got: {msg}");
    }

    #[test]
    fn type_coercion_identifies_cell() {
        let err = ExtractError::TypeCoercion {
            table: "events".into(),
            column: "amount".into(),
            row: 41,
            reason: "'abc' is not an integer".into(),
        };
        assert_eq!(
            err.to_string(),
            "cannot coerce events.amount at row 41: 'abc' is not an integer"
        );
    }

    #[test]
    fn only_connection_errors_are_retryable() {
        assert!(ExtractError::Connection("reset".into()).is_retryable());
        assert!(!ExtractError::Query("syntax".into()).is_retryable());
        assert!(!ExtractError::Cancelled.is_retryable());
    }

    #[test]
    fn phase_display_is_upper_case() {
        assert_eq!(Phase::Discovering.to_string(), "DISCOVERING");
        assert_eq!(
            serde_json::to_string(&Phase::Extracting).unwrap(),
            "\"EXTRACTING\""
        );
    }
}
