//! Run result types.

use std::fmt;

use tursotap_types::state::Bookmarks;

use crate::errors::TableFailure;

/// Terminal state of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    Done,
    Failed,
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        })
    }
}

/// What happened to one configured table.
#[derive(Debug, Clone)]
pub struct TableOutcome {
    pub table: String,
    pub status: TableStatus,
    /// Records emitted, including those of batches before a failure.
    pub records: u64,
    pub batches: u64,
    pub failure: Option<TableFailure>,
}

impl TableOutcome {
    pub(crate) fn done(table: String, records: u64, batches: u64) -> Self {
        Self {
            table,
            status: TableStatus::Done,
            records,
            batches,
            failure: None,
        }
    }

    pub(crate) fn failed(failure: TableFailure, records: u64, batches: u64) -> Self {
        Self {
            table: failure.table.clone(),
            status: TableStatus::Failed,
            records,
            batches,
            failure: Some(failure),
        }
    }
}

/// Result of one tap run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// One outcome per configured table, in configuration order.
    pub tables: Vec<TableOutcome>,
    /// Bookmark map as of the last emitted STATE message.
    pub bookmarks: Bookmarks,
    pub duration_secs: f64,
}

impl RunResult {
    /// True only when every table reached `DONE`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.tables.iter().all(|t| t.status == TableStatus::Done)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TableFailure> {
        self.tables.iter().filter_map(|t| t.failure.as_ref())
    }

    #[must_use]
    pub fn total_records(&self) -> u64 {
        self.tables.iter().map(|t| t.records).sum()
    }

    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableOutcome> {
        self.tables.iter().find(|t| t.table == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tursotap_types::error::{ExtractError, Phase};

    #[test]
    fn any_failed_table_fails_the_run() {
        let result = RunResult {
            tables: vec![
                TableOutcome::done("a".into(), 3, 1),
                TableOutcome::failed(
                    TableFailure {
                        table: "b".into(),
                        phase: Phase::Extracting,
                        error: ExtractError::Cancelled,
                    },
                    0,
                    0,
                ),
            ],
            bookmarks: Bookmarks::new(),
            duration_secs: 0.0,
        };
        assert!(!result.is_success());
        assert_eq!(result.failures().count(), 1);
        assert_eq!(result.total_records(), 3);
        assert_eq!(result.table("b").unwrap().status, TableStatus::Failed);
    }
}
